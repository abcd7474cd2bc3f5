use serde::{Deserialize, Serialize};

use crate::{
    crypto::Address,
    error::{CoreError, CoreResult},
};

/// Height of an operation in the external ledger's append-only order.
pub type Height = u64;

/// Amounts are atomic units with 18 decimals.
pub type Amount = u128;

// 18 decimals numbers
pub const COIN_DECIMALS: u8 = 18;
// 10^18 to represent 1 unit
pub const COIN_VALUE: Amount = 10u128.pow(COIN_DECIMALS as u32);

// Fixed-point scale used by the accrual claim arithmetic to avoid early
// rounding-to-zero on narrow numerators
pub const ACCRUAL_SCALE: Amount = COIN_VALUE;

// Fees in a fee schedule are expressed as parts of COIN_VALUE per unit
// transferred (e.g. nominal = COIN_VALUE / 1000 charges 0.1%)
pub const DEFAULT_NOMINAL_FEE: Amount = COIN_VALUE / 1000;

// A newly registered service must wait at least this many heights before
// any of its actions can be enabled. Owner-configured timeouts below this
// floor are clamped up to it.
pub const MIN_SERVICE_ACTIVATION_TIMEOUT: Height = 10;
pub const DEFAULT_SERVICE_ACTIVATION_TIMEOUT: Height = 100;

// Challenge proposals stay open to dispute for this many heights
pub const DEFAULT_CHALLENGE_WINDOW: Height = 1000;

// Security-bond stakes are locked for this many heights after each stage
pub const DEFAULT_BOND_RELEASE_DELAY: Height = 500;

// Fee schedule updates must name an earliest-applicable height at least
// this far in the future
pub const DEFAULT_CONFIG_UPDATE_MARGIN: Height = 100;

/// One fee schedule version, applicable from `earliest_height` onwards.
/// `min`/`max`/`nominal` are parts of [`COIN_VALUE`] per unit transferred.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTier {
    pub earliest_height: Height,
    pub min: Amount,
    pub max: Amount,
    pub nominal: Amount,
}

impl FeeTier {
    /// Structural validity: min <= nominal <= max, all below COIN_VALUE.
    pub fn is_well_formed(&self) -> bool {
        self.min <= self.nominal && self.nominal <= self.max && self.max <= COIN_VALUE
    }
}

/// Height-versioned fee schedule. Versions are kept sorted by their
/// earliest-applicable height; lookups resolve to the latest version whose
/// earliest height is not in the future.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    tiers: Vec<FeeTier>,
}

impl FeeSchedule {
    pub fn new(genesis: FeeTier) -> Self {
        Self {
            tiers: vec![genesis],
        }
    }

    /// Schedule a new version. Rejected unless its earliest-applicable
    /// height is at least `margin` heights past `now`, so a schedule change
    /// can never retroactively re-judge already-sealed driips.
    pub fn push_update(&mut self, tier: FeeTier, now: Height, margin: Height) -> CoreResult<()> {
        if !tier.is_well_formed() {
            return Err(CoreError::InvalidArgument("malformed fee tier"));
        }
        if tier.earliest_height < now.saturating_add(margin) {
            return Err(CoreError::OutOfWindow {
                gate: now.saturating_add(margin),
                now: tier.earliest_height,
            });
        }
        if let Some(last) = self.tiers.last() {
            if tier.earliest_height <= last.earliest_height {
                return Err(CoreError::InvalidArgument("fee tier not monotone"));
            }
        }
        self.tiers.push(tier);
        Ok(())
    }

    /// Version applicable at `height`, if any.
    pub fn applicable(&self, height: Height) -> Option<&FeeTier> {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.earliest_height <= height)
    }
}

/// Tie-break policy for the completion marker used by the challenge
/// cumulative-transfer correction: what to do when the marker height equals
/// the evidence height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerTiePolicy {
    /// A marker at the evidence height counts as already reflected
    /// (no correction applied). Favors not double-counting.
    #[default]
    AlreadyReflected,
    /// A marker at the evidence height counts as not yet reflected
    /// (correction applied).
    NotYetReflected,
}

/// Configuration values handed to the core by the external registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfig {
    /// Address whose seal authenticates driip evidence.
    pub operator: Address,
    /// Address allowed to flip wallet locks.
    pub locker: Address,
    /// No settlement challenge may start before this height.
    pub earliest_settlement_height: Height,
    /// Heights a proposal stays open to dispute.
    pub challenge_window: Height,
    /// Heights a registered service must wait before action enablement.
    pub service_activation_timeout: Height,
    /// Heights a security-bond stake stays locked after each stage.
    pub bond_release_delay: Height,
    /// Minimum future margin for fee schedule updates.
    pub config_update_margin: Height,
    /// Completion-marker tie-break (see [`MarkerTiePolicy`]).
    pub completion_marker_tie: MarkerTiePolicy,
    /// Fee schedule applied to payment driips.
    pub payment_fees: FeeSchedule,
    /// Fee schedule applied to trade driips.
    pub trade_fees: FeeSchedule,
}

impl ProtocolConfig {
    pub fn new(operator: Address, locker: Address) -> Self {
        let genesis_tier = FeeTier {
            earliest_height: 0,
            min: 0,
            max: COIN_VALUE / 10,
            nominal: DEFAULT_NOMINAL_FEE,
        };
        Self {
            operator,
            locker,
            earliest_settlement_height: 0,
            challenge_window: DEFAULT_CHALLENGE_WINDOW,
            service_activation_timeout: DEFAULT_SERVICE_ACTIVATION_TIMEOUT,
            bond_release_delay: DEFAULT_BOND_RELEASE_DELAY,
            config_update_margin: DEFAULT_CONFIG_UPDATE_MARGIN,
            completion_marker_tie: MarkerTiePolicy::default(),
            payment_fees: FeeSchedule::new(genesis_tier),
            trade_fees: FeeSchedule::new(genesis_tier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_schedule_resolves_latest_applicable() {
        let mut schedule = FeeSchedule::new(FeeTier {
            earliest_height: 0,
            min: 0,
            max: COIN_VALUE / 10,
            nominal: DEFAULT_NOMINAL_FEE,
        });
        schedule
            .push_update(
                FeeTier {
                    earliest_height: 500,
                    min: 0,
                    max: COIN_VALUE / 10,
                    nominal: DEFAULT_NOMINAL_FEE * 2,
                },
                100,
                100,
            )
            .unwrap();

        assert_eq!(schedule.applicable(499).unwrap().nominal, DEFAULT_NOMINAL_FEE);
        assert_eq!(
            schedule.applicable(500).unwrap().nominal,
            DEFAULT_NOMINAL_FEE * 2
        );
    }

    #[test]
    fn fee_schedule_update_requires_future_margin() {
        let mut schedule = FeeSchedule::new(FeeTier {
            earliest_height: 0,
            min: 0,
            max: COIN_VALUE / 10,
            nominal: DEFAULT_NOMINAL_FEE,
        });
        let tier = FeeTier {
            earliest_height: 150,
            min: 0,
            max: COIN_VALUE / 10,
            nominal: DEFAULT_NOMINAL_FEE,
        };
        // now + margin = 200 > 150, too soon
        assert!(matches!(
            schedule.push_update(tier, 100, 100),
            Err(CoreError::OutOfWindow { .. })
        ));
    }

    #[test]
    fn malformed_fee_tier_rejected() {
        let mut schedule = FeeSchedule::default();
        let tier = FeeTier {
            earliest_height: 1000,
            min: COIN_VALUE / 2,
            max: COIN_VALUE / 10,
            nominal: DEFAULT_NOMINAL_FEE,
        };
        assert!(matches!(
            schedule.push_update(tier, 0, 100),
            Err(CoreError::InvalidArgument(_))
        ));
    }
}
