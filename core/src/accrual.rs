//! Time-weighted accrual distribution.
//!
//! Pool revenue accumulates per currency inside an open period; closing a
//! period folds it into the aggregate figure. Wallets claim their share of
//! the aggregate in proportion to balance-blocks: the height-weighted sum
//! of their deposited balance over the unclaimed interval. Balances
//! fluctuate between closes, so a naive current-balance split would be
//! manipulable by depositing right before a close; integrating over the
//! whole interval removes that incentive.

use std::collections::HashMap;

use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height, ACCRUAL_SCALE},
    crypto::Address,
    currency::Currency,
    error::{CoreError, CoreResult},
    ledger::Ledger,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualPeriod {
    /// Revenue of the currently open period; resets to zero on close.
    pub period_accrual: Amount,
    /// Folded, claimable revenue; only decreases as claims are paid out.
    pub aggregate_accrual: Amount,
    /// Height of the most recent close, if any.
    pub last_close_height: Option<Height>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccrualEngine {
    periods: HashMap<Currency, AccrualPeriod>,
    /// Per wallet x currency claim checkpoint; prevents double-claiming
    /// the same interval.
    claims: HashMap<(Address, Currency), Height>,
}

impl AccrualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // === Projections ===

    pub fn period_accrual(&self, currency: &Currency) -> Amount {
        self.periods
            .get(currency)
            .map_or(0, |period| period.period_accrual)
    }

    pub fn aggregate_accrual(&self, currency: &Currency) -> Amount {
        self.periods
            .get(currency)
            .map_or(0, |period| period.aggregate_accrual)
    }

    pub fn last_close_height(&self, currency: &Currency) -> Option<Height> {
        self.periods.get(currency)?.last_close_height
    }

    pub fn last_claim_height(&self, wallet: &Address, currency: &Currency) -> Option<Height> {
        self.claims.get(&(*wallet, *currency)).copied()
    }

    // === Transitions ===

    /// Add revenue to the open period.
    pub fn record_revenue(&mut self, currency: &Currency, amount: Amount) -> CoreResult<()> {
        let period = self.periods.entry(*currency).or_default();
        period.period_accrual = period
            .period_accrual
            .checked_add(amount)
            .ok_or(CoreError::Overflow)?;
        Ok(())
    }

    /// Privileged: fold the open period into the aggregate and reset it.
    /// Returns the aggregate figure after the fold.
    pub fn close_period(&mut self, currency: &Currency, height: Height) -> CoreResult<Amount> {
        let period = self.periods.entry(*currency).or_default();
        if let Some(last) = period.last_close_height {
            if height <= last {
                return Err(CoreError::OutOfWindow {
                    gate: last.saturating_add(1),
                    now: height,
                });
            }
        }
        period.aggregate_accrual = period
            .aggregate_accrual
            .checked_add(period.period_accrual)
            .ok_or(CoreError::Overflow)?;
        period.period_accrual = 0;
        period.last_close_height = Some(height);
        debug!(
            "accrual period for {} closed at height {}, aggregate {}",
            currency, height, period.aggregate_accrual
        );
        Ok(period.aggregate_accrual)
    }

    /// Claim the wallet's share of the aggregate accrual over the interval
    /// `[last claim, last close)`, crediting it to the wallet's staged
    /// balance. The share is
    /// `balance_blocks(wallet) * aggregate / balance_blocks(all)`, computed
    /// with a fixed-point scale so narrow numerators do not round to zero
    /// early, then truncated toward zero.
    pub fn claim(
        &mut self,
        ledger: &mut Ledger,
        wallet: &Address,
        currency: &Currency,
    ) -> CoreResult<Amount> {
        let period = self
            .periods
            .get_mut(currency)
            .ok_or(CoreError::InvalidState("no accrual for currency"))?;
        let close = period
            .last_close_height
            .ok_or(CoreError::InvalidState("no closed accrual period"))?;
        if period.aggregate_accrual == 0 {
            return Err(CoreError::InvalidState("no accrual available"));
        }
        let from = self
            .claims
            .get(&(*wallet, *currency))
            .copied()
            .unwrap_or(0);
        if from >= close {
            return Err(CoreError::AlreadyClaimed(from));
        }

        let wallet_blocks = ledger.wallet_balance_blocks(wallet, currency, from, close);
        let total_blocks = ledger.total_balance_blocks(currency, from, close);
        if total_blocks.is_zero() {
            return Err(CoreError::InvalidState("no balance blocks in period"));
        }

        let scale = U256::from(ACCRUAL_SCALE);
        let scaled =
            wallet_blocks * U256::from(period.aggregate_accrual) * scale / total_blocks / scale;
        if scaled > U256::from(Amount::MAX) {
            return Err(CoreError::Overflow);
        }
        let amount = scaled.low_u128();

        // wallet_blocks <= total_blocks, so amount <= aggregate
        period.aggregate_accrual -= amount;
        self.claims.insert((*wallet, *currency), close);
        if amount > 0 {
            ledger.credit_staged(wallet, currency, amount)?;
        }
        debug!(
            "accrual claim by {} for {}: {} over [{}, {})",
            wallet, currency, amount, from, close
        );
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COIN_VALUE;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    /// Two depositors holding 3:1 over the whole period.
    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        let native = Currency::native();
        ledger.deposit(&addr(1), &native, 300, 0).unwrap();
        ledger.deposit(&addr(2), &native, 100, 0).unwrap();
        ledger
    }

    #[test]
    fn claim_splits_by_balance_blocks() {
        let mut ledger = funded_ledger();
        let mut engine = AccrualEngine::new();
        let native = Currency::native();

        // 1.2 + 0.6 units of revenue
        engine.record_revenue(&native, 12 * COIN_VALUE / 10).unwrap();
        engine.record_revenue(&native, 6 * COIN_VALUE / 10).unwrap();
        engine.close_period(&native, 100).unwrap();
        let aggregate = engine.aggregate_accrual(&native);
        assert_eq!(aggregate, 18 * COIN_VALUE / 10);

        let claimed = engine.claim(&mut ledger, &addr(1), &native).unwrap();
        assert_eq!(claimed, aggregate * 3 / 4);
        assert_eq!(engine.aggregate_accrual(&native), aggregate - claimed);
        assert_eq!(ledger.staged_balance(&addr(1), &native), claimed);

        // the second claim is computed against the reduced aggregate
        let remaining = aggregate - claimed;
        let claimed2 = engine.claim(&mut ledger, &addr(2), &native).unwrap();
        assert_eq!(claimed2, remaining / 4);
        assert_eq!(engine.aggregate_accrual(&native), remaining - claimed2);
    }

    #[test]
    fn double_claim_rejected() {
        let mut ledger = funded_ledger();
        let mut engine = AccrualEngine::new();
        let native = Currency::native();
        engine.record_revenue(&native, COIN_VALUE).unwrap();
        engine.close_period(&native, 100).unwrap();

        engine.claim(&mut ledger, &addr(1), &native).unwrap();
        assert_eq!(
            engine.claim(&mut ledger, &addr(1), &native),
            Err(CoreError::AlreadyClaimed(100))
        );

        // a new close re-opens claiming for the next interval
        engine.record_revenue(&native, COIN_VALUE).unwrap();
        engine.close_period(&native, 200).unwrap();
        engine.claim(&mut ledger, &addr(1), &native).unwrap();
    }

    #[test]
    fn late_depositor_gets_time_weighted_share() {
        let mut ledger = Ledger::new();
        let native = Currency::native();
        // wallet 1 holds 100 for the whole period, wallet 2 deposits the
        // same amount only for the last quarter
        ledger.deposit(&addr(1), &native, 100, 0).unwrap();
        ledger.deposit(&addr(2), &native, 100, 75).unwrap();

        let mut engine = AccrualEngine::new();
        engine.record_revenue(&native, 1000).unwrap();
        engine.close_period(&native, 100).unwrap();

        // blocks: wallet1 = 100*100 = 10000, wallet2 = 100*25 = 2500,
        // total 12500; the second claim sees the reduced aggregate
        let claimed1 = engine.claim(&mut ledger, &addr(1), &native).unwrap();
        let claimed2 = engine.claim(&mut ledger, &addr(2), &native).unwrap();
        assert_eq!(claimed1, 800);
        assert_eq!(claimed2, 40);
        assert_eq!(engine.aggregate_accrual(&native), 160);
    }

    #[test]
    fn claim_requires_closed_period_with_accrual() {
        let mut ledger = funded_ledger();
        let mut engine = AccrualEngine::new();
        let native = Currency::native();

        assert_eq!(
            engine.claim(&mut ledger, &addr(1), &native),
            Err(CoreError::InvalidState("no accrual for currency"))
        );
        engine.record_revenue(&native, 0).unwrap();
        assert_eq!(
            engine.claim(&mut ledger, &addr(1), &native),
            Err(CoreError::InvalidState("no closed accrual period"))
        );
        engine.close_period(&native, 10).unwrap();
        assert_eq!(
            engine.claim(&mut ledger, &addr(1), &native),
            Err(CoreError::InvalidState("no accrual available"))
        );
    }

    #[test]
    fn close_heights_must_advance() {
        let mut engine = AccrualEngine::new();
        let native = Currency::native();
        engine.close_period(&native, 100).unwrap();
        assert!(matches!(
            engine.close_period(&native, 100),
            Err(CoreError::OutOfWindow { .. })
        ));
    }
}
