//! Security-bond / penalty pool.
//!
//! Same phase model as the ledger, reduced to a funded pool plus staged
//! per-wallet credits. Two deliberate departures from ledger semantics:
//! a withdrawal request is silently clamped to `min(request, staged)`
//! instead of rejected, and every stage event resets a per-stake release
//! clock; withdrawing before the clock elapses clamps the withdrawable
//! amount to zero rather than failing.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height},
    crypto::Address,
    currency::Currency,
    error::{CoreError, CoreResult},
    ledger::TransferBackend,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondStake {
    pub staged: Amount,
    /// First height at which the stake becomes withdrawable. Reset to
    /// `now + release_delay` on every stage event: extended, never
    /// stacked.
    pub release_height: Height,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecurityBond {
    release_delay: Height,
    /// Unallocated pool funds per currency.
    pool: HashMap<Currency, Amount>,
    stakes: HashMap<(Address, Currency), BondStake>,
}

impl SecurityBond {
    pub fn new(release_delay: Height) -> Self {
        Self {
            release_delay,
            pool: HashMap::new(),
            stakes: HashMap::new(),
        }
    }

    pub fn pool_balance(&self, currency: &Currency) -> Amount {
        self.pool.get(currency).copied().unwrap_or(0)
    }

    pub fn staged_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.stakes
            .get(&(*wallet, *currency))
            .map_or(0, |stake| stake.staged)
    }

    pub fn release_height(&self, wallet: &Address, currency: &Currency) -> Option<Height> {
        self.stakes
            .get(&(*wallet, *currency))
            .map(|stake| stake.release_height)
    }

    /// Fund the pool (penalty revenue, protocol deposits).
    pub fn deposit(&mut self, currency: &Currency, amount: Amount) -> CoreResult<()> {
        let pool = self.pool.entry(*currency).or_default();
        *pool = pool.checked_add(amount).ok_or(CoreError::Overflow)?;
        Ok(())
    }

    /// Privileged: stage a reward to a wallet out of the pool. Resets the
    /// stake's release clock to `now + release_delay`.
    pub fn stage(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<Height> {
        if amount == 0 {
            return Err(CoreError::InvalidArgument("zero amount"));
        }
        let pool = self.pool.entry(*currency).or_default();
        if *pool < amount {
            return Err(CoreError::InsufficientBalance {
                need: amount,
                have: *pool,
            });
        }
        let stake = self.stakes.entry((*wallet, *currency)).or_default();
        stake.staged = stake.staged.checked_add(amount).ok_or(CoreError::Overflow)?;
        *pool -= amount;
        stake.release_height = now.saturating_add(self.release_delay);
        debug!(
            "bond stage of {} {} to {}, release at height {}",
            amount, currency, wallet, stake.release_height
        );
        Ok(stake.release_height)
    }

    /// Withdraw staged bond funds. The transferred amount is
    /// `min(requested, staged)`, clamped to zero before the release
    /// height; clamping is not an error. Returns the amount transferred.
    pub fn withdraw(
        &mut self,
        wallet: &Address,
        requested: Amount,
        currency: &Currency,
        now: Height,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<Amount> {
        let Some(stake) = self.stakes.get_mut(&(*wallet, *currency)) else {
            return Ok(0);
        };
        let mut amount = requested.min(stake.staged);
        if now < stake.release_height {
            amount = 0;
        }
        if amount == 0 {
            return Ok(0);
        }
        stake.staged -= amount;
        if let Err(err) = backend.transfer_out(wallet, currency, amount) {
            // roll the debit back, all-or-nothing
            self.stakes
                .entry((*wallet, *currency))
                .or_default()
                .staged += amount;
            return Err(CoreError::TransferFailed(err.0));
        }
        Ok(amount)
    }
}
