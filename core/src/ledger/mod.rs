//! Multi-state balance ledger.
//!
//! Per wallet x currency three-phase balances (deposited / staged /
//! settled), an append-only per-wallet deposit log, and a deposited-balance
//! history used as the time axis for accrual distribution and as the
//! snapshot source for settlement challenges.

mod balance;
mod deposit;

pub use balance::{BalancePhase, BalanceRecord};
pub use deposit::{balance_blocks, value_at, BalanceStep, DepositRecord};

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{Amount, Height},
    crypto::Address,
    currency::Currency,
    error::{CoreError, CoreResult},
};

/// Failure of the external currency-transfer primitive. Any operation that
/// invoked the primitive rolls back entirely when it fails.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransferError(pub &'static str);

/// External currency-transfer primitive (native value or token transfer
/// with revert-on-failure semantics). Supplied by the execution
/// environment; the ledger mutates its internal state fully before
/// invoking it and rolls back if it fails.
pub trait TransferBackend {
    fn transfer_out(
        &mut self,
        to: &Address,
        currency: &Currency,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// The balance ledger. Owns all keyed balance storage; everything else in
/// the core reads or writes it through the operations below.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    /// Balances per wallet, with a deterministic per-wallet currency index
    /// built incrementally on each deposit. Seizure iterates this index.
    accounts: HashMap<Address, IndexMap<Currency, BalanceRecord>>,
    /// Append-only audit trail, deposits only.
    deposit_logs: HashMap<Address, Vec<DepositRecord>>,
    /// Deposited-balance history per wallet x currency. Appended on every
    /// change to the deposited phase, not only on deposits, so the accrual
    /// integral sees debits too.
    balance_history: HashMap<(Address, Currency), Vec<BalanceStep>>,
    /// Deposited-balance history summed over all wallets, per currency.
    aggregate_history: HashMap<Currency, Vec<BalanceStep>>,
    /// Current aggregate deposited figure per currency.
    aggregate_deposited: HashMap<Currency, Amount>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // === Projections ===

    pub fn record(&self, wallet: &Address, currency: &Currency) -> BalanceRecord {
        self.accounts
            .get(wallet)
            .and_then(|index| index.get(currency))
            .copied()
            .unwrap_or_default()
    }

    pub fn deposited_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.record(wallet, currency).deposited
    }

    pub fn staged_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.record(wallet, currency).staged
    }

    pub fn settled_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.record(wallet, currency).settled
    }

    /// Balance a settlement challenge may stage: deposited + settled.
    pub fn active_balance(&self, wallet: &Address, currency: &Currency) -> Amount {
        self.record(wallet, currency).active()
    }

    pub fn deposit_count(&self, wallet: &Address) -> usize {
        self.deposit_logs.get(wallet).map_or(0, Vec::len)
    }

    pub fn deposit_record(&self, wallet: &Address, index: usize) -> Option<&DepositRecord> {
        self.deposit_logs.get(wallet)?.get(index)
    }

    /// Currencies the wallet has ever held, in first-touch order.
    pub fn touched_currencies(&self, wallet: &Address) -> Vec<Currency> {
        self.accounts
            .get(wallet)
            .map(|index| index.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Deposited balance of the wallet as of the given height, read from
    /// the balance history step function.
    pub fn deposited_at(&self, wallet: &Address, currency: &Currency, height: Height) -> Amount {
        self.balance_history
            .get(&(*wallet, *currency))
            .map(|steps| value_at(steps, height))
            .unwrap_or(0)
    }

    /// Height-weighted deposited balance of the wallet over `[from, to)`.
    pub fn wallet_balance_blocks(
        &self,
        wallet: &Address,
        currency: &Currency,
        from: Height,
        to: Height,
    ) -> U256 {
        self.balance_history
            .get(&(*wallet, *currency))
            .map(|steps| balance_blocks(steps, from, to))
            .unwrap_or_default()
    }

    /// Height-weighted deposited balance over all wallets over `[from, to)`.
    pub fn total_balance_blocks(&self, currency: &Currency, from: Height, to: Height) -> U256 {
        self.aggregate_history
            .get(currency)
            .map(|steps| balance_blocks(steps, from, to))
            .unwrap_or_default()
    }

    // === Operations ===

    /// Credit an incoming deposit to the wallet's deposited balance and
    /// append to the deposit log. The only operation that extends the
    /// per-wallet currency index.
    pub fn deposit(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        amount: Amount,
        height: Height,
    ) -> CoreResult<()> {
        require_nonzero(amount)?;
        require_valid_currency(currency)?;

        let record = self.record_mut(wallet, currency);
        record.credit(BalancePhase::Deposited, amount)?;
        self.note_deposited_change(wallet, currency, height)?;

        self.deposit_logs.entry(*wallet).or_default().push(DepositRecord {
            amount,
            currency: *currency,
            height,
        });
        debug!("deposit of {} {} to {} at height {}", amount, currency, wallet, height);
        Ok(())
    }

    /// Earmark for withdrawal: moves from settled first, then deposited,
    /// into staged.
    pub fn stage(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        height: Height,
    ) -> CoreResult<()> {
        require_nonzero(amount)?;
        let record = self.record_mut(wallet, currency);
        let active = record.active();
        if active < amount {
            return Err(CoreError::InsufficientBalance {
                need: amount,
                have: active,
            });
        }
        // overflow-check the credit before any debit, all-or-nothing
        record
            .staged
            .checked_add(amount)
            .ok_or(CoreError::Overflow)?;
        let from_settled = record.settled.min(amount);
        let from_deposited = amount - from_settled;
        record.settled -= from_settled;
        record.deposited -= from_deposited;
        record.staged += amount;
        if from_deposited > 0 {
            self.note_deposited_change(wallet, currency, height)?;
        }
        Ok(())
    }

    /// Stage into a beneficiary's balance instead of the wallet's own.
    /// Beneficiary registration is checked by the caller.
    pub fn stage_to(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        beneficiary: &Address,
        height: Height,
    ) -> CoreResult<()> {
        require_nonzero(amount)?;
        if beneficiary == wallet {
            return Err(CoreError::InvalidArgument("beneficiary is the wallet itself"));
        }
        let record = self.record_mut(wallet, currency);
        let active = record.active();
        if active < amount {
            return Err(CoreError::InsufficientBalance {
                need: amount,
                have: active,
            });
        }
        // overflow-check the beneficiary credit before any debit
        self.record(beneficiary, currency)
            .staged
            .checked_add(amount)
            .ok_or(CoreError::Overflow)?;
        let record = self.record_mut(wallet, currency);
        let from_settled = record.settled.min(amount);
        let from_deposited = amount - from_settled;
        record.settled -= from_settled;
        record.deposited -= from_deposited;
        self.record_mut(beneficiary, currency).staged += amount;
        if from_deposited > 0 {
            self.note_deposited_change(wallet, currency, height)?;
        }
        Ok(())
    }

    /// Return staged funds to the deposited phase.
    pub fn unstage(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        height: Height,
    ) -> CoreResult<()> {
        require_nonzero(amount)?;
        let record = self.record_mut(wallet, currency);
        // overflow-check the credit before the debit, all-or-nothing
        record
            .deposited
            .checked_add(amount)
            .ok_or(CoreError::Overflow)?;
        record.debit(BalancePhase::Staged, amount)?;
        record.credit(BalancePhase::Deposited, amount)?;
        self.note_deposited_change(wallet, currency, height)
    }

    /// Withdraw staged funds through the external transfer primitive.
    /// Internal state is debited first; a failed transfer rolls it back.
    pub fn withdraw(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<()> {
        require_nonzero(amount)?;
        self.record_mut(wallet, currency)
            .debit(BalancePhase::Staged, amount)?;
        if let Err(err) = backend.transfer_out(wallet, currency, amount) {
            self.record_mut(wallet, currency)
                .credit(BalancePhase::Staged, amount)?;
            return Err(CoreError::TransferFailed(err.0));
        }
        debug!("withdrawal of {} {} by {}", amount, currency, wallet);
        Ok(())
    }

    /// Privileged: move funds from the source's deposited balance into the
    /// destination's settled balance.
    pub fn transfer_to_settled(
        &mut self,
        source: &Address,
        destination: &Address,
        amount: Amount,
        currency: &Currency,
        height: Height,
    ) -> CoreResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.record_mut(source, currency)
            .debit(BalancePhase::Deposited, amount)?;
        self.note_deposited_change(source, currency, height)?;
        self.record_mut(destination, currency)
            .credit(BalancePhase::Settled, amount)?;
        Ok(())
    }

    /// Privileged: withdraw from the source's deposited balance directly to
    /// an external destination through the transfer primitive.
    pub fn withdraw_from_deposited(
        &mut self,
        source: &Address,
        destination: &Address,
        amount: Amount,
        currency: &Currency,
        height: Height,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.record_mut(source, currency)
            .debit(BalancePhase::Deposited, amount)?;
        self.note_deposited_change(source, currency, height)?;
        if let Err(err) = backend.transfer_out(destination, currency, amount) {
            self.record_mut(source, currency)
                .credit(BalancePhase::Deposited, amount)?;
            self.note_deposited_change(source, currency, height)?;
            return Err(CoreError::TransferFailed(err.0));
        }
        Ok(())
    }

    /// Privileged: move all deposited + settled balances of the source,
    /// across its touched-currency index, into the destination's staged
    /// balance. Returns the per-currency amounts moved.
    pub fn seize(
        &mut self,
        source: &Address,
        destination: &Address,
        height: Height,
    ) -> CoreResult<Vec<(Currency, Amount)>> {
        if source == destination {
            return Err(CoreError::InvalidArgument("seizure onto the same wallet"));
        }
        // pre-check every destination credit before mutating anything, so
        // a failing currency cannot leave the sweep half applied
        let mut moved = Vec::new();
        for currency in self.touched_currencies(source) {
            let amount = self.record(source, &currency).active();
            if amount == 0 {
                continue;
            }
            self.record(destination, &currency)
                .staged
                .checked_add(amount)
                .ok_or(CoreError::Overflow)?;
            moved.push((currency, amount));
        }
        for (currency, amount) in &moved {
            let record = self.record_mut(source, currency);
            let from_deposited = record.deposited;
            record.deposited = 0;
            record.settled = 0;
            if from_deposited > 0 {
                self.note_deposited_change(source, currency, height)?;
            }
            self.record_mut(destination, currency).staged += amount;
        }
        debug!(
            "seized {} currencies from {} into {} at height {}",
            moved.len(),
            source,
            destination,
            height
        );
        Ok(moved)
    }

    /// Credit staged funds out of an external pool (accrual claims, bond
    /// rewards). Not part of the wallet-facing operation set.
    pub(crate) fn credit_staged(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        amount: Amount,
    ) -> CoreResult<()> {
        self.record_mut(wallet, currency)
            .credit(BalancePhase::Staged, amount)
    }

    // === Internals ===

    fn record_mut(&mut self, wallet: &Address, currency: &Currency) -> &mut BalanceRecord {
        self.accounts
            .entry(*wallet)
            .or_default()
            .entry(*currency)
            .or_default()
    }

    /// Append a balance-history step after a change to the wallet's
    /// deposited phase, and keep the per-currency aggregate in step.
    /// Same-height updates collapse into one step.
    fn note_deposited_change(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        height: Height,
    ) -> CoreResult<()> {
        let deposited = self.record(wallet, currency).deposited;
        let steps = self.balance_history.entry((*wallet, *currency)).or_default();
        let previous = steps.last().map(|step| step.deposited).unwrap_or(0);
        push_step(steps, height, deposited);

        let aggregate = self.aggregate_deposited.entry(*currency).or_default();
        *aggregate = if deposited >= previous {
            aggregate
                .checked_add(deposited - previous)
                .ok_or(CoreError::Overflow)?
        } else {
            aggregate
                .checked_sub(previous - deposited)
                .ok_or(CoreError::Overflow)?
        };
        let aggregate = *aggregate;
        push_step(self.aggregate_history.entry(*currency).or_default(), height, aggregate);
        Ok(())
    }
}

fn push_step(steps: &mut Vec<BalanceStep>, height: Height, deposited: Amount) {
    match steps.last_mut() {
        Some(last) if last.height == height => last.deposited = deposited,
        _ => steps.push(BalanceStep { height, deposited }),
    }
}

fn require_nonzero(amount: Amount) -> CoreResult<()> {
    if amount == 0 {
        return Err(CoreError::InvalidArgument("zero amount"));
    }
    Ok(())
}

fn require_valid_currency(currency: &Currency) -> CoreResult<()> {
    // A null contract address is only legal for the native pseudo-currency
    if !currency.is_native() && currency.contract.is_zero() {
        return Err(CoreError::InvalidArgument("null token contract address"));
    }
    Ok(())
}
