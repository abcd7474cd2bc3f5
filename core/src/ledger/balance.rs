use serde::{Deserialize, Serialize};

use crate::{
    config::Amount,
    error::{CoreError, CoreResult},
};

/// The three balance phases of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancePhase {
    /// Raw custody, entered on deposit.
    Deposited,
    /// Earmarked for withdrawal or transfer-out.
    Staged,
    /// Credited from a counterparty's settlement.
    Settled,
}

/// Per wallet x currency balance record. Created lazily on first deposit,
/// never deleted; all three figures can return to zero and be reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecord {
    pub deposited: Amount,
    pub staged: Amount,
    pub settled: Amount,
}

impl BalanceRecord {
    pub fn get(&self, phase: BalancePhase) -> Amount {
        match phase {
            BalancePhase::Deposited => self.deposited,
            BalancePhase::Staged => self.staged,
            BalancePhase::Settled => self.settled,
        }
    }

    /// Sum of all three phases. The conservation invariant is stated over
    /// this figure.
    pub fn total(&self) -> Amount {
        self.deposited
            .saturating_add(self.staged)
            .saturating_add(self.settled)
    }

    /// Balance a settlement challenge can stage: deposited + settled.
    pub fn active(&self) -> Amount {
        self.deposited.saturating_add(self.settled)
    }

    pub fn credit(&mut self, phase: BalancePhase, amount: Amount) -> CoreResult<()> {
        let slot = self.slot_mut(phase);
        *slot = slot.checked_add(amount).ok_or(CoreError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, phase: BalancePhase, amount: Amount) -> CoreResult<()> {
        let slot = self.slot_mut(phase);
        if *slot < amount {
            return Err(CoreError::InsufficientBalance {
                need: amount,
                have: *slot,
            });
        }
        *slot -= amount;
        Ok(())
    }

    fn slot_mut(&mut self, phase: BalancePhase) -> &mut Amount {
        match phase {
            BalancePhase::Deposited => &mut self.deposited,
            BalancePhase::Staged => &mut self.staged,
            BalancePhase::Settled => &mut self.settled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_checks_phase_balance() {
        let mut record = BalanceRecord::default();
        record.credit(BalancePhase::Deposited, 100).unwrap();
        assert_eq!(
            record.debit(BalancePhase::Staged, 1),
            Err(CoreError::InsufficientBalance { need: 1, have: 0 })
        );
        record.debit(BalancePhase::Deposited, 60).unwrap();
        assert_eq!(record.deposited, 40);
        assert_eq!(record.total(), 40);
    }

    #[test]
    fn credit_detects_overflow() {
        let mut record = BalanceRecord {
            deposited: Amount::MAX,
            ..Default::default()
        };
        assert_eq!(
            record.credit(BalancePhase::Deposited, 1),
            Err(CoreError::Overflow)
        );
    }
}
