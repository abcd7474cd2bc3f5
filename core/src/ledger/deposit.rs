use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height},
    currency::Currency,
};

/// Append-only per-wallet deposit log entry. Audit trail only; immutable
/// once written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub amount: Amount,
    pub currency: Currency,
    pub height: Height,
}

/// One step of the deposited-balance history of a wallet x currency (or of
/// a whole currency, for the aggregate log). The history is a
/// piecewise-constant step function of height: `deposited` applies from
/// `height` until the next step. This is the time axis of the accrual
/// balance-blocks integral and the snapshot source for challenges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceStep {
    pub height: Height,
    pub deposited: Amount,
}

/// Value of the step function at `height` (the last step not past it).
pub fn value_at(steps: &[BalanceStep], height: Height) -> Amount {
    steps
        .iter()
        .rev()
        .find(|step| step.height <= height)
        .map(|step| step.deposited)
        .unwrap_or(0)
}

/// Height-weighted sum of the step function over `[from, to)`, widened to
/// U256 so downstream accrual arithmetic cannot overflow.
pub fn balance_blocks(steps: &[BalanceStep], from: Height, to: Height) -> primitive_types::U256 {
    use primitive_types::U256;

    if to <= from {
        return U256::zero();
    }

    let mut blocks = U256::zero();
    let mut cursor = from;
    let mut value = value_at(steps, from);
    for step in steps.iter().filter(|s| s.height > from && s.height < to) {
        blocks += U256::from(value) * U256::from(step.height - cursor);
        cursor = step.height;
        value = step.deposited;
    }
    blocks += U256::from(value) * U256::from(to - cursor);
    blocks
}
