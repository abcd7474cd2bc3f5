use thiserror::Error;

use crate::config::{Amount, Height};

pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy of the settlement core. Every check is performed eagerly
/// at the start of a mutating operation; on failure the whole operation is
/// aborted with no partial state change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unauthorized caller")]
    Unauthorized,

    #[error("wallet is locked")]
    WalletLocked,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: Amount, have: Amount },

    #[error("out of window: gate height {gate}, now {now}")]
    OutOfWindow { gate: Height, now: Height },

    #[error("malformed evidence: {0}")]
    MalformedEvidence(&'static str),

    #[error("already claimed up to height {0}")]
    AlreadyClaimed(Height),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("balance overflow")]
    Overflow,

    #[error("external transfer failed: {0}")]
    TransferFailed(&'static str),
}
