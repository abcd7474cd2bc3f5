#![allow(clippy::too_many_arguments)]

pub mod accrual;
pub mod authorization;
pub mod bond;
pub mod config;
pub mod crypto;
pub mod currency;
pub mod error;
pub mod event;
pub mod fraud;
pub mod ledger;
pub mod protocol;
pub mod settlement;

pub use protocol::Protocol;

#[cfg(test)]
mod protocol_tests;
