//! Fraud / continuity validation of driip chains.
//!
//! The validator itself is stateless ([`validator`]); the tracker below
//! records convictions: it flips the global operational mode to `Exit`,
//! keeps the offending evidence as the canonical fraud record and lists
//! the wallets whose balances were seized.

mod evidence;
mod validator;

pub use evidence::{
    BalancePair, DriipKind, Evidence, OrderSnapshot, PaymentParty, PaymentRecord, TradeParty,
    TradeRecord,
};
pub use validator::{
    examine_double_spent_orders, examine_payment, examine_successive_payments,
    examine_successive_trades, examine_trade, FraudFinding,
};

use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::crypto::{Address, Hash};

/// Global operational mode of the protocol. Fraud detection toggles it to
/// `Exit`: no new deposits or challenges, staged withdrawals stay open so
/// participants can leave.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationalMode {
    #[default]
    Normal,
    Exit,
}

/// Record of all fraud convictions to date.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudTracker {
    mode: OperationalMode,
    /// The most recent convicted evidence, kept as the canonical record.
    canonical: Option<Evidence>,
    fraudulent_hashes: HashSet<Hash>,
    seized_wallets: HashSet<Address>,
}

impl FraudTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operational_mode(&self) -> OperationalMode {
        self.mode
    }

    pub fn canonical_record(&self) -> Option<&Evidence> {
        self.canonical.as_ref()
    }

    pub fn is_fraudulent(&self, hash: &Hash) -> bool {
        self.fraudulent_hashes.contains(hash)
    }

    pub fn fraud_count(&self) -> usize {
        self.fraudulent_hashes.len()
    }

    pub fn seized_wallets(&self) -> impl Iterator<Item = &Address> {
        self.seized_wallets.iter()
    }

    /// Register a conviction.
    pub fn convict(&mut self, evidence: Evidence, finding: &FraudFinding) {
        warn!(
            "fraud detected on record {}: {} (wallets {:?})",
            finding.record_hash, finding.reason, finding.wallets
        );
        self.mode = OperationalMode::Exit;
        self.fraudulent_hashes.insert(finding.record_hash);
        self.seized_wallets.extend(finding.wallets.iter().copied());
        self.canonical = Some(evidence);
    }
}
