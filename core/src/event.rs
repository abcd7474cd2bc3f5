use serde::{Deserialize, Serialize};
use strum::EnumDiscriminants;

use crate::{
    authorization::ServiceAction,
    config::{Amount, Height},
    crypto::{Address, Hash},
    currency::Currency,
    fraud::DriipKind,
    settlement::ChallengeChannel,
};

/// One discrete event per state transition, carrying the operation's key
/// fields and the height at which it occurred. This log is the sole
/// interface consumed by external export/reporting tooling, which filters
/// it by kind and wallet to reconstruct history.
#[derive(Clone, Debug, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, strum::Display))]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum CoreEvent {
    #[serde(rename_all = "camelCase")]
    Deposited {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    Staged {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    StagedTo {
        wallet: Address,
        beneficiary: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    Unstaged {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    Withdrawn {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    TransferredToSettled {
        source: Address,
        destination: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    WithdrawnFromDeposited {
        source: Address,
        destination: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    Seized {
        source: Address,
        destination: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    ServiceRegistered { service: Address, height: Height },
    #[serde(rename_all = "camelCase")]
    ServiceActionEnabled {
        service: Address,
        action: ServiceAction,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    ServiceDisabled { service: Address, height: Height },
    #[serde(rename_all = "camelCase")]
    ServiceDeregistered { service: Address, height: Height },
    #[serde(rename_all = "camelCase")]
    BeneficiaryRegistered { beneficiary: Address, height: Height },
    #[serde(rename_all = "camelCase")]
    BeneficiaryDeregistered { beneficiary: Address, height: Height },
    #[serde(rename_all = "camelCase")]
    WalletLockChanged {
        wallet: Address,
        locked: bool,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    ChallengeStarted {
        wallet: Address,
        currency: Currency,
        channel: ChallengeChannel,
        nonce: u64,
        stage_amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    ChallengeStopped {
        wallet: Address,
        currency: Currency,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    ProposalDisqualified {
        wallet: Address,
        currency: Currency,
        challenger: Address,
        candidate_hash: Hash,
        candidate_kind: DriipKind,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    SettlementCompleted {
        wallet: Address,
        currency: Currency,
        stage_amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    FraudDetected {
        record_hash: Hash,
        kind: DriipKind,
        wallets: Vec<Address>,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    AccrualPeriodClosed {
        currency: Currency,
        aggregate_accrual: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    AccrualClaimed {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    BondStaged {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        release_height: Height,
        height: Height,
    },
    #[serde(rename_all = "camelCase")]
    BondWithdrawn {
        wallet: Address,
        currency: Currency,
        amount: Amount,
        height: Height,
    },
}

impl CoreEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// Wallets named by this event, used by the by-wallet export filter.
    pub fn wallets(&self) -> Vec<Address> {
        match self {
            CoreEvent::Deposited { wallet, .. }
            | CoreEvent::Staged { wallet, .. }
            | CoreEvent::Unstaged { wallet, .. }
            | CoreEvent::Withdrawn { wallet, .. }
            | CoreEvent::WalletLockChanged { wallet, .. }
            | CoreEvent::ChallengeStarted { wallet, .. }
            | CoreEvent::ChallengeStopped { wallet, .. }
            | CoreEvent::SettlementCompleted { wallet, .. }
            | CoreEvent::AccrualClaimed { wallet, .. }
            | CoreEvent::BondStaged { wallet, .. }
            | CoreEvent::BondWithdrawn { wallet, .. } => vec![*wallet],
            CoreEvent::StagedTo {
                wallet,
                beneficiary,
                ..
            } => vec![*wallet, *beneficiary],
            CoreEvent::TransferredToSettled {
                source,
                destination,
                ..
            }
            | CoreEvent::WithdrawnFromDeposited {
                source,
                destination,
                ..
            }
            | CoreEvent::Seized {
                source,
                destination,
                ..
            } => vec![*source, *destination],
            CoreEvent::ServiceRegistered { service, .. }
            | CoreEvent::ServiceActionEnabled { service, .. }
            | CoreEvent::ServiceDisabled { service, .. }
            | CoreEvent::ServiceDeregistered { service, .. } => vec![*service],
            CoreEvent::BeneficiaryRegistered { beneficiary, .. }
            | CoreEvent::BeneficiaryDeregistered { beneficiary, .. } => vec![*beneficiary],
            CoreEvent::ProposalDisqualified {
                wallet, challenger, ..
            } => vec![*wallet, *challenger],
            CoreEvent::FraudDetected { wallets, .. } => wallets.clone(),
            CoreEvent::AccrualPeriodClosed { .. } => Vec::new(),
        }
    }

    pub fn height(&self) -> Height {
        match self {
            CoreEvent::Deposited { height, .. }
            | CoreEvent::Staged { height, .. }
            | CoreEvent::StagedTo { height, .. }
            | CoreEvent::Unstaged { height, .. }
            | CoreEvent::Withdrawn { height, .. }
            | CoreEvent::TransferredToSettled { height, .. }
            | CoreEvent::WithdrawnFromDeposited { height, .. }
            | CoreEvent::Seized { height, .. }
            | CoreEvent::ServiceRegistered { height, .. }
            | CoreEvent::ServiceActionEnabled { height, .. }
            | CoreEvent::ServiceDisabled { height, .. }
            | CoreEvent::ServiceDeregistered { height, .. }
            | CoreEvent::BeneficiaryRegistered { height, .. }
            | CoreEvent::BeneficiaryDeregistered { height, .. }
            | CoreEvent::WalletLockChanged { height, .. }
            | CoreEvent::ChallengeStarted { height, .. }
            | CoreEvent::ChallengeStopped { height, .. }
            | CoreEvent::ProposalDisqualified { height, .. }
            | CoreEvent::SettlementCompleted { height, .. }
            | CoreEvent::FraudDetected { height, .. }
            | CoreEvent::AccrualPeriodClosed { height, .. }
            | CoreEvent::AccrualClaimed { height, .. }
            | CoreEvent::BondStaged { height, .. }
            | CoreEvent::BondWithdrawn { height, .. } => *height,
        }
    }
}

/// Append-only log of discrete events, one per state transition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<CoreEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: CoreEvent) {
        log::debug!("event {} at height {}", event.kind(), event.height());
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreEvent> {
        self.events.iter()
    }

    /// Events naming the given wallet, in emission order.
    pub fn by_wallet<'a>(&'a self, wallet: &'a Address) -> impl Iterator<Item = &'a CoreEvent> {
        self.events
            .iter()
            .filter(move |event| event.wallets().contains(wallet))
    }

    /// Events of the given kind, in emission order.
    pub fn by_kind(&self, kind: EventKind) -> impl Iterator<Item = &CoreEvent> + '_ {
        self.events.iter().filter(move |event| event.kind() == kind)
    }

    /// JSON export for the out-of-scope reporting tooling.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.events)
    }
}
