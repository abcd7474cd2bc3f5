use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height},
    crypto::{Address, Hash},
    currency::Currency,
    fraud::DriipKind,
};

/// Which off-ledger channel produced the proposal. The two channels are
/// mutually exclusive per (wallet, currency): at most one may hold a
/// non-terminated proposal at a time, so a single balance movement can
/// never be counted twice.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeChannel {
    /// Settlement of a concrete driip (payment or trade).
    Driip,
    /// Null settlement: staging with no driip to reconcile.
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProposalStatus {
    Qualified,
    Disqualified,
}

/// The driip a proposal claims to settle. Absent for null settlements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengedDriip {
    pub hash: Hash,
    pub kind: DriipKind,
}

/// Outcome of a successful dispute against a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disqualification {
    pub challenger: Address,
    pub height: Height,
    pub candidate_hash: Hash,
    pub candidate_kind: DriipKind,
}

/// A pending reconciliation between off-ledger driips and on-ledger
/// balances for one (wallet, currency) key. Single active instance per
/// key and channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementProposal {
    pub wallet: Address,
    pub currency: Currency,
    pub channel: ChallengeChannel,
    /// The wallet's driip nonce the proposal settles up to (0 for null
    /// settlements).
    pub nonce: u64,
    /// Net on-ledger effect of the off-ledger activity being settled;
    /// signed, since off-ledger activity can go either way.
    pub cumulative_transfer: i128,
    pub stage_amount: Amount,
    pub target_balance: Amount,
    /// Height the challenge window opened.
    pub reference_height: Height,
    /// Last height at which the proposal can still be disputed.
    pub expiration_height: Height,
    /// Whether the wallet itself (rather than a proxy service) started the
    /// challenge.
    pub wallet_initiated: bool,
    pub challenged: Option<ChallengedDriip>,
    pub status: ProposalStatus,
    pub disqualification: Option<Disqualification>,
    pub terminated: bool,
}

impl SettlementProposal {
    /// A proposal expires once its challenge window has passed without
    /// termination; expiry is implicit, never stored.
    pub fn expired(&self, now: Height) -> bool {
        self.expiration_height < now
    }
}
