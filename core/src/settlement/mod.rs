//! Settlement-challenge state machine.
//!
//! Proposal lifecycle: `None -> Proposed -> {Qualified | Disqualified} ->
//! Terminated`, with implicit expiry once the challenge window passes.
//! Authorization, operational-mode and evidence-seal gating live in the
//! protocol facade; this module owns the proposal storage and the
//! transition rules over it.

mod proposal;

pub use proposal::{
    ChallengeChannel, ChallengedDriip, Disqualification, ProposalStatus, SettlementProposal,
};

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height, MarkerTiePolicy},
    crypto::{Address, Hash},
    currency::Currency,
    error::{CoreError, CoreResult},
    fraud::DriipKind,
};

type ProposalKey = (Address, Currency, ChallengeChannel);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChallengeMachine {
    proposals: HashMap<ProposalKey, SettlementProposal>,
    /// Height at which the last settlement completed per (wallet,
    /// currency); drives the cumulative-transfer correction.
    completion_markers: HashMap<(Address, Currency), Height>,
}

impl ChallengeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    // === Projections ===

    pub fn proposal(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<&SettlementProposal> {
        self.proposals.get(&(*wallet, *currency, channel))
    }

    pub fn has_proposal(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> bool {
        self.proposal(wallet, currency, channel).is_some()
    }

    pub fn proposal_status(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<ProposalStatus> {
        self.proposal(wallet, currency, channel).map(|p| p.status)
    }

    pub fn proposal_nonce(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<u64> {
        self.proposal(wallet, currency, channel).map(|p| p.nonce)
    }

    pub fn proposal_stage_amount(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<Amount> {
        self.proposal(wallet, currency, channel)
            .map(|p| p.stage_amount)
    }

    pub fn proposal_expiration_height(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<Height> {
        self.proposal(wallet, currency, channel)
            .map(|p| p.expiration_height)
    }

    pub fn proposal_disqualification(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<&Disqualification> {
        self.proposal(wallet, currency, channel)
            .and_then(|p| p.disqualification.as_ref())
    }

    pub fn completion_marker(&self, wallet: &Address, currency: &Currency) -> Option<Height> {
        self.completion_markers.get(&(*wallet, *currency)).copied()
    }

    /// True if either channel holds a non-terminated proposal for the key.
    /// Expiry does not clear the overlap; the proposal must be stopped or
    /// settled first, so the channels stay mutually exclusive.
    pub fn has_overlapping_proposal(&self, wallet: &Address, currency: &Currency) -> bool {
        [ChallengeChannel::Driip, ChallengeChannel::Null]
            .iter()
            .any(|channel| {
                self.proposal(wallet, currency, *channel)
                    .map(|p| !p.terminated)
                    .unwrap_or(false)
            })
    }

    /// Stage amount of the latest terminated proposal for the key, if the
    /// completion marker shows its effect is not yet reflected in balances
    /// as of `evidence_height`. Used to correct the cumulative transfer of
    /// a new proposal.
    pub fn unreflected_prior_stage(
        &self,
        wallet: &Address,
        currency: &Currency,
        evidence_height: Height,
        tie_policy: MarkerTiePolicy,
    ) -> Amount {
        let prior = [ChallengeChannel::Driip, ChallengeChannel::Null]
            .iter()
            .filter_map(|channel| self.proposal(wallet, currency, *channel))
            .filter(|p| p.terminated)
            .max_by_key(|p| p.reference_height);
        let Some(prior) = prior else {
            return 0;
        };
        let reflected = match self.completion_marker(wallet, currency) {
            None => false,
            Some(marker) => match tie_policy {
                MarkerTiePolicy::AlreadyReflected => marker <= evidence_height,
                MarkerTiePolicy::NotYetReflected => marker < evidence_height,
            },
        };
        if reflected {
            0
        } else {
            prior.stage_amount
        }
    }

    // === Transitions ===

    /// Open a new proposal. Fails if either channel already holds a
    /// non-terminated proposal for the key.
    pub fn start(&mut self, proposal: SettlementProposal) -> CoreResult<()> {
        if self.has_overlapping_proposal(&proposal.wallet, &proposal.currency) {
            return Err(CoreError::InvalidState("overlapping non-terminated proposal"));
        }
        debug!(
            "challenge started for {} / {} on {} channel, nonce {}",
            proposal.wallet, proposal.currency, proposal.channel, proposal.nonce
        );
        self.proposals.insert(
            (proposal.wallet, proposal.currency, proposal.channel),
            proposal,
        );
        Ok(())
    }

    /// Voluntarily cancel the challenge window: terminates the proposals
    /// of both channels for the key.
    pub fn stop(&mut self, wallet: &Address, currency: &Currency) -> CoreResult<()> {
        let mut stopped = false;
        for channel in [ChallengeChannel::Driip, ChallengeChannel::Null] {
            if let Some(proposal) = self.proposals.get_mut(&(*wallet, *currency, channel)) {
                if !proposal.terminated {
                    proposal.terminated = true;
                    stopped = true;
                }
            }
        }
        if !stopped {
            return Err(CoreError::InvalidState("no active proposal"));
        }
        Ok(())
    }

    /// Mark a proposal disqualified after counter-evidence prevailed.
    pub fn disqualify(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
        challenger: Address,
        height: Height,
        candidate_hash: Hash,
        candidate_kind: DriipKind,
    ) -> CoreResult<()> {
        let proposal = self
            .proposals
            .get_mut(&(*wallet, *currency, channel))
            .ok_or(CoreError::InvalidState("no such proposal"))?;
        if proposal.terminated {
            return Err(CoreError::InvalidState("proposal is terminated"));
        }
        if proposal.expired(height) {
            return Err(CoreError::OutOfWindow {
                gate: proposal.expiration_height,
                now: height,
            });
        }
        if proposal.status == ProposalStatus::Disqualified {
            return Err(CoreError::InvalidState("proposal already disqualified"));
        }
        proposal.status = ProposalStatus::Disqualified;
        proposal.disqualification = Some(Disqualification {
            challenger,
            height,
            candidate_hash,
            candidate_kind,
        });
        Ok(())
    }

    /// Terminate a qualified proposal whose challenge window has passed,
    /// recording the completion marker. Returns the amount to stage.
    pub fn settle(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
        now: Height,
    ) -> CoreResult<Amount> {
        let proposal = self
            .proposals
            .get_mut(&(*wallet, *currency, channel))
            .ok_or(CoreError::InvalidState("no such proposal"))?;
        if proposal.terminated {
            return Err(CoreError::InvalidState("proposal is terminated"));
        }
        if proposal.status != ProposalStatus::Qualified {
            return Err(CoreError::InvalidState("proposal is disqualified"));
        }
        if !proposal.expired(now) {
            // still inside the challenge window
            return Err(CoreError::OutOfWindow {
                gate: proposal.expiration_height.saturating_add(1),
                now,
            });
        }
        proposal.terminated = true;
        let stage_amount = proposal.stage_amount;
        self.completion_markers.insert((*wallet, *currency), now);
        debug!(
            "settlement completed for {} / {} at height {}, staging {}",
            wallet, currency, now, stage_amount
        );
        Ok(stage_amount)
    }
}
