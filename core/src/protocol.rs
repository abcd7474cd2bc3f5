//! Protocol facade.
//!
//! Single entry surface over the ledger, the authorization registry, the
//! challenge machine, the fraud tracker, the accrual engine and the
//! security bond. Every wallet-facing or privileged operation goes through
//! here: the facade performs the authorization, wallet-lock and
//! operational-mode gating, delegates the state transition to the owning
//! module and appends the corresponding event.

use log::info;

use crate::{
    accrual::AccrualEngine,
    authorization::{AuthorizationState, ServiceAction},
    bond::SecurityBond,
    config::{Amount, FeeTier, Height, ProtocolConfig},
    crypto::Address,
    currency::Currency,
    error::{CoreError, CoreResult},
    event::{CoreEvent, EventLog},
    fraud::{
        examine_double_spent_orders, examine_payment, examine_successive_payments,
        examine_successive_trades, examine_trade, DriipKind, Evidence, FraudFinding, FraudTracker,
        OperationalMode, PaymentRecord, TradeRecord,
    },
    ledger::{Ledger, TransferBackend},
    settlement::{
        ChallengeChannel, ChallengeMachine, ChallengedDriip, Disqualification, ProposalStatus,
        SettlementProposal,
    },
};

pub struct Protocol {
    config: ProtocolConfig,
    ledger: Ledger,
    auth: AuthorizationState,
    challenges: ChallengeMachine,
    fraud: FraudTracker,
    accrual: AccrualEngine,
    bond: SecurityBond,
    events: EventLog,
}

impl Protocol {
    pub fn new(config: ProtocolConfig, owner: Address) -> Self {
        let auth =
            AuthorizationState::new(owner, config.locker, config.service_activation_timeout);
        let bond = SecurityBond::new(config.bond_release_delay);
        Self {
            config,
            ledger: Ledger::new(),
            auth,
            challenges: ChallengeMachine::new(),
            fraud: FraudTracker::new(),
            accrual: AccrualEngine::new(),
            bond,
            events: EventLog::new(),
        }
    }

    // === Projections ===

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn authorization(&self) -> &AuthorizationState {
        &self.auth
    }

    pub fn challenges(&self) -> &ChallengeMachine {
        &self.challenges
    }

    pub fn fraud(&self) -> &FraudTracker {
        &self.fraud
    }

    pub fn accrual(&self) -> &AccrualEngine {
        &self.accrual
    }

    pub fn bond(&self) -> &SecurityBond {
        &self.bond
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn operational_mode(&self) -> OperationalMode {
        self.fraud.operational_mode()
    }

    // === Configuration ===

    /// Owner-only fee schedule update; the new tier must lie past the
    /// configured future margin.
    pub fn update_fee_schedule(
        &mut self,
        caller: &Address,
        kind: DriipKind,
        tier: FeeTier,
        now: Height,
    ) -> CoreResult<()> {
        if caller != self.auth.owner() {
            return Err(CoreError::Unauthorized);
        }
        let margin = self.config.config_update_margin;
        match kind {
            DriipKind::Payment => self.config.payment_fees.push_update(tier, now, margin),
            DriipKind::Trade => self.config.trade_fees.push_update(tier, now, margin),
        }
    }

    // === Balance operations ===

    /// Credit an incoming deposit. Refused once the protocol has entered
    /// exit mode.
    pub fn deposit(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        amount: Amount,
        now: Height,
    ) -> CoreResult<()> {
        self.require_normal_mode()?;
        self.ledger.deposit(wallet, currency, amount, now)?;
        self.events.push(CoreEvent::Deposited {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    pub fn stage(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.ledger.stage(wallet, amount, currency, now)?;
        self.events.push(CoreEvent::Staged {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    /// Stage on behalf of a wallet; restricted to services enabled for the
    /// stage action.
    pub fn stage_by_service(
        &mut self,
        caller: &Address,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::Stage)?;
        self.ledger.stage(wallet, amount, currency, now)?;
        self.events.push(CoreEvent::Staged {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    /// Stage into a registered beneficiary's balance.
    pub fn stage_to_beneficiary(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        beneficiary: &Address,
        now: Height,
    ) -> CoreResult<()> {
        if !self.auth.is_registered_beneficiary(beneficiary) {
            return Err(CoreError::Unauthorized);
        }
        self.ledger
            .stage_to(wallet, amount, currency, beneficiary, now)?;
        self.events.push(CoreEvent::StagedTo {
            wallet: *wallet,
            beneficiary: *beneficiary,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    pub fn unstage(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.ledger.unstage(wallet, amount, currency, now)?;
        self.events.push(CoreEvent::Unstaged {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    /// Withdraw staged funds. Open in exit mode so participants can leave;
    /// refused only for locked wallets.
    pub fn withdraw(
        &mut self,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<()> {
        if self.auth.is_wallet_locked(wallet) {
            return Err(CoreError::WalletLocked);
        }
        self.ledger.withdraw(wallet, amount, currency, backend)?;
        self.events.push(CoreEvent::Withdrawn {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    pub fn transfer_to_settled(
        &mut self,
        caller: &Address,
        source: &Address,
        destination: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::TransferToSettled)?;
        self.ledger
            .transfer_to_settled(source, destination, amount, currency, now)?;
        self.events.push(CoreEvent::TransferredToSettled {
            source: *source,
            destination: *destination,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    pub fn withdraw_from_deposited(
        &mut self,
        caller: &Address,
        source: &Address,
        destination: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::WithdrawFromDeposited)?;
        if self.auth.is_wallet_locked(source) {
            return Err(CoreError::WalletLocked);
        }
        self.ledger
            .withdraw_from_deposited(source, destination, amount, currency, now, backend)?;
        self.events.push(CoreEvent::WithdrawnFromDeposited {
            source: *source,
            destination: *destination,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(())
    }

    pub fn seize(
        &mut self,
        caller: &Address,
        source: &Address,
        destination: &Address,
        now: Height,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::Seize)?;
        self.seize_into(source, destination, now)
    }

    // === Authorization ===

    pub fn register_service(
        &mut self,
        caller: &Address,
        service: Address,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.register_service(caller, service, now)?;
        self.events.push(CoreEvent::ServiceRegistered {
            service,
            height: now,
        });
        Ok(())
    }

    pub fn enable_service_action(
        &mut self,
        caller: &Address,
        service: &Address,
        action: ServiceAction,
        now: Height,
    ) -> CoreResult<()> {
        self.auth
            .enable_service_action(caller, service, action, now)?;
        self.events.push(CoreEvent::ServiceActionEnabled {
            service: *service,
            action,
            height: now,
        });
        Ok(())
    }

    pub fn disable_service(
        &mut self,
        caller: &Address,
        service: &Address,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.disable_service(caller, service)?;
        self.events.push(CoreEvent::ServiceDisabled {
            service: *service,
            height: now,
        });
        Ok(())
    }

    pub fn deregister_service(
        &mut self,
        caller: &Address,
        service: &Address,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.deregister_service(caller, service)?;
        self.events.push(CoreEvent::ServiceDeregistered {
            service: *service,
            height: now,
        });
        Ok(())
    }

    pub fn set_activation_timeout(&mut self, caller: &Address, timeout: Height) -> CoreResult<()> {
        self.auth.set_activation_timeout(caller, timeout)
    }

    pub fn register_beneficiary(
        &mut self,
        caller: &Address,
        beneficiary: Address,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.register_beneficiary(caller, beneficiary)?;
        self.events.push(CoreEvent::BeneficiaryRegistered {
            beneficiary,
            height: now,
        });
        Ok(())
    }

    pub fn deregister_beneficiary(
        &mut self,
        caller: &Address,
        beneficiary: &Address,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.deregister_beneficiary(caller, beneficiary)?;
        self.events.push(CoreEvent::BeneficiaryDeregistered {
            beneficiary: *beneficiary,
            height: now,
        });
        Ok(())
    }

    pub fn set_wallet_lock(
        &mut self,
        caller: &Address,
        wallet: Address,
        locked: bool,
        now: Height,
    ) -> CoreResult<()> {
        self.auth.set_wallet_lock(caller, wallet, locked)?;
        self.events.push(CoreEvent::WalletLockChanged {
            wallet,
            locked,
            height: now,
        });
        Ok(())
    }

    // === Settlement challenges ===

    /// Open a driip settlement challenge for the wallet, either by the
    /// wallet itself or by an enabled settlement proxy. The proposal's
    /// cumulative transfer is computed from the off-ledger balance carried
    /// by the evidence, the on-ledger deposited snapshot at the evidence
    /// height and the unreflected stage of the latest completed settlement.
    pub fn start_challenge(
        &mut self,
        caller: &Address,
        wallet: &Address,
        currency: &Currency,
        evidence: &Evidence,
        stage_amount: Amount,
        now: Height,
    ) -> CoreResult<()> {
        self.require_challenge_open(caller, wallet, now)?;
        self.verify_seal(evidence)?;
        if self.fraud.is_fraudulent(&evidence.seal().hash) {
            return Err(CoreError::InvalidState("record is a convicted fraud"));
        }
        let nonce = evidence
            .party_nonce(wallet)
            .ok_or(CoreError::MalformedEvidence("wallet is not a party to the record"))?;
        if !evidence.currencies().contains(currency) {
            return Err(CoreError::MalformedEvidence("currency not in record"));
        }

        let active = self.ledger.active_balance(wallet, currency);
        if active < stage_amount {
            return Err(CoreError::InsufficientBalance {
                need: stage_amount,
                have: active,
            });
        }

        let off_ledger = signed(evidence_balance(evidence, wallet, currency)?)?;
        let on_ledger = signed(self.ledger.deposited_at(wallet, currency, evidence.height()))?;
        let correction = signed(self.challenges.unreflected_prior_stage(
            wallet,
            currency,
            evidence.height(),
            self.config.completion_marker_tie,
        ))?;
        let cumulative_transfer = off_ledger
            .checked_sub(on_ledger)
            .and_then(|value| value.checked_sub(correction))
            .ok_or(CoreError::Overflow)?;

        self.challenges.start(SettlementProposal {
            wallet: *wallet,
            currency: *currency,
            channel: ChallengeChannel::Driip,
            nonce,
            cumulative_transfer,
            stage_amount,
            target_balance: active - stage_amount,
            reference_height: now,
            expiration_height: now.saturating_add(self.config.challenge_window),
            wallet_initiated: caller == wallet,
            challenged: Some(ChallengedDriip {
                hash: evidence.seal().hash,
                kind: evidence.kind(),
            }),
            status: ProposalStatus::Qualified,
            disqualification: None,
            terminated: false,
        })?;
        self.events.push(CoreEvent::ChallengeStarted {
            wallet: *wallet,
            currency: *currency,
            channel: ChallengeChannel::Driip,
            nonce,
            stage_amount,
            height: now,
        });
        Ok(())
    }

    /// Open a null settlement challenge: staging without a driip.
    pub fn start_null_challenge(
        &mut self,
        caller: &Address,
        wallet: &Address,
        currency: &Currency,
        stage_amount: Amount,
        now: Height,
    ) -> CoreResult<()> {
        self.require_challenge_open(caller, wallet, now)?;
        let active = self.ledger.active_balance(wallet, currency);
        if active < stage_amount {
            return Err(CoreError::InsufficientBalance {
                need: stage_amount,
                have: active,
            });
        }
        self.challenges.start(SettlementProposal {
            wallet: *wallet,
            currency: *currency,
            channel: ChallengeChannel::Null,
            nonce: 0,
            cumulative_transfer: 0,
            stage_amount,
            target_balance: active - stage_amount,
            reference_height: now,
            expiration_height: now.saturating_add(self.config.challenge_window),
            wallet_initiated: caller == wallet,
            challenged: None,
            status: ProposalStatus::Qualified,
            disqualification: None,
            terminated: false,
        })?;
        self.events.push(CoreEvent::ChallengeStarted {
            wallet: *wallet,
            currency: *currency,
            channel: ChallengeChannel::Null,
            nonce: 0,
            stage_amount,
            height: now,
        });
        Ok(())
    }

    pub fn stop_challenge(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.challenges.stop(wallet, currency)?;
        self.events.push(CoreEvent::ChallengeStopped {
            wallet: *wallet,
            currency: *currency,
            height: now,
        });
        Ok(())
    }

    /// Dispute an open proposal with a newer driip record. The counter
    /// evidence must be sealed by the operator, pass the continuity
    /// validator on its own, name the challenged wallet as a party, and
    /// carry a nonce past the one the proposal settles up to. Success
    /// disqualifies the proposal and hands the wallet's deposited and
    /// settled balances to the challenger.
    pub fn challenge_by_evidence(
        &mut self,
        challenger: &Address,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
        counter: &Evidence,
        now: Height,
    ) -> CoreResult<()> {
        self.verify_seal(counter)?;
        // a record that fails its own continuity checks cannot prevail
        // over the proposal; it belongs to the fraud path instead
        let finding = match counter {
            Evidence::Payment(record) => examine_payment(record, &self.config)?,
            Evidence::Trade(record) => examine_trade(record, &self.config)?,
        };
        if finding.is_some() {
            return Err(CoreError::InvalidState("counter record is itself inconsistent"));
        }
        let counter_nonce = counter
            .party_nonce(wallet)
            .ok_or(CoreError::MalformedEvidence("wallet is not a party to the record"))?;
        let proposal_nonce = self
            .challenges
            .proposal_nonce(wallet, currency, channel)
            .ok_or(CoreError::InvalidState("no such proposal"))?;
        if counter_nonce <= proposal_nonce {
            return Err(CoreError::InvalidState("candidate does not supersede proposal"));
        }

        let candidate_hash = counter.seal().hash;
        let candidate_kind = counter.kind();
        self.challenges.disqualify(
            wallet,
            currency,
            channel,
            *challenger,
            now,
            candidate_hash,
            candidate_kind,
        )?;
        info!(
            "proposal for {} / {} disqualified by {} at height {}",
            wallet, currency, challenger, now
        );
        self.events.push(CoreEvent::ProposalDisqualified {
            wallet: *wallet,
            currency: *currency,
            challenger: *challenger,
            candidate_hash,
            candidate_kind,
            height: now,
        });
        self.seize_into(wallet, challenger, now)
    }

    /// Terminate a qualified proposal whose window has passed, staging its
    /// amount.
    pub fn settle_qualified(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
        now: Height,
    ) -> CoreResult<Amount> {
        let stage_amount = self.challenges.settle(wallet, currency, channel, now)?;
        if stage_amount > 0 {
            self.ledger.stage(wallet, stage_amount, currency, now)?;
        }
        self.events.push(CoreEvent::SettlementCompleted {
            wallet: *wallet,
            currency: *currency,
            stage_amount,
            height: now,
        });
        Ok(stage_amount)
    }

    pub fn proposal_disqualification(
        &self,
        wallet: &Address,
        currency: &Currency,
        channel: ChallengeChannel,
    ) -> Option<&Disqualification> {
        self.challenges
            .proposal_disqualification(wallet, currency, channel)
    }

    // === Fraud challenges ===
    //
    // Open in exit mode as well: detecting further fraud must stay
    // possible after the first conviction.

    pub fn challenge_by_payment(
        &mut self,
        challenger: &Address,
        record: &PaymentRecord,
        now: Height,
    ) -> CoreResult<()> {
        let finding = examine_payment(record, &self.config)?
            .ok_or(CoreError::InvalidState("record is genuine"))?;
        self.convict(challenger, Evidence::Payment(*record), finding, now)
    }

    pub fn challenge_by_trade(
        &mut self,
        challenger: &Address,
        record: &TradeRecord,
        now: Height,
    ) -> CoreResult<()> {
        let finding = examine_trade(record, &self.config)?
            .ok_or(CoreError::InvalidState("record is genuine"))?;
        self.convict(challenger, Evidence::Trade(*record), finding, now)
    }

    pub fn challenge_by_successive_payments(
        &mut self,
        challenger: &Address,
        wallet: &Address,
        earlier: &PaymentRecord,
        later: &PaymentRecord,
        now: Height,
    ) -> CoreResult<()> {
        let finding = examine_successive_payments(wallet, earlier, later, &self.config)?
            .ok_or(CoreError::InvalidState("records are consistent"))?;
        self.convict(challenger, Evidence::Payment(*later), finding, now)
    }

    pub fn challenge_by_successive_trades(
        &mut self,
        challenger: &Address,
        wallet: &Address,
        earlier: &TradeRecord,
        later: &TradeRecord,
        now: Height,
    ) -> CoreResult<()> {
        let finding = examine_successive_trades(wallet, earlier, later, &self.config)?
            .ok_or(CoreError::InvalidState("records are consistent"))?;
        self.convict(challenger, Evidence::Trade(*later), finding, now)
    }

    pub fn challenge_by_double_spent_orders(
        &mut self,
        challenger: &Address,
        first: &TradeRecord,
        second: &TradeRecord,
        now: Height,
    ) -> CoreResult<()> {
        let finding = examine_double_spent_orders(first, second, &self.config)?
            .ok_or(CoreError::InvalidState("records are consistent"))?;
        self.convict(challenger, Evidence::Trade(*second), finding, now)
    }

    // === Accrual ===

    /// Record revenue into the open accrual period. Fed by the external
    /// fee collection.
    pub fn record_accrual_revenue(
        &mut self,
        currency: &Currency,
        amount: Amount,
    ) -> CoreResult<()> {
        self.accrual.record_revenue(currency, amount)
    }

    pub fn close_accrual_period(
        &mut self,
        caller: &Address,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::CloseAccrualPeriod)?;
        let aggregate = self.accrual.close_period(currency, now)?;
        self.events.push(CoreEvent::AccrualPeriodClosed {
            currency: *currency,
            aggregate_accrual: aggregate,
            height: now,
        });
        Ok(())
    }

    pub fn claim_accrual(
        &mut self,
        wallet: &Address,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<Amount> {
        if self.auth.is_wallet_locked(wallet) {
            return Err(CoreError::WalletLocked);
        }
        let amount = self.accrual.claim(&mut self.ledger, wallet, currency)?;
        self.events.push(CoreEvent::AccrualClaimed {
            wallet: *wallet,
            currency: *currency,
            amount,
            height: now,
        });
        Ok(amount)
    }

    // === Security bond ===

    pub fn bond_deposit(&mut self, currency: &Currency, amount: Amount) -> CoreResult<()> {
        self.bond.deposit(currency, amount)
    }

    pub fn bond_stage(
        &mut self,
        caller: &Address,
        wallet: &Address,
        amount: Amount,
        currency: &Currency,
        now: Height,
    ) -> CoreResult<()> {
        self.require_enabled_service(caller, ServiceAction::StageBond)?;
        let release_height = self.bond.stage(wallet, amount, currency, now)?;
        self.events.push(CoreEvent::BondStaged {
            wallet: *wallet,
            currency: *currency,
            amount,
            release_height,
            height: now,
        });
        Ok(())
    }

    pub fn bond_withdraw(
        &mut self,
        wallet: &Address,
        requested: Amount,
        currency: &Currency,
        now: Height,
        backend: &mut dyn TransferBackend,
    ) -> CoreResult<Amount> {
        let amount = self
            .bond
            .withdraw(wallet, requested, currency, now, backend)?;
        if amount > 0 {
            self.events.push(CoreEvent::BondWithdrawn {
                wallet: *wallet,
                currency: *currency,
                amount,
                height: now,
            });
        }
        Ok(amount)
    }

    // === Internals ===

    fn require_normal_mode(&self) -> CoreResult<()> {
        if self.fraud.operational_mode() != OperationalMode::Normal {
            return Err(CoreError::InvalidState("protocol is in exit mode"));
        }
        Ok(())
    }

    fn require_enabled_service(&self, caller: &Address, action: ServiceAction) -> CoreResult<()> {
        if !self.auth.is_enabled_service(caller, action) {
            return Err(CoreError::Unauthorized);
        }
        Ok(())
    }

    /// A challenge may be opened by the wallet itself or by an enabled
    /// settlement proxy on its behalf.
    fn require_challenge_open(
        &self,
        caller: &Address,
        wallet: &Address,
        now: Height,
    ) -> CoreResult<()> {
        self.require_normal_mode()?;
        if caller != wallet {
            self.require_enabled_service(caller, ServiceAction::Stage)?;
        }
        if now < self.config.earliest_settlement_height {
            return Err(CoreError::OutOfWindow {
                gate: self.config.earliest_settlement_height,
                now,
            });
        }
        if self.auth.is_wallet_locked(wallet) {
            return Err(CoreError::WalletLocked);
        }
        Ok(())
    }

    fn verify_seal(&self, evidence: &Evidence) -> CoreResult<()> {
        let seal = evidence.seal();
        if seal.signer != self.config.operator {
            return Err(CoreError::MalformedEvidence("seal not signed by operator"));
        }
        if evidence.compute_hash() != seal.hash {
            return Err(CoreError::MalformedEvidence("sealed hash does not match record fields"));
        }
        Ok(())
    }

    /// Register the conviction and seize the implicated wallets' active
    /// balances into the challenger's staged balance.
    fn convict(
        &mut self,
        challenger: &Address,
        evidence: Evidence,
        finding: FraudFinding,
        now: Height,
    ) -> CoreResult<()> {
        self.fraud.convict(evidence, &finding);
        self.events.push(CoreEvent::FraudDetected {
            record_hash: finding.record_hash,
            kind: finding.kind,
            wallets: finding.wallets.clone(),
            height: now,
        });
        for wallet in &finding.wallets {
            if wallet != challenger {
                self.seize_into(wallet, challenger, now)?;
            }
        }
        Ok(())
    }

    fn seize_into(
        &mut self,
        source: &Address,
        destination: &Address,
        now: Height,
    ) -> CoreResult<()> {
        let moved = self.ledger.seize(source, destination, now)?;
        for (currency, amount) in moved {
            self.events.push(CoreEvent::Seized {
                source: *source,
                destination: *destination,
                currency,
                amount,
                height: now,
            });
        }
        Ok(())
    }
}

fn signed(amount: Amount) -> CoreResult<i128> {
    i128::try_from(amount).map_err(|_| CoreError::Overflow)
}

/// The wallet's off-ledger current balance in `currency`, read from the
/// party snapshot inside the record.
fn evidence_balance(
    evidence: &Evidence,
    wallet: &Address,
    currency: &Currency,
) -> CoreResult<Amount> {
    match evidence {
        Evidence::Payment(record) => {
            if &record.currency != currency {
                return Err(CoreError::MalformedEvidence("currency not in record"));
            }
            if &record.sender.wallet == wallet {
                Ok(record.sender.balance.current)
            } else if &record.recipient.wallet == wallet {
                Ok(record.recipient.balance.current)
            } else {
                Err(CoreError::MalformedEvidence("wallet is not a party to the record"))
            }
        }
        Evidence::Trade(record) => {
            let party = if &record.buyer.wallet == wallet {
                &record.buyer
            } else if &record.seller.wallet == wallet {
                &record.seller
            } else {
                return Err(CoreError::MalformedEvidence("wallet is not a party to the record"));
            };
            if &record.intended_currency == currency {
                Ok(party.intended.current)
            } else if &record.conjugate_currency == currency {
                Ok(party.conjugate.current)
            } else {
                Err(CoreError::MalformedEvidence("currency not in record"))
            }
        }
    }
}
