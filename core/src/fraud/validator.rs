//! Pure continuity verification over driip evidence.
//!
//! Structural defects in the submitted evidence (wrong sealer, records that
//! are not the claimed nonce-adjacent pair, currency mismatches) abort the
//! challenge with [`CoreError::MalformedEvidence`]. A *verified*
//! inconsistency is not an error: it is returned as a [`FraudFinding`] for
//! the caller to act on. The checks are over-inclusive on purpose; a false
//! negative would let fraud stand.

use primitive_types::U256;

use crate::{
    config::{Amount, FeeTier, ProtocolConfig, COIN_VALUE},
    crypto::{Address, Hash},
    error::{CoreError, CoreResult},
};

use super::evidence::{DriipKind, PaymentParty, PaymentRecord, TradeParty, TradeRecord};

/// Outcome of a successful fraud detection: the canonical record hash, the
/// implicated wallets and the first check that failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FraudFinding {
    pub record_hash: Hash,
    pub kind: DriipKind,
    pub wallets: Vec<Address>,
    pub reason: &'static str,
}

/// Single payment record in isolation: recompute the sealed hash, check
/// both parties' balance arithmetic and the fee against the schedule.
/// Any single check failing is sufficient to convict.
pub fn examine_payment(
    record: &PaymentRecord,
    config: &ProtocolConfig,
) -> CoreResult<Option<FraudFinding>> {
    require_operator_signer(record.seal.signer, config)?;
    let tier = config
        .payment_fees
        .applicable(record.height)
        .ok_or(CoreError::MalformedEvidence("no applicable fee schedule"))?;

    let reason = if record.compute_hash() != record.seal.hash {
        Some("sealed hash does not match record fields")
    } else if !sender_balance_consistent(record) {
        Some("sender balance discontinuity")
    } else if !checked_eq(
        record.recipient.balance.current,
        record.recipient.balance.previous,
        record.amount,
        0,
    ) {
        Some("recipient balance discontinuity")
    } else if !fee_within_bounds(record.sender.single_fee, record.amount, tier) {
        Some("fee outside schedule bounds")
    } else {
        None
    };

    Ok(reason.map(|reason| FraudFinding {
        record_hash: record.seal.hash,
        kind: DriipKind::Payment,
        wallets: vec![record.sender.wallet],
        reason,
    }))
}

/// Single trade record in isolation: hash, both parties' two-currency
/// balance arithmetic, fee bounds and order residual monotonicity.
pub fn examine_trade(
    record: &TradeRecord,
    config: &ProtocolConfig,
) -> CoreResult<Option<FraudFinding>> {
    require_operator_signer(record.seal.signer, config)?;
    let tier = config
        .trade_fees
        .applicable(record.height)
        .ok_or(CoreError::MalformedEvidence("no applicable fee schedule"))?;

    let buyer = &record.buyer;
    let seller = &record.seller;
    let reason = if record.compute_hash() != record.seal.hash {
        Some("sealed hash does not match record fields")
    } else if !checked_eq(
        buyer.intended.current,
        buyer.intended.previous,
        record.amount,
        buyer.single_fee,
    ) || !checked_debit_eq(buyer.conjugate.current, buyer.conjugate.previous, record.conjugate_amount)
    {
        Some("buyer balance discontinuity")
    } else if !checked_debit_eq(seller.intended.current, seller.intended.previous, record.amount)
        || !checked_eq(
            seller.conjugate.current,
            seller.conjugate.previous,
            record.conjugate_amount,
            seller.single_fee,
        )
    {
        Some("seller balance discontinuity")
    } else if !order_residuals_consistent(buyer) || !order_residuals_consistent(seller) {
        Some("order residual inconsistency")
    } else if !fee_within_bounds(buyer.single_fee, record.amount, tier)
        || !fee_within_bounds(seller.single_fee, record.conjugate_amount, tier)
    {
        Some("fee outside schedule bounds")
    } else {
        None
    };

    Ok(reason.map(|reason| FraudFinding {
        record_hash: record.seal.hash,
        kind: DriipKind::Trade,
        wallets: vec![buyer.wallet, seller.wallet],
        reason,
    }))
}

/// Two payment records claimed to be nonce-adjacent for `wallet`: checks
/// balance continuity and cumulative fee progression across the pair.
pub fn examine_successive_payments(
    wallet: &Address,
    earlier: &PaymentRecord,
    later: &PaymentRecord,
    config: &ProtocolConfig,
) -> CoreResult<Option<FraudFinding>> {
    require_operator_signer(earlier.seal.signer, config)?;
    require_operator_signer(later.seal.signer, config)?;
    require_sealed_hash_matches(earlier.compute_hash(), earlier.seal.hash)?;
    require_sealed_hash_matches(later.compute_hash(), later.seal.hash)?;
    if earlier.currency != later.currency {
        return Err(CoreError::MalformedEvidence("currency mismatch across records"));
    }
    let earlier_party = payment_party(earlier, wallet)?;
    let later_party = payment_party(later, wallet)?;
    require_adjacent_nonces(earlier_party.nonce, later_party.nonce)?;

    let reason = if later_party.balance.previous != earlier_party.balance.current {
        Some("balance discontinuity across successive records")
    } else if !checked_eq(
        later_party.net_fee,
        earlier_party.net_fee,
        later_party.single_fee,
        0,
    ) {
        Some("net fee discontinuity across successive records")
    } else {
        None
    };

    Ok(reason.map(|reason| FraudFinding {
        record_hash: later.seal.hash,
        kind: DriipKind::Payment,
        wallets: vec![*wallet],
        reason,
    }))
}

/// Two trade records claimed to be nonce-adjacent for `wallet`.
pub fn examine_successive_trades(
    wallet: &Address,
    earlier: &TradeRecord,
    later: &TradeRecord,
    config: &ProtocolConfig,
) -> CoreResult<Option<FraudFinding>> {
    require_operator_signer(earlier.seal.signer, config)?;
    require_operator_signer(later.seal.signer, config)?;
    require_sealed_hash_matches(earlier.compute_hash(), earlier.seal.hash)?;
    require_sealed_hash_matches(later.compute_hash(), later.seal.hash)?;
    if earlier.intended_currency != later.intended_currency
        || earlier.conjugate_currency != later.conjugate_currency
    {
        return Err(CoreError::MalformedEvidence("currency mismatch across records"));
    }
    let earlier_party = trade_party(earlier, wallet)?;
    let later_party = trade_party(later, wallet)?;
    require_adjacent_nonces(earlier_party.nonce, later_party.nonce)?;

    let reason = if later_party.intended.previous != earlier_party.intended.current
        || later_party.conjugate.previous != earlier_party.conjugate.current
    {
        Some("balance discontinuity across successive records")
    } else if !checked_eq(
        later_party.net_fee,
        earlier_party.net_fee,
        later_party.single_fee,
        0,
    ) {
        Some("net fee discontinuity across successive records")
    } else {
        None
    };

    Ok(reason.map(|reason| FraudFinding {
        record_hash: later.seal.hash,
        kind: DriipKind::Trade,
        wallets: vec![*wallet],
        reason,
    }))
}

/// Two otherwise independent trades are fraudulent if they consume the
/// same order commitment hash on one side.
pub fn examine_double_spent_orders(
    first: &TradeRecord,
    second: &TradeRecord,
    config: &ProtocolConfig,
) -> CoreResult<Option<FraudFinding>> {
    require_operator_signer(first.seal.signer, config)?;
    require_operator_signer(second.seal.signer, config)?;
    require_sealed_hash_matches(first.compute_hash(), first.seal.hash)?;
    require_sealed_hash_matches(second.compute_hash(), second.seal.hash)?;
    if first.seal.hash == second.seal.hash {
        return Err(CoreError::MalformedEvidence("identical trade records"));
    }

    let mut wallets = Vec::new();
    if first.buyer.order.hash == second.buyer.order.hash {
        push_unique(&mut wallets, first.buyer.wallet);
        push_unique(&mut wallets, second.buyer.wallet);
    }
    if first.seller.order.hash == second.seller.order.hash {
        push_unique(&mut wallets, first.seller.wallet);
        push_unique(&mut wallets, second.seller.wallet);
    }
    if wallets.is_empty() {
        return Ok(None);
    }

    Ok(Some(FraudFinding {
        record_hash: second.seal.hash,
        kind: DriipKind::Trade,
        wallets,
        reason: "order commitment consumed twice",
    }))
}

// === Helpers ===

fn require_operator_signer(signer: Address, config: &ProtocolConfig) -> CoreResult<()> {
    if signer != config.operator {
        return Err(CoreError::MalformedEvidence("seal not signed by operator"));
    }
    Ok(())
}

fn require_sealed_hash_matches(computed: Hash, sealed: Hash) -> CoreResult<()> {
    if computed != sealed {
        return Err(CoreError::MalformedEvidence("sealed hash does not match record fields"));
    }
    Ok(())
}

fn require_adjacent_nonces(earlier: u64, later: u64) -> CoreResult<()> {
    if later != earlier.wrapping_add(1) {
        return Err(CoreError::MalformedEvidence("records are not nonce-adjacent"));
    }
    Ok(())
}

fn payment_party<'a>(record: &'a PaymentRecord, wallet: &Address) -> CoreResult<&'a PaymentParty> {
    if &record.sender.wallet == wallet {
        Ok(&record.sender)
    } else if &record.recipient.wallet == wallet {
        Ok(&record.recipient)
    } else {
        Err(CoreError::MalformedEvidence("wallet is not a party to the record"))
    }
}

fn trade_party<'a>(record: &'a TradeRecord, wallet: &Address) -> CoreResult<&'a TradeParty> {
    if &record.buyer.wallet == wallet {
        Ok(&record.buyer)
    } else if &record.seller.wallet == wallet {
        Ok(&record.seller)
    } else {
        Err(CoreError::MalformedEvidence("wallet is not a party to the record"))
    }
}

/// current == previous + credit - fee, with overflow treated as mismatch.
fn checked_eq(current: Amount, previous: Amount, credit: Amount, fee: Amount) -> bool {
    previous
        .checked_add(credit)
        .and_then(|sum| sum.checked_sub(fee))
        .map(|expected| expected == current)
        .unwrap_or(false)
}

/// current == previous - debit, with underflow treated as mismatch.
fn checked_debit_eq(current: Amount, previous: Amount, debit: Amount) -> bool {
    previous
        .checked_sub(debit)
        .map(|expected| expected == current)
        .unwrap_or(false)
}

fn sender_balance_consistent(record: &PaymentRecord) -> bool {
    record
        .sender
        .balance
        .previous
        .checked_sub(record.amount)
        .and_then(|rest| rest.checked_sub(record.sender.single_fee))
        .map(|expected| expected == record.sender.balance.current)
        .unwrap_or(false)
}

fn order_residuals_consistent(party: &TradeParty) -> bool {
    party.order.previous_residual <= party.order.amount
        && party.order.current_residual <= party.order.previous_residual
}

/// Fee bound from a schedule tier: `amount * parts / COIN_VALUE`.
fn fee_bound(amount: Amount, parts: Amount) -> Amount {
    let wide = U256::from(amount) * U256::from(parts) / U256::from(COIN_VALUE);
    // parts <= COIN_VALUE, so the result fits back into an Amount
    wide.low_u128()
}

fn fee_within_bounds(fee: Amount, amount: Amount, tier: &FeeTier) -> bool {
    fee >= fee_bound(amount, tier.min) && fee <= fee_bound(amount, tier.max)
}

fn push_unique(wallets: &mut Vec<Address>, wallet: Address) {
    if !wallets.contains(&wallet) {
        wallets.push(wallet);
    }
}
