use serde::{Deserialize, Serialize};

use crate::{
    config::{Amount, Height},
    crypto::{hash, Address, Hash, Seal},
    currency::Currency,
};

/// Kind of off-ledger driip record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
pub enum DriipKind {
    Payment,
    Trade,
}

/// Pre/post balance snapshot of one party in one currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePair {
    pub previous: Amount,
    pub current: Amount,
}

/// Sender or recipient snapshot inside a payment driip. `nonce` is the
/// wallet's own driip counter; `net_fee` is the wallet's cumulative fee
/// across its driip chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentParty {
    pub wallet: Address,
    pub nonce: u64,
    pub balance: BalancePair,
    pub single_fee: Amount,
    pub net_fee: Amount,
}

/// An off-ledger payment record, sealed by the operator. Immutable;
/// supplied by callers at verification time, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub amount: Amount,
    pub currency: Currency,
    pub sender: PaymentParty,
    pub recipient: PaymentParty,
    pub height: Height,
    pub seal: Seal,
}

impl PaymentRecord {
    /// Domain-separated byte image of the record's fields (seal excluded).
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(b"DRIIP_PAYMENT_V1");
        message.extend_from_slice(&self.amount.to_le_bytes());
        write_currency(&mut message, &self.currency);
        write_payment_party(&mut message, &self.sender);
        write_payment_party(&mut message, &self.recipient);
        message.extend_from_slice(&self.height.to_le_bytes());
        message
    }

    pub fn compute_hash(&self) -> Hash {
        hash(&self.message())
    }

    /// Recompute the content hash and seal the record with `signer`.
    pub fn seal_with(&mut self, signer: Address) {
        self.seal = Seal::new(self.compute_hash(), signer);
    }
}

/// Order commitment consumed by one side of a trade: the order's
/// commitment hash, its full amount and the residual amounts before and
/// after this trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub hash: Hash,
    pub amount: Amount,
    pub previous_residual: Amount,
    pub current_residual: Amount,
}

/// Buyer or seller snapshot inside a trade driip. The intended currency is
/// what the buyer receives; the conjugate is what the seller receives.
/// Each party's fee is charged in its receiving currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeParty {
    pub wallet: Address,
    pub nonce: u64,
    pub order: OrderSnapshot,
    pub intended: BalancePair,
    pub conjugate: BalancePair,
    pub single_fee: Amount,
    pub net_fee: Amount,
}

/// An off-ledger trade record, sealed by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    /// Intended-currency amount exchanged.
    pub amount: Amount,
    /// Conjugate-currency amount exchanged.
    pub conjugate_amount: Amount,
    pub intended_currency: Currency,
    pub conjugate_currency: Currency,
    pub buyer: TradeParty,
    pub seller: TradeParty,
    pub height: Height,
    pub seal: Seal,
}

impl TradeRecord {
    pub fn message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(b"DRIIP_TRADE_V1");
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.conjugate_amount.to_le_bytes());
        write_currency(&mut message, &self.intended_currency);
        write_currency(&mut message, &self.conjugate_currency);
        write_trade_party(&mut message, &self.buyer);
        write_trade_party(&mut message, &self.seller);
        message.extend_from_slice(&self.height.to_le_bytes());
        message
    }

    pub fn compute_hash(&self) -> Hash {
        hash(&self.message())
    }

    pub fn seal_with(&mut self, signer: Address) {
        self.seal = Seal::new(self.compute_hash(), signer);
    }
}

/// A driip evidence record of either kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Evidence {
    Payment(PaymentRecord),
    Trade(TradeRecord),
}

impl Evidence {
    pub fn kind(&self) -> DriipKind {
        match self {
            Evidence::Payment(_) => DriipKind::Payment,
            Evidence::Trade(_) => DriipKind::Trade,
        }
    }

    pub fn height(&self) -> Height {
        match self {
            Evidence::Payment(record) => record.height,
            Evidence::Trade(record) => record.height,
        }
    }

    pub fn seal(&self) -> &Seal {
        match self {
            Evidence::Payment(record) => &record.seal,
            Evidence::Trade(record) => &record.seal,
        }
    }

    pub fn compute_hash(&self) -> Hash {
        match self {
            Evidence::Payment(record) => record.compute_hash(),
            Evidence::Trade(record) => record.compute_hash(),
        }
    }

    pub fn involves(&self, wallet: &Address) -> bool {
        self.party_nonce(wallet).is_some()
    }

    /// The wallet's driip nonce in this record, if it is a party.
    pub fn party_nonce(&self, wallet: &Address) -> Option<u64> {
        match self {
            Evidence::Payment(record) => {
                if &record.sender.wallet == wallet {
                    Some(record.sender.nonce)
                } else if &record.recipient.wallet == wallet {
                    Some(record.recipient.nonce)
                } else {
                    None
                }
            }
            Evidence::Trade(record) => {
                if &record.buyer.wallet == wallet {
                    Some(record.buyer.nonce)
                } else if &record.seller.wallet == wallet {
                    Some(record.seller.nonce)
                } else {
                    None
                }
            }
        }
    }

    pub fn currencies(&self) -> Vec<Currency> {
        match self {
            Evidence::Payment(record) => vec![record.currency],
            Evidence::Trade(record) => vec![record.intended_currency, record.conjugate_currency],
        }
    }
}

fn write_currency(message: &mut Vec<u8>, currency: &Currency) {
    message.extend_from_slice(currency.contract.as_bytes());
    message.extend_from_slice(&currency.id.to_le_bytes());
}

fn write_balance_pair(message: &mut Vec<u8>, pair: &BalancePair) {
    message.extend_from_slice(&pair.previous.to_le_bytes());
    message.extend_from_slice(&pair.current.to_le_bytes());
}

fn write_payment_party(message: &mut Vec<u8>, party: &PaymentParty) {
    message.extend_from_slice(party.wallet.as_bytes());
    message.extend_from_slice(&party.nonce.to_le_bytes());
    write_balance_pair(message, &party.balance);
    message.extend_from_slice(&party.single_fee.to_le_bytes());
    message.extend_from_slice(&party.net_fee.to_le_bytes());
}

fn write_trade_party(message: &mut Vec<u8>, party: &TradeParty) {
    message.extend_from_slice(party.wallet.as_bytes());
    message.extend_from_slice(&party.nonce.to_le_bytes());
    message.extend_from_slice(party.order.hash.as_bytes());
    message.extend_from_slice(&party.order.amount.to_le_bytes());
    message.extend_from_slice(&party.order.previous_residual.to_le_bytes());
    message.extend_from_slice(&party.order.current_residual.to_le_bytes());
    write_balance_pair(message, &party.intended);
    write_balance_pair(message, &party.conjugate);
    message.extend_from_slice(&party.single_fee.to_le_bytes());
    message.extend_from_slice(&party.net_fee.to_le_bytes());
}
