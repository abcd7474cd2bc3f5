use serde::{Deserialize, Serialize};

use crate::crypto::Address;

/// A currency is identified by a (contract address, sub id) pair. The sub id
/// distinguishes fungible sub-types of the same contract; the native
/// pseudo-currency uses the zero contract with id 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub contract: Address,
    pub id: u64,
}

impl Currency {
    pub const fn new(contract: Address, id: u64) -> Self {
        Self { contract, id }
    }

    /// The native-value pseudo-currency.
    pub const fn native() -> Self {
        Self {
            contract: Address::zero(),
            id: 0,
        }
    }

    pub fn is_native(&self) -> bool {
        self.contract.is_zero() && self.id == 0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}:{}", self.contract, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_currency_is_zero_keyed() {
        let native = Currency::native();
        assert!(native.is_native());
        assert!(native.contract.is_zero());
        assert_eq!(native.id, 0);
        assert!(!Currency::new(Address::new([1; 20]), 0).is_native());
    }
}
