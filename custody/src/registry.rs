//! Custodian and merchant sets plus the quorum threshold.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use wdoi_types::{AccountId, Timestamp};

/// An authority entitled to confirm mint and burn requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custodian {
    pub id: AccountId,
    /// Display label.
    pub label: String,
    /// External reference, e.g. the source-chain address the custodian watches.
    pub external_ref: String,
    pub added_at: Timestamp,
}

/// A custodian to install with
/// [`CustodyAuthority::seed_registry`](crate::CustodyAuthority::seed_registry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustodianSeed {
    pub id: AccountId,
    pub label: String,
    pub external_ref: String,
}

/// Registry state, persisted as a single row.
///
/// Starts with no members and a threshold of 1, so the first custodian added
/// can confirm alone until the admin raises the threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub custodians: BTreeMap<AccountId, Custodian>,
    pub merchants: BTreeSet<AccountId>,
    pub required_confirmations: u32,
}

impl Registry {
    pub(crate) const KEY: &'static [u8] = b"registry";

    pub fn is_custodian(&self, id: &AccountId) -> bool {
        self.custodians.contains_key(id)
    }

    pub fn is_merchant(&self, id: &AccountId) -> bool {
        self.merchants.contains(id)
    }

    pub fn custodian_count(&self) -> u32 {
        u32::try_from(self.custodians.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.custodians.is_empty() && self.merchants.is_empty()
    }

    /// Whether `n` is a valid threshold for a set of `custodians` members.
    pub fn threshold_fits(n: u32, custodians: u32) -> bool {
        n >= 1 && n <= custodians
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            custodians: BTreeMap::new(),
            merchants: BTreeSet::new(),
            required_confirmations: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds() {
        assert!(!Registry::threshold_fits(0, 3));
        assert!(Registry::threshold_fits(1, 3));
        assert!(Registry::threshold_fits(3, 3));
        assert!(!Registry::threshold_fits(4, 3));
        assert!(!Registry::threshold_fits(1, 0));
    }

    #[test]
    fn default_registry_is_empty_with_threshold_one() {
        let registry = Registry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.required_confirmations, 1);
        assert_eq!(registry.custodian_count(), 0);
    }
}
