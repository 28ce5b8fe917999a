//! Relevance filter over a chain's managed addresses.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::blockchain::types::{ChainTransaction, ChainType};
use crate::custody::AddressInventory;
use crate::ledger::types::Direction;

/// Managed addresses of one chain with their owners.
///
/// Addresses are parsed 20-byte values, so matching is case-insensitive with
/// respect to their hex spelling.
#[derive(Debug, Clone, Default)]
pub struct AddressFilter {
    owners: HashMap<Address, Option<u64>>,
}

impl AddressFilter {
    pub async fn load(inventory: &dyn AddressInventory, chain: ChainType) -> Self {
        let owners = inventory
            .list_managed_addresses(chain)
            .await
            .into_iter()
            .map(|entry| (entry.address, entry.user_id))
            .collect();
        Self { owners }
    }

    /// Keep only `addresses`; owners come from `self` where known.
    pub fn restrict(&self, addresses: &[Address]) -> Self {
        let owners = addresses
            .iter()
            .map(|address| (*address, self.owner(address)))
            .collect();
        Self { owners }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.owners.contains_key(address)
    }

    pub fn owner(&self, address: &Address) -> Option<u64> {
        self.owners.get(address).copied().flatten()
    }

    /// Direction of `tx` relative to this address set, or `None` if unrelated.
    pub fn classify(&self, tx: &ChainTransaction) -> Option<Direction> {
        let incoming = tx.to.is_some_and(|to| self.contains(&to));
        let outgoing = self.contains(&tx.from);
        Direction::classify(incoming, outgoing)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
