//! Managed address inventory.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::ChainType;
use crate::config::schema::AddressConfig;

/// What an address is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    /// Receives user deposits.
    #[default]
    Deposit,
    /// Holds spendable funds and is swept by collection.
    Hot,
    /// Cold-storage destination.
    Cold,
}

/// Lifecycle of an address in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    /// Generated but not yet bound to a user.
    Unused,
    #[default]
    Active,
    /// Excluded from collection.
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedAddress {
    pub address: Address,
    pub chain_type: ChainType,
    pub role: AddressRole,
    pub status: AddressStatus,
    pub user_id: Option<u64>,
    pub index: u32,
    pub note: String,
    pub bind_time: Option<u64>,
}

impl ManagedAddress {
    pub fn new(address: Address, chain_type: ChainType, role: AddressRole) -> Self {
        Self {
            address,
            chain_type,
            role,
            status: AddressStatus::Active,
            user_id: None,
            index: 0,
            note: String::new(),
            bind_time: None,
        }
    }

    pub fn with_user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: AddressStatus) -> Self {
        self.status = status;
        self
    }
}

/// Source of truth for which addresses the wallet manages.
///
/// Read-only to the core apart from [`AddressInventory::mark_role`].
#[async_trait]
pub trait AddressInventory: Send + Sync {
    /// Every managed address on `chain`, regardless of role or status.
    async fn list_managed_addresses(&self, chain: ChainType) -> Vec<ManagedAddress>;

    /// Owning user of an address, if bound.
    async fn owner_of(&self, chain: ChainType, address: Address) -> Option<u64>;

    /// Record the role an address plays in collection.
    async fn mark_role(&self, chain: ChainType, address: Address, role: AddressRole);
}

/// In-memory inventory loaded from the `[[addresses]]` config entries.
#[derive(Debug, Default)]
pub struct AddressBook {
    entries: DashMap<(ChainType, Address), ManagedAddress>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config; entries with unparsable addresses are skipped.
    pub fn from_config(entries: &[AddressConfig]) -> Self {
        let book = Self::new();
        for entry in entries {
            let address = match entry.address.parse::<Address>() {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!(address = %entry.address, error = %e, "Skipping invalid managed address");
                    continue;
                }
            };
            book.insert(ManagedAddress {
                address,
                chain_type: entry.chain_type,
                role: entry.role,
                status: entry.status,
                user_id: entry.user_id,
                index: entry.index,
                note: entry.note.clone(),
                bind_time: entry.bind_time,
            });
        }
        tracing::info!(count = book.len(), "Address book loaded");
        book
    }

    pub fn insert(&self, entry: ManagedAddress) {
        self.entries.insert((entry.chain_type, entry.address), entry);
    }

    pub fn get(&self, chain: ChainType, address: Address) -> Option<ManagedAddress> {
        self.entries.get(&(chain, address)).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unused deposit addresses per chain.
    pub fn unused_deposit_count(&self, chain: ChainType) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                e.chain_type == chain
                    && e.role == AddressRole::Deposit
                    && e.status == AddressStatus::Unused
            })
            .count()
    }
}

#[async_trait]
impl AddressInventory for AddressBook {
    async fn list_managed_addresses(&self, chain: ChainType) -> Vec<ManagedAddress> {
        let mut addresses: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.chain_type == chain)
            .map(|e| e.value().clone())
            .collect();
        addresses.sort_by_key(|a| a.address);
        addresses
    }

    async fn owner_of(&self, chain: ChainType, address: Address) -> Option<u64> {
        self.entries.get(&(chain, address)).and_then(|e| e.user_id)
    }

    async fn mark_role(&self, chain: ChainType, address: Address, role: AddressRole) {
        if let Some(mut entry) = self.entries.get_mut(&(chain, address)) {
            if entry.role != role {
                tracing::info!(%address, chain = %chain, from = ?entry.role, to = ?role, "Address role updated");
                entry.role = role;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str, chain: ChainType, role: AddressRole) -> AddressConfig {
        AddressConfig {
            address: address.to_string(),
            chain_type: chain,
            role,
            status: AddressStatus::Active,
            user_id: Some(9),
            index: 1,
            note: String::new(),
            bind_time: None,
            key_env: None,
        }
    }

    #[tokio::test]
    async fn lists_by_chain_and_parses_mixed_case() {
        let book = AddressBook::from_config(&[
            entry("0x00000000000000000000000000000000000000AA", ChainType::Ethereum, AddressRole::Deposit),
            entry("0x00000000000000000000000000000000000000bb", ChainType::Bsc, AddressRole::Hot),
            entry("garbage", ChainType::Ethereum, AddressRole::Deposit),
        ]);
        assert_eq!(book.len(), 2);

        let eth = book.list_managed_addresses(ChainType::Ethereum).await;
        assert_eq!(eth.len(), 1);
        let lower: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        assert_eq!(eth[0].address, lower);
        assert_eq!(book.owner_of(ChainType::Ethereum, lower).await, Some(9));
        assert_eq!(book.owner_of(ChainType::Bsc, lower).await, None);
    }

    #[tokio::test]
    async fn mark_role_updates_existing_entries_only() {
        let book = AddressBook::new();
        let address = Address::repeat_byte(0xc0);
        book.insert(ManagedAddress::new(address, ChainType::Ethereum, AddressRole::Deposit));

        book.mark_role(ChainType::Ethereum, address, AddressRole::Cold).await;
        book.mark_role(ChainType::Ethereum, Address::repeat_byte(1), AddressRole::Cold).await;

        assert_eq!(book.get(ChainType::Ethereum, address).unwrap().role, AddressRole::Cold);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn counts_unused_pool() {
        let book = AddressBook::new();
        for byte in 1..=3u8 {
            book.insert(
                ManagedAddress::new(Address::repeat_byte(byte), ChainType::Ethereum, AddressRole::Deposit)
                    .with_status(AddressStatus::Unused),
            );
        }
        book.insert(ManagedAddress::new(Address::repeat_byte(9), ChainType::Ethereum, AddressRole::Deposit));
        assert_eq!(book.unused_deposit_count(ChainType::Ethereum), 3);
        assert_eq!(book.unused_deposit_count(ChainType::Bsc), 0);
    }
}
