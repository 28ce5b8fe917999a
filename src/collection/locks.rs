//! Per-address serialisation of nonce → sign → submit.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct AddressLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl AddressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `address`. Released when the guard drops.
    pub async fn acquire(&self, address: Address) -> OwnedMutexGuard<()> {
        // Clone out of the map first; the shard lock must not be held across the await.
        let lock = self.locks.entry(address).or_default().clone();
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
