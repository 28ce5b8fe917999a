//! Key custody: the only way signing keys reach the collection engine.
//!
//! Every lookup fails closed. A missing, malformed or mismatching key yields
//! [`CustodyError::KeyUnavailable`] and the address is simply not swept.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

use crate::blockchain::wallet::SigningKey;
use crate::config::schema::AddressConfig;

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("signing key unavailable for {address}: {reason}")]
    KeyUnavailable { address: Address, reason: String },
}

impl CustodyError {
    fn unavailable(address: Address, reason: impl Into<String>) -> Self {
        CustodyError::KeyUnavailable {
            address,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait KeyCustody: Send + Sync {
    /// Signing key for `address`; never returns a key for a different address.
    async fn signing_key(&self, address: Address) -> Result<SigningKey, CustodyError>;
}

/// Reads each hot key from the environment variable named in its address entry.
///
/// The variable is read on every lookup so keys can be rotated without restart.
#[derive(Debug, Default)]
pub struct EnvKeyCustody {
    vars: HashMap<Address, String>,
}

impl EnvKeyCustody {
    pub fn from_config(entries: &[AddressConfig]) -> Self {
        let vars = entries
            .iter()
            .filter_map(|entry| {
                let var = entry.key_env.clone()?;
                let address = entry.address.parse::<Address>().ok()?;
                Some((address, var))
            })
            .collect::<HashMap<_, _>>();
        tracing::info!(keys = vars.len(), "Environment key custody configured");
        Self { vars }
    }
}

#[async_trait]
impl KeyCustody for EnvKeyCustody {
    async fn signing_key(&self, address: Address) -> Result<SigningKey, CustodyError> {
        let var = self
            .vars
            .get(&address)
            .ok_or_else(|| CustodyError::unavailable(address, "no key configured"))?;
        let raw = std::env::var(var)
            .map_err(|_| CustodyError::unavailable(address, format!("environment variable {} not set", var)))?;
        let key = SigningKey::from_private_key(&raw)
            .map_err(|e| CustodyError::unavailable(address, e.to_string()))?;
        if key.address() != address {
            return Err(CustodyError::unavailable(
                address,
                format!("key in {} belongs to {}", var, key.address()),
            ));
        }
        Ok(key)
    }
}

/// In-memory custody, keyed by derived address.
#[derive(Debug, Default)]
pub struct StaticKeyCustody {
    keys: DashMap<Address, SigningKey>,
}

impl StaticKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: SigningKey) -> Address {
        let address = key.address();
        self.keys.insert(address, key);
        address
    }
}

#[async_trait]
impl KeyCustody for StaticKeyCustody {
    async fn signing_key(&self, address: Address) -> Result<SigningKey, CustodyError> {
        self.keys
            .get(&address)
            .map(|k| k.value().clone())
            .ok_or_else(|| CustodyError::unavailable(address, "no key held"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ChainType;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn entry(address: &str, key_env: &str) -> AddressConfig {
        AddressConfig {
            address: address.to_string(),
            chain_type: ChainType::Ethereum,
            role: Default::default(),
            status: Default::default(),
            user_id: None,
            index: 0,
            note: String::new(),
            bind_time: None,
            key_env: Some(key_env.to_string()),
        }
    }

    #[tokio::test]
    async fn env_custody_loads_matching_key() {
        let var = format!("WALLET_TEST_KEY_{}", uuid::Uuid::new_v4().simple());
        std::env::set_var(&var, TEST_PRIVATE_KEY);
        let custody = EnvKeyCustody::from_config(&[entry(TEST_ADDRESS, &var)]);

        let address: Address = TEST_ADDRESS.parse().unwrap();
        let key = custody.signing_key(address).await.unwrap();
        assert_eq!(key.address(), address);
        std::env::remove_var(&var);
    }

    #[tokio::test]
    async fn env_custody_fails_closed() {
        let var = format!("WALLET_TEST_KEY_{}", uuid::Uuid::new_v4().simple());
        let other = "0x00000000000000000000000000000000000000aa";
        let custody = EnvKeyCustody::from_config(&[entry(TEST_ADDRESS, &var), entry(other, &var)]);
        let address: Address = TEST_ADDRESS.parse().unwrap();

        // Unset variable.
        assert!(custody.signing_key(address).await.is_err());

        // Key that derives a different address.
        std::env::set_var(&var, TEST_PRIVATE_KEY);
        let err = custody.signing_key(other.parse().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("belongs to"));

        // Address without any configured key.
        assert!(custody.signing_key(Address::repeat_byte(7)).await.is_err());
        std::env::remove_var(&var);
    }

    #[tokio::test]
    async fn static_custody_roundtrip() {
        let custody = StaticKeyCustody::new();
        let address = custody.insert(SigningKey::from_private_key(TEST_PRIVATE_KEY).unwrap());
        assert!(custody.signing_key(address).await.is_ok());
        assert!(custody.signing_key(Address::ZERO).await.is_err());
    }
}
