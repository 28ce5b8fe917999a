//! Hot-address signing keys.
//!
//! # Security
//! - Keys reach this type only through key custody (`custody::keys`)
//! - Keys are never logged or serialized

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{ChainError, ChainResult};

/// Signing key for a single managed address.
#[derive(Clone)]
pub struct SigningKey {
    signer: PrivateKeySigner,
}

impl SigningKey {
    /// Create a key from a hex-encoded private key string.
    ///
    /// Accepts the key with or without a `0x` prefix.
    pub fn from_private_key(private_key_hex: &str) -> ChainResult<Self> {
        let key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Wallet(format!("Invalid private key format: {}", e)))?;

        Ok(Self { signer })
    }

    /// Address derived from the key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a legacy transaction with EIP-155 replay protection.
    ///
    /// Returns the transaction hash and its EIP-2718 encoding, ready for
    /// `send_raw_transaction`.
    pub fn sign_legacy(&self, mut tx: TxLegacy) -> ChainResult<(TxHash, Bytes)> {
        if tx.chain_id.is_none() {
            return Err(ChainError::Wallet(
                "Refusing to sign a transaction without chain id".to_string(),
            ));
        }
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ChainError::Wallet(format!("Signing failed: {}", e)))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let hash = *envelope.tx_hash();
        Ok((hash, Bytes::from(envelope.encoded_2718())))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::Transaction as _;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{address, TxKind, U256};

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_key_from_private_key() {
        let key = SigningKey::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(
            key.address(),
            address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266")
        );

        let prefixed = SigningKey::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(prefixed.address(), key.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let result = SigningKey::from_private_key("invalid_key");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = SigningKey::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains(TEST_PRIVATE_KEY));
    }

    #[test]
    fn test_sign_legacy_roundtrips_through_decoder() {
        let key = SigningKey::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let cold = address!("00000000000000000000000000000000000000c0");
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 4,
            gas_price: 2_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(cold),
            value: U256::from(1_000u64),
            input: Bytes::new(),
        };
        let (hash, raw) = key.sign_legacy(tx).unwrap();

        let decoded = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        assert_eq!(*decoded.tx_hash(), hash);
        assert_eq!(decoded.to(), Some(cold));
        assert_eq!(decoded.nonce(), 4);
        assert_eq!(decoded.chain_id(), Some(1));
    }

    #[test]
    fn test_sign_without_chain_id_is_refused() {
        let key = SigningKey::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let tx = TxLegacy {
            chain_id: None,
            ..TxLegacy::default()
        };
        assert!(key.sign_legacy(tx).is_err());
    }
}
