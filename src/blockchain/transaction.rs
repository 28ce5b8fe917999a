//! Sweep transaction planning, signing and confirmation checks.
//!
//! # Responsibilities
//! - Price a full-balance transfer (gas price policy, gas estimate)
//! - Build and sign legacy EIP-155 transactions
//! - Derive confirmation depth from a receipt

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};

use crate::blockchain::connection::ChainConnection;
use crate::blockchain::types::{ChainError, ChainResult, TxReceipt};
use crate::blockchain::wallet::SigningKey;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas pricing limits applied to every sweep.
#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    /// Multiplier applied to the node's suggested price (1.0 = as suggested).
    pub price_multiplier: f64,
    /// Maximum accepted price in gwei after the multiplier.
    pub max_gas_price_gwei: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            price_multiplier: 1.0,
            max_gas_price_gwei: 500,
        }
    }
}

/// A priced transfer of everything above the gas cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepQuote {
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `gas_limit * gas_price`, the worst-case fee.
    pub gas_cost: U256,
    /// Amount that lands at the destination.
    pub send_amount: U256,
}

/// Outcome of pricing a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteOutcome {
    Ready(SweepQuote),
    /// Balance does not exceed the gas cost; nothing may be sent.
    InsufficientForGas { balance: U256, gas_cost: U256 },
}

/// Price a sweep of `balance` from `from` to `to`.
pub async fn quote_sweep(
    connection: &dyn ChainConnection,
    from: Address,
    to: Address,
    balance: U256,
    policy: GasPolicy,
) -> ChainResult<QuoteOutcome> {
    let suggested = connection.gas_price().await?;
    let gas_price = apply_multiplier(suggested, policy.price_multiplier);

    let gas_price_gwei = gas_price / WEI_PER_GWEI;
    if gas_price_gwei > policy.max_gas_price_gwei as u128 {
        return Err(ChainError::GasPriceTooHigh {
            current_gwei: u64::try_from(gas_price_gwei).unwrap_or(u64::MAX),
            max_gwei: policy.max_gas_price_gwei,
        });
    }

    let gas_limit = connection.estimate_gas(from, to, balance).await?;
    let gas_cost = U256::from(gas_limit) * U256::from(gas_price);

    if balance <= gas_cost {
        return Ok(QuoteOutcome::InsufficientForGas { balance, gas_cost });
    }

    Ok(QuoteOutcome::Ready(SweepQuote {
        gas_price,
        gas_limit,
        gas_cost,
        send_amount: balance - gas_cost,
    }))
}

fn apply_multiplier(price: u128, multiplier: f64) -> u128 {
    if multiplier <= 0.0 || (multiplier - 1.0).abs() < f64::EPSILON {
        return price;
    }
    (price as f64 * multiplier) as u128
}

/// Build and sign the transfer described by `quote`.
pub fn sign_sweep(
    key: &SigningKey,
    chain_id: u64,
    nonce: u64,
    to: Address,
    quote: &SweepQuote,
) -> ChainResult<(TxHash, Bytes)> {
    let tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price: quote.gas_price,
        gas_limit: quote.gas_limit,
        to: TxKind::Call(to),
        value: quote.send_amount,
        input: Bytes::new(),
    };
    key.sign_legacy(tx)
}

/// Transaction confirmation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Transaction has been mined but not enough confirmations.
    Confirming { current: u64, required: u64 },
    /// Transaction is confirmed with required block depth.
    Confirmed { block_number: u64, confirmations: u64 },
    /// Transaction reverted on-chain.
    Failed { block_number: Option<u64> },
}

impl ConfirmationStatus {
    /// Classify a receipt against the current head.
    ///
    /// Confirmations count the blocks mined after the one holding the transaction.
    pub fn from_receipt(receipt: &TxReceipt, latest: u64, fallback_block: u64, required: u64) -> Self {
        if !receipt.success {
            return ConfirmationStatus::Failed {
                block_number: receipt.block_number,
            };
        }
        let block_number = receipt.block_number.unwrap_or(fallback_block);
        let confirmations = latest.saturating_sub(block_number);
        if confirmations >= required {
            ConfirmationStatus::Confirmed {
                block_number,
                confirmations,
            }
        } else {
            ConfirmationStatus::Confirming {
                current: confirmations,
                required,
            }
        }
    }

    pub fn confirmations(&self) -> u64 {
        match self {
            ConfirmationStatus::Confirming { current, .. } => *current,
            ConfirmationStatus::Confirmed { confirmations, .. } => *confirmations,
            ConfirmationStatus::Failed { .. } => 0,
        }
    }
}
