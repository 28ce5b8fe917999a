//! Wallet notifications.
//!
//! The core publishes events; delivery to users (websocket fan-out, push) is
//! done by whoever subscribes. Publishing never blocks and never fails the
//! operation that produced the event.

use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::blockchain::types::ChainType;
use crate::ledger::types::{AdjustmentKind, Balance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    DepositObserved {
        user_id: Option<u64>,
        txid: TxHash,
        address: Address,
        currency: String,
        chain_type: ChainType,
        amount: U256,
        block_height: Option<u64>,
        confirmed: bool,
    },
    BalanceChanged {
        user_id: Option<u64>,
        address: Address,
        currency: String,
        chain_type: ChainType,
        kind: AdjustmentKind,
        amount: U256,
        balance: Balance,
    },
    CollectionSubmitted {
        txid: TxHash,
        from: Address,
        to: Address,
        currency: String,
        chain_type: ChainType,
        amount: U256,
        fee: U256,
    },
}

impl WalletEvent {
    /// User the event concerns, if any.
    pub fn user_id(&self) -> Option<u64> {
        match self {
            WalletEvent::DepositObserved { user_id, .. } => *user_id,
            WalletEvent::BalanceChanged { user_id, .. } => *user_id,
            WalletEvent::CollectionSubmitted { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::DepositObserved { .. } => "deposit_observed",
            WalletEvent::BalanceChanged { .. } => "balance_changed",
            WalletEvent::CollectionSubmitted { .. } => "collection_submitted",
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: WalletEvent);
}

/// Fans events out over a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events rather than stalling the core.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<WalletEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, event: WalletEvent) {
        tracing::debug!(event = event.name(), user_id = ?event.user_id(), "Publishing wallet event");
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection_event() -> WalletEvent {
        WalletEvent::CollectionSubmitted {
            txid: TxHash::repeat_byte(1),
            from: Address::repeat_byte(0xaa),
            to: Address::repeat_byte(0xc0),
            currency: "ETH".into(),
            chain_type: ChainType::Ethereum,
            amount: U256::from(99),
            fee: U256::from(1),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(collection_event());
        assert_eq!(rx.recv().await.unwrap(), collection_event());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let notifier = BroadcastNotifier::default();
        notifier.publish(collection_event());
        assert_eq!(notifier.receiver_count(), 0);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(collection_event()).unwrap();
        assert_eq!(json["type"], "collection_submitted");
        assert_eq!(json["currency"], "ETH");
    }
}
