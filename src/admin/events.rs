//! Live notification stream over WebSocket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::admin::AdminState;
use crate::events::WalletEvent;

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    /// Only forward events owned by this user.
    pub user_id: Option<u64>,
}

impl EventFilter {
    pub fn accepts(&self, event: &WalletEvent) -> bool {
        match self.user_id {
            Some(user_id) => event.user_id() == Some(user_id),
            None => true,
        }
    }
}

pub async fn stream_events(
    State(state): State<AdminState>,
    Query(filter): Query<EventFilter>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| forward_events(socket, state, filter))
}

async fn forward_events(mut socket: WebSocket, state: AdminState, filter: EventFilter) {
    let mut events = state.notifier.subscribe();
    tracing::info!(user_id = ?filter.user_id, "Event stream opened");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if !filter.accepts(&event) {
                        continue;
                    }
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!(user_id = ?filter.user_id, "Event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ChainType;
    use crate::ledger::types::{AdjustmentKind, Balance};
    use alloy::primitives::{Address, U256};

    #[test]
    fn filter_by_owner() {
        let event = WalletEvent::BalanceChanged {
            user_id: Some(42),
            address: Address::repeat_byte(1),
            currency: "ETH".into(),
            chain_type: ChainType::Ethereum,
            kind: AdjustmentKind::Credit,
            amount: U256::from(1),
            balance: Balance::default(),
        };
        assert!(EventFilter { user_id: None }.accepts(&event));
        assert!(EventFilter { user_id: Some(42) }.accepts(&event));
        assert!(!EventFilter { user_id: Some(7) }.accepts(&event));
    }
}
