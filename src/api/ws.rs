//! WebSocket fan-out of order events. Clients subscribe per symbol and
//! receive every resolved transition for it; delivery is best-effort.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::select;

use crate::api::routes::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Deserialize)]
struct SubscriptionMessage {
    action: SubscriptionAction,
    symbol: String,
}

#[derive(Debug, Serialize)]
struct SubscriptionAck {
    status: &'static str,
    message: String,
    symbol: Option<String>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    let mut subscribed: HashSet<String> = HashSet::new();

    loop {
        select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        if subscribed.contains(&event.symbol) {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if socket.send(Message::Text(json.into())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    // Lagged receivers just miss events; channel closed means shutdown.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => return,
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let ack = match serde_json::from_str::<SubscriptionMessage>(&text) {
                            Ok(sub) => {
                                let symbol = sub.symbol.trim().to_uppercase();
                                match sub.action {
                                    SubscriptionAction::Subscribe => {
                                        subscribed.insert(symbol.clone());
                                        SubscriptionAck {
                                            status: "success",
                                            message: format!("subscribed to {symbol}"),
                                            symbol: Some(symbol),
                                        }
                                    }
                                    SubscriptionAction::Unsubscribe => {
                                        subscribed.remove(&symbol);
                                        SubscriptionAck {
                                            status: "success",
                                            message: format!("unsubscribed from {symbol}"),
                                            symbol: Some(symbol),
                                        }
                                    }
                                }
                            }
                            Err(_) => SubscriptionAck {
                                status: "error",
                                message: "expected {\"action\": \"subscribe\", \"symbol\": \"TCS\"}"
                                    .to_string(),
                                symbol: None,
                            },
                        };
                        if let Ok(json) = serde_json::to_string(&ack) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    _ => {} // binary, ping, pong
                }
            }
        }
    }
}
