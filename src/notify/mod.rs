//! Outbound order events, fanned out to WebSocket clients. Fire-and-forget:
//! delivery has no effect on engine state.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::position::{PositionId, Price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    BuyExecuted,
    SellExecuted,
    /// A pending sell whose source holding was emptied before it triggered.
    SellRejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderEvent {
    pub user_id: Uuid,
    pub symbol: String,
    pub position_id: PositionId,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Price>,
}

pub type EventSender = broadcast::Sender<OrderEvent>;

pub fn channel(capacity: usize) -> (EventSender, broadcast::Receiver<OrderEvent>) {
    broadcast::channel(capacity)
}
