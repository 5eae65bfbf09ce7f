//! Downstream signaling after persistence: the "new order" event queue and
//! the optional archival relay.

use {
    crate::sources::Source,
    anyhow::Result,
    model::order::{Order, OrderHash},
    primitive_types::H256,
    serde::Serialize,
};

/// One event per newly persisted order. The consumer dedups by `context`, so
/// re-ingestion replays are at-least-once but collapse on their side.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub context: String,
    pub hash: OrderHash,
    pub trigger: Trigger,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Trigger {
    NewOrder,
}

impl OrderEvent {
    pub fn new_order(hash: OrderHash) -> Self {
        Self {
            context: format!("new-order-{hash}"),
            hash,
            trigger: Trigger::NewOrder,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderEventSending: Send + Sync {
    async fn enqueue(&self, events: Vec<OrderEvent>) -> Result<()>;
}

/// The full record forwarded for off-chain archival.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalOrder {
    pub order: Order,
    pub schema_hash: H256,
    pub source: Option<Source>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ArchivalRelaying: Send + Sync {
    /// Failures are the relay's concern; the ingestion pipeline logs them and
    /// moves on without retrying.
    async fn relay(&self, orders: Vec<ArchivalOrder>) -> Result<()>;
}
