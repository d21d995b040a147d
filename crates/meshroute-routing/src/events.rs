//! Route change notifications.
//!
//! The flooding component subscribes here to learn when something should be
//! re-advertised or withdrawn. Delivery is best effort: a subscriber whose
//! buffer is full misses the event instead of stalling the table writer.

use meshroute_core::{AgentId, Metric};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::record::Routed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Cidr,
    Domain,
    Agent,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEvent {
    pub kind: RouteKind,
    pub action: RouteAction,
    /// Match key as text: prefix, domain pattern, agent id or forward key.
    pub key: String,
    pub origin: AgentId,
    pub next_hop: AgentId,
    pub metric: Metric,
}

impl RouteEvent {
    pub fn from_route<R: Routed>(kind: RouteKind, action: RouteAction, route: &R) -> Self {
        let meta = route.meta();
        Self {
            kind,
            action,
            key: route.key_string(),
            origin: meta.origin,
            next_hop: meta.next_hop,
            metric: meta.metric,
        }
    }
}

/// Fan-out to any number of bounded subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<RouteEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// New receiver buffering up to `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<RouteEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Never blocks. Closed subscribers are pruned on the way.
    pub fn publish(&self, event: RouteEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!(
                    kind = ?dropped.kind,
                    key = %dropped.key,
                    "route event dropped, subscriber full"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn publish_all<R: Routed>(&self, kind: RouteKind, action: RouteAction, routes: &[R]) {
        for route in routes {
            self.publish(RouteEvent::from_route(kind, action, route));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
