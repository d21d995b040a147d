//! The attributes every route carries, whatever it matches on.

use std::fmt;
use std::time::{Duration, Instant};

use meshroute_core::{AgentId, Metric, PathInfo};

/// Propagation state shared by CIDR, domain, agent and forward routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMeta {
    /// Neighbor to forward toward. A lookup key into the peer registry,
    /// nothing more.
    pub next_hop: AgentId,
    /// Agent that introduced the route into the mesh.
    pub origin: AgentId,
    pub metric: Metric,
    /// Per-origin version. Newer sequences replace older ones.
    pub sequence: u64,
    pub path: PathInfo,
    pub last_update: Instant,
}

impl RouteMeta {
    /// Metadata for a route this agent originates: it is its own next hop
    /// and the path is empty, so loop detection can never trip on it.
    pub fn local(local: AgentId, metric: Metric, sequence: u64) -> Self {
        Self {
            next_hop: local,
            origin: local,
            metric,
            sequence,
            path: PathInfo::empty(),
            last_update: Instant::now(),
        }
    }

    /// Metadata for a route heard from neighbor `from`.
    pub fn learned(
        from: AgentId,
        origin: AgentId,
        metric: Metric,
        sequence: u64,
        path: PathInfo,
    ) -> Self {
        Self {
            next_hop: from,
            origin,
            metric,
            sequence,
            path,
            last_update: Instant::now(),
        }
    }

    /// Freshness gate: a newer sequence always wins, an equal sequence wins
    /// only with a strictly better metric.
    pub fn supersedes(&self, existing: &RouteMeta) -> bool {
        self.sequence > existing.sequence
            || (self.sequence == existing.sequence && self.metric < existing.metric)
    }

    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > max_age
    }
}

/// Implemented by each route kind so the shared store can order, gate and
/// expire them.
pub trait Routed: Clone {
    fn meta(&self) -> &RouteMeta;

    fn meta_mut(&mut self) -> &mut RouteMeta;

    /// Human-readable match key, used in events and logs.
    fn key_string(&self) -> String;
}

/// Outcome of offering a route to a table.
///
/// Rejection is routine in a flooding protocol: every re-advertisement of
/// an unchanged route is rejected as stale. It is a value, not an error.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First entry from this origin for the key.
    Added,
    /// Superseded the origin's previous entry.
    Replaced,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Added | Admission::Replaced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The path already names this agent.
    Loop,
    /// Older sequence, or same sequence without a better metric.
    Stale,
    /// Claims this agent as origin but arrived from a neighbor.
    Echo,
    /// Malformed match key.
    Invalid,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::Loop => "loop",
            Rejection::Stale => "stale",
            Rejection::Echo => "echo",
            Rejection::Invalid => "invalid",
        })
    }
}
