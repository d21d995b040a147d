//! Advertisement payloads — the decoded contents of route and node-info
//! messages as handed to the routing core by the frame decoder.
//!
//! The frame codec itself lives outside this workspace; these types are the
//! contract with it, which is why they derive serde.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::identity::AgentId;
use crate::prefix::Prefix;

/// Hop cost of a route. Lower wins.
pub type Metric = u16;

/// The agents an advertisement traversed, or the ciphertext standing in for
/// them when the path is encrypted for the management key.
///
/// A sealed path cannot be inspected here; it is stored and re-advertised
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathInfo {
    Plain(Vec<AgentId>),
    Sealed(Bytes),
}

impl PathInfo {
    /// Empty plain path, used by locally originated routes.
    pub fn empty() -> Self {
        PathInfo::Plain(Vec::new())
    }

    /// True only when the path is readable and names `agent`.
    pub fn contains(&self, agent: &AgentId) -> bool {
        match self {
            PathInfo::Plain(hops) => hops.contains(agent),
            PathInfo::Sealed(_) => false,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, PathInfo::Sealed(_))
    }

    /// Readable hops, if any.
    pub fn hops(&self) -> Option<&[AgentId]> {
        match self {
            PathInfo::Plain(hops) => Some(hops),
            PathInfo::Sealed(_) => None,
        }
    }

    /// The path a sender puts on the wire when relaying: itself first, then
    /// the hops it learned. Sealed paths are relayed unchanged.
    pub fn prepended(&self, sender: AgentId) -> Self {
        match self {
            PathInfo::Plain(hops) => {
                let mut out = Vec::with_capacity(hops.len() + 1);
                out.push(sender);
                out.extend_from_slice(hops);
                PathInfo::Plain(out)
            }
            PathInfo::Sealed(blob) => PathInfo::Sealed(blob.clone()),
        }
    }
}

impl Default for PathInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// One CIDR route inside a route advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub prefix: Prefix,
    pub metric: Metric,
}

/// One hostname route inside a domain advertisement. The pattern is carried
/// as text and validated on ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub pattern: String,
    pub metric: Metric,
}

/// One agent-presence route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub agent: AgentId,
    pub metric: Metric,
}

/// One forward (service rendezvous) route. The listener target never leaves
/// the origin agent, so it has no field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub key: String,
    pub metric: Metric,
}

/// Per-agent metadata shown to operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub display_name: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub version: String,
    /// Direct neighbors of the agent at the time it published this record.
    pub peers: Vec<AgentId>,
}

/// NodeInfo as it travels: readable, or sealed to the management key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeInfoPayload {
    Plain(NodeInfo),
    Sealed(Bytes),
}
