//! NodeInfo store — per-agent metadata, plain or sealed.
//!
//! One record per origin agent, replaced only by a strictly newer sequence.
//! Sealed payloads are kept verbatim so they can be relayed; when an opener
//! is configured they are also decrypted, on ingest and again lazily on
//! read, and the result cached beside the ciphertext.
//!
//! Decryption never runs under a map guard. Display names are read from the
//! stored record, so they cannot drift from it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use meshroute_core::crypto::SealedOpener;
use meshroute_core::{AgentId, NodeInfo, NodeInfoPayload};

use crate::record::{Admission, Rejection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfoRecord {
    pub origin: AgentId,
    pub sequence: u64,
    /// As received. Re-advertised unchanged.
    pub payload: NodeInfoPayload,
    /// `None` while the payload is sealed and could not be opened.
    pub decoded: Option<NodeInfo>,
    pub received_from: AgentId,
    pub last_update: Instant,
}

pub struct NodeInfoStore {
    local: AgentId,
    records: DashMap<AgentId, NodeInfoRecord>,
    opener: Option<Arc<dyn SealedOpener>>,
}

impl NodeInfoStore {
    pub fn new(local: AgentId, opener: Option<Arc<dyn SealedOpener>>) -> Self {
        Self {
            local,
            records: DashMap::new(),
            opener,
        }
    }

    pub fn can_open_sealed(&self) -> bool {
        self.opener.is_some()
    }

    /// Ingest a record heard from `from`. `from == origin == local` is how
    /// the local agent publishes its own.
    pub fn process(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        payload: NodeInfoPayload,
    ) -> Admission {
        if origin == self.local && from != self.local {
            return Admission::Rejected(Rejection::Echo);
        }

        let decoded = self.decode(&origin, &payload);
        let record = NodeInfoRecord {
            origin,
            sequence,
            payload,
            decoded,
            received_from: from,
            last_update: Instant::now(),
        };

        match self.records.entry(origin) {
            Entry::Occupied(mut slot) => {
                if sequence <= slot.get().sequence {
                    return Admission::Rejected(Rejection::Stale);
                }
                slot.insert(record);
                Admission::Replaced
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Admission::Added
            }
        }
    }

    /// Owned copy of the record for `agent`. A sealed record that was not
    /// readable at ingest is retried here, and cached if it opens and no
    /// newer record arrived meanwhile.
    pub fn get(&self, agent: &AgentId) -> Option<NodeInfoRecord> {
        let mut record = self.records.get(agent)?.value().clone();
        if record.decoded.is_some() || self.opener.is_none() {
            return Some(record);
        }

        let Some(info) = self.decode(agent, &record.payload) else {
            return Some(record);
        };
        if let Some(mut stored) = self.records.get_mut(agent) {
            if stored.sequence == record.sequence && stored.decoded.is_none() {
                stored.decoded = Some(info.clone());
            }
        }
        record.decoded = Some(info);
        Some(record)
    }

    /// Decoded metadata for `agent`, if known and readable.
    pub fn node_info(&self, agent: &AgentId) -> Option<NodeInfo> {
        self.get(agent).and_then(|r| r.decoded)
    }

    /// Non-empty display name from the latest readable record.
    pub fn display_name(&self, agent: &AgentId) -> Option<String> {
        let info = self.node_info(agent)?;
        let name = info.display_name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Display name when one is known, the short hex id otherwise.
    pub fn display_label(&self, agent: &AgentId) -> String {
        self.display_name(agent).unwrap_or_else(|| agent.short())
    }

    /// Every record, ordered by origin.
    pub fn all(&self) -> Vec<NodeInfoRecord> {
        let mut all: Vec<NodeInfoRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.origin.cmp(&b.origin));
        all
    }

    /// Drops records not refreshed within `max_age`. The local record stays.
    pub fn cleanup_stale(&self, now: Instant, max_age: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|origin, record| {
            *origin == self.local || now.saturating_duration_since(record.last_update) <= max_age
        });
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn decode(&self, origin: &AgentId, payload: &NodeInfoPayload) -> Option<NodeInfo> {
        match payload {
            NodeInfoPayload::Plain(info) => Some(info.clone()),
            NodeInfoPayload::Sealed(blob) => {
                let opener = self.opener.as_ref()?;
                let plaintext = match opener.open_sealed(blob) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(origin = %origin, error = %e, "sealed node info not readable");
                        return None;
                    }
                };
                match serde_json::from_slice(&plaintext) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        tracing::debug!(origin = %origin, error = %e, "sealed node info malformed");
                        None
                    }
                }
            }
        }
    }
}
