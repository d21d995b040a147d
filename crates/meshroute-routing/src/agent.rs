//! Agent presence routes — how to reach a named agent for control traffic
//! and direct messaging.

use meshroute_core::AgentId;

use crate::keyed::{KeyedRoute, KeyedTable};
use crate::record::{RouteMeta, Routed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoute {
    /// Agent this route leads to.
    pub agent: AgentId,
    pub meta: RouteMeta,
}

impl Routed for AgentRoute {
    fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RouteMeta {
        &mut self.meta
    }

    fn key_string(&self) -> String {
        self.agent.to_string()
    }
}

impl KeyedRoute for AgentRoute {
    type Key = AgentId;

    fn key(&self) -> &AgentId {
        &self.agent
    }
}

pub type AgentTable = KeyedTable<AgentRoute>;
