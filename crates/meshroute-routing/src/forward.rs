//! Forward routes — service rendezvous by routing key.
//!
//! An operator binds a key (say `ssh-bastion`) to a `host:port` on one
//! agent. That agent advertises the key; everyone else learns which neighbor
//! leads toward it. The target itself is only ever known on the origin.

use meshroute_core::AgentId;

use crate::keyed::{KeyedRoute, KeyedTable};
use crate::record::{RouteMeta, Routed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRoute {
    pub key: String,
    /// `host:port` to dial. `Some` only on the origin agent.
    pub target: Option<String>,
    pub meta: RouteMeta,
}

impl ForwardRoute {
    /// True when this agent is the listener end for the key.
    pub fn is_terminal(&self, local: &AgentId) -> bool {
        self.meta.origin == *local && self.target.is_some()
    }
}

impl Routed for ForwardRoute {
    fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RouteMeta {
        &mut self.meta
    }

    fn key_string(&self) -> String {
        self.key.clone()
    }
}

impl KeyedRoute for ForwardRoute {
    type Key = String;

    fn key(&self) -> &String {
        &self.key
    }
}

pub type ForwardTable = KeyedTable<ForwardRoute>;
