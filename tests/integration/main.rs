//! meshroute integration test harness.
//!
//! Runs several `Manager`s in one process and plays the flooding component
//! between them: every directed link carries the sender's split-horizon
//! advertisement, with the sender prepended to the path, until a full round
//! changes nothing.

use std::collections::VecDeque;

use anyhow::{bail, Result};

use meshroute_core::{AgentEntry, AgentId, DomainEntry, ForwardEntry, Prefix, RouteEntry};
use meshroute_routing::Manager;

mod propagation;
mod sealed;
mod withdrawal;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound on relay rounds before a topology is declared divergent.
pub const MAX_ROUNDS: usize = 32;

pub struct Mesh {
    pub agents: Vec<Manager>,
    links: Vec<(usize, usize)>,
}

impl Mesh {
    pub fn new(size: usize) -> Self {
        Self {
            agents: (0..size).map(|_| Manager::new(AgentId::random())).collect(),
            links: Vec::new(),
        }
    }

    /// Build a mesh from existing managers, e.g. ones holding an opener.
    pub fn from_managers(agents: Vec<Manager>) -> Self {
        Self {
            agents,
            links: Vec::new(),
        }
    }

    pub fn id(&self, i: usize) -> AgentId {
        self.agents[i].local_id()
    }

    pub fn link(&mut self, a: usize, b: usize) -> &mut Self {
        if !self.linked(a, b) {
            self.links.push((a, b));
        }
        self
    }

    /// Drop the link and let both ends purge what they learned over it.
    /// Returns the routes removed on each side.
    pub fn unlink(&mut self, a: usize, b: usize) -> (usize, usize) {
        self.links
            .retain(|&(x, y)| !((x == a && y == b) || (x == b && y == a)));
        let removed_a = self.agents[a].handle_peer_disconnect(&self.id(b));
        let removed_b = self.agents[b].handle_peer_disconnect(&self.id(a));
        (removed_a, removed_b)
    }

    pub fn linked(&self, a: usize, b: usize) -> bool {
        self.links
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    pub fn neighbors(&self, i: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter_map(|&(x, y)| match (x == i, y == i) {
                (true, _) => Some(y),
                (_, true) => Some(x),
                _ => None,
            })
            .collect()
    }

    /// Relay until a round accepts nothing. Returns the number of rounds.
    pub fn converge(&self) -> Result<usize> {
        for round in 1..=MAX_ROUNDS {
            if self.relay_round() == 0 {
                return Ok(round);
            }
        }
        bail!("no convergence after {MAX_ROUNDS} rounds")
    }

    /// One pass over every directed link. Returns entries accepted.
    pub fn relay_round(&self) -> usize {
        let mut accepted = 0;
        for &(a, b) in &self.links {
            accepted += self.relay(a, b);
            accepted += self.relay(b, a);
        }
        accepted
    }

    /// Deliver `from`'s advertisement for `to`, one message per route.
    pub fn relay(&self, from: usize, to: usize) -> usize {
        let (sender, receiver) = (&self.agents[from], &self.agents[to]);
        let me = sender.local_id();
        let adv = sender.get_full_routes_for_advertise(&receiver.local_id());
        let mut accepted = 0;

        for r in adv.routes {
            let entry = RouteEntry {
                prefix: r.prefix,
                metric: r.meta.metric,
            };
            accepted += receiver
                .process_route_advertise(
                    me,
                    r.meta.origin,
                    r.meta.sequence,
                    &[entry],
                    &r.meta.path.prepended(me),
                )
                .len();
        }
        for r in adv.domains {
            let entry = DomainEntry {
                pattern: r.pattern.to_string(),
                metric: r.meta.metric,
            };
            accepted += receiver
                .process_domain_route_advertise(
                    me,
                    r.meta.origin,
                    r.meta.sequence,
                    &[entry],
                    &r.meta.path.prepended(me),
                )
                .len();
        }
        for r in adv.agents {
            let entry = AgentEntry {
                agent: r.agent,
                metric: r.meta.metric,
            };
            accepted += receiver
                .process_agent_route_advertise(
                    me,
                    r.meta.origin,
                    r.meta.sequence,
                    &[entry],
                    &r.meta.path.prepended(me),
                )
                .len();
        }
        for r in adv.forwards {
            let entry = ForwardEntry {
                key: r.key.clone(),
                metric: r.meta.metric,
            };
            accepted += receiver
                .process_forward_route_advertise(
                    me,
                    r.meta.origin,
                    r.meta.sequence,
                    &[entry],
                    &r.meta.path.prepended(me),
                )
                .len();
        }
        accepted
    }

    /// Retract a local CIDR route at `origin` and flood the withdrawal
    /// outward, each agent forwarding it only if it removed something.
    /// Returns how many agents dropped the route.
    pub fn withdraw_route(&self, origin: usize, prefix: Prefix) -> usize {
        let origin_id = self.id(origin);
        if !self.agents[origin].remove_local_route(&prefix) {
            return 0;
        }
        let sequence = self.agents[origin].current_sequence();

        let mut dropped = 0;
        let mut queue: VecDeque<usize> = VecDeque::from([origin]);
        while let Some(at) = queue.pop_front() {
            let sender = self.id(at);
            for n in self.neighbors(at) {
                let removed =
                    self.agents[n].process_route_withdraw(sender, origin_id, sequence, &[prefix]);
                if !removed.is_empty() {
                    dropped += 1;
                    queue.push_back(n);
                }
            }
        }
        dropped
    }

    /// Chain 0 - 1 - ... - n-1.
    pub fn line(size: usize) -> Self {
        let mut mesh = Self::new(size);
        for i in 1..size {
            mesh.link(i - 1, i);
        }
        mesh
    }

    /// Every agent announces its own presence.
    pub fn announce_presence(&self) {
        for m in &self.agents {
            let _ = m.add_local_agent_route(m.local_id(), 0);
        }
    }
}

pub fn prefix(s: &str) -> Prefix {
    s.parse().expect("valid prefix")
}
