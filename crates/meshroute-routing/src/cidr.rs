//! CIDR route table — longest-prefix match over IP destinations.
//!
//! Prefix length dominates metric: a /24 beats a /8 for an address both
//! contain, however much cheaper the /8 is. Metric only breaks ties between
//! origins advertising the same prefix.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use meshroute_core::{AgentId, Prefix};
use parking_lot::RwLock;

use crate::record::{Admission, RouteMeta, Routed};
use crate::store::RouteStore;

/// A route to an IP network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: Prefix,
    pub meta: RouteMeta,
}

impl Routed for Route {
    fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RouteMeta {
        &mut self.meta
    }

    fn key_string(&self) -> String {
        self.prefix.to_string()
    }
}

/// Thread-safe CIDR table. Every read returns owned copies.
pub struct RouteTable {
    local: AgentId,
    inner: RwLock<RouteStore<Prefix, Route>>,
}

impl RouteTable {
    pub fn new(local: AgentId) -> Self {
        Self {
            local,
            inner: RwLock::new(RouteStore::default()),
        }
    }

    pub fn add_route(&self, route: Route) -> Admission {
        let prefix = route.prefix;
        self.inner.write().offer(prefix, route, &self.local)
    }

    /// Remove `origin`'s route for `prefix`. Returns the removed route.
    pub fn remove_route(&self, prefix: &Prefix, origin: &AgentId) -> Option<Route> {
        self.inner.write().remove(prefix, origin, None)
    }

    /// Like `remove_route`, but keeps an entry newer than `sequence`.
    pub(crate) fn withdraw(&self, prefix: &Prefix, origin: &AgentId, sequence: u64) -> Option<Route> {
        self.inner.write().remove(prefix, origin, Some(sequence))
    }

    /// Drop every route whose next hop is `peer`. Returns how many went.
    pub fn remove_routes_from_peer(&self, peer: &AgentId) -> usize {
        self.take_routes_from_peer(peer).len()
    }

    pub(crate) fn take_routes_from_peer(&self, peer: &AgentId) -> Vec<Route> {
        self.inner.write().drain_from_peer(peer)
    }

    /// Best route for `addr`: longest matching prefix, then lowest metric.
    pub fn lookup(&self, addr: IpAddr) -> Option<Route> {
        let inner = self.inner.read();
        let mut best: Option<&Route> = None;
        for (prefix, set) in inner.sets() {
            if !prefix.contains(addr) {
                continue;
            }
            let Some(candidate) = set.best() else { continue };
            let better = match best {
                None => true,
                Some(current) => {
                    let (len, cur_len) = (prefix.prefix_len(), current.prefix.prefix_len());
                    len > cur_len || (len == cur_len && candidate.meta.metric < current.meta.metric)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best.cloned()
    }

    /// The best route of every prefix containing `addr`, most specific
    /// first, then by metric.
    pub fn lookup_all(&self, addr: IpAddr) -> Vec<Route> {
        let inner = self.inner.read();
        let mut matches: Vec<Route> = inner
            .sets()
            .filter(|(prefix, _)| prefix.contains(addr))
            .filter_map(|(_, set)| set.best().cloned())
            .collect();
        matches.sort_by(|a, b| {
            b.prefix
                .prefix_len()
                .cmp(&a.prefix.prefix_len())
                .then(a.meta.metric.cmp(&b.meta.metric))
        });
        matches
    }

    /// Every origin's route for exactly `prefix`, best first.
    pub fn routes_for(&self, prefix: &Prefix) -> Vec<Route> {
        self.inner
            .read()
            .get(prefix)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove learned routes not refreshed within `max_age`.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        self.take_stale(Instant::now(), max_age).len()
    }

    /// Re-sequence this agent's own entries in place.
    pub(crate) fn take_restamped(&self, sequence: u64, now: Instant) -> Vec<Route> {
        self.inner.write().restamp_origin(&self.local, sequence, now)
    }

    pub(crate) fn take_stale(&self, now: Instant, max_age: Duration) -> Vec<Route> {
        self.inner.write().drain_stale(&self.local, now, max_age)
    }

    /// All entries, every origin, ordered by prefix then metric.
    pub fn get_all_routes(&self) -> Vec<Route> {
        let mut all: Vec<Route> = self.inner.read().routes().cloned().collect();
        all.sort_by(|a, b| a.prefix.cmp(&b.prefix).then(a.meta.metric.cmp(&b.meta.metric)));
        all
    }

    /// Number of entries, counting each origin separately.
    pub fn size(&self) -> usize {
        self.inner.read().len()
    }

    pub fn prefix_count(&self) -> usize {
        self.inner.read().key_count()
    }
}
