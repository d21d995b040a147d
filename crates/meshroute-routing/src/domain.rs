//! Domain route table — exact names plus single-level wildcards.
//!
//! Exact and wildcard routes live in separate maps. `*.example.com` is
//! stored under `example.com` in the wildcard map and answers for
//! `foo.example.com` only: not `example.com` itself, not `a.b.example.com`.
//! An exact route always outranks a wildcard, whatever the metrics.

use std::time::{Duration, Instant};

use meshroute_core::{AgentId, DomainPattern};
use parking_lot::RwLock;

use crate::record::{Admission, RouteMeta, Routed};
use crate::store::RouteStore;

/// A route to a hostname or a wildcard of hostnames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRoute {
    pub pattern: DomainPattern,
    pub meta: RouteMeta,
}

impl Routed for DomainRoute {
    fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RouteMeta {
        &mut self.meta
    }

    fn key_string(&self) -> String {
        self.pattern.to_string()
    }
}

#[derive(Default)]
struct DomainMaps {
    exact: RouteStore<String, DomainRoute>,
    /// keyed by base domain
    wildcard: RouteStore<String, DomainRoute>,
}

impl DomainMaps {
    fn store_for(&mut self, pattern: &DomainPattern) -> &mut RouteStore<String, DomainRoute> {
        if pattern.is_wildcard() {
            &mut self.wildcard
        } else {
            &mut self.exact
        }
    }

    fn drain_where(&mut self, mut pred: impl FnMut(&DomainRoute) -> bool) -> Vec<DomainRoute> {
        let mut gone = self.exact.drain_where(&mut pred);
        gone.extend(self.wildcard.drain_where(&mut pred));
        gone
    }
}

/// Thread-safe domain table. Every read returns owned copies.
pub struct DomainTable {
    local: AgentId,
    inner: RwLock<DomainMaps>,
}

impl DomainTable {
    pub fn new(local: AgentId) -> Self {
        Self {
            local,
            inner: RwLock::new(DomainMaps::default()),
        }
    }

    pub fn add_route(&self, route: DomainRoute) -> Admission {
        let key = route.pattern.base_domain().to_string();
        let mut inner = self.inner.write();
        inner
            .store_for(&route.pattern)
            .offer(key, route, &self.local)
    }

    pub fn remove_route(&self, pattern: &DomainPattern, origin: &AgentId) -> Option<DomainRoute> {
        self.inner
            .write()
            .store_for(pattern)
            .remove(pattern.base_domain(), origin, None)
    }

    pub(crate) fn withdraw(
        &self,
        pattern: &DomainPattern,
        origin: &AgentId,
        sequence: u64,
    ) -> Option<DomainRoute> {
        self.inner
            .write()
            .store_for(pattern)
            .remove(pattern.base_domain(), origin, Some(sequence))
    }

    pub fn remove_routes_from_peer(&self, peer: &AgentId) -> usize {
        self.take_routes_from_peer(peer).len()
    }

    pub(crate) fn take_routes_from_peer(&self, peer: &AgentId) -> Vec<DomainRoute> {
        self.inner
            .write()
            .drain_where(|r| r.meta.next_hop == *peer)
    }

    /// Best route for a hostname. Case-insensitive; a fully qualified name
    /// with a trailing dot matches the same routes.
    pub fn lookup(&self, domain: &str) -> Option<DomainRoute> {
        let lowered = domain.trim().to_ascii_lowercase();
        let name = lowered.strip_suffix('.').unwrap_or(&lowered);
        let inner = self.inner.read();
        if let Some(route) = inner.exact.best(name) {
            return Some(route.clone());
        }
        let (label, rest) = name.split_once('.')?;
        if label.is_empty() {
            return None;
        }
        inner.wildcard.best(rest).cloned()
    }

    /// Every origin's route for exactly `pattern`, best first.
    pub fn routes_for(&self, pattern: &DomainPattern) -> Vec<DomainRoute> {
        let inner = self.inner.read();
        let store = if pattern.is_wildcard() {
            &inner.wildcard
        } else {
            &inner.exact
        };
        store
            .get(pattern.base_domain())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        self.take_stale(Instant::now(), max_age).len()
    }

    pub(crate) fn take_restamped(&self, sequence: u64, now: Instant) -> Vec<DomainRoute> {
        let mut inner = self.inner.write();
        let mut moved = inner.exact.restamp_origin(&self.local, sequence, now);
        moved.extend(inner.wildcard.restamp_origin(&self.local, sequence, now));
        moved
    }

    pub(crate) fn take_stale(&self, now: Instant, max_age: Duration) -> Vec<DomainRoute> {
        let local = self.local;
        self.inner
            .write()
            .drain_where(|r| r.meta.origin != local && r.meta.is_stale(now, max_age))
    }

    /// Exact routes first, then wildcards, each ordered by pattern.
    pub fn get_all_routes(&self) -> Vec<DomainRoute> {
        let inner = self.inner.read();
        let mut exact: Vec<DomainRoute> = inner.exact.routes().cloned().collect();
        let mut wildcard: Vec<DomainRoute> = inner.wildcard.routes().cloned().collect();
        let by_pattern = |a: &DomainRoute, b: &DomainRoute| {
            a.pattern
                .as_str()
                .cmp(b.pattern.as_str())
                .then(a.meta.metric.cmp(&b.meta.metric))
        };
        exact.sort_by(by_pattern);
        wildcard.sort_by(by_pattern);
        exact.extend(wildcard);
        exact
    }

    pub fn size(&self) -> usize {
        let inner = self.inner.read();
        inner.exact.len() + inner.wildcard.len()
    }
}
