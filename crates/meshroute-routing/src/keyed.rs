//! Exact-match route table, generic over the key type.
//!
//! Agent presence routes (keyed by agent identity) and forward routes (keyed
//! by an operator-chosen string) match the same way, so they share this one
//! implementation.

use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use meshroute_core::AgentId;
use parking_lot::RwLock;

use crate::record::{Admission, Routed};
use crate::store::RouteStore;

/// A route whose match key is carried in the record itself.
pub trait KeyedRoute: Routed {
    type Key: Eq + Hash + Ord + Clone + Debug;

    fn key(&self) -> &Self::Key;
}

/// Thread-safe exact-match table. Every read returns owned copies.
pub struct KeyedTable<R: KeyedRoute> {
    local: AgentId,
    inner: RwLock<RouteStore<R::Key, R>>,
}

impl<R: KeyedRoute> KeyedTable<R> {
    pub fn new(local: AgentId) -> Self {
        Self {
            local,
            inner: RwLock::new(RouteStore::default()),
        }
    }

    pub fn add_route(&self, route: R) -> Admission {
        let key = route.key().clone();
        self.inner.write().offer(key, route, &self.local)
    }

    pub fn remove_route<Q>(&self, key: &Q, origin: &AgentId) -> Option<R>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key, origin, None)
    }

    pub(crate) fn withdraw<Q>(&self, key: &Q, origin: &AgentId, sequence: u64) -> Option<R>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key, origin, Some(sequence))
    }

    pub fn remove_routes_from_peer(&self, peer: &AgentId) -> usize {
        self.take_routes_from_peer(peer).len()
    }

    pub(crate) fn take_routes_from_peer(&self, peer: &AgentId) -> Vec<R> {
        self.inner.write().drain_from_peer(peer)
    }

    /// Lowest-metric route for `key`.
    pub fn lookup<Q>(&self, key: &Q) -> Option<R>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().best(key).cloned()
    }

    /// Just the neighbor to forward toward.
    pub fn lookup_next_hop<Q>(&self, key: &Q) -> Option<AgentId>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().best(key).map(|r| r.meta().next_hop)
    }

    /// Every origin's route for `key`, best first.
    pub fn routes_for<Q>(&self, key: &Q) -> Vec<R>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        self.take_stale(Instant::now(), max_age).len()
    }

    /// Re-sequence this agent's own entries in place.
    pub(crate) fn take_restamped(&self, sequence: u64, now: Instant) -> Vec<R> {
        self.inner.write().restamp_origin(&self.local, sequence, now)
    }

    pub(crate) fn take_stale(&self, now: Instant, max_age: Duration) -> Vec<R> {
        self.inner.write().drain_stale(&self.local, now, max_age)
    }

    /// All entries ordered by key, then metric.
    pub fn get_all_routes(&self) -> Vec<R> {
        let mut all: Vec<R> = self.inner.read().routes().cloned().collect();
        all.sort_by(|a, b| {
            a.key()
                .cmp(b.key())
                .then(a.meta().metric.cmp(&b.meta().metric))
        });
        all
    }

    pub fn size(&self) -> usize {
        self.inner.read().len()
    }

    pub fn key_count(&self) -> usize {
        self.inner.read().key_count()
    }
}
