//! Per-key origin sets — the storage shape shared by every table.
//!
//! Each match key maps to the routes different origins advertised for it,
//! kept sorted by metric so the best route is always the head. Tables wrap
//! a `RouteStore` in their own lock and add the matching discipline.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use meshroute_core::AgentId;

use crate::record::{Admission, Rejection, Routed};

/// Routes for one key, at most one per origin, metric ascending.
#[derive(Debug, Clone)]
pub(crate) struct OriginSet<R> {
    entries: Vec<R>,
}

impl<R: Routed> OriginSet<R> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn offer(&mut self, route: R) -> Admission {
        let origin = route.meta().origin;
        let admission = match self
            .entries
            .iter()
            .position(|e| e.meta().origin == origin)
        {
            Some(i) => {
                if !route.meta().supersedes(self.entries[i].meta()) {
                    return Admission::Rejected(Rejection::Stale);
                }
                self.entries[i] = route;
                Admission::Replaced
            }
            None => {
                self.entries.push(route);
                Admission::Added
            }
        };
        // stable: equal metrics keep arrival order
        self.entries.sort_by_key(|e| e.meta().metric);
        admission
    }

    pub(crate) fn best(&self) -> Option<&R> {
        self.entries.first()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &R> {
        self.entries.iter()
    }

    /// Remove `origin`'s entry unless it is newer than `up_to_sequence`.
    fn remove_origin(&mut self, origin: &AgentId, up_to_sequence: Option<u64>) -> Option<R> {
        let i = self.entries.iter().position(|e| {
            e.meta().origin == *origin && up_to_sequence.map_or(true, |seq| e.meta().sequence <= seq)
        })?;
        Some(self.entries.remove(i))
    }

    /// Move `origin`'s entry up to `sequence` in place. An entry already at
    /// or past it is left alone.
    fn restamp(&mut self, origin: &AgentId, sequence: u64, now: Instant) -> Option<R> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.meta().origin == *origin && e.meta().sequence < sequence)?;
        let meta = entry.meta_mut();
        meta.sequence = sequence;
        meta.last_update = now;
        Some(entry.clone())
    }

    fn drain_where(&mut self, mut pred: impl FnMut(&R) -> bool) -> Vec<R> {
        let (gone, keep): (Vec<R>, Vec<R>) = self.entries.drain(..).partition(|r| pred(r));
        self.entries = keep;
        gone
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Key → origin set. Not synchronized; the owning table holds the lock.
#[derive(Debug, Clone)]
pub(crate) struct RouteStore<K, R> {
    sets: HashMap<K, OriginSet<R>>,
}

impl<K, R> Default for RouteStore<K, R> {
    fn default() -> Self {
        Self {
            sets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, R: Routed> RouteStore<K, R> {
    /// Offer a route for `key`. Paths naming `local` are loops.
    pub(crate) fn offer(&mut self, key: K, route: R, local: &AgentId) -> Admission {
        if route.meta().path.contains(local) {
            return Admission::Rejected(Rejection::Loop);
        }
        // a fresh set always admits, so no empty set is ever left behind
        self.sets.entry(key).or_insert_with(OriginSet::new).offer(route)
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&OriginSet<R>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.sets.get(key)
    }

    pub(crate) fn best<Q>(&self, key: &Q) -> Option<&R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.sets.get(key).and_then(OriginSet::best)
    }

    pub(crate) fn remove<Q>(
        &mut self,
        key: &Q,
        origin: &AgentId,
        up_to_sequence: Option<u64>,
    ) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let set = self.sets.get_mut(key)?;
        let removed = set.remove_origin(origin, up_to_sequence);
        if set.is_empty() {
            self.sets.remove(key);
        }
        removed
    }

    /// Remove every entry matching `pred` across all keys.
    pub(crate) fn drain_where(&mut self, mut pred: impl FnMut(&R) -> bool) -> Vec<R> {
        let mut gone = Vec::new();
        for set in self.sets.values_mut() {
            gone.extend(set.drain_where(&mut pred));
        }
        self.sets.retain(|_, set| !set.is_empty());
        gone
    }

    /// Re-sequence every entry `origin` owns. Returns copies of the
    /// entries that moved.
    pub(crate) fn restamp_origin(&mut self, origin: &AgentId, sequence: u64, now: Instant) -> Vec<R> {
        self.sets
            .values_mut()
            .filter_map(|set| set.restamp(origin, sequence, now))
            .collect()
    }

    pub(crate) fn drain_from_peer(&mut self, peer: &AgentId) -> Vec<R> {
        self.drain_where(|r| r.meta().next_hop == *peer)
    }

    /// Learned routes older than `max_age`. Routes `local` originated never
    /// expire.
    pub(crate) fn drain_stale(&mut self, local: &AgentId, now: Instant, max_age: Duration) -> Vec<R> {
        self.drain_where(|r| r.meta().origin != *local && r.meta().is_stale(now, max_age))
    }

    pub(crate) fn sets(&self) -> impl Iterator<Item = (&K, &OriginSet<R>)> {
        self.sets.iter()
    }

    pub(crate) fn routes(&self) -> impl Iterator<Item = &R> {
        self.sets.values().flat_map(OriginSet::iter)
    }

    /// Total entries across all keys and origins.
    pub(crate) fn len(&self) -> usize {
        self.sets.values().map(OriginSet::len).sum()
    }

    pub(crate) fn key_count(&self) -> usize {
        self.sets.len()
    }
}
