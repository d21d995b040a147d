//! Manager — the one entry point to route state.
//!
//! Owns the four tables, the NodeInfo store and the event bus. The flooding
//! component hands it every inbound advertisement and withdrawal and asks it
//! what to advertise to each neighbor; the data plane asks it for next hops.
//!
//! No table lock is held across a call into another table or the bus: each
//! table call returns owned records and events are published afterwards.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use meshroute_core::config::LocalRoutesConfig;
use meshroute_core::crypto::SealedOpener;
use meshroute_core::{
    AgentEntry, AgentId, DomainEntry, DomainPattern, ForwardEntry, Metric, NodeInfoPayload,
    PathInfo, Prefix, RouteEntry,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::agent::{AgentRoute, AgentTable};
use crate::cidr::{Route, RouteTable};
use crate::domain::{DomainRoute, DomainTable};
use crate::events::{EventBus, RouteAction, RouteEvent, RouteKind};
use crate::forward::{ForwardRoute, ForwardTable};
use crate::node_info::{NodeInfoRecord, NodeInfoStore};
use crate::record::{Admission, Rejection, RouteMeta, Routed};

/// Everything a neighbor should hear from us, split horizon applied.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    pub routes: Vec<Route>,
    pub domains: Vec<DomainRoute>,
    pub agents: Vec<AgentRoute>,
    /// Targets are stripped; they never leave the origin.
    pub forwards: Vec<ForwardRoute>,
}

impl Advertisement {
    pub fn len(&self) -> usize {
        self.routes.len() + self.domains.len() + self.agents.len() + self.forwards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entries removed by one staleness sweep, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub routes: usize,
    pub domains: usize,
    pub agents: usize,
    pub forwards: usize,
    pub node_info: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.routes + self.domains + self.agents + self.forwards + self.node_info
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub agent: AgentId,
    pub sequence: u64,
    pub cidr_routes: usize,
    pub cidr_prefixes: usize,
    pub domain_routes: usize,
    pub agent_routes: usize,
    pub forward_routes: usize,
    pub node_info: usize,
    pub subscribers: usize,
}

pub struct Manager {
    local: AgentId,
    sequence: AtomicU64,
    routes: RouteTable,
    domains: DomainTable,
    agents: AgentTable,
    forwards: ForwardTable,
    node_info: NodeInfoStore,
    events: EventBus,
}

impl Manager {
    pub fn new(local: AgentId) -> Self {
        Self::with_opener(local, None)
    }

    /// `opener` decrypts sealed NodeInfo; pass `None` when this agent holds
    /// no management key.
    pub fn with_opener(local: AgentId, opener: Option<Arc<dyn SealedOpener>>) -> Self {
        // Seeded from the clock so a restarted agent outranks the copies
        // peers still hold from its previous run.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            local,
            sequence: AtomicU64::new(seed),
            routes: RouteTable::new(local),
            domains: DomainTable::new(local),
            agents: AgentTable::new(local),
            forwards: ForwardTable::new(local),
            node_info: NodeInfoStore::new(local, opener),
            events: EventBus::new(),
        }
    }

    pub fn local_id(&self) -> AgentId {
        self.local
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Highest sequence issued so far. A withdrawal sent with this value
    /// covers every route this agent has originated.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn domains(&self) -> &DomainTable {
        &self.domains
    }

    pub fn agents(&self) -> &AgentTable {
        &self.agents
    }

    pub fn forwards(&self) -> &ForwardTable {
        &self.forwards
    }

    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<RouteEvent> {
        self.events.subscribe(capacity)
    }

    // ── Local origination ─────────────────────────────────────────────────────

    pub fn add_local_route(&self, prefix: Prefix, metric: Metric) -> Admission {
        let route = Route {
            prefix,
            meta: RouteMeta::local(self.local, metric, self.next_sequence()),
        };
        self.originate(RouteKind::Cidr, route, |r| self.routes.add_route(r))
    }

    pub fn remove_local_route(&self, prefix: &Prefix) -> bool {
        let removed = self.routes.remove_route(prefix, &self.local);
        self.retract(RouteKind::Cidr, removed)
    }

    /// `pattern` is an exact name or `*.base`. Invalid patterns are rejected.
    pub fn add_local_domain_route(&self, pattern: &str, metric: Metric) -> Admission {
        let pattern = match DomainPattern::parse(pattern) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid local domain route");
                return Admission::Rejected(Rejection::Invalid);
            }
        };
        let route = DomainRoute {
            pattern,
            meta: RouteMeta::local(self.local, metric, self.next_sequence()),
        };
        self.originate(RouteKind::Domain, route, |r| self.domains.add_route(r))
    }

    pub fn remove_local_domain_route(&self, pattern: &str) -> bool {
        let Ok(pattern) = DomainPattern::parse(pattern) else {
            return false;
        };
        let removed = self.domains.remove_route(&pattern, &self.local);
        self.retract(RouteKind::Domain, removed)
    }

    /// Announce reachability of `agent` through this one. Daemons call this
    /// with their own id at metric 0.
    pub fn add_local_agent_route(&self, agent: AgentId, metric: Metric) -> Admission {
        let route = AgentRoute {
            agent,
            meta: RouteMeta::local(self.local, metric, self.next_sequence()),
        };
        self.originate(RouteKind::Agent, route, |r| self.agents.add_route(r))
    }

    pub fn remove_local_agent_route(&self, agent: &AgentId) -> bool {
        let removed = self.agents.remove_route(agent, &self.local);
        self.retract(RouteKind::Agent, removed)
    }

    /// Bind `key` to a `host:port` on this agent.
    pub fn add_local_forward_route(&self, key: &str, target: &str, metric: Metric) -> Admission {
        let key = key.trim();
        let target = target.trim();
        if key.is_empty() || target.is_empty() {
            tracing::warn!(key, target, "invalid local forward route");
            return Admission::Rejected(Rejection::Invalid);
        }
        let route = ForwardRoute {
            key: key.to_string(),
            target: Some(target.to_string()),
            meta: RouteMeta::local(self.local, metric, self.next_sequence()),
        };
        self.originate(RouteKind::Forward, route, |r| self.forwards.add_route(r))
    }

    pub fn remove_local_forward_route(&self, key: &str) -> bool {
        let removed = self.forwards.remove_route(key.trim(), &self.local);
        self.retract(RouteKind::Forward, removed)
    }

    /// Install the routes, domains and forwards from the config file.
    /// Invalid entries are logged and skipped. Returns how many were taken.
    pub fn apply_local_config(&self, local: &LocalRoutesConfig) -> usize {
        let mut installed = 0;

        for entry in &local.routes {
            match entry.prefix.parse::<Prefix>() {
                Ok(prefix) => {
                    if self.add_local_route(prefix, entry.metric).is_accepted() {
                        installed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(prefix = %entry.prefix, error = %e, "skipping local route");
                }
            }
        }
        for entry in &local.domains {
            if self
                .add_local_domain_route(&entry.pattern, entry.metric)
                .is_accepted()
            {
                installed += 1;
            }
        }
        for entry in &local.forwards {
            if self
                .add_local_forward_route(&entry.key, &entry.target, entry.metric)
                .is_accepted()
            {
                installed += 1;
            }
        }

        installed
    }

    /// Re-stamp every locally originated entry with a fresh sequence so the
    /// next advertisement refreshes it on peers instead of being rejected
    /// as a duplicate. Returns the sequence used.
    ///
    /// Entries are moved in place under each table's write lock, so a route
    /// removed or replaced concurrently is never brought back.
    pub fn refresh_local(&self) -> u64 {
        let sequence = self.next_sequence();
        let now = Instant::now();

        let routes = self.routes.take_restamped(sequence, now);
        let domains = self.domains.take_restamped(sequence, now);
        let agents = self.agents.take_restamped(sequence, now);
        let forwards = self.forwards.take_restamped(sequence, now);
        let refreshed = routes.len() + domains.len() + agents.len() + forwards.len();

        self.events.publish_all(RouteKind::Cidr, RouteAction::Added, &routes);
        self.events.publish_all(RouteKind::Domain, RouteAction::Added, &domains);
        self.events.publish_all(RouteKind::Agent, RouteAction::Added, &agents);
        self.events.publish_all(RouteKind::Forward, RouteAction::Added, &forwards);

        tracing::debug!(sequence, refreshed, "local routes re-sequenced");
        sequence
    }

    // ── Advertisement ingestion ───────────────────────────────────────────────

    /// Ingest a CIDR advertisement relayed by `from` on behalf of `origin`.
    /// Each entry costs one more hop here. Returns what was accepted.
    pub fn process_route_advertise(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        entries: &[RouteEntry],
        path: &PathInfo,
    ) -> Vec<Route> {
        if self.is_echo(RouteKind::Cidr, &from, &origin) {
            return Vec::new();
        }
        entries
            .iter()
            .filter_map(|entry| {
                let route = Route {
                    prefix: entry.prefix,
                    meta: learned(from, origin, entry.metric, sequence, path),
                };
                self.admit(RouteKind::Cidr, route, |r| self.routes.add_route(r))
            })
            .collect()
    }

    pub fn process_domain_route_advertise(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        entries: &[DomainEntry],
        path: &PathInfo,
    ) -> Vec<DomainRoute> {
        if self.is_echo(RouteKind::Domain, &from, &origin) {
            return Vec::new();
        }
        entries
            .iter()
            .filter_map(|entry| {
                let pattern = match DomainPattern::parse(&entry.pattern) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(
                            from = %from,
                            origin = %origin,
                            pattern = %entry.pattern,
                            error = %e,
                            reason = %Rejection::Invalid,
                            "advertised domain route rejected"
                        );
                        return None;
                    }
                };
                let route = DomainRoute {
                    pattern,
                    meta: learned(from, origin, entry.metric, sequence, path),
                };
                self.admit(RouteKind::Domain, route, |r| self.domains.add_route(r))
            })
            .collect()
    }

    pub fn process_agent_route_advertise(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        entries: &[AgentEntry],
        path: &PathInfo,
    ) -> Vec<AgentRoute> {
        if self.is_echo(RouteKind::Agent, &from, &origin) {
            return Vec::new();
        }
        entries
            .iter()
            .filter_map(|entry| {
                let route = AgentRoute {
                    agent: entry.agent,
                    meta: learned(from, origin, entry.metric, sequence, path),
                };
                self.admit(RouteKind::Agent, route, |r| self.agents.add_route(r))
            })
            .collect()
    }

    pub fn process_forward_route_advertise(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        entries: &[ForwardEntry],
        path: &PathInfo,
    ) -> Vec<ForwardRoute> {
        if self.is_echo(RouteKind::Forward, &from, &origin) {
            return Vec::new();
        }
        entries
            .iter()
            .filter_map(|entry| {
                if entry.key.trim().is_empty() {
                    tracing::debug!(from = %from, origin = %origin, "empty forward key rejected");
                    return None;
                }
                let route = ForwardRoute {
                    key: entry.key.trim().to_string(),
                    target: None,
                    meta: learned(from, origin, entry.metric, sequence, path),
                };
                self.admit(RouteKind::Forward, route, |r| self.forwards.add_route(r))
            })
            .collect()
    }

    // ── Withdrawal ────────────────────────────────────────────────────────────

    /// Remove `origin`'s entries for `prefixes`. An entry carrying a newer
    /// sequence than the withdrawal survives it, and withdrawals naming this
    /// agent as origin are ignored: local routes go through `remove_local_*`.
    pub fn process_route_withdraw(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        prefixes: &[Prefix],
    ) -> Vec<Route> {
        if origin == self.local {
            return Vec::new();
        }
        let removed: Vec<Route> = prefixes
            .iter()
            .filter_map(|p| self.routes.withdraw(p, &origin, sequence))
            .collect();
        self.withdrawn(RouteKind::Cidr, &from, &origin, removed)
    }

    pub fn process_domain_route_withdraw(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        patterns: &[impl AsRef<str>],
    ) -> Vec<DomainRoute> {
        if origin == self.local {
            return Vec::new();
        }
        let removed: Vec<DomainRoute> = patterns
            .iter()
            .filter_map(|p| DomainPattern::parse(p.as_ref()).ok())
            .filter_map(|p| self.domains.withdraw(&p, &origin, sequence))
            .collect();
        self.withdrawn(RouteKind::Domain, &from, &origin, removed)
    }

    pub fn process_agent_route_withdraw(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        agents: &[AgentId],
    ) -> Vec<AgentRoute> {
        if origin == self.local {
            return Vec::new();
        }
        let removed: Vec<AgentRoute> = agents
            .iter()
            .filter_map(|a| self.agents.withdraw(a, &origin, sequence))
            .collect();
        self.withdrawn(RouteKind::Agent, &from, &origin, removed)
    }

    pub fn process_forward_route_withdraw(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        keys: &[impl AsRef<str>],
    ) -> Vec<ForwardRoute> {
        if origin == self.local {
            return Vec::new();
        }
        let removed: Vec<ForwardRoute> = keys
            .iter()
            .filter_map(|k| self.forwards.withdraw(k.as_ref().trim(), &origin, sequence))
            .collect();
        self.withdrawn(RouteKind::Forward, &from, &origin, removed)
    }

    // ── Peer loss and expiry ──────────────────────────────────────────────────

    /// Drop every route learned through `peer`. Returns the count removed.
    pub fn handle_peer_disconnect(&self, peer: &AgentId) -> usize {
        if *peer == self.local {
            return 0;
        }
        let routes = self.routes.take_routes_from_peer(peer);
        let domains = self.domains.take_routes_from_peer(peer);
        let agents = self.agents.take_routes_from_peer(peer);
        let forwards = self.forwards.take_routes_from_peer(peer);

        let total = routes.len() + domains.len() + agents.len() + forwards.len();
        if total > 0 {
            tracing::info!(
                peer = %peer,
                routes = routes.len(),
                domains = domains.len(),
                agents = agents.len(),
                forwards = forwards.len(),
                "purged routes of disconnected peer"
            );
        }

        self.events.publish_all(RouteKind::Cidr, RouteAction::Removed, &routes);
        self.events.publish_all(RouteKind::Domain, RouteAction::Removed, &domains);
        self.events.publish_all(RouteKind::Agent, RouteAction::Removed, &agents);
        self.events.publish_all(RouteKind::Forward, RouteAction::Removed, &forwards);
        total
    }

    pub fn cleanup_stale_routes(&self, max_age: Duration) -> usize {
        let gone = self.routes.take_stale(Instant::now(), max_age);
        self.expired(RouteKind::Cidr, gone)
    }

    pub fn cleanup_stale_domain_routes(&self, max_age: Duration) -> usize {
        let gone = self.domains.take_stale(Instant::now(), max_age);
        self.expired(RouteKind::Domain, gone)
    }

    pub fn cleanup_stale_agent_routes(&self, max_age: Duration) -> usize {
        let gone = self.agents.take_stale(Instant::now(), max_age);
        self.expired(RouteKind::Agent, gone)
    }

    pub fn cleanup_stale_forward_routes(&self, max_age: Duration) -> usize {
        let gone = self.forwards.take_stale(Instant::now(), max_age);
        self.expired(RouteKind::Forward, gone)
    }

    /// Sweep every table and the NodeInfo store.
    pub fn cleanup_stale(&self, max_age: Duration) -> SweepReport {
        self.cleanup_stale_as_of(Instant::now(), max_age)
    }

    /// [`cleanup_stale`](Self::cleanup_stale) against an explicit clock.
    pub fn cleanup_stale_as_of(&self, now: Instant, max_age: Duration) -> SweepReport {
        SweepReport {
            routes: self.expired(RouteKind::Cidr, self.routes.take_stale(now, max_age)),
            domains: self.expired(RouteKind::Domain, self.domains.take_stale(now, max_age)),
            agents: self.expired(RouteKind::Agent, self.agents.take_stale(now, max_age)),
            forwards: self.expired(RouteKind::Forward, self.forwards.take_stale(now, max_age)),
            node_info: self.node_info.cleanup_stale(now, max_age),
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    pub fn lookup(&self, addr: IpAddr) -> Option<Route> {
        self.routes.lookup(addr)
    }

    pub fn lookup_all(&self, addr: IpAddr) -> Vec<Route> {
        self.routes.lookup_all(addr)
    }

    pub fn lookup_domain(&self, name: &str) -> Option<DomainRoute> {
        self.domains.lookup(name)
    }

    pub fn lookup_agent(&self, agent: &AgentId) -> Option<AgentRoute> {
        self.agents.lookup(agent)
    }

    /// Neighbor to hand traffic for `agent` to.
    pub fn lookup_next_hop(&self, agent: &AgentId) -> Option<AgentId> {
        self.agents.lookup_next_hop(agent)
    }

    pub fn lookup_forward(&self, key: &str) -> Option<ForwardRoute> {
        self.forwards.lookup(key.trim())
    }

    // ── Advertisement selection ───────────────────────────────────────────────

    /// CIDR routes to advertise to `exclude`, minus those learned from it.
    pub fn get_routes_to_advertise(&self, exclude: &AgentId) -> Vec<Route> {
        split_horizon(self.routes.get_all_routes(), exclude)
    }

    pub fn get_full_routes_for_advertise(&self, exclude: &AgentId) -> Advertisement {
        let mut forwards = split_horizon(self.forwards.get_all_routes(), exclude);
        for f in &mut forwards {
            f.target = None;
        }
        Advertisement {
            routes: self.get_routes_to_advertise(exclude),
            domains: split_horizon(self.domains.get_all_routes(), exclude),
            agents: split_horizon(self.agents.get_all_routes(), exclude),
            forwards,
        }
    }

    // ── NodeInfo ──────────────────────────────────────────────────────────────

    pub fn process_node_info(
        &self,
        from: AgentId,
        origin: AgentId,
        sequence: u64,
        payload: NodeInfoPayload,
    ) -> Admission {
        let admission = self.node_info.process(from, origin, sequence, payload);
        if let Admission::Rejected(reason) = admission {
            tracing::trace!(from = %from, origin = %origin, sequence, reason = %reason, "node info rejected");
        }
        admission
    }

    /// Publish this agent's own record. Returns the sequence it was stored
    /// under, for the flooding component to advertise with.
    pub fn set_local_node_info(&self, payload: NodeInfoPayload) -> u64 {
        let sequence = self.next_sequence();
        let _ = self
            .node_info
            .process(self.local, self.local, sequence, payload);
        sequence
    }

    pub fn get_node_info(&self, agent: &AgentId) -> Option<NodeInfoRecord> {
        self.node_info.get(agent)
    }

    pub fn all_node_info(&self) -> Vec<NodeInfoRecord> {
        self.node_info.all()
    }

    pub fn display_name(&self, agent: &AgentId) -> Option<String> {
        self.node_info.display_name(agent)
    }

    /// Display name, or the short hex id when none is known.
    pub fn display_label(&self, agent: &AgentId) -> String {
        self.node_info.display_label(agent)
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            agent: self.local,
            sequence: self.current_sequence(),
            cidr_routes: self.routes.size(),
            cidr_prefixes: self.routes.prefix_count(),
            domain_routes: self.domains.size(),
            agent_routes: self.agents.size(),
            forward_routes: self.forwards.size(),
            node_info: self.node_info.len(),
            subscribers: self.events.subscriber_count(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn is_echo(&self, kind: RouteKind, from: &AgentId, origin: &AgentId) -> bool {
        if *origin != self.local {
            return false;
        }
        tracing::debug!(
            kind = ?kind,
            from = %from,
            reason = %Rejection::Echo,
            "advertisement of our own routes rejected"
        );
        true
    }

    fn originate<R: Routed>(
        &self,
        kind: RouteKind,
        mut route: R,
        add: impl Fn(R) -> Admission,
    ) -> Admission {
        loop {
            let admission = add(route.clone());
            match admission {
                // a refresh stamped our previous entry after this sequence
                // was drawn; draw again
                Admission::Rejected(Rejection::Stale) => {
                    route.meta_mut().sequence = self.next_sequence();
                }
                Admission::Added | Admission::Replaced => {
                    let event = RouteEvent::from_route(kind, RouteAction::Added, &route);
                    tracing::info!(kind = ?kind, key = %event.key, metric = event.metric, "local route installed");
                    self.events.publish(event);
                    return admission;
                }
                Admission::Rejected(_) => return admission,
            }
        }
    }

    fn retract<R: Routed>(&self, kind: RouteKind, removed: Option<R>) -> bool {
        let Some(route) = removed else {
            return false;
        };
        tracing::info!(kind = ?kind, key = %route.key_string(), "local route removed");
        self.events
            .publish(RouteEvent::from_route(kind, RouteAction::Removed, &route));
        true
    }

    fn admit<R: Routed>(
        &self,
        kind: RouteKind,
        route: R,
        add: impl FnOnce(R) -> Admission,
    ) -> Option<R> {
        let kept = route.clone();
        match add(route) {
            Admission::Added | Admission::Replaced => {
                self.events
                    .publish(RouteEvent::from_route(kind, RouteAction::Added, &kept));
                Some(kept)
            }
            Admission::Rejected(reason) => {
                let meta = kept.meta();
                tracing::trace!(
                    kind = ?kind,
                    key = %kept.key_string(),
                    from = %meta.next_hop,
                    origin = %meta.origin,
                    sequence = meta.sequence,
                    reason = %reason,
                    "advertised route rejected"
                );
                None
            }
        }
    }

    fn withdrawn<R: Routed>(
        &self,
        kind: RouteKind,
        from: &AgentId,
        origin: &AgentId,
        removed: Vec<R>,
    ) -> Vec<R> {
        if !removed.is_empty() {
            tracing::debug!(kind = ?kind, from = %from, origin = %origin, count = removed.len(), "routes withdrawn");
        }
        self.events.publish_all(kind, RouteAction::Removed, &removed);
        removed
    }

    fn expired<R: Routed>(&self, kind: RouteKind, gone: Vec<R>) -> usize {
        if !gone.is_empty() {
            tracing::debug!(kind = ?kind, count = gone.len(), "stale routes expired");
        }
        self.events.publish_all(kind, RouteAction::Removed, &gone);
        gone.len()
    }
}

fn learned(
    from: AgentId,
    origin: AgentId,
    advertised: Metric,
    sequence: u64,
    path: &PathInfo,
) -> RouteMeta {
    RouteMeta::learned(from, origin, advertised.saturating_add(1), sequence, path.clone())
}

fn split_horizon<R: Routed>(routes: Vec<R>, exclude: &AgentId) -> Vec<R> {
    routes
        .into_iter()
        .filter(|r| r.meta().next_hop != *exclude)
        .collect()
}
