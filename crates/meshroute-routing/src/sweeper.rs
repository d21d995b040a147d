//! Background maintenance loops for a shared [`Manager`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::manager::Manager;

/// Expire learned routes and NodeInfo not refreshed within `max_age`,
/// checking every `interval`, until `shutdown` fires.
pub async fn sweep_loop(
    manager: Arc<Manager>,
    interval: Duration,
    max_age: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("sweep loop stopping");
                return;
            }
            _ = ticker.tick() => {
                let report = manager.cleanup_stale(max_age);
                if report.total() > 0 {
                    tracing::info!(
                        routes = report.routes,
                        domains = report.domains,
                        agents = report.agents,
                        forwards = report.forwards,
                        node_info = report.node_info,
                        "expired stale entries"
                    );
                }
            }
        }
    }
}

/// Re-sequence local routes every `interval` so peers keep them fresh.
pub async fn refresh_loop(
    manager: Arc<Manager>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // first tick completes immediately; routes were just installed
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {
                let sequence = manager.refresh_local();
                tracing::trace!(sequence, "local routes refreshed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroute_core::{AgentId, PathInfo, Prefix, RouteEntry};

    fn learn(manager: &Manager, prefix: &str) {
        let entry = RouteEntry {
            prefix: prefix.parse::<Prefix>().unwrap(),
            metric: 1,
        };
        let _ = manager.process_route_advertise(
            AgentId::random(),
            AgentId::random(),
            1,
            &[entry],
            &PathInfo::empty(),
        );
    }

    #[tokio::test]
    async fn sweep_expires_learned_routes_and_stops() {
        let manager = Arc::new(Manager::new(AgentId::random()));
        let _ = manager.add_local_route("192.168.0.0/16".parse().unwrap(), 0);
        learn(&manager, "10.0.0.0/8");

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(sweep_loop(
            manager.clone(),
            Duration::from_millis(10),
            Duration::ZERO,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.routes().size(), 1);
        assert!(manager.lookup("192.168.1.1".parse().unwrap()).is_some());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_bumps_local_sequence() {
        let manager = Arc::new(Manager::new(AgentId::random()));
        let _ = manager.add_local_route("10.0.0.0/8".parse().unwrap(), 0);
        let before = manager.current_sequence();

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(refresh_loop(manager.clone(), Duration::from_millis(10), rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let route = manager.lookup("10.1.1.1".parse().unwrap()).unwrap();
        assert!(route.meta.sequence > before);
    }
}
