//! meshrouted — route state daemon for one mesh agent.
//!
//! Loads configuration, installs the configured local routes, then keeps
//! the tables swept and logs every route change until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};

use meshroute_core::config::MeshConfig;
use meshroute_core::crypto::{Keypair, SealedOpener};
use meshroute_core::{AgentId, NodeInfo, NodeInfoPayload};
use meshroute_routing::{refresh_loop, sweep_loop, Manager, RouteAction};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MeshConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MeshConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MeshConfig::default()
    });

    let agent_id = resolve_agent_id(&config)?;
    let opener = management_opener(&config)?;
    tracing::info!(
        agent = %agent_id,
        management_key = opener.is_some(),
        "meshrouted starting"
    );

    let manager = Arc::new(Manager::with_opener(agent_id, opener));

    // ── Local state ──────────────────────────────────────────────────────────

    let _ = manager.add_local_agent_route(agent_id, 0);
    let installed = manager.apply_local_config(&config.local);
    manager.set_local_node_info(NodeInfoPayload::Plain(local_node_info(&config)));
    tracing::info!(
        installed,
        ttl_secs = config.routing.route_ttl_secs,
        sweep_secs = config.routing.sweep_interval_secs,
        "local routes installed"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let sweep_task = tokio::spawn(sweep_loop(
        manager.clone(),
        config.routing.sweep_interval(),
        config.routing.route_ttl(),
        shutdown_tx.subscribe(),
    ));

    let refresh_task = tokio::spawn(refresh_loop(
        manager.clone(),
        config.routing.advertise_interval(),
        shutdown_tx.subscribe(),
    ));

    let event_logger = {
        let manager = manager.clone();
        let mut events = manager.subscribe(config.routing.event_buffer);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let verb = match event.action {
                    RouteAction::Added => "route added",
                    RouteAction::Removed => "route removed",
                };
                tracing::info!(
                    kind = ?event.kind,
                    key = %event.key,
                    origin = %manager.display_label(&event.origin),
                    next_hop = %manager.display_label(&event.next_hop),
                    metric = event.metric,
                    "{verb}"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = sweep_task          => tracing::error!("sweep task exited: {:?}", r),
        r = refresh_task        => tracing::error!("refresh task exited: {:?}", r),
        r = event_logger        => tracing::error!("event logger exited: {:?}", r),
    }

    match serde_json::to_string(&manager.stats()) {
        Ok(stats) => tracing::info!(stats = %stats, "final route state"),
        Err(e) => tracing::warn!(error = %e, "failed to encode stats"),
    }

    Ok(())
}

/// Configured id, or a fresh random one when none is set.
fn resolve_agent_id(config: &MeshConfig) -> Result<AgentId> {
    let id = config.agent.id.trim();
    if id.is_empty() {
        let id = AgentId::random();
        tracing::warn!(agent = %id, "no agent id configured, using a random one");
        return Ok(id);
    }
    id.parse::<AgentId>().context("agent.id")
}

fn management_opener(config: &MeshConfig) -> Result<Option<Arc<dyn SealedOpener>>> {
    let key = config.node_info.management_private_key.trim();
    if key.is_empty() {
        return Ok(None);
    }
    let keypair = Keypair::from_private_hex(key).context("node_info.management_private_key")?;
    Ok(Some(Arc::new(keypair)))
}

fn local_node_info(config: &MeshConfig) -> NodeInfo {
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .unwrap_or_default();
    NodeInfo {
        display_name: config.agent.display_name.clone(),
        hostname,
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        peers: Vec::new(),
    }
}
