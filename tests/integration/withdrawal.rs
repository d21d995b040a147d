use crate::*;

use std::time::{Duration, Instant};

#[test]
fn test_withdrawal_floods_to_every_agent() -> Result<()> {
    let mesh = Mesh::line(4);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    let _ = mesh.agents[0].add_local_route(prefix("172.16.0.0/12"), 0);
    mesh.converge()?;
    assert_eq!(mesh.agents[3].routes().size(), 2);

    assert_eq!(mesh.withdraw_route(0, prefix("10.0.0.0/8")), 3);

    for m in &mesh.agents {
        assert!(m.lookup("10.0.0.1".parse()?).is_none());
        assert!(m.lookup("172.16.0.1".parse()?).is_some());
    }
    Ok(())
}

/// A withdrawal that arrives after a fresher advertisement leaves it alone.
#[test]
fn test_reordered_withdrawal_is_ignored() -> Result<()> {
    let mesh = Mesh::line(2);
    let a = mesh.id(0);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    let old_seq = mesh.agents[0].current_sequence();
    mesh.agents[0].refresh_local();
    mesh.converge()?;

    let removed = mesh.agents[1].process_route_withdraw(a, a, old_seq, &[prefix("10.0.0.0/8")]);
    assert!(removed.is_empty());
    assert!(mesh.agents[1].lookup("10.0.0.1".parse()?).is_some());
    Ok(())
}

#[test]
fn test_disconnect_purges_downstream_knowledge() -> Result<()> {
    let mut mesh = Mesh::line(3);
    mesh.announce_presence();
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    mesh.converge()?;

    let (removed_b, removed_c) = mesh.unlink(1, 2);
    // B loses C's presence; C loses A's and B's presence plus the route
    assert_eq!(removed_b, 1);
    assert_eq!(removed_c, 3);

    let c = &mesh.agents[2];
    assert!(c.lookup("10.0.0.1".parse()?).is_none());
    assert_eq!(c.lookup_next_hop(&mesh.id(0)), None);
    assert_eq!(c.agents().size(), 1);

    // nothing comes back while the link is down
    mesh.converge()?;
    assert!(mesh.agents[2].lookup("10.0.0.1".parse()?).is_none());
    Ok(())
}

/// Losing the direct link, C falls back to the path through B.
#[test]
fn test_reroute_after_link_loss() -> Result<()> {
    let mut mesh = Mesh::line(3);
    mesh.link(0, 2);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    mesh.converge()?;
    assert_eq!(
        mesh.agents[2].lookup("10.0.0.1".parse()?).map(|r| r.meta.metric),
        Some(1)
    );

    mesh.unlink(0, 2);
    mesh.converge()?;

    let on_c = mesh.agents[2].lookup("10.0.0.1".parse()?).expect("rerouted");
    assert_eq!(on_c.meta.metric, 2);
    assert_eq!(on_c.meta.next_hop, mesh.id(1));
    Ok(())
}

/// Learned routes age out unless the origin re-sequences them.
#[test]
fn test_stale_routes_expire_until_refreshed() -> Result<()> {
    let mesh = Mesh::line(3);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    mesh.converge()?;

    let ttl = Duration::from_secs(300);
    let later = Instant::now() + Duration::from_secs(3600);
    for m in &mesh.agents[1..] {
        assert_eq!(m.cleanup_stale_as_of(later, ttl).routes, 1);
    }
    // the origin keeps its own route
    assert_eq!(mesh.agents[0].cleanup_stale_as_of(later, ttl).total(), 0);

    let seq = mesh.agents[0].refresh_local();
    mesh.converge()?;
    let on_c = mesh.agents[2].lookup("10.0.0.1".parse()?).expect("relearned");
    assert_eq!(on_c.meta.sequence, seq);
    Ok(())
}
