use crate::*;

use meshroute_core::PathInfo;

/// A - B - C: metrics grow one per hop and the path records the relays.
#[test]
fn test_line_topology_metrics_and_paths() -> Result<()> {
    let mesh = Mesh::line(3);
    let (a, b) = (mesh.id(0), mesh.id(1));
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);

    mesh.converge()?;

    let on_b = mesh.agents[1].lookup("10.1.2.3".parse()?).expect("route on B");
    assert_eq!(on_b.meta.metric, 1);
    assert_eq!(on_b.meta.next_hop, a);
    assert_eq!(on_b.meta.path, PathInfo::Plain(vec![a]));

    let on_c = mesh.agents[2].lookup("10.1.2.3".parse()?).expect("route on C");
    assert_eq!(on_c.meta.metric, 2);
    assert_eq!(on_c.meta.next_hop, b);
    assert_eq!(on_c.meta.origin, a);
    assert_eq!(on_c.meta.path, PathInfo::Plain(vec![b, a]));
    Ok(())
}

/// Adding a shortcut A - C makes C prefer the direct route.
#[test]
fn test_shorter_path_preferred() -> Result<()> {
    let mut mesh = Mesh::line(3);
    mesh.link(0, 2);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);

    mesh.converge()?;

    let on_c = mesh.agents[2].lookup("10.0.0.1".parse()?).expect("route on C");
    assert_eq!(on_c.meta.metric, 1);
    assert_eq!(on_c.meta.next_hop, mesh.id(0));
    // one entry per origin, so the longer copy via B was never kept
    assert_eq!(mesh.agents[2].routes().size(), 1);
    Ok(())
}

/// Longest prefix wins across origins, whatever the metrics.
#[test]
fn test_more_specific_prefix_from_farther_agent() -> Result<()> {
    let mesh = Mesh::line(4);
    let _ = mesh.agents[1].add_local_route(prefix("10.0.0.0/8"), 0);
    let _ = mesh.agents[3].add_local_route(prefix("10.20.0.0/16"), 0);

    mesh.converge()?;

    let at_a = &mesh.agents[0];
    let specific = at_a.lookup("10.20.1.1".parse()?).expect("specific route");
    assert_eq!(specific.meta.origin, mesh.id(3));
    assert_eq!(specific.meta.metric, 3);

    let broad = at_a.lookup("10.30.1.1".parse()?).expect("broad route");
    assert_eq!(broad.meta.origin, mesh.id(1));

    let all = at_a.lookup_all("10.20.1.1".parse()?);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].prefix, prefix("10.20.0.0/16"));
    Ok(())
}

#[test]
fn test_agent_presence_gives_next_hop() -> Result<()> {
    let mesh = Mesh::line(4);
    mesh.announce_presence();

    mesh.converge()?;

    let (a, b, d) = (mesh.id(0), mesh.id(1), mesh.id(3));
    assert_eq!(mesh.agents[0].lookup_next_hop(&d), Some(b));
    assert_eq!(mesh.agents[3].lookup_agent(&a).map(|r| r.meta.metric), Some(3));
    // every agent knows every other agent plus itself
    for m in &mesh.agents {
        assert_eq!(m.agents().size(), 4);
    }
    Ok(())
}

#[test]
fn test_domains_and_forwards_propagate() -> Result<()> {
    let mesh = Mesh::line(3);
    let origin = &mesh.agents[0];
    assert!(origin.add_local_domain_route("*.corp.example.com", 0).is_accepted());
    assert!(origin.add_local_domain_route("wiki.example.com", 0).is_accepted());
    assert!(origin
        .add_local_forward_route("ssh-bastion", "10.0.0.5:22", 0)
        .is_accepted());

    mesh.converge()?;

    let c = &mesh.agents[2];
    let b = mesh.id(1);
    assert_eq!(c.lookup_domain("git.corp.example.com").map(|r| r.meta.next_hop), Some(b));
    assert_eq!(c.lookup_domain("WIKI.example.com").map(|r| r.meta.metric), Some(2));
    assert!(c.lookup_domain("a.b.corp.example.com").is_none());

    let fwd = c.lookup_forward("ssh-bastion").expect("forward on C");
    assert_eq!(fwd.meta.next_hop, b);
    assert!(fwd.target.is_none());

    let at_origin = mesh.agents[0].lookup_forward("ssh-bastion").expect("forward on A");
    assert_eq!(at_origin.target.as_deref(), Some("10.0.0.5:22"));
    Ok(())
}

/// Nothing is advertised back to the neighbor it was learned from.
#[test]
fn test_split_horizon() -> Result<()> {
    let mesh = Mesh::line(3);
    mesh.announce_presence();
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    mesh.converge()?;

    let b = &mesh.agents[1];
    let (a, c) = (mesh.id(0), mesh.id(2));

    let to_a = b.get_full_routes_for_advertise(&a);
    assert!(to_a.routes.is_empty());
    assert!(to_a.agents.iter().all(|r| r.meta.next_hop != a));
    assert!(to_a.agents.iter().any(|r| r.agent == c));

    let to_c = b.get_routes_to_advertise(&c);
    assert_eq!(to_c.len(), 1);
    assert_eq!(to_c[0].meta.origin, a);
    Ok(())
}

/// A ring converges with one entry per origin on every agent.
#[test]
fn test_ring_converges_without_loops() -> Result<()> {
    let mut mesh = Mesh::line(4);
    mesh.link(3, 0);
    mesh.announce_presence();
    let _ = mesh.agents[0].add_local_route(prefix("192.168.0.0/16"), 0);

    let rounds = mesh.converge()?;
    assert!(rounds < MAX_ROUNDS);

    assert_eq!(mesh.agents[0].routes().size(), 1);
    let local = mesh.agents[0].lookup("192.168.1.1".parse()?).expect("local route");
    assert_eq!(local.meta.next_hop, mesh.id(0));

    // C is two hops away either way round
    let on_c = mesh.agents[2].lookup("192.168.1.1".parse()?).expect("route on C");
    assert_eq!(on_c.meta.metric, 2);
    for m in &mesh.agents {
        assert_eq!(m.agents().size(), 4);
    }
    Ok(())
}

#[test]
fn test_route_events_reach_subscriber() -> Result<()> {
    let mesh = Mesh::line(2);
    let mut events = mesh.agents[1].subscribe(16);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);

    mesh.converge()?;

    let ev = events.try_recv()?;
    assert_eq!(ev.key, "10.0.0.0/8");
    assert_eq!(ev.origin, mesh.id(0));
    assert_eq!(ev.metric, 1);
    assert!(events.try_recv().is_err());

    let json = serde_json::to_value(&ev)?;
    assert_eq!(json["kind"], "cidr");
    Ok(())
}
