use crate::*;

use std::sync::Arc;

use bytes::Bytes;
use meshroute_core::crypto::{seal, Keypair};
use meshroute_core::{NodeInfo, NodeInfoPayload, PathInfo};

/// Hand B a copy of A's route whose path arrived encrypted.
fn deliver_sealed(mesh: &Mesh, blob: &Bytes) -> usize {
    let a = mesh.id(0);
    let seq = mesh.agents[0].current_sequence();
    let entry = RouteEntry {
        prefix: prefix("10.0.0.0/8"),
        metric: 0,
    };
    mesh.agents[1]
        .process_route_advertise(a, a, seq, &[entry], &PathInfo::Sealed(blob.clone()))
        .len()
}

#[test]
fn test_sealed_path_relayed_verbatim() -> Result<()> {
    let mesh = Mesh::line(3);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    let blob = Bytes::from_static(b"\x01\x02ciphertext-of-the-path");
    assert_eq!(deliver_sealed(&mesh, &blob), 1);

    mesh.converge()?;

    // the plain copy from A carries the same sequence and metric, so B keeps
    // the sealed one and C receives it byte for byte
    let on_b = mesh.agents[1].lookup("10.0.0.1".parse()?).expect("route on B");
    assert_eq!(on_b.meta.path, PathInfo::Sealed(blob.clone()));
    let on_c = mesh.agents[2].lookup("10.0.0.1".parse()?).expect("route on C");
    assert_eq!(on_c.meta.path, PathInfo::Sealed(blob));
    assert_eq!(on_c.meta.metric, 2);
    Ok(())
}

/// Loop detection cannot read a sealed path; the origin still refuses its
/// own route when it comes back around the ring.
#[test]
fn test_origin_refuses_own_route_behind_sealed_path() -> Result<()> {
    let mut mesh = Mesh::line(3);
    mesh.link(2, 0);
    let _ = mesh.agents[0].add_local_route(prefix("10.0.0.0/8"), 0);
    let blob = Bytes::from_static(b"sealed");
    assert_eq!(deliver_sealed(&mesh, &blob), 1);

    assert_eq!(mesh.relay(1, 2), 1);
    assert_eq!(mesh.relay(2, 0), 0);

    let a = &mesh.agents[0];
    assert_eq!(a.routes().size(), 1);
    assert_eq!(
        a.lookup("10.0.0.1".parse()?).map(|r| r.meta.next_hop),
        Some(mesh.id(0))
    );
    Ok(())
}

#[test]
fn test_sealed_node_info_readable_only_with_key() -> Result<()> {
    let management = Keypair::generate();
    let opener = Keypair::from_private(*management.private_bytes());
    let mesh = Mesh::from_managers(vec![
        Manager::new(AgentId::random()),
        Manager::new(AgentId::random()),
        Manager::with_opener(AgentId::random(), Some(Arc::new(opener))),
    ]);
    let (a, b) = (mesh.id(0), mesh.id(1));

    let info = NodeInfo {
        display_name: "edge-a".into(),
        hostname: "edge-a.lan".into(),
        os: "linux".into(),
        arch: "aarch64".into(),
        version: "0.1.0".into(),
        peers: vec![b],
    };
    let sealed = seal(&management.public, &serde_json::to_vec(&info)?)?;
    let payload = NodeInfoPayload::Sealed(Bytes::from(sealed));
    let seq = mesh.agents[0].set_local_node_info(payload.clone());

    // A → B: stored, not readable
    assert!(mesh.agents[1].process_node_info(a, a, seq, payload.clone()).is_accepted());
    let on_b = mesh.agents[1].get_node_info(&a).expect("record on B");
    assert!(on_b.decoded.is_none());
    assert_eq!(mesh.agents[1].display_label(&a), a.short());

    // B → C: relayed verbatim, opened with the management key
    assert!(mesh.agents[2].process_node_info(b, a, seq, on_b.payload).is_accepted());
    let on_c = mesh.agents[2].get_node_info(&a).expect("record on C");
    assert_eq!(on_c.payload, payload);
    assert_eq!(on_c.received_from, b);
    assert_eq!(on_c.decoded, Some(info));
    assert_eq!(mesh.agents[2].display_label(&a), "edge-a");

    // a replay of the same sequence changes nothing
    assert!(!mesh.agents[2].process_node_info(b, a, seq, payload).is_accepted());
    Ok(())
}
