use dv_router::protocol::{Cost, DistanceVectorProtocol, LinkCommand, LinkState, NodeId, Outbound};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

type Hub = Arc<RwLock<HashMap<NodeId, Arc<DistanceVectorProtocol>>>>;

fn id(port: u16) -> NodeId {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

fn cost(value: f64) -> Cost {
    Cost::new(value).unwrap()
}

/// Delivers `from`'s outbound queue to whichever engines are still attached
/// to the hub, going through the wire codec on the way.
fn spawn_link(hub: Hub, from: NodeId, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let Some(target) = hub.read().await.get(&outbound.to).cloned() else {
                continue;
            };
            let bytes = outbound.message.encode().unwrap();
            let _ = target.handle_datagram(&bytes, from).await;
        }
    });
}

/// A(31001) - B(31002) - C(31003) - A, every link at cost 1.
async fn triangle() -> (Hub, [Arc<DistanceVectorProtocol>; 3]) {
    let (a, b, c) = (id(31001), id(31002), id(31003));
    let topology = [(a, [b, c]), (b, [a, c]), (c, [a, b])];
    let hub: Hub = Arc::default();

    let mut engines = Vec::new();
    for (node, neighbors) in topology {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(DistanceVectorProtocol::new(
            node,
            Duration::from_secs(1),
            neighbors.map(|n| (n, cost(1.0))),
            tx,
        ));
        hub.write().await.insert(node, engine.clone());
        spawn_link(hub.clone(), node, rx);
        engines.push(engine);
    }

    for engine in &engines {
        engine.start().await;
    }

    let engines: [Arc<DistanceVectorProtocol>; 3] = engines.try_into().ok().unwrap();
    (hub, engines)
}

async fn route(engine: &DistanceVectorProtocol, to: NodeId) -> (Cost, Option<NodeId>, LinkState) {
    let snapshot = engine.snapshot().await;
    let entry = snapshot.entry(&to).unwrap();
    (entry.cost, entry.next_hop, entry.link)
}

#[tokio::test(start_paused = true)]
async fn test_triangle_converges_after_one_round() {
    let (_hub, [a, b, c]) = triangle().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    for engine in [&a, &b, &c] {
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.entries.len(), 2);
        for entry in &snapshot.entries {
            assert_eq!(entry.cost, cost(1.0));
            assert_eq!(entry.next_hop, Some(entry.destination));
            assert_eq!(entry.link, LinkState::Neighbor);
        }
    }

    for engine in [a, b, c] {
        engine.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_link_down_reroutes_through_remaining_neighbor() {
    let (_hub, [a, b, c]) = triangle().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    a.execute(&b.local(), LinkCommand::Down).await.unwrap();
    assert_eq!(route(&a, c.local()).await, (cost(1.0), Some(c.local()), LinkState::Neighbor));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(route(&a, b.local()).await, (cost(2.0), Some(c.local()), LinkState::Down));
    assert_eq!(route(&a, c.local()).await, (cost(1.0), Some(c.local()), LinkState::Neighbor));
    assert_eq!(route(&b, a.local()).await, (cost(2.0), Some(c.local()), LinkState::Down));

    // Still down well past the liveness timeout.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(route(&a, b.local()).await.2, LinkState::Down);

    a.execute(&b.local(), LinkCommand::Up).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(route(&a, b.local()).await, (cost(1.0), Some(b.local()), LinkState::Neighbor));
    assert_eq!(route(&b, a.local()).await, (cost(1.0), Some(a.local()), LinkState::Neighbor));

    for engine in [a, b, c] {
        engine.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_link_change_propagates_to_peer() {
    let (_hub, [a, b, c]) = triangle().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    a.execute(&b.local(), LinkCommand::Change(cost(5.0))).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(route(&a, b.local()).await, (cost(2.0), Some(c.local()), LinkState::Neighbor));
    assert_eq!(route(&b, a.local()).await, (cost(2.0), Some(c.local()), LinkState::Neighbor));
    assert_eq!(b.snapshot().await.entry(&a.local()).unwrap().direct, cost(5.0));

    for engine in [a, b, c] {
        engine.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_node_becomes_unreachable() {
    let (hub, [a, b, c]) = triangle().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    hub.write().await.remove(&c.local());
    c.shutdown().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    for engine in [&a, &b] {
        let (cost_to_c, next_hop, link) = route(engine, c.local()).await;
        assert_eq!(cost_to_c, Cost::INFINITY);
        assert_eq!(next_hop, None);
        assert_eq!(link, LinkState::Down);
    }
    assert_eq!(route(&a, b.local()).await, (cost(1.0), Some(b.local()), LinkState::Neighbor));

    a.shutdown().await;
    b.shutdown().await;
}
