//! End-to-end discovery and maintenance over the event-driven network

use std::time::Duration;

use manet_dsr::{DsrConfig, RouteDecision};
use manet_simulation::{Network, SimConfig, TopologyBuilder, from_edges, node_address};

#[test]
fn test_discovery_on_grid() {
    // 1 2 3
    // 4 5 6
    // 7 8 9
    let topology = TopologyBuilder::new(9).unwrap().grid(3).unwrap();
    let mut net = Network::new(topology, &DsrConfig::default(), SimConfig::default()).unwrap();

    net.send(node_address(1), node_address(9), "corner to corner").unwrap();
    net.run_for(Duration::from_secs(2));

    let delivered: Vec<_> = net.delivered_at(node_address(9)).collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].datagram.source, node_address(1));

    // No grid path is shorter than four hops
    let source = net.node(node_address(1)).unwrap();
    let route = source.route_cache().lookup(node_address(9)).unwrap();
    assert!(route.path.len() >= 4);
    assert_eq!(route.path.last(), Some(&node_address(9)));
    assert!(source.send_buffer().is_empty());
}

#[test]
fn test_second_packet_uses_cached_route() {
    let topology = TopologyBuilder::new(4).unwrap().line();
    let mut net = Network::new(topology, &DsrConfig::without_jitter(), SimConfig::default()).unwrap();

    assert_eq!(net.send(node_address(1), node_address(4), "a").unwrap(), RouteDecision::Buffered);
    net.run_for(Duration::from_secs(1));
    assert_eq!(
        net.send(node_address(1), node_address(4), "b").unwrap(),
        RouteDecision::Transmitted
    );
    net.run_for(Duration::from_secs(1));

    assert_eq!(net.delivered_at(node_address(4)).count(), 2);
    assert_eq!(net.node(node_address(1)).unwrap().stats().requests_initiated, 1);
}

#[test]
fn test_reply_follows_reversed_route() {
    let topology = TopologyBuilder::new(3).unwrap().line();
    let mut net = Network::new(topology, &DsrConfig::without_jitter(), SimConfig::default()).unwrap();

    net.send(node_address(1), node_address(3), "x").unwrap();
    net.run_for(Duration::from_secs(1));

    // The target learned the way back from the request it answered
    let target = net.node(node_address(3)).unwrap();
    assert_eq!(
        target.route_cache().lookup(node_address(1)).unwrap().path,
        vec![node_address(2), node_address(1)]
    );
    assert_eq!(target.stats().replies_initiated_as_destination, 1);
    assert!(
        net.node(node_address(2))
            .unwrap()
            .route_cache()
            .lookup(node_address(3))
            .is_some()
    );
}

#[test]
fn test_link_restored_after_break() {
    let topology = from_edges(&[(1, 2), (2, 3)]);
    let mut net = Network::new(topology, &DsrConfig::without_jitter(), SimConfig::default()).unwrap();

    net.send(node_address(1), node_address(3), "first").unwrap();
    net.run_for(Duration::from_secs(1));

    assert!(net.break_link(node_address(2), node_address(3)));
    net.send(node_address(1), node_address(3), "lost").unwrap();
    net.run_for(Duration::from_secs(1));

    // The source heard about the break and dropped its route
    let source = net.node(node_address(1)).unwrap();
    assert_eq!(source.stats().errors_received_as_source, 1);
    assert!(source.route_cache().lookup(node_address(3)).is_none());

    net.connect(node_address(2), node_address(3)).unwrap();
    net.send(node_address(1), node_address(3), "again").unwrap();
    net.run_for(Duration::from_secs(2));

    let ids: Vec<_> = net
        .delivered_at(node_address(3))
        .map(|d| d.datagram.id)
        .collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(net.node(node_address(1)).unwrap().stats().requests_initiated, 2);
}

#[test]
fn test_route_error_addressed_to_source() {
    let topology = from_edges(&[(1, 2), (2, 3), (3, 4)]);
    let mut net = Network::new(topology, &DsrConfig::without_jitter(), SimConfig::default()).unwrap();

    net.send(node_address(1), node_address(4), "a").unwrap();
    net.run_for(Duration::from_secs(1));
    net.break_link(node_address(3), node_address(4));
    net.send(node_address(1), node_address(4), "b").unwrap();
    net.run_for(Duration::from_millis(100));

    let relay = net.node(node_address(3)).unwrap().stats();
    assert_eq!(relay.errors_initiated, 1);
    assert_eq!(relay.data_dropped_rexmt_timeout, 1);

    // 2 relays the error and forgets the link too
    let middle = net.node(node_address(2)).unwrap();
    assert_eq!(middle.stats().errors_received, 1);
    assert!(middle.route_cache().lookup(node_address(4)).is_none());
    assert!(middle.rexmt_buffer().is_empty());
}

#[test]
fn test_oversized_datagram_dropped() {
    let mut config = DsrConfig::without_jitter();
    config.mtu = 128;
    let topology = TopologyBuilder::new(3).unwrap().line();
    let mut net = Network::new(topology, &config, SimConfig::default()).unwrap();

    net.send(node_address(1), node_address(3), vec![0u8; 200]).unwrap();
    net.run_for(Duration::from_secs(1));

    assert_eq!(net.delivered_at(node_address(3)).count(), 0);
    assert_eq!(net.node(node_address(1)).unwrap().stats().packets_greater_mtu, 1);
}
