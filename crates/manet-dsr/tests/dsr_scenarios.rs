//! End-to-end DSR scenarios on small static topologies
//!
//! Jitter is disabled so that every run is fully deterministic and the
//! timing below can be followed hop by hop (1 ms per link).

mod common;

use std::time::Duration;

use common::{TestNetwork, addr, path};
use manet_dsr::{DsrConfig, DsrOption, RouteDecision};

#[test]
fn test_discovery_escalates_and_flushes_buffer() {
    let mut net = TestNetwork::line(4, DsrConfig::without_jitter());

    assert_eq!(net.send(1, 4, 1), RouteDecision::Buffered);
    net.run_for(Duration::from_secs(1));

    let delivered = net.delivered_at(4);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].source, addr(1));
    assert_eq!(delivered[0].id, 1);

    // One neighbors-only request, then one propagating retry
    let a = net.node(1).stats();
    assert_eq!(a.requests_initiated, 1);
    assert_eq!(a.requests_resent, 1);
    assert_eq!(a.replies_received_as_source, 1);
    assert_eq!(a.data_initiated, 1);
    assert!(net.node(1).send_buffer().is_empty());
    assert!(net.node(1).request_table().sent(addr(4)).is_none());
    assert_eq!(net.node(1).route_cache().lookup(addr(4)).unwrap().path, path(&[2, 3, 4]));

    assert_eq!(net.node(2).stats().requests_ttl_expired, 1);
    assert_eq!(net.node(4).stats().replies_initiated_as_destination, 1);

    // First hop carries the full source route
    let first = net.data_transmissions(1, 1)[0].clone();
    assert_eq!(first.from, addr(1));
    assert_eq!(first.next_hop, addr(2));
    let route = first.packet().unwrap().source_route().cloned().unwrap();
    assert_eq!(route.hops, path(&[2, 3]));
    assert_eq!(route.segments_left, 2);
}

#[test]
fn test_segments_left_decrements_per_hop() {
    let mut net = TestNetwork::line(6, DsrConfig::without_jitter());

    net.send(1, 6, 7);
    net.run_for(Duration::from_secs(1));
    assert_eq!(net.delivered_at(6).len(), 1);

    let hops: Vec<_> = net
        .data_transmissions(1, 7)
        .into_iter()
        .map(|t| {
            let segments_left = t.packet().and_then(|p| p.source_route().map(|sr| sr.segments_left));
            (t.from, t.next_hop, segments_left, t.datagram.ttl)
        })
        .collect();

    assert_eq!(
        hops,
        vec![
            (addr(1), addr(2), Some(4), 5),
            (addr(2), addr(3), Some(3), 4),
            (addr(3), addr(4), Some(2), 3),
            (addr(4), addr(5), Some(1), 2),
            (addr(5), addr(6), None, 1),
        ]
    );
    for n in 2..=5 {
        assert_eq!(net.node(n).stats().data_forwarded, 1);
    }
    assert_eq!(net.node(6).stats().data_received, 1);
}

#[test]
fn test_intermediate_answers_from_cache() {
    // 5 hangs off 2 on the line 1 - 2 - 3 - 4
    let mut net = TestNetwork::new(&[1, 2, 3, 4, 5], &[(1, 2), (2, 3), (3, 4), (2, 5)], DsrConfig::without_jitter());

    net.send(1, 4, 1);
    net.run_for(Duration::from_secs(1));
    assert_eq!(net.node(2).route_cache().lookup(addr(4)).unwrap().path, path(&[3, 4]));

    net.send(5, 4, 1);
    net.run_for(Duration::from_secs(1));

    assert_eq!(net.node(2).stats().replies_initiated_as_intermediate, 1);
    let e = net.node(5).stats();
    assert_eq!(e.requests_initiated, 1);
    assert_eq!(e.requests_resent, 0);
    assert_eq!(net.node(5).route_cache().lookup(addr(4)).unwrap().path, path(&[2, 3, 4]));

    let delivered = net.delivered_at(4);
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].source, addr(5));
}

#[test]
fn test_broken_link_reported_and_salvaged() {
    // Two equal routes 2 - 3 - 4 and 2 - 5 - 4
    let mut net = TestNetwork::new(
        &[1, 2, 3, 4, 5],
        &[(1, 2), (2, 3), (3, 4), (2, 5), (5, 4)],
        DsrConfig::without_jitter(),
    );

    net.send(1, 4, 1);
    net.run_for(Duration::from_millis(200));
    assert_eq!(net.delivered_at(4).len(), 1);
    assert_eq!(net.node(1).route_cache().lookup(addr(4)).unwrap().path, path(&[2, 3, 4]));
    assert_eq!(net.node(2).route_cache().lookup(addr(4)).unwrap().path, path(&[3, 4]));

    net.break_link(2, 3);
    assert_eq!(net.send(1, 4, 2), RouteDecision::Transmitted);
    net.run_for(Duration::from_millis(200));

    // Two retransmissions, then the link is given up
    let b = net.node(2).stats();
    assert_eq!(b.link_breaks, 1);
    assert_eq!(b.errors_initiated, 1);
    assert_eq!(b.salvaged, 1);
    assert!(net.node(2).route_cache().lookup(addr(3)).is_none());
    assert!(net.node(2).rexmt_buffer().is_empty());

    // The salvaged copy leaves 2 over the alternate route
    let salvaged = net
        .data_transmissions(1, 2)
        .into_iter()
        .find(|t| t.from == addr(2) && t.next_hop == addr(5))
        .cloned()
        .unwrap();
    let route = salvaged.packet().unwrap().source_route().cloned().unwrap();
    assert_eq!(route.hops, path(&[5]));
    assert_eq!(route.salvage, 1);
    assert_eq!(route.salvage_origin, Some(addr(2)));

    let delivered = net.delivered_at(4);
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].id, 2);

    // The source drops routes over the broken link
    let a = net.node(1).stats();
    assert_eq!(a.errors_received_as_source, 1);
    assert_eq!(net.node(1).route_cache().lookup(addr(4)).unwrap().path, path(&[2, 5, 4]));
    assert!(net.node(1).route_cache().routes_to(addr(3)).is_empty());

    let error = net
        .transmissions
        .iter()
        .filter(|t| t.from == addr(2) && t.next_hop == addr(1))
        .filter_map(|t| t.packet())
        .find_map(|p| match p.options.first() {
            Some(DsrOption::RouteError(e)) => Some(e.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error.source, addr(2));
    assert_eq!(error.destination, addr(1));
    assert_eq!(error.unreachable, addr(3));
}

#[test]
fn test_retries_exhausted_restart_discovery() {
    let mut config = DsrConfig::without_jitter();
    config.discovery.max_request_retransmissions = 2;
    let mut net = TestNetwork::line(2, config);

    // 9 does not exist: retries at 30 ms, 530 ms and 1530 ms, restart at 3530 ms
    net.send(1, 9, 1);
    net.run_until(Duration::from_millis(3550));

    let a = net.node(1).stats();
    assert_eq!(a.requests_initiated, 2);
    assert_eq!(a.requests_resent, 3);
    assert_eq!(net.node(1).request_table().sent(addr(9)).unwrap().count, 1);
    assert_eq!(net.node(1).send_buffer().len(), 1);
}

#[test]
fn test_buffered_packet_expires_and_discovery_stops() {
    let mut net = TestNetwork::line(2, DsrConfig::without_jitter());

    net.send(1, 9, 1);
    net.run_until(Duration::from_secs(31));

    let a = net.node(1).stats().clone();
    assert_eq!(a.data_dropped_no_route, 1);
    assert!(net.node(1).send_buffer().is_empty());

    net.run_until(Duration::from_secs(60));
    let later = net.node(1).stats();
    assert_eq!(later.requests_initiated, a.requests_initiated);
    assert_eq!(later.requests_resent, a.requests_resent);
}

#[test]
fn test_request_not_relayed_twice() {
    // Ring of four: the flood reaches 3 both ways
    let mut net = TestNetwork::new(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4), (4, 1)], DsrConfig::without_jitter());

    net.send(1, 9, 1);
    net.run_for(Duration::from_millis(100));

    let c = net.node(3).stats();
    assert_eq!(c.requests_relayed, 1);
    assert_eq!(c.requests_duplicate, 1);
}
