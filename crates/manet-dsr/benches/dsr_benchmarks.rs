//! DSR performance benchmarks
//!
//! Benchmarks for the hot paths of a node:
//! - Route cache insertion, lookup and link purges
//! - DSR header encoding and decoding
//! - Request table duplicate detection
//! - Forwarding a source-routed packet through the engine
//!
//! Run with: cargo bench -p manet-dsr

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use bytes::Bytes;
use manet_core::{Clock, LinkLayer, SimTime, TimerService, protocol};
use manet_dsr::{
    Datagram, Dsr, DsrConfig, DsrOption, DsrPacket, NodeAddress, RequestTable, RequestTableConfig,
    RouteCache, RouteCacheConfig, RouteReply, SourceRoute, TimerToken,
};

fn addr(n: u32) -> NodeAddress {
    NodeAddress(0x0a00_0000 + n)
}

fn path(start: u32, len: u32) -> Vec<NodeAddress> {
    (start..start + len).map(addr).collect()
}

// ============================================================================
// Bench Context
// ============================================================================

/// Discards everything the engine hands out
#[derive(Default)]
struct NullContext {
    transmitted: usize,
}

impl Clock for NullContext {
    fn now(&self) -> SimTime {
        Duration::ZERO
    }
}

impl LinkLayer for NullContext {
    fn transmit(&mut self, _datagram: Datagram, _next_hop: NodeAddress, _delay: Duration) {
        self.transmitted += 1;
    }
}

impl TimerService for NullContext {
    fn schedule(&mut self, _token: TimerToken, _delay: Duration) {}
}

// ============================================================================
// Route Cache Benchmarks
// ============================================================================

fn bench_route_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_cache");

    for size in [100u32, 1000] {
        group.bench_with_input(BenchmarkId::new("insert", size), &size, |b, &size| {
            b.iter(|| {
                let mut cache = RouteCache::new(&RouteCacheConfig::default());
                for i in 0..size {
                    cache.insert(&path(i, 1 + i % 8), Duration::ZERO);
                }
                black_box(cache.len())
            })
        });

        let mut cache = RouteCache::new(&RouteCacheConfig::default());
        for i in 0..size {
            cache.insert(&path(i, 1 + i % 8), Duration::ZERO);
        }
        group.bench_with_input(BenchmarkId::new("lookup", size), &size, |b, &size| {
            b.iter(|| {
                for i in (0..size).step_by(7) {
                    black_box(cache.lookup(addr(i)));
                }
            })
        });
    }

    group.bench_function("delete_by_link", |b| {
        b.iter(|| {
            let mut cache = RouteCache::new(&RouteCacheConfig::default());
            for i in 0..200 {
                cache.insert(&path(i % 20, 1 + i % 6), Duration::ZERO);
            }
            black_box(cache.delete_by_link(addr(0), addr(3), addr(4)))
        })
    });

    group.finish();
}

// ============================================================================
// Codec Benchmarks
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let data_packet = DsrPacket::encapsulate(protocol::UDP, Bytes::from(vec![0u8; 512]))
        .with_option(DsrOption::SourceRoute(SourceRoute::new(path(1, 8))));
    let reply_packet = DsrPacket::control()
        .with_option(DsrOption::SourceRoute(SourceRoute::new(path(1, 8))))
        .with_option(DsrOption::RouteReply(RouteReply::new(path(1, 9))));

    group.bench_function("encode_source_routed_data", |b| {
        b.iter(|| black_box(&data_packet).encode())
    });

    let encoded_data = data_packet.encode();
    group.bench_function("decode_source_routed_data", |b| {
        b.iter(|| DsrPacket::decode(black_box(&encoded_data)))
    });

    let encoded_reply = reply_packet.encode();
    group.bench_function("decode_route_reply", |b| {
        b.iter(|| DsrPacket::decode(black_box(&encoded_reply)))
    });

    group.finish();
}

// ============================================================================
// Request Table Benchmarks
// ============================================================================

fn bench_request_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_table");

    group.bench_function("add_and_check_seen", |b| {
        b.iter(|| {
            let mut table = RequestTable::new(&RequestTableConfig::default());
            for i in 0..256u32 {
                table.add_seen(addr(i % 32), i as u16, addr(99));
            }
            black_box(table.check_seen(addr(5), 250, addr(99)))
        })
    });

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    let mut route = SourceRoute::new(path(2, 6));
    route.segments_left = 5;
    let packet = DsrPacket::encapsulate(protocol::UDP, Bytes::from(vec![0u8; 512]))
        .with_option(DsrOption::SourceRoute(route));
    let datagram = Datagram::new(addr(1), addr(20), 1, protocol::DSR, packet.encode()).with_ttl(10);

    group.bench_function("forward_source_routed", |b| {
        let mut dsr = Dsr::new(addr(2), DsrConfig::without_jitter()).unwrap();
        let mut ctx = NullContext::default();
        b.iter(|| dsr.route_packet(&mut ctx, black_box(datagram.clone()), Some(addr(1))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_route_cache,
    bench_codec,
    bench_request_table,
    bench_engine,
);

criterion_main!(benches);
