//! Routing Table Benchmarks — Accept and Lookup Path Costs
//!
//! Measures the operations the control task and drain workers hit on
//! every connection: identifier generation, role lookup, and the
//! linear reverse lookup used on disconnect.
//!
//! Run with: cargo bench --bench routing_bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fixme_router::domain::{ClientId, RoutedConnection};
use fixme_router::usecases::RoutingTable;

const BROKER_PORT: u16 = 5000;

struct Endpoint {
    serial: u64,
    port: u16,
}

impl RoutedConnection for Endpoint {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn local_port(&self) -> u16 {
        self.port
    }
}

fn populated(count: u64) -> (RoutingTable<Endpoint>, Vec<ClientId>) {
    let table = RoutingTable::new(BROKER_PORT);
    let ids = (0..count)
        .map(|serial| {
            let port = if serial % 2 == 0 { BROKER_PORT } else { BROKER_PORT + 1 };
            table.add_client(Arc::new(Endpoint { serial, port })).unwrap()
        })
        .collect();
    (table, ids)
}

/// Benchmark add + remove of one client on a table with 1000 live entries.
fn bench_add_remove(c: &mut Criterion) {
    let (table, _ids) = populated(1000);
    let endpoint = Arc::new(Endpoint { serial: u64::MAX, port: BROKER_PORT });

    c.bench_function("routing_add_remove", |b| {
        b.iter(|| {
            let id = table.add_client(Arc::clone(&endpoint)).unwrap();
            table.remove_client(black_box(&id));
        });
    });
}

/// Benchmark role derivation for a live identifier.
fn bench_client_type(c: &mut Criterion) {
    let (table, ids) = populated(1000);
    let id = ids[500].clone();

    c.bench_function("routing_client_type", |b| {
        b.iter(|| table.get_client_type(black_box(&id)).unwrap());
    });
}

/// Benchmark the reverse lookup scan at several table sizes.
fn bench_reverse_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing_reverse_lookup");
    for size in [10u64, 100, 1000, 10_000] {
        let (table, _ids) = populated(size);
        let probe = Endpoint { serial: size - 1, port: BROKER_PORT };
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| table.get_client_id(black_box(&probe)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_add_remove,
    bench_client_type,
    bench_reverse_lookup,
);
criterion_main!(benches);
