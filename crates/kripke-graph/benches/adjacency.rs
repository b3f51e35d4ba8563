//! Adjacency store construction and query benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kripke_graph::{Adjacency, FlatStore, Node};

const NODES: usize = 100_000;
const DEGREE: usize = 4;

fn build_growable() -> FlatStore {
    let mut store = FlatStore::new();
    for node in 0..NODES {
        store.prepare(node as Node, DEGREE).unwrap();
        for i in 0..DEGREE {
            store
                .set_successor(node as Node, i, ((node * 31 + i * 7) % NODES) as Node)
                .unwrap();
        }
    }
    store
}

fn build_fixed() -> FlatStore {
    let mut store = FlatStore::with_capacity(NODES, NODES * DEGREE);
    for node in 0..NODES {
        store.prepare(node as Node, DEGREE).unwrap();
        for i in 0..DEGREE {
            store
                .set_successor(node as Node, i, ((node * 31 + i * 7) % NODES) as Node)
                .unwrap();
        }
    }
    store
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("flat_build_growable_100k", |b| {
        b.iter(|| black_box(build_growable()))
    });
    c.bench_function("flat_build_fixed_100k", |b| {
        b.iter(|| black_box(build_fixed()))
    });
}

fn bench_query(c: &mut Criterion) {
    let store = build_fixed();
    c.bench_function("flat_query_sweep", |b| {
        b.iter(|| {
            let mut acc: u64 = 0;
            for node in 0..NODES as Node {
                for i in 0..DEGREE {
                    acc = acc.wrapping_add(store.successor(node, i).unwrap() as u64);
                }
            }
            black_box(acc)
        })
    });
    c.bench_function("flat_query_raw_sweep", |b| {
        b.iter(|| {
            let mut acc: u64 = 0;
            for &target in store.successors_raw() {
                acc = acc.wrapping_add(target as u64);
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
