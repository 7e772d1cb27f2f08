//! Benchmarks for the triad census and topology scoring kernels.
//!
//! Run with:
//! - `cargo bench --bench prediction_kernels`
//! - `cargo bench --bench prediction_kernels --features parallel`

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tiegraph_core::engine::adjacency::Adjacency;
use tiegraph_core::engine::graph::{FlatEdge, FlatGraph, NodeData, NodeId};
use tiegraph_core::engine::sampling::find_all_missing_edges;
use tiegraph_core::engine::similarity::{TopologyIndex, TopologyPredictor};
use tiegraph_core::engine::triads::{enumerate_types, BALANCE_TRIADS};

/// Sparse directed graph with about `degree` out-edges per node.
fn make_graph(nodes: u32, degree: u32, seed: u64) -> FlatGraph {
    let mut state = seed;
    let mut graph = FlatGraph::new();
    for i in 0..nodes {
        graph.add_node(NodeData::new(NodeId(i)));
    }
    let mut seen = BTreeSet::new();
    for u in 0..nodes {
        for _ in 0..degree {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let v = ((state >> 33) % nodes as u64) as u32;
            if u != v && seen.insert((u, v)) {
                graph.edges.push(FlatEdge::original(NodeId(u), NodeId(v)));
            }
        }
    }
    graph
}

fn bench_triad_census(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance_triad_census");
    let wanted: BTreeSet<_> = BALANCE_TRIADS.iter().copied().collect();
    for (idx, size) in [50_u32, 100, 200, 400].iter().enumerate() {
        let adjacency = Adjacency::from_flat(&make_graph(*size, 4, idx as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &adjacency, |b, g| {
            b.iter(|| black_box(enumerate_types(black_box(g), &wanted)));
        });
    }
    group.finish();
}

fn bench_topology_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology_scoring");
    group.sample_size(20);
    let graph = make_graph(150, 4, 7);
    let adjacency = Adjacency::from_flat(&graph);
    let pairs = find_all_missing_edges(&graph);
    for index in [
        TopologyIndex::CommonNeighbors,
        TopologyIndex::Jaccard,
        TopologyIndex::AdamicAdar,
        TopologyIndex::PreferentialAttachment,
    ] {
        let sequential = TopologyPredictor::new(index);
        group.bench_with_input(
            BenchmarkId::new("sequential", index.designation()),
            &pairs,
            |b, p| b.iter(|| black_box(sequential.predict(&adjacency, black_box(p)))),
        );

        #[cfg(feature = "parallel")]
        {
            let mut parallel = TopologyPredictor::new(index);
            parallel.parallel = true;
            group.bench_with_input(
                BenchmarkId::new("parallel", index.designation()),
                &pairs,
                |b, p| b.iter(|| black_box(parallel.predict(&adjacency, black_box(p)))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_triad_census, bench_topology_scoring);
criterion_main!(benches);
