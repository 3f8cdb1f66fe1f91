//! Criterion benchmarks for the runner overhead, measured against the
//! in-memory backend so no database is needed.
//!
//! Run with: `cargo bench --bench runner`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_bench::adapters::memory_adapter::MemoryGraph;
use graph_bench::datagen::DataGen;
use graph_bench::runner::Runner;
use graph_bench::stats;
use graph_bench::workloads::{self, PreparedWorkload, SamplePolicy};
use graph_bench::WorkloadKind;
use std::time::Duration;

const SEED: u64 = 42;

fn memory_graph(nodes: usize, edges: usize) -> MemoryGraph {
    let generated = DataGen::new(SEED).social_graph(nodes, edges);
    let graph = MemoryGraph::with_seed(SEED);
    let mut db = graph.handle();
    db.insert_nodes(&generated.nodes).unwrap();
    db.insert_edges(&generated.edges).unwrap();
    db.close().unwrap();
    graph
}

fn bench_workloads(c: &mut Criterion) {
    let mut group = c.benchmark_group("workload_run");
    let operations = 1_000;
    let graph = memory_graph(5_000, 40_000);

    for kind in WorkloadKind::ALL {
        for threads in [1, 4] {
            let mut template = graph.handle();
            let prepared = PreparedWorkload::setup(
                workloads::create(kind, 2),
                template.as_mut(),
                operations,
                SamplePolicy::Pad,
                SEED,
            )
            .unwrap();

            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), threads),
                &threads,
                |b, &threads| {
                    let runner = Runner::new();
                    b.iter(|| {
                        runner
                            .run(&prepared, template.as_ref(), operations, threads)
                            .unwrap()
                    });
                },
            );
            template.close().unwrap();
        }
    }
    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarize");

    for n in [1_000usize, 100_000] {
        let samples: Vec<u64> = (0..n as u64).map(|i| (i * 7_919) % 50_000).collect();
        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter_batched(
                || samples.clone(),
                |mut s| stats::summarize(&mut s, Duration::from_secs(1)),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_workloads, bench_summarize);
criterion_main!(benches);
