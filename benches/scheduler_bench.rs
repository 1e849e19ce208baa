//! Benchmarks for scheduling, remapping and routing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qcb_scheduler::*;

/// Benchmark configuration
struct BenchConfig {
    pairs: usize,
    rounds: usize,
}

impl BenchConfig {
    fn new(pairs: usize, rounds: usize) -> Self {
        Self { pairs, rounds }
    }

    fn label(&self) -> String {
        format!("{}pairs_{}rounds", self.pairs, self.rounds)
    }
}

/// Repeated CNOT and T rounds over independent qubit pairs
fn generate_circuit(config: &BenchConfig, magic: bool) -> Dag {
    let names: Vec<String> = (0..config.pairs * 2).map(|i| format!("q{}", i)).collect();
    let mut builder = DagBuilder::new("bench").with_inputs(names.iter().map(String::as_str));
    for _ in 0..config.rounds {
        for pair in names.chunks(2) {
            builder
                .add_gate(Instruction::Cnot, [pair[0].as_str(), pair[1].as_str()])
                .unwrap();
            if magic {
                builder.add_gate(Instruction::T, [pair[0].as_str()]).unwrap();
            }
        }
    }
    builder.build()
}

/// One `Z.X` row per pair, separated by routing rows
fn generate_layout(pairs: usize) -> (PatchGraph, StaticMapper) {
    let mut rows = Vec::with_capacity(pairs * 2);
    let mut mapper = StaticMapper::new();
    for pair in 0..pairs {
        let row = rows.len();
        rows.push("Z.X");
        mapper.bind(format!("q{}", pair * 2), Coord::new(row, 0));
        mapper.bind(format!("q{}", pair * 2 + 1), Coord::new(row, 2));
        rows.push("...");
    }
    (PatchGraph::from_rows(&rows).unwrap(), mapper)
}

fn bench_list_scheduling(c: &mut Criterion) {
    let configs = [BenchConfig::new(4, 10), BenchConfig::new(16, 20), BenchConfig::new(64, 20)];
    let mut group = c.benchmark_group("list_scheduling");

    for config in &configs {
        let dag = generate_circuit(config, false);
        for capacity in [1, 4, 16] {
            group.throughput(Throughput::Elements(dag.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("capacity_{}", capacity), config.label()),
                &dag,
                |b, dag| {
                    let scheduler = ListScheduler::new(capacity);
                    b.iter(|| black_box(scheduler.schedule(dag, &[]).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_magic_state_remap(c: &mut Criterion) {
    let configs = [BenchConfig::new(4, 5), BenchConfig::new(16, 10)];
    let factories = [Factory::new("T", 2), Factory::new("T", 3)];
    let mut group = c.benchmark_group("magic_state_remap");

    for config in &configs {
        let dag = generate_circuit(config, true);
        group.throughput(Throughput::Elements(dag.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(config.label()), &dag, |b, dag| {
            b.iter(|| {
                let mut dag = dag.clone();
                black_box(remap_magic_states(&mut dag, 4, &factories).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let configs = [BenchConfig::new(2, 10), BenchConfig::new(8, 10), BenchConfig::new(16, 20)];
    let mut group = c.benchmark_group("routing");

    for config in &configs {
        let dag = generate_circuit(config, false);
        let (graph, mapper) = generate_layout(config.pairs);
        group.throughput(Throughput::Elements(dag.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(config.label()),
            &(graph, mapper),
            |b, (graph, mapper)| {
                b.iter(|| {
                    let mut router = Router::new(&dag, graph.clone(), mapper.clone(), RouterConfig::default());
                    black_box(router.route().unwrap())
                });
            },
        );
    }

    group.finish();
}

fn bench_depth_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth_estimate");

    for pairs in [4, 16, 64] {
        let dag = generate_circuit(&BenchConfig::new(pairs, 20), true);
        group.bench_with_input(BenchmarkId::new("depth_parallel", pairs), &dag, |b, dag| {
            b.iter(|| black_box(dag.depth_parallel(4)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_list_scheduling,
    bench_magic_state_remap,
    bench_routing,
    bench_depth_estimate
);

criterion_main!(benches);
