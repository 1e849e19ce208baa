//! Compile a small block with a magic-state factory and print its schedule
//!
//! Run with `RUST_LOG=debug` to watch admissions and resolutions.

use qcb_scheduler::*;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Two registers sharing a routing corridor with one factory output
    let graph = PatchGraph::from_rows(&[
        "Z.X.E",
        ".....",
        "Z.X..",
    ])?;
    let mapper = StaticMapper::new()
        .with_binding("a", Coord::new(0, 0))
        .with_binding("b", Coord::new(0, 2))
        .with_binding("c", Coord::new(2, 0))
        .with_binding("d", Coord::new(2, 2))
        .with_binding("T#0", Coord::new(0, 4));

    let mut builder = DagBuilder::new("demo").with_inputs(["a", "b", "c", "d"]);
    builder.add_gate(Instruction::Hadamard, ["a"])?;
    builder.add_gate(Instruction::Cnot, ["a", "b"])?;
    builder.add_gate(Instruction::Cnot, ["c", "d"])?;
    builder.add_gate(Instruction::T, ["b"])?;
    builder.add_gate(Instruction::T, ["d"])?;
    builder.add_gate(Instruction::Measure, ["b"])?;
    let dag = builder.build();
    println!("{}", dag);

    let config = CompilerConfig::default()
        .with_channel_capacity(2)
        .with_factory(Factory::new("T", 3));
    let compiler = QcbCompiler::new(config);

    let traversal = compiler.schedule(&dag)?;
    info!(
        cycles = traversal.cycles,
        estimate = compiler.depth_estimate(&dag),
        "list schedule"
    );

    let block = compiler.compile(dag, graph, mapper)?;
    for record in &block.schedule().cycles {
        let admitted: Vec<String> = record
            .admitted
            .iter()
            .map(|id| block.dag().node(*id).to_string())
            .collect();
        println!(
            "cycle {:>3}: {} running, admitted [{}]",
            record.cycle,
            record.active.len(),
            admitted.join(", ")
        );
    }
    println!("{} cycles after routing", block.n_cycles());
    println!("{}", block.graph());
    Ok(())
}
