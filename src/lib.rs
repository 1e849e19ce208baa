//! # QCB Scheduler
//!
//! Cycle-accurate scheduling and routing for a quantum compute block.
//! Operations are collected into a dependency graph, ordered by a
//! resource-constrained list scheduler fed by magic-state factories, bound
//! to concrete factory instances, and finally placed on a patch layout.

pub mod config;
pub mod dag;
pub mod error;
pub mod router;
pub mod scheduler;
pub mod topology;

// Re-exports for convenience
pub use config::{CompilerConfig, RouterConfig};
pub use dag::{Boundary, Dag, DagBuilder, DagNode, Instruction, NodeId, Symbol};
pub use error::{QcbError, Result};
pub use router::{CycleRecord, NodeState, RoutedSchedule, Router};
pub use scheduler::{remap_magic_states, Factory, ListScheduler, RemapReport, Traversal};
pub use topology::{AddressMapper, Allocation, Coord, PatchGraph, RoutingGraph, StaticMapper};

use tracing::info;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// High-level compiler interface
#[derive(Debug, Clone, Default)]
pub struct QcbCompiler {
    config: CompilerConfig,
}

impl QcbCompiler {
    /// Create a compiler with the given configuration
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Run the list scheduler without touching the graph
    pub fn schedule(&self, dag: &Dag) -> Result<Traversal> {
        ListScheduler::new(self.config.channel_capacity).schedule(dag, &self.config.factories)
    }

    /// Depth under the channel budget, ignoring factories and placement
    pub fn depth_estimate(&self, dag: &Dag) -> usize {
        dag.depth_parallel(self.config.channel_capacity)
    }

    /// Bind magic states to factory instances and route the result
    pub fn compile<G, M>(&self, mut dag: Dag, graph: G, mapper: M) -> Result<CompiledBlock<G, M>>
    where
        G: RoutingGraph,
        M: AddressMapper,
    {
        self.config.validate()?;

        let remap = if dag.factories().is_empty() {
            None
        } else {
            Some(remap_magic_states(
                &mut dag,
                self.config.channel_capacity,
                &self.config.factories,
            )?)
        };

        let mut router = Router::new(&dag, graph, mapper, self.config.router.clone());
        let schedule = router.route()?;
        let (graph, mapper) = router.into_parts();

        info!(graph = dag.name(), nodes = dag.len(), cycles = schedule.n_cycles(), "block compiled");
        Ok(CompiledBlock {
            dag,
            schedule,
            remap,
            graph,
            mapper,
        })
    }
}

/// Output of [`QcbCompiler::compile`]
#[derive(Debug)]
pub struct CompiledBlock<G, M> {
    dag: Dag,
    schedule: RoutedSchedule,
    remap: Option<RemapReport>,
    graph: G,
    mapper: M,
}

impl<G, M> CompiledBlock<G, M> {
    /// Graph after magic-state remapping
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Routed schedule
    pub fn schedule(&self) -> &RoutedSchedule {
        &self.schedule
    }

    /// Number of routed cycles
    pub fn n_cycles(&self) -> usize {
        self.schedule.n_cycles()
    }

    /// Remapping performed before routing, if any magic state was consumed
    pub fn remap(&self) -> Option<&RemapReport> {
        self.remap.as_ref()
    }

    /// Layout in its final state
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Mapper in its final state
    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_estimate_tracks_capacity() {
        let mut builder = DagBuilder::new("pairs").with_inputs(["a", "b", "c", "d"]);
        builder.add_gate(Instruction::Cnot, ["a", "b"]).unwrap();
        builder.add_gate(Instruction::Cnot, ["c", "d"]).unwrap();
        let dag = builder.build();

        let narrow = QcbCompiler::new(CompilerConfig::default());
        let wide = QcbCompiler::new(CompilerConfig::default().with_channel_capacity(2));
        assert_eq!(narrow.depth_estimate(&dag), 3);
        assert_eq!(wide.depth_estimate(&dag), 2);
    }

    #[test]
    fn test_compile_rejects_bad_config() {
        let dag = DagBuilder::new("empty").build();
        let compiler = QcbCompiler::new(CompilerConfig::default().with_channel_capacity(0));
        let result = compiler.compile(dag, PatchGraph::new(1, 1), StaticMapper::new());
        assert!(matches!(result, Err(QcbError::ConfigError(_))));
    }

    #[test]
    fn test_compile_without_magic_states() {
        let mut builder = DagBuilder::new("row").with_inputs(["a", "b"]);
        builder.add_gate(Instruction::Cnot, ["a", "b"]).unwrap();
        let dag = builder.build();

        let graph = PatchGraph::from_rows(&["Z.X"]).unwrap();
        let mapper = StaticMapper::new()
            .with_binding("a", Coord::new(0, 0))
            .with_binding("b", Coord::new(0, 2));
        let block = QcbCompiler::default().compile(dag, graph, mapper).unwrap();
        assert!(block.remap().is_none());
        assert_eq!(block.n_cycles(), 5);
    }
}
