//! Dependency graph of a quantum program
//!
//! Operations live in an arena addressed by [`NodeId`]. Producer/consumer
//! edges are stored on each node keyed by the resource they carry, and nodes
//! are bucketed into topological layers as they are added. The graph is
//! built through [`DagBuilder`], which owns the last-writer table used to
//! resolve dependencies; once built the structure is only changed by the
//! magic-state remapper.

pub mod builder;
pub mod instruction;
pub mod node;

pub use builder::*;
pub use instruction::*;
pub use node::*;

use crate::scheduler::Factory;
use crate::{QcbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Resource identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Create a new symbol
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Symbol name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&Symbol> for Symbol {
    fn from(symbol: &Symbol) -> Self {
        symbol.clone()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a resource is shared between operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// One writer at a time
    Exclusive,
    /// Fungible magic state, any producer instance satisfies any consumer
    MagicState,
}

/// Nodes sharing a layer number
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    /// Nodes in construction order
    pub nodes: Vec<NodeId>,
    /// Number of non-local nodes
    pub congestion: usize,
    /// Nodes drawing on a magic-state factory
    pub magic_state_consumers: Vec<NodeId>,
}

/// Layered dependency graph
#[derive(Debug, Clone)]
pub struct Dag {
    name: String,
    nodes: Vec<DagNode>,
    layers: Vec<Layer>,
    resources: BTreeMap<Symbol, ResourceKind>,
    factories: BTreeMap<Symbol, NodeId>,
    inputs: Vec<Symbol>,
}

impl Dag {
    pub(crate) fn empty(name: String) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            layers: Vec::new(),
            resources: BTreeMap::new(),
            factories: BTreeMap::new(),
            inputs: Vec::new(),
        }
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a node.
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn node(&self, id: NodeId) -> &DagNode {
        &self.nodes[id.0]
    }

    /// Look up a node, returning `None` for foreign ids
    pub fn get(&self, id: NodeId) -> Option<&DagNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DagNode {
        &mut self.nodes[id.0]
    }

    /// All live nodes in construction order
    pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter().filter(|node| !node.retired)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Whether the graph has no live nodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Topological layers
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// A single layer
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Number of layers
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Live operations that wait on no other operation: every predicate,
    /// if there is one, is a factory source
    pub fn entry_nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes().filter(move |node| {
            !node.is_factory()
                && node
                    .predicates
                    .iter()
                    .all(|(_, pred)| self.node(*pred).is_factory())
        })
    }

    /// Shared magic-state source node per symbol
    pub fn factories(&self) -> &BTreeMap<Symbol, NodeId> {
        &self.factories
    }

    /// Declared inputs
    pub fn inputs(&self) -> &[Symbol] {
        &self.inputs
    }

    /// Kind of a known resource
    pub fn resource_kind(&self, symbol: &Symbol) -> Option<ResourceKind> {
        self.resources.get(symbol).copied()
    }

    /// Whether a symbol names a fungible magic state
    pub fn is_magic_state(&self, symbol: &Symbol) -> bool {
        self.resource_kind(symbol) == Some(ResourceKind::MagicState)
    }

    /// Magic-state symbols consumed by a node
    pub fn consumed_magic_states<'a>(&'a self, node: &'a DagNode) -> impl Iterator<Item = &'a Symbol> + 'a {
        node.predicates
            .iter()
            .filter(move |(symbol, pred)| self.is_magic_state(symbol) && self.node(*pred).magic_state)
            .map(|(symbol, _)| symbol)
    }

    /// Lower-bound depth estimate for a given channel budget.
    ///
    /// Each layer costs one cycle plus one for every non-local node that
    /// does not fit in the channel.
    pub fn depth_parallel(&self, channel_capacity: usize) -> usize {
        self.layers
            .iter()
            .map(|layer| (1 + layer.congestion).saturating_sub(channel_capacity).max(1))
            .sum()
    }

    /// Cycles needed to feed every magic-state consumer, routing ignored.
    ///
    /// Consumers queue up at the cycle matching their layer and each draw is
    /// served by the fastest factory of its state holding a finished unit.
    /// A `blocking` factory idles once it holds one unit; otherwise it keeps
    /// stockpiling and may serve a burst of draws in one cycle.
    pub fn depth_factories(&self, factories: &[Factory], blocking: bool) -> Result<usize> {
        // (period, progress) per factory, fastest first
        let mut lines: BTreeMap<&Symbol, Vec<(usize, usize)>> = BTreeMap::new();
        for factory in factories {
            lines.entry(&factory.symbol).or_default().push((factory.period, 0));
        }
        for line in lines.values_mut() {
            line.sort_by_key(|(period, _)| *period);
        }
        for node in self.nodes() {
            if let Some(symbol) = self.consumed_magic_states(node).find(|s| !lines.contains_key(s)) {
                return Err(QcbError::missing_factory(symbol.as_str()));
            }
        }

        let mut pending: Vec<&Symbol> = Vec::new();
        let mut cycles = 0;
        while cycles < self.layers.len() || !pending.is_empty() {
            if let Some(layer) = self.layers.get(cycles) {
                for id in &layer.magic_state_consumers {
                    pending.extend(self.consumed_magic_states(self.node(*id)));
                }
            }

            pending.retain(|symbol| {
                let ready = lines
                    .get_mut(symbol)
                    .and_then(|line| line.iter_mut().find(|(period, progress)| progress >= period));
                match ready {
                    Some((period, progress)) => {
                        *progress -= *period;
                        false
                    }
                    None => true,
                }
            });

            for line in lines.values_mut() {
                for (period, progress) in line.iter_mut() {
                    if !blocking || *progress < *period {
                        *progress += 1;
                    }
                }
            }
            cycles += 1;
        }
        Ok(cycles)
    }

    /// Count how often pairs of resources take part in concurrent non-local
    /// operations within the same layer.
    pub fn interaction_counts(&self) -> BTreeMap<(Symbol, Symbol), usize> {
        let mut counts = BTreeMap::new();
        for layer in &self.layers {
            let non_local: Vec<&DagNode> = layer
                .nodes
                .iter()
                .map(|id| self.node(*id))
                .filter(|node| node.non_local())
                .collect();

            for node in &non_local {
                for other in &non_local {
                    if node.id == other.id {
                        continue;
                    }
                    for target in &node.targets {
                        for other_target in &other.targets {
                            *counts
                                .entry((target.clone(), other_target.clone()))
                                .or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        counts
    }

    pub(crate) fn register(&mut self, symbol: Symbol, kind: ResourceKind) {
        self.resources.insert(symbol, kind);
    }

    pub(crate) fn register_factory(&mut self, symbol: Symbol, node: NodeId) {
        self.resources.insert(symbol.clone(), ResourceKind::MagicState);
        self.factories.insert(symbol, node);
    }

    pub(crate) fn unregister_factory(&mut self, symbol: &Symbol) -> Option<NodeId> {
        self.factories.remove(symbol)
    }

    pub(crate) fn add_input(&mut self, symbol: Symbol) {
        self.inputs.push(symbol);
    }

    pub(crate) fn push_node(&mut self, node: DagNode) -> NodeId {
        let id = node.id;
        debug_assert_eq!(id.0, self.nodes.len());
        self.nodes.push(node);
        self.place(id);
        id
    }

    /// Next id to be issued
    pub(crate) fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    fn place(&mut self, id: NodeId) {
        let (layer_num, non_local, consumes) = {
            let node = &self.nodes[id.0];
            let consumes = node
                .predicates
                .iter()
                .any(|(_, pred)| self.nodes[pred.0].magic_state);
            (node.layer, node.non_local(), consumes)
        };

        if layer_num >= self.layers.len() {
            self.layers.resize_with(layer_num + 1, Layer::default);
        }
        let layer = &mut self.layers[layer_num];
        layer.nodes.push(id);
        layer.congestion += non_local as usize;
        if consumes {
            layer.magic_state_consumers.push(id);
        }
    }

    /// Raise every predicate's slack to reflect the layer gap to `id`
    pub(crate) fn propagate_slack(&mut self, id: NodeId) {
        let layer = self.nodes[id.0].layer;
        let predicates: Vec<NodeId> = self.nodes[id.0].predicates.iter().map(|(_, p)| *p).collect();
        for pred in predicates {
            let node = &mut self.nodes[pred.0];
            let gap = layer.saturating_sub(node.layer).max(1);
            node.slack = node.slack.max(1.0 / gap as f64);
        }
    }

    /// Recompute layers, congestion and slack for the live nodes.
    ///
    /// Used after structural rewrites. Slack only ever increases.
    pub fn relayer(&mut self) -> Result<()> {
        let live: Vec<NodeId> = self.nodes().map(|node| node.id).collect();
        let mut indegree = vec![0usize; self.nodes.len()];
        for id in &live {
            indegree[id.0] = self.nodes[id.0].predicates.len();
        }

        let mut queue: VecDeque<NodeId> = live.iter().copied().filter(|id| indegree[id.0] == 0).collect();
        let mut order = Vec::with_capacity(live.len());

        while let Some(id) = queue.pop_front() {
            let layer = self.nodes[id.0]
                .predicates
                .iter()
                .map(|(_, pred)| self.nodes[pred.0].layer + 1)
                .max()
                .unwrap_or(0);
            self.nodes[id.0].layer = layer;
            order.push(id);

            let antecedents: Vec<NodeId> = self.nodes[id.0].antecedents.iter().map(|(_, a)| *a).collect();
            for next in antecedents {
                if self.nodes[next.0].retired {
                    continue;
                }
                indegree[next.0] = indegree[next.0].saturating_sub(1);
                if indegree[next.0] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != live.len() {
            return Err(QcbError::invalid_graph(format!(
                "dependency cycle among {} nodes in {}",
                live.len() - order.len(),
                self.name
            )));
        }

        order.sort();
        self.layers.clear();
        for id in order {
            self.place(id);
            self.propagate_slack(id);
        }
        Ok(())
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} nodes, {} layers)", self.name, self.len(), self.depth())?;
        for (i, layer) in self.layers.iter().enumerate() {
            write!(f, "  {}:", i)?;
            for id in &layer.nodes {
                write!(f, " {}", self.node(*id))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Dag {
        let mut builder = DagBuilder::new("chain").with_inputs(["a", "b", "c"]);
        builder.add_gate(Instruction::Cnot, ["a", "b"]).unwrap();
        builder.add_gate(Instruction::Cnot, ["b", "c"]).unwrap();
        builder.add_gate(Instruction::Hadamard, ["a"]).unwrap();
        builder.build()
    }

    #[test]
    fn test_layers_follow_predicates() {
        let dag = chain();
        for node in dag.nodes() {
            let expected = node
                .predicates()
                .iter()
                .map(|(_, p)| dag.node(*p).layer + 1)
                .max()
                .unwrap_or(0);
            assert_eq!(node.layer, expected, "{}", node);
        }
        assert_eq!(dag.depth(), 3);
    }

    #[test]
    fn test_depth_parallel() {
        let mut builder = DagBuilder::new("wide").with_inputs(["a", "b", "c", "d"]);
        builder.add_gate(Instruction::Cnot, ["a", "b"]).unwrap();
        builder.add_gate(Instruction::Cnot, ["c", "d"]).unwrap();
        let dag = builder.build();

        // Layer 0 holds the inputs, layer 1 both CNOTs
        assert_eq!(dag.layer(1).unwrap().congestion, 2);
        assert_eq!(dag.depth_parallel(2), 2);
        assert_eq!(dag.depth_parallel(1), 3);
    }

    #[test]
    fn test_interaction_counts() {
        let mut builder = DagBuilder::new("wide").with_inputs(["a", "b", "c", "d"]);
        builder.add_gate(Instruction::Cnot, ["a", "b"]).unwrap();
        builder.add_gate(Instruction::Cnot, ["c", "d"]).unwrap();
        let counts = builder.build().interaction_counts();

        assert_eq!(counts.get(&(Symbol::from("a"), Symbol::from("c"))), Some(&1));
        assert_eq!(counts.get(&(Symbol::from("d"), Symbol::from("b"))), Some(&1));
        assert_eq!(counts.get(&(Symbol::from("a"), Symbol::from("b"))), None);
    }

    #[test]
    fn test_depth_factories_blocking_and_stockpiling() {
        let mut builder = DagBuilder::new("late").with_inputs(["a", "b"]);
        for _ in 0..3 {
            builder.add_gate(Instruction::X, ["a"]).unwrap();
            builder.add_gate(Instruction::X, ["b"]).unwrap();
        }
        builder.add_gate(Instruction::T, ["a"]).unwrap();
        builder.add_gate(Instruction::T, ["b"]).unwrap();
        let dag = builder.build();
        let factories = [Factory::new("T", 1)];

        // Both draws land in layer 4; a blocking factory holds a single unit
        assert_eq!(dag.depth_factories(&factories, true).unwrap(), 6);
        assert_eq!(dag.depth_factories(&factories, false).unwrap(), 5);
        assert_eq!(dag.depth_factories(&[], true), Err(QcbError::missing_factory("T")));
    }

    #[test]
    fn test_entry_nodes_include_factory_fed_operations() {
        let mut builder = DagBuilder::new("entry").with_inputs(["a"]);
        builder.add_gate(Instruction::T, ["a"]).unwrap();
        let lone = builder.add_gate(Instruction::T, Vec::<Symbol>::new()).unwrap();
        let dag = builder.build();

        let entries: Vec<NodeId> = dag.entry_nodes().map(|node| node.id).collect();
        assert_eq!(entries, vec![NodeId(0), lone]);
        assert_eq!(dag.node(lone).layer, 1);
    }

    #[test]
    fn test_relayer_is_stable() {
        let mut dag = chain();
        let before: Vec<usize> = dag.nodes().map(|n| n.layer).collect();
        dag.relayer().unwrap();
        let after: Vec<usize> = dag.nodes().map(|n| n.layer).collect();
        assert_eq!(before, after);
    }
}
