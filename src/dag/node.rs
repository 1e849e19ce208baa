//! Dependency graph nodes

use crate::dag::{Instruction, Symbol};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Stable arena index of a node, also its construction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Get the arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Edge list keyed by the resource each edge carries
pub type Edges = SmallVec<[(Symbol, NodeId); 4]>;

/// An operation in the dependency graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    /// Arena id
    pub id: NodeId,
    /// Operation kind
    pub instruction: Instruction,
    /// Ordered target resources
    pub targets: SmallVec<[Symbol; 4]>,
    /// Duration in cycles
    pub cycles: usize,
    /// Whether this node represents a shared production resource
    pub magic_state: bool,
    /// Topological layer
    pub layer: usize,
    /// Scheduling urgency, larger is more urgent
    pub slack: f64,
    /// Producer per resource this node reads
    pub(crate) predicates: Edges,
    /// Consumers of this node's output
    pub(crate) antecedents: Edges,
    /// Detached by the magic-state remapper
    pub(crate) retired: bool,
}

impl DagNode {
    pub(crate) fn new(id: NodeId, instruction: Instruction, targets: SmallVec<[Symbol; 4]>) -> Self {
        let cycles = instruction.cycles();
        Self {
            id,
            instruction,
            targets,
            cycles,
            magic_state: false,
            layer: 0,
            slack: 0.0,
            predicates: Edges::new(),
            antecedents: Edges::new(),
            retired: false,
        }
    }

    /// True iff the node touches more than one resource
    pub fn non_local(&self) -> bool {
        self.targets.len() > 1
    }

    /// True iff the node is a magic-state production node
    pub fn is_factory(&self) -> bool {
        self.magic_state
    }

    /// Whether the remapper detached this node from the graph
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Producer edges, one per resource read
    pub fn predicates(&self) -> &[(Symbol, NodeId)] {
        &self.predicates
    }

    /// Consumer edges
    pub fn antecedents(&self) -> &[(Symbol, NodeId)] {
        &self.antecedents
    }

    /// Producer of a given resource
    pub fn predicate(&self, symbol: &Symbol) -> Option<NodeId> {
        self.predicates
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, id)| *id)
    }

    /// Number of ancilla patches required per target
    pub fn ancillae(&self) -> usize {
        self.instruction.ancillae()
    }

    /// Whether the node targets a resource
    pub fn touches(&self, symbol: &Symbol) -> bool {
        self.targets.contains(symbol)
    }

    pub(crate) fn add_antecedent(&mut self, symbol: Symbol, node: NodeId) {
        if !self.antecedents.iter().any(|(s, n)| *s == symbol && *n == node) {
            self.antecedents.push((symbol, node));
        }
    }
}

impl fmt::Display for DagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[", self.instruction)?;
        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", target)?;
        }
        f.write_str("]")
    }
}
