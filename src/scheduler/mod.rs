//! Resource-constrained list scheduling
//!
//! A greedy, cycle-by-cycle admission pass over the dependency graph. Each
//! cycle admits ready nodes in slack order, bounded by the routing channel
//! capacity for non-local nodes and by the output of the magic-state
//! factories.

pub mod factory;
pub mod remap;

pub use factory::*;
pub use remap::*;

use crate::dag::{Dag, NodeId, Symbol};
use crate::{QcbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace, warn};

/// Result of one scheduling pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Traversal {
    /// Number of cycles used
    pub cycles: usize,
    /// Nodes admitted in each cycle, in admission order
    pub layers: Vec<Vec<NodeId>>,
    /// Factory instances that served each magic-state consumer
    pub bindings: BTreeMap<NodeId, Vec<FactoryBinding>>,
}

impl Traversal {
    /// Cycle in which a node was admitted
    pub fn cycle_of(&self, node: NodeId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.contains(&node))
    }

    /// Every admitted node, in schedule order
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.layers.iter().flatten().copied()
    }
}

/// Sort nodes by slack descending, breaking ties by construction order
pub(crate) fn priority_sort(dag: &Dag, nodes: &mut [NodeId]) {
    nodes.sort_by(|a, b| {
        dag.node(*b)
            .slack
            .partial_cmp(&dag.node(*a).slack)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });
}

/// Greedy list scheduler
#[derive(Debug, Clone)]
pub struct ListScheduler {
    channel_capacity: usize,
}

impl ListScheduler {
    /// Create a scheduler admitting at most `channel_capacity` non-local
    /// nodes per cycle
    pub fn new(channel_capacity: usize) -> Self {
        Self { channel_capacity }
    }

    /// Channel capacity
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Schedule every operation of `dag`.
    ///
    /// All simulation state is local to the call, so repeated calls on the
    /// same graph return identical results.
    pub fn schedule(&self, dag: &Dag, factories: &[Factory]) -> Result<Traversal> {
        let mut pool = FactoryPool::new(factories);
        self.validate(dag, &pool)?;

        let mut traversal = Traversal::default();
        let mut resolved: HashSet<NodeId> = HashSet::new();
        let mut candidates: Vec<NodeId> = dag.entry_nodes().map(|node| node.id).collect();

        while !candidates.is_empty() {
            let cycle = traversal.layers.len();
            let mut admitted = Vec::new();
            let mut claimed: HashSet<&Symbol> = HashSet::new();
            let mut non_local = 0usize;

            priority_sort(dag, &mut candidates);

            for &id in &candidates {
                if resolved.contains(&id) {
                    continue;
                }
                let node = dag.node(id);
                if node.non_local() && non_local >= self.channel_capacity {
                    continue;
                }

                let mut ready = true;
                let mut consumes: Vec<&Symbol> = Vec::new();
                for (symbol, pred) in node.predicates() {
                    if dag.node(*pred).is_factory() && dag.is_magic_state(symbol) {
                        if pool.inventory(symbol) == 0 {
                            ready = false;
                            break;
                        }
                        consumes.push(symbol);
                    } else if !resolved.contains(pred) || claimed.contains(symbol) {
                        ready = false;
                        break;
                    }
                }
                if !ready {
                    continue;
                }

                resolved.insert(id);
                admitted.push(id);
                for target in &node.targets {
                    if !dag.is_magic_state(target) {
                        claimed.insert(target);
                    }
                }
                if node.non_local() {
                    non_local += 1;
                }

                for symbol in consumes {
                    let binding = pool.consume(symbol).ok_or_else(|| {
                        QcbError::internal_error(format!("inventory of '{}' vanished", symbol))
                    })?;
                    trace!(node = %id, cycle, instance = binding.instance, state = %symbol, "magic state consumed");
                    traversal.bindings.entry(id).or_default().push(binding);
                }
            }

            // With nothing admitted and every factory full, no later cycle can differ
            let stalled = admitted.is_empty() && pool.saturated();
            pool.advance();

            if stalled {
                let pending: Vec<NodeId> = candidates.iter().copied().filter(|id| !resolved.contains(id)).collect();
                warn!(cycle, pending = pending.len(), "scheduler stalled");
                return Err(QcbError::Stalled { cycle, pending });
            }

            // Unresolved candidates retry next cycle, followed by the
            // consumers of everything admitted now
            let mut next: Vec<NodeId> = candidates.iter().copied().filter(|id| !resolved.contains(id)).collect();
            let mut queued: HashSet<NodeId> = next.iter().copied().collect();
            for id in &admitted {
                for (_, antecedent) in dag.node(*id).antecedents() {
                    if !resolved.contains(antecedent) && queued.insert(*antecedent) {
                        next.push(*antecedent);
                    }
                }
            }
            candidates = next;
            traversal.layers.push(admitted);
        }

        traversal.cycles = traversal.layers.len();
        debug!(graph = dag.name(), cycles = traversal.cycles, "schedule complete");
        Ok(traversal)
    }

    fn validate(&self, dag: &Dag, pool: &FactoryPool) -> Result<()> {
        for node in dag.nodes() {
            for symbol in dag.consumed_magic_states(node) {
                if !pool.produces(symbol) {
                    return Err(QcbError::missing_factory(symbol.as_str()));
                }
            }
        }
        Ok(())
    }
}
