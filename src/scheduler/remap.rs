//! Binding shared magic-state consumption to concrete factory instances
//!
//! Before remapping, every consumer of a magic state points at one shared
//! source per symbol. After a scheduling pass has decided which factory
//! instance served which consumer, each instance becomes its own resource
//! (`T#0`, `T#1`, ...) with a linear chain: a root production node feeds the
//! first consumer, and every later consumer is fed by a refill node that
//! follows the previous consumer.

use crate::dag::{Dag, DagNode, Instruction, NodeId, Symbol};
use crate::scheduler::{Factory, ListScheduler, Traversal};
use crate::{QcbError, Result};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Nodes created by [`remap_magic_states`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemapReport {
    /// Root production node per factory instance
    pub instances: Vec<NodeId>,
    /// Refill nodes chained behind earlier consumers
    pub refills: Vec<NodeId>,
    /// Shared sources detached from the graph
    pub retired: Vec<NodeId>,
    /// Scheduling pass used to pick instances
    pub traversal: Traversal,
}

/// Rewrite shared magic-state edges into per-instance chains
pub fn remap_magic_states(dag: &mut Dag, channel_capacity: usize, factories: &[Factory]) -> Result<RemapReport> {
    let traversal = ListScheduler::new(channel_capacity).schedule(dag, factories)?;
    let mut report = RemapReport::default();
    let mut tails: BTreeMap<Symbol, NodeId> = BTreeMap::new();
    let mut shared_symbols: BTreeSet<Symbol> = BTreeSet::new();

    let order: Vec<NodeId> = traversal.order().collect();
    for consumer in order {
        let Some(bindings) = traversal.bindings.get(&consumer) else {
            continue;
        };

        for binding in bindings {
            let shared = binding.symbol.clone();
            let instance = binding.instance_symbol();
            let source = dag.node(consumer).predicate(&shared).ok_or_else(|| {
                QcbError::internal_error(format!("{} lost its '{}' edge", consumer, shared))
            })?;
            dag.node_mut(source)
                .antecedents
                .retain(|(symbol, node)| !(*symbol == shared && *node == consumer));
            shared_symbols.insert(shared.clone());

            let producer = match tails.get(&instance) {
                None => {
                    let id = dag.next_id();
                    let mut node = DagNode::new(id, Instruction::Init, smallvec![instance.clone()]);
                    node.magic_state = true;
                    node.cycles = binding.period.max(1);
                    dag.register_factory(instance.clone(), id);
                    dag.push_node(node);
                    report.instances.push(id);
                    debug!(instance = %instance, node = %id, "factory instance created");
                    id
                }
                Some(&previous) => {
                    let id = dag.next_id();
                    let mut node = DagNode::new(id, Instruction::Prep, smallvec![instance.clone()]);
                    node.magic_state = true;
                    node.cycles = binding.period.max(1);
                    node.layer = dag.node(previous).layer + 1;
                    node.predicates.push((instance.clone(), previous));
                    dag.push_node(node);
                    dag.node_mut(previous).add_antecedent(instance.clone(), id);
                    report.refills.push(id);
                    debug!(instance = %instance, node = %id, after = %previous, "refill chained");
                    id
                }
            };

            let node = dag.node_mut(consumer);
            for target in node.targets.iter_mut() {
                if *target == shared {
                    *target = instance.clone();
                }
            }
            node.predicates.retain(|(symbol, _)| *symbol != shared);
            node.predicates.push((instance.clone(), producer));
            dag.node_mut(producer).add_antecedent(instance.clone(), consumer);
            tails.insert(instance, consumer);
        }
    }

    for symbol in shared_symbols {
        if let Some(source) = dag.unregister_factory(&symbol) {
            let node = dag.node_mut(source);
            if node.antecedents.is_empty() {
                node.retired = true;
                report.retired.push(source);
            }
        }
    }

    dag.relayer()?;
    report.traversal = traversal;
    Ok(report)
}
