//! Incremental construction of dependency graphs

use crate::dag::{Dag, DagNode, Edges, Instruction, NodeId, ResourceKind, Symbol};
use crate::{QcbError, Result};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::trace;

/// Builds a [`Dag`] one operation at a time.
///
/// The builder tracks the last node to write each exclusive resource; that
/// table is discarded by [`DagBuilder::build`].
#[derive(Debug, Clone)]
pub struct DagBuilder {
    dag: Dag,
    last_writer: HashMap<Symbol, NodeId>,
}

impl DagBuilder {
    /// Create a builder for an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            dag: Dag::empty(name.into()),
            last_writer: HashMap::new(),
        }
    }

    /// Declare input resources, each produced by a layer-0 `INIT` node
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        for input in inputs {
            let symbol = input.into();
            if self.dag.resource_kind(&symbol).is_none() {
                self.push_input(symbol);
            }
        }
        self
    }

    /// Layer-0 `INIT` producing a fresh input resource
    fn push_input(&mut self, symbol: Symbol) {
        let id = self.dag.next_id();
        self.dag.add_input(symbol.clone());
        self.dag.register(symbol.clone(), ResourceKind::Exclusive);
        self.last_writer.insert(symbol.clone(), id);

        let node = DagNode::new(id, Instruction::Init, SmallVec::from_elem(symbol, 1));
        trace!(node = %id, layer = 0, op = %node.instruction, "input added");
        self.dag.push_node(node);
        self.dag.propagate_slack(id);
    }

    /// Add an operation, drawing a magic state if its kind consumes one
    pub fn add_gate<I, S>(&mut self, instruction: Instruction, targets: I) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let magic_state = instruction.magic_state().is_some();
        self.add_node(targets, instruction, magic_state)
    }

    /// Add an operation over `targets`.
    ///
    /// When `magic_state` is set the node also consumes one unit from the
    /// shared factory registered under the instruction's magic state (or its
    /// label), creating that factory source on first use.
    pub fn add_node<I, S>(&mut self, targets: I, instruction: Instruction, magic_state: bool) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let cycles = instruction.cycles();
        self.add_node_with_cycles(targets, instruction, magic_state, cycles)
    }

    /// Add an operation with an explicit duration
    pub fn add_node_with_cycles<I, S>(
        &mut self,
        targets: I,
        instruction: Instruction,
        magic_state: bool,
        cycles: usize,
    ) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut targets: SmallVec<[Symbol; 4]> = targets.into_iter().map(Into::into).collect();
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].contains(target) {
                return Err(QcbError::invalid_graph(format!(
                    "{} targets '{}' more than once",
                    instruction, target
                )));
            }
        }

        let state_symbol = magic_state.then(|| {
            Symbol::from(instruction.magic_state().unwrap_or_else(|| instruction.label()))
        });

        // Resolve every predicate before touching the graph
        let mut predicates = Edges::new();
        let mut fresh = Vec::new();
        for target in &targets {
            match self.dag.resource_kind(target) {
                Some(ResourceKind::MagicState) => {
                    let source = self.dag.factories().get(target).copied().ok_or_else(|| {
                        QcbError::invalid_graph(format!("magic state '{}' has no source", target))
                    })?;
                    predicates.push((target.clone(), source));
                }
                Some(ResourceKind::Exclusive) => {
                    let writer = self.last_writer.get(target).copied().ok_or_else(|| {
                        QcbError::internal_error(format!("'{}' has no recorded writer", target))
                    })?;
                    predicates.push((target.clone(), writer));
                }
                None if instruction.produces() => fresh.push(target.clone()),
                None => return Err(QcbError::unknown_resource(target.as_str(), instruction.label())),
            }
        }

        if let Some(symbol) = state_symbol {
            if !targets.contains(&symbol) {
                if self.dag.resource_kind(&symbol) == Some(ResourceKind::Exclusive) {
                    return Err(QcbError::invalid_graph(format!(
                        "magic state '{}' collides with an exclusive resource",
                        symbol
                    )));
                }
                let source = self.factory_source(&symbol);
                predicates.push((symbol.clone(), source));
                targets.push(symbol);
            }
        }

        for symbol in fresh {
            self.dag.register(symbol, ResourceKind::Exclusive);
        }

        let id = self.dag.next_id();
        let mut node = DagNode::new(id, instruction, targets);
        node.cycles = cycles.max(1);
        node.layer = predicates
            .iter()
            .map(|(_, pred)| self.dag.node(*pred).layer + 1)
            .max()
            .unwrap_or(0);
        node.predicates = predicates;

        for target in &node.targets {
            if self.dag.resource_kind(target) == Some(ResourceKind::Exclusive) {
                self.last_writer.insert(target.clone(), id);
            }
        }
        for (symbol, pred) in node.predicates.clone() {
            self.dag.node_mut(pred).add_antecedent(symbol, id);
        }

        trace!(node = %id, layer = node.layer, op = %node.instruction, "node added");
        self.dag.push_node(node);
        self.dag.propagate_slack(id);
        Ok(id)
    }

    /// Shared source node for a magic-state symbol
    fn factory_source(&mut self, symbol: &Symbol) -> NodeId {
        if let Some(id) = self.dag.factories().get(symbol) {
            return *id;
        }
        let id = self.dag.next_id();
        let mut node = DagNode::new(id, Instruction::Init, SmallVec::from_elem(symbol.clone(), 1));
        node.magic_state = true;
        self.dag.register_factory(symbol.clone(), id);
        self.dag.push_node(node);
        id
    }

    /// Graph built so far
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Finish construction
    pub fn build(self) -> Dag {
        self.dag
    }
}
