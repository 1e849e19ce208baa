//! Resource to patch address resolution

use crate::dag::{DagNode, NodeId, Symbol};
use crate::topology::{Coord, Cycle};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Outcome of an address request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// One coordinate per target, in target order
    Addresses(SmallVec<[Coord; 4]>),
    /// No address is available this cycle; the caller retries later
    CouldNotAllocate,
}

/// Maps the resources a node touches to physical patches
pub trait AddressMapper {
    /// Addresses of every target of `node`
    fn resolve(&mut self, node: &DagNode) -> Allocation;

    /// Commit the allocations of `node` for `duration` cycles from `cycle`
    fn lock(&mut self, node: &DagNode, cycle: Cycle, duration: usize);

    /// Release extern allocations held through the targets of `node`
    fn free(&mut self, node: &DagNode);

    /// Earliest cycle at which every address of `node` was last released
    fn first_free_cycle(&self, node: &DagNode) -> Cycle;
}

/// Fixed bindings plus a pool of extern slots for unbound symbols.
///
/// An unbound symbol takes the first extern slot no other symbol holds.
/// The choice stays pending until [`AddressMapper::lock`] commits it, and a
/// committed slot is returned to the pool by [`AddressMapper::free`].
#[derive(Debug, Clone, Default)]
pub struct StaticMapper {
    bindings: BTreeMap<Symbol, Coord>,
    extern_slots: Vec<Coord>,
    held: BTreeMap<Symbol, Coord>,
    pending: HashMap<NodeId, Vec<(Symbol, Coord)>>,
    busy_until: BTreeMap<Coord, Cycle>,
}

impl StaticMapper {
    /// Create a mapper with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a symbol to a coordinate
    pub fn bind(&mut self, symbol: impl Into<Symbol>, coord: Coord) -> &mut Self {
        self.bindings.insert(symbol.into(), coord);
        self
    }

    /// Builder form of [`StaticMapper::bind`]
    pub fn with_binding(mut self, symbol: impl Into<Symbol>, coord: Coord) -> Self {
        self.bind(symbol, coord);
        self
    }

    /// Add slots for symbols without a fixed binding
    pub fn with_extern_slots<I: IntoIterator<Item = Coord>>(mut self, slots: I) -> Self {
        self.extern_slots.extend(slots);
        self
    }

    /// Fixed coordinate of a symbol, if any
    pub fn binding(&self, symbol: &Symbol) -> Option<Coord> {
        self.bindings.get(symbol).copied()
    }

    /// Extern slot currently held by a symbol
    pub fn held(&self, symbol: &Symbol) -> Option<Coord> {
        self.held.get(symbol).copied()
    }

    fn address(&self, symbol: &Symbol) -> Option<Coord> {
        self.binding(symbol).or_else(|| self.held(symbol))
    }

    fn free_slot(&self, taken: &[(Symbol, Coord)]) -> Option<Coord> {
        self.extern_slots.iter().copied().find(|slot| {
            !self.held.values().any(|held| held == slot) && !taken.iter().any(|(_, coord)| coord == slot)
        })
    }
}

impl AddressMapper for StaticMapper {
    fn resolve(&mut self, node: &DagNode) -> Allocation {
        let mut addresses = SmallVec::new();
        let mut pending: Vec<(Symbol, Coord)> = Vec::new();

        for target in &node.targets {
            if let Some(coord) = self.address(target) {
                addresses.push(coord);
                continue;
            }
            match self.free_slot(&pending) {
                Some(slot) => {
                    pending.push((target.clone(), slot));
                    addresses.push(slot);
                }
                None => {
                    trace!(node = %node.id, symbol = %target, "no address available");
                    self.pending.remove(&node.id);
                    return Allocation::CouldNotAllocate;
                }
            }
        }

        if pending.is_empty() {
            self.pending.remove(&node.id);
        } else {
            self.pending.insert(node.id, pending);
        }
        Allocation::Addresses(addresses)
    }

    fn lock(&mut self, node: &DagNode, cycle: Cycle, duration: usize) {
        if let Some(pending) = self.pending.remove(&node.id) {
            for (symbol, slot) in pending {
                debug!(node = %node.id, symbol = %symbol, row = slot.row, col = slot.col, "extern slot taken");
                self.held.insert(symbol, slot);
            }
        }
        let until = cycle + duration;
        for target in &node.targets {
            if let Some(coord) = self.address(target) {
                let busy = self.busy_until.entry(coord).or_insert(0);
                *busy = (*busy).max(until);
            }
        }
    }

    fn free(&mut self, node: &DagNode) {
        for target in &node.targets {
            if let Some(slot) = self.held.remove(target) {
                debug!(node = %node.id, symbol = %target, row = slot.row, col = slot.col, "extern slot released");
            }
        }
    }

    fn first_free_cycle(&self, node: &DagNode) -> Cycle {
        node.targets
            .iter()
            .filter_map(|target| self.address(target))
            .filter_map(|coord| self.busy_until.get(&coord).copied())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DagBuilder, Instruction};

    #[test]
    fn test_static_bindings_resolve_in_target_order() {
        let mut builder = DagBuilder::new("m").with_inputs(["a", "b"]);
        let cnot = builder.add_gate(Instruction::Cnot, ["b", "a"]).unwrap();
        let dag = builder.build();

        let mut mapper = StaticMapper::new()
            .with_binding("a", Coord::new(0, 0))
            .with_binding("b", Coord::new(0, 2));
        let allocation = mapper.resolve(dag.node(cnot));
        assert_eq!(
            allocation,
            Allocation::Addresses(SmallVec::from_vec(vec![Coord::new(0, 2), Coord::new(0, 0)]))
        );
    }

    #[test]
    fn test_extern_slot_lifecycle() {
        let mut builder = DagBuilder::new("ext");
        let first = builder.add_gate(Instruction::Init, ["m"]).unwrap();
        let reset = builder.add_gate(Instruction::Reset, ["m"]).unwrap();
        let other = builder.add_gate(Instruction::Init, ["n"]).unwrap();
        let dag = builder.build();

        let slot = Coord::new(2, 2);
        let mut mapper = StaticMapper::new().with_extern_slots([slot]);

        assert!(matches!(mapper.resolve(dag.node(first)), Allocation::Addresses(_)));
        mapper.lock(dag.node(first), 0, 1);
        assert_eq!(mapper.held(&Symbol::from("m")), Some(slot));
        assert_eq!(mapper.first_free_cycle(dag.node(first)), 1);

        // The only slot is taken
        assert_eq!(mapper.resolve(dag.node(other)), Allocation::CouldNotAllocate);

        mapper.free(dag.node(reset));
        assert_eq!(mapper.held(&Symbol::from("m")), None);
        assert!(matches!(mapper.resolve(dag.node(other)), Allocation::Addresses(_)));
    }

    #[test]
    fn test_unused_address_is_free_from_zero() {
        let mut builder = DagBuilder::new("idle").with_inputs(["a"]);
        let x = builder.add_gate(Instruction::X, ["a"]).unwrap();
        let dag = builder.build();

        let mapper = StaticMapper::new().with_binding("a", Coord::new(0, 0));
        assert_eq!(mapper.first_free_cycle(dag.node(x)), 0);
    }
}
