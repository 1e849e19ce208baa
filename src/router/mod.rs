//! Spatial routing of a scheduled dependency graph
//!
//! The router replays the graph cycle by cycle against a physical layout.
//! Every node moves `Waiting -> Active -> Resolved` exactly once: it waits
//! until its predicates resolve and its patches and route are free, then
//! holds its locks for its full duration.
//!
//! Allocation and routing misses leave a node waiting for the next cycle.
//! Only a layout that cannot change any more (nothing running, nothing
//! admitted) for longer than the configured stall limit is reported as
//! [`QcbError::Unroutable`].

use crate::config::RouterConfig;
use crate::dag::{Boundary, Dag, DagNode, NodeId};
use crate::scheduler::priority_sort;
use crate::topology::{AddressMapper, Allocation, Coord, Cycle, RoutingGraph};
use crate::{QcbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};

/// Lifecycle of a node during routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Queued for placement
    Waiting,
    /// Holding its patches
    Active { remaining: usize },
    /// Finished and released
    Resolved,
}

/// What happened in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: Cycle,
    /// Nodes placed in this cycle
    pub admitted: Vec<NodeId>,
    /// Nodes running during this cycle, admitted ones included
    pub active: Vec<NodeId>,
    /// Nodes that finished at the start of this cycle
    pub resolved: Vec<NodeId>,
}

impl CycleRecord {
    fn new(cycle: Cycle) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    fn is_idle(&self) -> bool {
        self.admitted.is_empty() && self.active.is_empty() && self.resolved.is_empty()
    }
}

/// Physically placed schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutedSchedule {
    /// Per-cycle records, idle cycles removed
    pub cycles: Vec<CycleRecord>,
    /// Patches locked by each node, endpoints and ancillae included
    pub routes: BTreeMap<NodeId, Vec<Coord>>,
}

impl RoutedSchedule {
    /// Number of recorded cycles
    pub fn n_cycles(&self) -> usize {
        self.cycles.len()
    }

    /// Cycle in which a node was placed
    pub fn admitted_at(&self, node: NodeId) -> Option<Cycle> {
        self.cycles
            .iter()
            .find(|record| record.admitted.contains(&node))
            .map(|record| record.cycle)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Cycle-driven router over a layout and an address mapper
#[derive(Debug)]
pub struct Router<'a, G, M> {
    dag: &'a Dag,
    graph: G,
    mapper: M,
    config: RouterConfig,
}

impl<'a, G: RoutingGraph, M: AddressMapper> Router<'a, G, M> {
    /// Create a router
    pub fn new(dag: &'a Dag, graph: G, mapper: M, config: RouterConfig) -> Self {
        Self {
            dag,
            graph,
            mapper,
            config,
        }
    }

    /// Layout
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Mutable layout, for seeding locks before routing
    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Address mapper
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Give back the collaborators
    pub fn into_parts(self) -> (G, M) {
        (self.graph, self.mapper)
    }

    /// Route every live node of the graph
    pub fn route(&mut self) -> Result<RoutedSchedule> {
        let dag = self.dag;
        let mut states: HashMap<NodeId, NodeState> = HashMap::new();
        let mut waiting: Vec<NodeId> = Vec::new();
        let mut active: Vec<NodeId> = Vec::new();
        let mut records: Vec<CycleRecord> = Vec::new();
        let mut routes: BTreeMap<NodeId, Vec<Coord>> = BTreeMap::new();
        let mut idle = 0usize;

        // Factory-fed entries request their factories here
        for node in dag.entry_nodes() {
            enqueue(dag, node.id, &mut states, &mut waiting);
        }

        let mut cycle: Cycle = 0;
        while !waiting.is_empty() || !active.is_empty() {
            let mut record = CycleRecord::new(cycle);

            let mut running = Vec::with_capacity(active.len());
            for id in active.drain(..) {
                let remaining = match states.get(&id) {
                    Some(NodeState::Active { remaining }) => remaining.saturating_sub(1),
                    _ => 0,
                };
                if remaining == 0 {
                    states.insert(id, NodeState::Resolved);
                    record.resolved.push(id);
                } else {
                    states.insert(id, NodeState::Active { remaining });
                    running.push(id);
                }
            }
            active = running;

            for &id in &record.resolved {
                self.release(dag.node(id), routes.get(&id).map(Vec::as_slice).unwrap_or(&[]));
                trace!(node = %id, cycle, "resolved");
            }
            for &id in &record.resolved {
                for (_, antecedent) in dag.node(id).antecedents() {
                    enqueue(dag, *antecedent, &mut states, &mut waiting);
                }
            }

            priority_sort(dag, &mut waiting);
            for &id in &waiting {
                let node = dag.node(id);
                let Some(occupied) = self.place(node, cycle) else {
                    continue;
                };
                let (start, remaining) = self.admit(node, &occupied, cycle);
                for earlier in records.iter_mut().skip(start).take(cycle - start) {
                    earlier.active.push(id);
                }
                states.insert(id, NodeState::Active { remaining });
                active.push(id);
                routes.insert(id, occupied);
                record.admitted.push(id);
            }
            waiting.retain(|id| !record.admitted.contains(id));
            record.active = active.clone();

            if record.admitted.is_empty() && record.resolved.is_empty() && active.is_empty() {
                idle += 1;
                if idle > self.config.stall_limit {
                    warn!(cycle, waiting = waiting.len(), "routing stalled");
                    return Err(QcbError::Unroutable { cycle, waiting });
                }
            } else {
                idle = 0;
            }

            records.push(record);
            cycle += 1;
        }

        let unresolved: Vec<NodeId> = dag
            .nodes()
            .map(|node| node.id)
            .filter(|id| states.get(id) != Some(&NodeState::Resolved))
            .collect();
        if !unresolved.is_empty() {
            warn!(cycle, unresolved = unresolved.len(), "nodes never became ready");
            return Err(QcbError::Unroutable {
                cycle,
                waiting: unresolved,
            });
        }

        records.retain(|record| !record.is_idle());
        debug!(graph = dag.name(), cycles = records.len(), "routing complete");
        Ok(RoutedSchedule {
            cycles: records,
            routes,
        })
    }

    /// Patches a node would lock if placed at `cycle`
    fn place(&mut self, node: &DagNode, cycle: Cycle) -> Option<Vec<Coord>> {
        let addresses = match self.mapper.resolve(node) {
            Allocation::Addresses(addresses) => addresses,
            Allocation::CouldNotAllocate => return None,
        };
        if !addresses.iter().all(|coord| self.graph.probe(*coord, node.id, cycle)) {
            return None;
        }
        if node.non_local() || node.ancillae() > 0 {
            self.find_route(node, &addresses, cycle)
        } else {
            Some(addresses.to_vec())
        }
    }

    /// Lock a placed node, returning its start cycle and remaining duration.
    ///
    /// A factory starts as early as its address became free, but always
    /// keeps at least one cycle to run.
    fn admit(&mut self, node: &DagNode, occupied: &[Coord], cycle: Cycle) -> (Cycle, usize) {
        let duration = node.cycles.max(1);
        let warm = if node.is_factory() {
            let free = self.mapper.first_free_cycle(node);
            (duration - 1).min(cycle.saturating_sub(free))
        } else {
            0
        };
        let start = cycle - warm;

        for coord in occupied {
            self.graph.lock(*coord, node.id, start, duration);
        }
        self.mapper.lock(node, start, duration);
        debug!(node = %node.id, op = %node.instruction, cycle, start, patches = occupied.len(), "admitted");
        (start, duration - warm)
    }

    fn release(&mut self, node: &DagNode, occupied: &[Coord]) {
        for coord in occupied {
            self.graph.unlock(*coord, node.id);
        }
        if node.instruction.releases_extern() {
            self.mapper.free(node);
        }
        if node.instruction.rotates() {
            for coord in occupied {
                self.graph.rotate(*coord);
            }
        }
    }

    /// Chain of patches joining the addresses of `node` in target order,
    /// followed by the ancillae of each address in turn
    pub fn find_route(&self, node: &DagNode, addresses: &[Coord], cycle: Cycle) -> Option<Vec<Coord>> {
        let (&anchor, rest) = addresses.split_first()?;
        let arity = addresses.len();
        let mut chain = vec![anchor];

        let mut from = anchor;
        for (offset, &to) in rest.iter().enumerate() {
            let index = offset + 1;
            let path = self.graph.route(
                from,
                to,
                node.id,
                cycle,
                self.boundary(node, index - 1, from, arity),
                self.boundary(node, index, to, arity),
            )?;
            for coord in path.into_iter().skip(1) {
                if !chain.contains(&coord) {
                    chain.push(coord);
                }
            }
            from = to;
        }

        let count = node.ancillae();
        if count > 0 {
            // Every endpoint gets its own ancillae, clear of the chain so far
            for &address in addresses {
                let spare = self.graph.ancillae(node.id, address, count, cycle, &chain)?;
                chain.extend(spare);
            }
        }
        Some(chain)
    }

    fn boundary(&self, node: &DagNode, index: usize, coord: Coord, arity: usize) -> Boundary {
        if self.graph.is_boundary(coord) {
            self.graph.orientation(coord).unwrap_or(Boundary::Z)
        } else {
            node.instruction.boundary(index, arity)
        }
    }
}

/// Queue `id` once every predicate resolved, pulling in idle factory
/// predicates whose own inputs are ready
fn enqueue(dag: &Dag, id: NodeId, states: &mut HashMap<NodeId, NodeState>, waiting: &mut Vec<NodeId>) {
    if states.contains_key(&id) || dag.node(id).is_retired() {
        return;
    }
    let resolved = |states: &HashMap<NodeId, NodeState>, id: &NodeId| states.get(id) == Some(&NodeState::Resolved);

    let mut ready = true;
    for (_, pred) in dag.node(id).predicates() {
        if resolved(states, pred) {
            continue;
        }
        ready = false;
        let producer = dag.node(*pred);
        if producer.is_factory()
            && !states.contains_key(pred)
            && producer.predicates().iter().all(|(_, p)| resolved(states, p))
        {
            trace!(factory = %pred, consumer = %id, "factory requested");
            states.insert(*pred, NodeState::Waiting);
            waiting.push(*pred);
        }
    }
    if ready {
        states.insert(id, NodeState::Waiting);
        waiting.push(id);
    }
}
