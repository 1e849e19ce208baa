//! Grid of surface-code patches backed by a petgraph adjacency graph

use crate::dag::{Boundary, NodeId};
use crate::topology::{Axis, Coord, Cycle, Patch, PatchKind, PatchLock, RoutingGraph};
use crate::{QcbError, Result};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::trace;

/// Rectangular patch layout.
///
/// Every usable patch is a graph node; edges join orthogonal neighbours and
/// carry the [`Axis`] of the shared side. Blocked patches have no edges.
#[derive(Debug, Clone)]
pub struct PatchGraph {
    graph: UnGraph<Patch, Axis>,
    index: HashMap<Coord, NodeIndex>,
    rows: usize,
    cols: usize,
}

impl PatchGraph {
    /// Create a grid made only of routing patches
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut graph = Self {
            graph: UnGraph::new_undirected(),
            index: HashMap::new(),
            rows,
            cols,
        };
        for row in 0..rows {
            for col in 0..cols {
                graph.insert(Patch::new(Coord::new(row, col), PatchKind::Route, Boundary::Z));
            }
        }
        graph.connect();
        graph
    }

    /// Parse a layout from text rows.
    ///
    /// `Z` and `X` are registers with that horizontal boundary, `.` is a
    /// routing patch, `#` is blocked, `E` is an extern interface and a
    /// lowercase `e`/`x` pair marks externs exposing `Z`/`X` respectively.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let cols = rows.first().map_or(0, |row| row.as_ref().chars().count());
        let mut graph = Self {
            graph: UnGraph::new_undirected(),
            index: HashMap::new(),
            rows: rows.len(),
            cols,
        };

        for (r, line) in rows.iter().enumerate() {
            let line = line.as_ref();
            if line.chars().count() != cols {
                return Err(QcbError::config_error(format!(
                    "layout row {} has {} patches, expected {}",
                    r,
                    line.chars().count(),
                    cols
                )));
            }
            for (c, ch) in line.chars().enumerate() {
                let coord = Coord::new(r, c);
                let (kind, orientation) = match ch {
                    'Z' => (PatchKind::Register, Boundary::Z),
                    'X' => (PatchKind::Register, Boundary::X),
                    '.' => (PatchKind::Route, Boundary::Z),
                    '#' => (PatchKind::Blocked, Boundary::Z),
                    'E' | 'e' => (PatchKind::Extern, Boundary::Z),
                    'x' => (PatchKind::Extern, Boundary::X),
                    other => {
                        return Err(QcbError::config_error(format!(
                            "unknown patch '{}' at {},{}",
                            other, r, c
                        )))
                    }
                };
                graph.insert(Patch::new(coord, kind, orientation));
            }
        }

        graph.connect();
        Ok(graph)
    }

    fn insert(&mut self, patch: Patch) {
        let coord = patch.coord;
        let node = self.graph.add_node(patch);
        self.index.insert(coord, node);
    }

    fn connect(&mut self) {
        self.graph.clear_edges();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let here = Coord::new(row, col);
                for (there, axis) in [(Coord::new(row, col + 1), Axis::Horizontal), (Coord::new(row + 1, col), Axis::Vertical)] {
                    let (Some(&a), Some(&b)) = (self.index.get(&here), self.index.get(&there)) else {
                        continue;
                    };
                    if self.graph[a].kind != PatchKind::Blocked && self.graph[b].kind != PatchKind::Blocked {
                        self.graph.add_edge(a, b, axis);
                    }
                }
            }
        }
    }

    /// Replace the role of one patch
    pub fn set_patch(&mut self, coord: Coord, kind: PatchKind, orientation: Boundary) -> Result<()> {
        let node = *self
            .index
            .get(&coord)
            .ok_or_else(|| QcbError::config_error(format!("no patch at {},{}", coord.row, coord.col)))?;
        let patch = &mut self.graph[node];
        patch.kind = kind;
        patch.orientation = orientation;
        self.connect();
        Ok(())
    }

    /// Grid dimensions as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Every patch in row-major order
    pub fn patches(&self) -> impl Iterator<Item = &Patch> {
        self.graph.node_weights()
    }

    /// Coordinates of every patch of a given kind, row-major
    pub fn coords_of(&self, kind: PatchKind) -> Vec<Coord> {
        self.patches().filter(|patch| patch.kind == kind).map(|patch| patch.coord).collect()
    }

    /// Coordinates currently locked by `node`
    pub fn locked_by(&self, node: NodeId) -> Vec<Coord> {
        self.patches()
            .filter(|patch| patch.lock.map_or(false, |lock| lock.node == node))
            .map(|patch| patch.coord)
            .collect()
    }

    /// Orthogonal neighbours in a fixed order
    fn adjacent(&self, coord: Coord) -> SmallVec<[(Coord, Axis); 4]> {
        let Some(&node) = self.index.get(&coord) else {
            return SmallVec::new();
        };
        let mut neighbours: SmallVec<[(Coord, Axis); 4]> = self
            .graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node { edge.target() } else { edge.source() };
                (self.graph[other].coord, *edge.weight())
            })
            .collect();
        neighbours.sort_by_key(|(coord, _)| *coord);
        neighbours
    }

    fn routable(&self, coord: Coord, node: NodeId, cycle: Cycle) -> bool {
        self.patch(coord)
            .map_or(false, |patch| patch.kind == PatchKind::Route && patch.is_free(node, cycle))
    }

    fn exposes(&self, coord: Coord, axis: Axis) -> Option<Boundary> {
        self.patch(coord).and_then(|patch| patch.exposes(axis))
    }
}

impl RoutingGraph for PatchGraph {
    fn patch(&self, coord: Coord) -> Option<&Patch> {
        self.index.get(&coord).map(|node| &self.graph[*node])
    }

    fn lock(&mut self, coord: Coord, node: NodeId, cycle: Cycle, duration: usize) {
        let Some(&index) = self.index.get(&coord) else {
            return;
        };
        let until = cycle + duration;
        let patch = &mut self.graph[index];
        patch.lock = Some(PatchLock {
            node,
            locked_at: cycle,
            until,
        });
        patch.last_used = patch.last_used.max(until);
        trace!(node = %node, row = coord.row, col = coord.col, until, "patch locked");
    }

    fn unlock(&mut self, coord: Coord, node: NodeId) {
        let Some(&index) = self.index.get(&coord) else {
            return;
        };
        let patch = &mut self.graph[index];
        if patch.lock.map_or(false, |lock| lock.node == node) {
            patch.lock = None;
        }
    }

    fn route(
        &self,
        start: Coord,
        end: Coord,
        node: NodeId,
        cycle: Cycle,
        start_boundary: Boundary,
        end_boundary: Boundary,
    ) -> Option<Vec<Coord>> {
        if start == end || self.patch(start).is_none() || self.patch(end).is_none() {
            return None;
        }

        let mut queue = VecDeque::new();
        let mut visited: HashSet<Coord> = HashSet::new();
        let mut parent: HashMap<Coord, Coord> = HashMap::new();
        visited.insert(start);

        // Leave the start patch only through a side exposing the wanted boundary
        for (next, axis) in self.adjacent(start) {
            if self.exposes(start, axis) == Some(start_boundary) && self.routable(next, node, cycle) {
                visited.insert(next);
                parent.insert(next, start);
                queue.push_back(next);
            }
        }

        while let Some(current) = queue.pop_front() {
            for (next, axis) in self.adjacent(current) {
                if next == end {
                    if self.exposes(end, axis) != Some(end_boundary) {
                        continue;
                    }
                    let mut path = vec![end, current];
                    let mut cursor = current;
                    while let Some(&previous) = parent.get(&cursor) {
                        path.push(previous);
                        cursor = previous;
                    }
                    path.reverse();
                    return Some(path);
                }
                if !visited.contains(&next) && self.routable(next, node, cycle) {
                    visited.insert(next);
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn ancillae(&self, node: NodeId, anchor: Coord, count: usize, cycle: Cycle, taken: &[Coord]) -> Option<Vec<Coord>> {
        if count == 0 {
            return Some(Vec::new());
        }
        self.patch(anchor)?;

        let mut found = Vec::with_capacity(count);
        let mut queue = VecDeque::from([anchor]);
        let mut visited: HashSet<Coord> = HashSet::from([anchor]);

        while let Some(current) = queue.pop_front() {
            for (next, _) in self.adjacent(current) {
                if visited.insert(next) && self.routable(next, node, cycle) {
                    // Taken patches still connect, they just are not handed out
                    if !taken.contains(&next) {
                        found.push(next);
                        if found.len() == count {
                            return Some(found);
                        }
                    }
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn rotate(&mut self, coord: Coord) {
        if let Some(&index) = self.index.get(&coord) {
            let patch = &mut self.graph[index];
            if patch.kind == PatchKind::Register {
                patch.orientation = patch.orientation.flip();
            }
        }
    }
}

impl fmt::Display for PatchGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let symbol = match self.patch(Coord::new(row, col)) {
                    Some(patch) if patch.lock.is_some() => '*',
                    Some(patch) => match (patch.kind, patch.orientation) {
                        (PatchKind::Register, Boundary::Z) => 'Z',
                        (PatchKind::Register, Boundary::X) => 'X',
                        (PatchKind::Route, _) => '.',
                        (PatchKind::Extern, Boundary::Z) => 'E',
                        (PatchKind::Extern, Boundary::X) => 'x',
                        (PatchKind::Blocked, _) => '#',
                    },
                    None => ' ',
                };
                write!(f, "{}", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        let graph = PatchGraph::from_rows(&["Z.X", "#.E"]).unwrap();
        assert_eq!(graph.shape(), (2, 3));
        assert_eq!(graph.coords_of(PatchKind::Register).len(), 2);
        assert!(graph.is_boundary(Coord::new(1, 2)));
        assert!(!graph.is_boundary(Coord::new(0, 0)));
        assert_eq!(graph.to_string(), "Z.X\n#.E\n");
    }

    #[test]
    fn test_ragged_layout_rejected() {
        assert!(PatchGraph::from_rows(&["Z.X", "Z."]).is_err());
        assert!(PatchGraph::from_rows(&["Z?X"]).is_err());
    }

    #[test]
    fn test_route_single_row() {
        let graph = PatchGraph::from_rows(&["Z.X"]).unwrap();
        let path = graph
            .route(Coord::new(0, 0), Coord::new(0, 2), NodeId(0), 0, Boundary::Z, Boundary::X)
            .unwrap();
        assert_eq!(path, vec![Coord::new(0, 0), Coord::new(0, 1), Coord::new(0, 2)]);
    }

    #[test]
    fn test_route_respects_boundary() {
        let graph = PatchGraph::from_rows(&["Z.X"]).unwrap();
        // The X register exposes X to its western neighbour, never Z
        let path = graph.route(Coord::new(0, 0), Coord::new(0, 2), NodeId(0), 0, Boundary::Z, Boundary::Z);
        assert!(path.is_none());
    }

    #[test]
    fn test_route_avoids_locked_patch() {
        let mut graph = PatchGraph::from_rows(&["Z.X"]).unwrap();
        graph.lock(Coord::new(0, 1), NodeId(7), 0, 2);

        let blocked = graph.route(Coord::new(0, 0), Coord::new(0, 2), NodeId(1), 1, Boundary::Z, Boundary::X);
        assert!(blocked.is_none());
        // The owner still sees its own patch
        assert!(graph.probe(Coord::new(0, 1), NodeId(7), 1));
        // The lock lapses on its own
        let later = graph.route(Coord::new(0, 0), Coord::new(0, 2), NodeId(1), 2, Boundary::Z, Boundary::X);
        assert!(later.is_some());

        graph.unlock(Coord::new(0, 1), NodeId(7));
        assert!(graph.locked_by(NodeId(7)).is_empty());
    }

    #[test]
    fn test_ancillae_are_contiguous() {
        let graph = PatchGraph::from_rows(&["Z..", "#.#"]).unwrap();
        let ancillae = graph.ancillae(NodeId(0), Coord::new(0, 0), 3, 0, &[]).unwrap();
        assert_eq!(ancillae, vec![Coord::new(0, 1), Coord::new(0, 2), Coord::new(1, 1)]);
        assert!(graph.ancillae(NodeId(0), Coord::new(0, 0), 4, 0, &[]).is_none());
    }

    #[test]
    fn test_ancillae_skip_taken_patches() {
        let graph = PatchGraph::from_rows(&["Z..", "#.#"]).unwrap();
        let taken = [Coord::new(0, 1)];
        let ancillae = graph.ancillae(NodeId(0), Coord::new(0, 0), 2, 0, &taken).unwrap();
        assert_eq!(ancillae, vec![Coord::new(0, 2), Coord::new(1, 1)]);
        assert!(graph.ancillae(NodeId(0), Coord::new(0, 0), 3, 0, &taken).is_none());
    }

    #[test]
    fn test_rotate_flips_register() {
        let mut graph = PatchGraph::from_rows(&["Z.X"]).unwrap();
        graph.rotate(Coord::new(0, 0));
        assert_eq!(graph.orientation(Coord::new(0, 0)), Some(Boundary::X));
        graph.rotate(Coord::new(0, 1));
        assert_eq!(graph.orientation(Coord::new(0, 1)), Some(Boundary::Z));
    }
}
