//! Physical layout abstractions consumed by the router
//!
//! The router never owns geometry. It talks to a [`RoutingGraph`] for patch
//! locks, routes and ancillae, and to an [`AddressMapper`] for the patch
//! each resource lives on. [`PatchGraph`] and [`StaticMapper`] are grid
//! implementations of both.

pub mod mapper;
pub mod patch_graph;

pub use mapper::*;
pub use patch_graph::*;

use crate::dag::{Boundary, NodeId};
use serde::{Deserialize, Serialize};

/// Simulation cycle
pub type Cycle = usize;

/// Grid coordinate of a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    /// Create a new coordinate
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Manhattan distance to another coordinate
    pub fn manhattan_distance(&self, other: &Coord) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Axis of the shared side with an adjacent coordinate
    pub fn axis_to(&self, other: &Coord) -> Option<Axis> {
        match (self.row.abs_diff(other.row), self.col.abs_diff(other.col)) {
            (0, 1) => Some(Axis::Horizontal),
            (1, 0) => Some(Axis::Vertical),
            _ => None,
        }
    }
}

impl From<(usize, usize)> for Coord {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// Direction of a side shared by two adjacent patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// East/west neighbours
    Horizontal,
    /// North/south neighbours
    Vertical,
}

/// Role of a patch in the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchKind {
    /// Holds a resource
    Register,
    /// Routing channel
    Route,
    /// Boundary of an external block such as a factory output
    Extern,
    /// Not usable
    Blocked,
}

/// Lock held on a patch by an active node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLock {
    pub node: NodeId,
    pub locked_at: Cycle,
    pub until: Cycle,
}

/// A unit of physical space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub coord: Coord,
    pub kind: PatchKind,
    /// Boundary exposed on the horizontal sides of a register, or on every
    /// side of an extern patch
    pub orientation: Boundary,
    pub lock: Option<PatchLock>,
    /// Cycle at which the latest lock frees
    pub last_used: Cycle,
}

impl Patch {
    /// Create an unlocked patch
    pub fn new(coord: Coord, kind: PatchKind, orientation: Boundary) -> Self {
        Self {
            coord,
            kind,
            orientation,
            lock: None,
            last_used: 0,
        }
    }

    /// Whether `node` may use this patch at `cycle`
    pub fn is_free(&self, node: NodeId, cycle: Cycle) -> bool {
        match self.lock {
            None => true,
            Some(lock) => lock.node == node || cycle >= lock.until,
        }
    }

    /// Boundary presented to a neighbour along `axis`
    pub fn exposes(&self, axis: Axis) -> Option<Boundary> {
        match (self.kind, axis) {
            (PatchKind::Register, Axis::Horizontal) => Some(self.orientation),
            (PatchKind::Register, Axis::Vertical) => Some(self.orientation.flip()),
            (PatchKind::Extern, _) => Some(self.orientation),
            _ => None,
        }
    }
}

/// Layout collaborator used by the router.
///
/// Route and ancilla queries return `None` when no path exists; the router
/// treats that as a retry, not an error.
pub trait RoutingGraph {
    /// Patch lookup by coordinate
    fn patch(&self, coord: Coord) -> Option<&Patch>;

    /// Whether `node` may use the patch at `cycle`
    fn probe(&self, coord: Coord, node: NodeId, cycle: Cycle) -> bool {
        self.patch(coord).map_or(false, |patch| patch.is_free(node, cycle))
    }

    /// Lock a patch for `node` from `cycle` for `duration` cycles
    fn lock(&mut self, coord: Coord, node: NodeId, cycle: Cycle, duration: usize);

    /// Release a lock held by `node`
    fn unlock(&mut self, coord: Coord, node: NodeId);

    /// Contiguous chain of free patches joining two endpoints, both included
    fn route(
        &self,
        start: Coord,
        end: Coord,
        node: NodeId,
        cycle: Cycle,
        start_boundary: Boundary,
        end_boundary: Boundary,
    ) -> Option<Vec<Coord>>;

    /// `count` free patches grown from `anchor`, anchor and `taken` excluded
    fn ancillae(&self, node: NodeId, anchor: Coord, count: usize, cycle: Cycle, taken: &[Coord]) -> Option<Vec<Coord>>;

    /// Apply a boundary rotation to a patch
    fn rotate(&mut self, coord: Coord);

    /// Whether the patch belongs to an external interface
    fn is_boundary(&self, coord: Coord) -> bool {
        self.patch(coord).map_or(false, |patch| patch.kind == PatchKind::Extern)
    }

    /// Boundary an external interface presents
    fn orientation(&self, coord: Coord) -> Option<Boundary> {
        self.patch(coord).map(|patch| patch.orientation)
    }
}
