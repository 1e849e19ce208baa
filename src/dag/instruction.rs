//! Operation kinds carried by dependency graph nodes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lattice-surgery boundary type a patch must expose towards a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    /// Z-type boundary
    Z,
    /// X-type boundary
    X,
}

impl Boundary {
    /// The opposite boundary type
    pub fn flip(self) -> Self {
        match self {
            Boundary::Z => Boundary::X,
            Boundary::X => Boundary::Z,
        }
    }
}

/// Operation kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// Initialise fresh patches
    Init,
    /// Prepare a patch, used for magic-state refills
    Prep,
    /// Reset and release patches
    Reset,
    /// Measurement
    Measure,
    /// Pauli-X
    X,
    /// Pauli-Z
    Z,
    /// Hadamard, rotates the patch boundaries
    Hadamard,
    /// S gate
    Phase,
    /// T gate, consumes a magic state
    T,
    /// Controlled-NOT, first target is the control
    Cnot,
    /// Toffoli, last target is the target
    Toffoli,
    /// Move state from the first target to the second
    Move,
    /// User-defined operation
    Custom {
        label: String,
        cycles: usize,
        ancillae: usize,
    },
}

impl Instruction {
    /// Create a custom instruction
    pub fn custom(label: impl Into<String>, cycles: usize, ancillae: usize) -> Self {
        Self::Custom {
            label: label.into(),
            cycles: cycles.max(1),
            ancillae,
        }
    }

    /// Operation label
    pub fn label(&self) -> &str {
        match self {
            Instruction::Init => "INIT",
            Instruction::Prep => "PREP",
            Instruction::Reset => "RESET",
            Instruction::Measure => "MEAS",
            Instruction::X => "X",
            Instruction::Z => "Z",
            Instruction::Hadamard => "H",
            Instruction::Phase => "S",
            Instruction::T => "T",
            Instruction::Cnot => "CNOT",
            Instruction::Toffoli => "TOFFOLI",
            Instruction::Move => "MOVE",
            Instruction::Custom { label, .. } => label,
        }
    }

    /// Default duration in cycles
    pub fn cycles(&self) -> usize {
        match self {
            Instruction::Cnot => 3,
            Instruction::Toffoli => 3,
            Instruction::Custom { cycles, .. } => (*cycles).max(1),
            _ => 1,
        }
    }

    /// Number of ancilla patches needed next to each target
    pub fn ancillae(&self) -> usize {
        match self {
            Instruction::Hadamard | Instruction::Phase => 1,
            Instruction::Custom { ancillae, .. } => *ancillae,
            _ => 0,
        }
    }

    /// Whether resolving the operation rotates the boundaries of its patches
    pub fn rotates(&self) -> bool {
        matches!(self, Instruction::Hadamard)
    }

    /// Whether the operation releases any extern allocation it touched
    pub fn releases_extern(&self) -> bool {
        matches!(self, Instruction::Reset)
    }

    /// Whether the operation may introduce previously unknown resources
    pub fn produces(&self) -> bool {
        matches!(self, Instruction::Init | Instruction::Prep)
    }

    /// Magic state consumed by this kind when added through `add_gate`
    pub fn magic_state(&self) -> Option<&str> {
        match self {
            Instruction::T => Some("T"),
            _ => None,
        }
    }

    /// Boundary the target at `index` must expose, out of `arity` targets
    pub fn boundary(&self, index: usize, arity: usize) -> Boundary {
        match self {
            Instruction::Cnot | Instruction::Toffoli if index + 1 == arity && arity > 1 => Boundary::X,
            Instruction::Move if index > 0 => Boundary::X,
            _ => Boundary::Z,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cnot_orientation() {
        assert_eq!(Instruction::Cnot.boundary(0, 2), Boundary::Z);
        assert_eq!(Instruction::Cnot.boundary(1, 2), Boundary::X);
        assert_eq!(Instruction::Cnot.cycles(), 3);
    }

    #[test]
    fn test_custom_duration_is_at_least_one() {
        let op = Instruction::custom("LONG", 0, 2);
        assert_eq!(op.cycles(), 1);
        assert_eq!(op.ancillae(), 2);
        assert_eq!(op.to_string(), "LONG");
    }
}
