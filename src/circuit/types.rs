//! Core types for circuit unknowns.

use std::fmt;

/// Index of an unknown in the linear system.
/// Index 0 is always the ground reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub usize);

impl VariableId {
    /// The ground reference (always index 0).
    pub const GROUND: VariableId = VariableId(0);

    /// Check if this is the ground reference.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    /// Row/column index in the solver, `None` for ground.
    pub fn index(&self) -> Option<usize> {
        if self.is_ground() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "X{}", self.0)
        }
    }
}

/// What an unknown measures. Selects the absolute convergence tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Node voltage
    Voltage,
    /// Branch current (voltage sources, inductors)
    Current,
}

/// A named unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    pub id: VariableId,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VariableKind::Voltage => write!(f, "V({})", self.name),
            VariableKind::Current => write!(f, "I({})", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground() {
        assert!(VariableId::GROUND.is_ground());
        assert_eq!(VariableId::GROUND.index(), None);
        assert_eq!(VariableId(3).index(), Some(3));
        assert_eq!(VariableId(3).to_string(), "X3");
    }
}
