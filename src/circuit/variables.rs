//! Mapping from names to unknowns.

use std::collections::HashMap;

use super::types::{Variable, VariableId, VariableKind};
use crate::error::{EngineError, Result};

/// Names accepted for the ground reference.
const GROUND_NAMES: [&str; 2] = ["0", "gnd"];

/// The set of unknowns of a circuit.
///
/// Ground is always present at index 0 and is not an unknown of the
/// linear system.
#[derive(Debug, Clone)]
pub struct VariableSet {
    map: HashMap<String, VariableId>,
    list: Vec<Variable>,
}

impl Default for VariableSet {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableSet {
    pub fn new() -> Self {
        let ground = Variable {
            name: GROUND_NAMES[0].to_string(),
            kind: VariableKind::Voltage,
            id: VariableId::GROUND,
        };
        Self {
            map: HashMap::new(),
            list: vec![ground],
        }
    }

    fn is_ground_name(name: &str) -> bool {
        GROUND_NAMES.iter().any(|g| g.eq_ignore_ascii_case(name))
    }

    /// Number of unknowns, ground excluded.
    pub fn len(&self) -> usize {
        self.list.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a node voltage, creating it on first use.
    pub fn node(&mut self, name: &str) -> VariableId {
        if Self::is_ground_name(name) {
            return VariableId::GROUND;
        }
        if let Some(&id) = self.map.get(name) {
            return id;
        }
        self.push(name, VariableKind::Voltage)
    }

    /// Create a new branch current. Branch names must be unique.
    pub fn create_branch(&mut self, name: &str) -> Result<VariableId> {
        if Self::is_ground_name(name) || self.map.contains_key(name) {
            return Err(EngineError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        Ok(self.push(name, VariableKind::Current))
    }

    fn push(&mut self, name: &str, kind: VariableKind) -> VariableId {
        let id = VariableId(self.list.len());
        self.map.insert(name.to_string(), id);
        self.list.push(Variable {
            name: name.to_string(),
            kind,
            id,
        });
        id
    }

    /// Look up an existing variable.
    pub fn get(&self, name: &str) -> Result<VariableId> {
        if Self::is_ground_name(name) {
            return Ok(VariableId::GROUND);
        }
        self.map
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Variable description by id.
    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.list.get(id.0)
    }

    /// Iterate all unknowns, ground excluded.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.list.iter().skip(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_aliases() {
        let mut vars = VariableSet::new();
        assert_eq!(vars.node("0"), VariableId::GROUND);
        assert_eq!(vars.node("GND"), VariableId::GROUND);
        assert!(vars.is_empty());
    }

    #[test]
    fn test_nodes_are_shared() {
        let mut vars = VariableSet::new();
        let a = vars.node("in");
        let b = vars.node("out");
        assert_eq!(vars.node("in"), a);
        assert_eq!((a, b), (VariableId(1), VariableId(2)));
        assert_eq!(vars.get("out").unwrap(), b);
        assert!(vars.get("missing").is_err());
    }

    #[test]
    fn test_branch_must_be_unique() {
        let mut vars = VariableSet::new();
        let i = vars.create_branch("V1#branch").unwrap();
        assert_eq!(vars.variable(i).unwrap().kind, VariableKind::Current);
        assert!(vars.create_branch("V1#branch").is_err());
    }
}
