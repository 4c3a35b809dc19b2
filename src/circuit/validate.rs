//! Circuit validation.

use std::collections::HashSet;

use crate::error::{EngineError, Result};

use super::Circuit;

/// Validate a circuit before binding.
///
/// Checks:
/// - The circuit has at least one behavior
/// - Behavior names are unique
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.behavior_count() == 0 {
        return Err(EngineError::InvalidTopology {
            message: "Circuit has no behaviors".to_string(),
        });
    }

    let mut names = HashSet::new();
    for behavior in circuit.behaviors() {
        if !names.insert(behavior.name()) {
            return Err(EngineError::DuplicateBehavior {
                name: behavior.name().to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Resistor;

    #[test]
    fn test_empty_circuit_rejected() {
        let circuit = Circuit::new();
        assert!(matches!(
            validate_circuit(&circuit),
            Err(EngineError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "a", "0", 1.0));
        circuit.add(Resistor::new("R1", "a", "b", 1.0));
        assert_eq!(
            validate_circuit(&circuit),
            Err(EngineError::DuplicateBehavior {
                name: "R1".to_string()
            })
        );
    }
}
