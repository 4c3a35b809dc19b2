//! Circuit description handed to the simulator.
//!
//! A [`Circuit`] is a collection of device behaviors arranged in groups.
//! Behaviors of different groups may be loaded concurrently, so a group
//! should collect devices that are independent of the other groups. Most
//! circuits use a single group. Unknowns are created in a [`VariableSet`]
//! while the simulator binds the behaviors.

mod types;
mod validate;
mod variables;

pub use types::*;
pub use validate::validate_circuit;
pub use variables::VariableSet;

use crate::behavior::Behavior;

/// A circuit ready for simulation.
pub struct Circuit {
    groups: Vec<Vec<Box<dyn Behavior>>>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Create an empty circuit with one behavior group.
    pub fn new() -> Self {
        Self {
            groups: vec![Vec::new()],
        }
    }

    /// Add a behavior to the first group.
    pub fn add<B: Behavior + 'static>(&mut self, behavior: B) -> &mut Self {
        self.groups[0].push(Box::new(behavior));
        self
    }

    /// Start a new behavior group and return its index.
    pub fn add_group(&mut self) -> usize {
        self.groups.push(Vec::new());
        self.groups.len() - 1
    }

    /// Add a behavior to a specific group, creating groups up to `group`.
    pub fn add_to_group<B: Behavior + 'static>(&mut self, group: usize, behavior: B) -> &mut Self {
        while self.groups.len() <= group {
            self.groups.push(Vec::new());
        }
        self.groups[group].push(Box::new(behavior));
        self
    }

    /// Number of behaviors over all groups.
    pub fn behavior_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_empty()).count()
    }

    /// Iterate all behaviors in group order.
    pub fn behaviors(&self) -> impl Iterator<Item = &dyn Behavior> {
        self.groups.iter().flatten().map(|b| b.as_ref())
    }

    pub(crate) fn into_groups(self) -> Vec<Vec<Box<dyn Behavior>>> {
        self.groups.into_iter().filter(|g| !g.is_empty()).collect()
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<Vec<&str>> = self
            .groups
            .iter()
            .map(|g| g.iter().map(|b| b.name()).collect())
            .collect();
        f.debug_struct("Circuit").field("groups", &names).finish()
    }
}
