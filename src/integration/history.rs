//! Accepted timepoints kept for integration and prediction.

/// Snapshot of one timepoint.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationState {
    /// Step that led to this timepoint.
    pub delta: f64,
    /// Solution vector, indexed like the variables.
    pub solution: Vec<f64>,
    /// Device state vector.
    pub states: Vec<f64>,
}

impl IntegrationState {
    fn new(solution_len: usize, state_len: usize) -> Self {
        Self {
            delta: 0.0,
            solution: vec![0.0; solution_len],
            states: vec![0.0; state_len],
        }
    }
}

/// Fixed-length history of timepoints.
///
/// Index 0 is the timepoint being computed, index 1 the last accepted one.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<IntegrationState>,
}

impl History {
    pub fn new(length: usize, solution_len: usize, state_len: usize) -> Self {
        Self {
            entries: (0..length.max(2))
                .map(|_| IntegrationState::new(solution_len, state_len))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> &IntegrationState {
        &self.entries[index]
    }

    pub fn current(&self) -> &IntegrationState {
        &self.entries[0]
    }

    pub fn current_mut(&mut self) -> &mut IntegrationState {
        &mut self.entries[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntegrationState> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut IntegrationState> {
        self.entries.iter_mut()
    }

    /// Split into the current timepoint and the accepted ones.
    pub fn split_current_mut(&mut self) -> (&mut IntegrationState, &[IntegrationState]) {
        let (current, previous) = self.entries.split_at_mut(1);
        (&mut current[0], previous)
    }

    /// Make room for a new timepoint.
    ///
    /// The oldest entry becomes the new current one and starts out as a
    /// copy of the last accepted timepoint.
    pub fn cycle(&mut self) {
        self.entries.rotate_right(1);
        let (current, previous) = self.entries.split_at_mut(1);
        current[0].solution.copy_from_slice(&previous[0].solution);
        current[0].states.copy_from_slice(&previous[0].states);
        current[0].delta = previous[0].delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_reuses_oldest() {
        let mut history = History::new(3, 2, 1);
        history.current_mut().solution[1] = 1.0;
        history.current_mut().delta = 0.5;
        history.cycle();
        history.current_mut().solution[1] = 2.0;
        history.cycle();

        assert_eq!(history.get(1).solution[1], 2.0);
        assert_eq!(history.get(2).solution[1], 1.0);
        assert_eq!(history.current().solution[1], 2.0);
        assert_eq!(history.current().delta, 0.5);
    }
}
