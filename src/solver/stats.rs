//! Simulation statistics.

use std::time::Duration;

/// Counters accumulated over the lifetime of a simulator.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Newton iterations over all analyses.
    pub iterations: usize,
    pub op_iterations: usize,
    pub transient_iterations: usize,
    /// Timepoints probed, accepted or not.
    pub timepoints: usize,
    pub accepted: usize,
    /// Timepoints rejected by the truncation error or by non-convergence.
    pub rejected: usize,
    pub factorings: usize,
    pub reorderings: usize,
    pub solves: usize,
    pub load_time: Duration,
    pub factor_time: Duration,
    pub solve_time: Duration,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "iterations:   {} (op {}, transient {})",
            self.iterations, self.op_iterations, self.transient_iterations
        )?;
        writeln!(
            f,
            "timepoints:   {} ({} accepted, {} rejected)",
            self.timepoints, self.accepted, self.rejected
        )?;
        writeln!(
            f,
            "factorings:   {} ({} reorderings)",
            self.factorings, self.reorderings
        )?;
        writeln!(f, "solves:       {}", self.solves)?;
        write!(
            f,
            "time:         load {:?}, factor {:?}, solve {:?}",
            self.load_time, self.factor_time, self.solve_time
        )
    }
}
