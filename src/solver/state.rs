//! Iteration state shared by the nonlinear solves.

/// How nonlinear behaviors pick their linearization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMode {
    /// First operating point iteration: junctions start at their critical
    /// voltage instead of the (meaningless) starting solution.
    #[default]
    Junction,
    /// Iterate from the solution while the operating point settles.
    Fix,
    /// Free iteration; only a converged iteration in this mode ends the
    /// operating point.
    Float,
    /// Transient timepoint.
    Transient,
}

/// Solution vectors and convergence aids of the nonlinear solver.
#[derive(Debug, Clone)]
pub struct BiasingState {
    /// Latest iterate, indexed by variable (ground at 0).
    pub solution: Vec<f64>,
    /// Previous iterate.
    pub old_solution: Vec<f64>,
    pub mode: InitMode,
    /// Junction conductance passed to the behaviors.
    pub gmin: f64,
    /// Extra conductance from every node to ground, used by gmin stepping.
    pub diagonal_gmin: f64,
    /// Scale applied to independent sources, used by source stepping.
    pub source_factor: f64,
}

impl BiasingState {
    pub fn new(size: usize, gmin: f64) -> Self {
        Self {
            solution: vec![0.0; size + 1],
            old_solution: vec![0.0; size + 1],
            mode: InitMode::Junction,
            gmin,
            diagonal_gmin: 0.0,
            source_factor: 1.0,
        }
    }

    /// Make the latest iterate the previous one.
    pub fn store_solution(&mut self) {
        std::mem::swap(&mut self.solution, &mut self.old_solution);
    }

    /// Reset the solution to zero.
    pub fn reset(&mut self) {
        self.solution.iter_mut().for_each(|x| *x = 0.0);
        self.old_solution.iter_mut().for_each(|x| *x = 0.0);
    }
}
