//! The bound circuit: behaviors, unknowns and the sparse system they load.

use std::ops::Range;
use std::sync::Mutex;
use std::time::Instant;

use crate::algebra::{ElementId, Executor, Job, LockedStamp, Sequential, SparseSolver, Stamp};
use crate::behavior::{
    AcceptContext, Behavior, BindContext, ConvergenceContext, InitContext, LoadContext,
    TransientContext,
};
use crate::circuit::{validate_circuit, Circuit, VariableKind, VariableSet};
use crate::error::{EngineError, Result};
use crate::integration::{
    Coefficients, IntegrationMethod, IntegrationRule, IntegrationState, StateAllocator, StateView,
};

use super::config::BiasingConfig;
use super::state::{BiasingState, InitMode};
use super::stats::Statistics;

/// Behaviors that load together, with the state slots they own.
struct BehaviorGroup {
    behaviors: Vec<Box<dyn Behavior>>,
    states: Range<usize>,
}

/// Borrowed integration data shared by every group during a load.
#[derive(Clone, Copy)]
struct TransientParts<'a> {
    time: f64,
    previous: &'a [IntegrationState],
    coefficients: &'a Coefficients,
    rule: &'a dyn IntegrationRule,
}

impl<'a> TransientParts<'a> {
    fn context(&self, offset: usize, states: &'a mut [f64]) -> TransientContext<'a> {
        TransientContext {
            time: self.time,
            states: StateView::new(offset, states, self.previous, self.coefficients, self.rule),
        }
    }
}

/// Split a state vector into the disjoint slices owned by each group.
fn split_states<'a>(
    mut states: &'a mut [f64],
    groups: &[BehaviorGroup],
) -> Vec<(usize, &'a mut [f64])> {
    let mut slices = Vec::with_capacity(groups.len());
    for group in groups {
        let (head, tail) = std::mem::take(&mut states).split_at_mut(group.states.len());
        slices.push((group.states.start, head));
        states = tail;
    }
    slices
}

/// Scalar load parameters copied into every group's context.
#[derive(Clone, Copy)]
struct LoadParameters {
    mode: InitMode,
    gmin: f64,
    source_factor: f64,
}

fn load_group(
    group: &mut BehaviorGroup,
    stamp: &mut dyn Stamp<f64>,
    solution: &[f64],
    parameters: LoadParameters,
    transient: Option<TransientContext<'_>>,
) -> Result<()> {
    let mut ctx = LoadContext {
        stamp,
        solution,
        mode: parameters.mode,
        gmin: parameters.gmin,
        source_factor: parameters.source_factor,
        transient,
    };
    for behavior in &mut group.behaviors {
        behavior.load(&mut ctx)?;
    }
    Ok(())
}

/// A circuit bound to its linear system.
pub struct NodalSystem {
    solver: SparseSolver<f64>,
    variables: VariableSet,
    groups: Vec<BehaviorGroup>,
    states: StateAllocator,
    state: BiasingState,
    /// Diagonal elements of the node voltage rows, for gmin stepping.
    diagonals: Vec<ElementId>,
    voltage_rows: Vec<usize>,
    executor: Box<dyn Executor>,
    nonlinear: bool,
    stats: Statistics,
}

impl NodalSystem {
    /// Validate and bind a circuit.
    pub fn build(circuit: Circuit, config: &BiasingConfig) -> Result<Self> {
        validate_circuit(&circuit)?;
        config.validate()?;

        let mut solver = SparseSolver::new();
        solver.set_pivot_thresholds(
            config.pivot_relative_threshold,
            config.pivot_absolute_threshold,
        )?;
        let mut variables = VariableSet::new();
        let mut states = StateAllocator::new();

        let mut groups = Vec::new();
        for behaviors in circuit.into_groups() {
            let start = states.len();
            let mut group = BehaviorGroup {
                behaviors,
                states: start..start,
            };
            for behavior in &mut group.behaviors {
                let mut ctx = BindContext::new(&mut variables, &mut solver, &mut states);
                behavior.bind(&mut ctx)?;
            }
            group.states = start..states.len();
            groups.push(group);
        }

        let mut diagonals = Vec::new();
        let mut voltage_rows = Vec::new();
        for variable in variables.iter() {
            let row = variable.id.0;
            let diagonal = solver.get_element(row, row)?;
            if variable.kind == VariableKind::Voltage {
                diagonals.push(diagonal);
                voltage_rows.push(row);
            }
        }

        let nonlinear = groups
            .iter()
            .flat_map(|g| &g.behaviors)
            .any(|b| b.is_nonlinear());
        let executor = Self::executor(config.parallel && groups.len() > 1);

        tracing::debug!(
            unknowns = variables.len(),
            behaviors = groups.iter().map(|g| g.behaviors.len()).sum::<usize>(),
            groups = groups.len(),
            states = states.len(),
            nonlinear,
            "circuit bound"
        );

        Ok(Self {
            state: BiasingState::new(variables.len(), config.gmin),
            solver,
            variables,
            groups,
            states,
            diagonals,
            voltage_rows,
            executor,
            nonlinear,
            stats: Statistics::new(),
        })
    }

    #[cfg(feature = "parallel")]
    fn executor(parallel: bool) -> Box<dyn Executor> {
        if parallel {
            Box::new(crate::algebra::RayonExecutor)
        } else {
            Box::new(Sequential)
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn executor(_parallel: bool) -> Box<dyn Executor> {
        Box::new(Sequential)
    }

    /// Replace the executor used when loading several groups.
    pub fn set_executor(&mut self, executor: Box<dyn Executor>) {
        self.executor = executor;
    }

    /// Clear the system and let every behavior load its contribution.
    pub fn load(&mut self, method: Option<&mut IntegrationMethod>) -> Result<()> {
        let started = Instant::now();
        self.solver.clear();

        let parameters = LoadParameters {
            mode: self.state.mode,
            gmin: self.state.gmin,
            source_factor: self.state.source_factor,
        };
        let solution = &self.state.solution;

        let (parts, slices) = match method {
            Some(method) => {
                let time = method.time();
                let (current, previous, coefficients, rule) = method.load_parts();
                let parts = TransientParts {
                    time,
                    previous,
                    coefficients,
                    rule,
                };
                (Some(parts), split_states(&mut current.states, &self.groups))
            }
            None => (None, Vec::new()),
        };
        let mut slices = slices.into_iter();
        let mut next_context = || {
            parts.and_then(|p| {
                slices
                    .next()
                    .map(|(offset, states)| p.context(offset, states))
            })
        };

        if self.groups.len() == 1 {
            let transient = next_context();
            load_group(
                &mut self.groups[0],
                &mut self.solver,
                solution,
                parameters,
                transient,
            )?;
        } else {
            let lock = Mutex::new(&mut self.solver);
            let jobs: Vec<Job<'_>> = self
                .groups
                .iter_mut()
                .map(|group| {
                    let transient = next_context();
                    let lock = &lock;
                    Box::new(move || {
                        let mut stamp = LockedStamp::new(lock);
                        load_group(group, &mut stamp, solution, parameters, transient)
                    }) as Job<'_>
                })
                .collect();
            self.executor.execute(jobs)?;
        }

        if self.state.diagonal_gmin > 0.0 {
            for &diagonal in &self.diagonals {
                self.solver.add(diagonal, self.state.diagonal_gmin);
            }
        }
        self.stats.load_time += started.elapsed();
        Ok(())
    }

    /// Factor the loaded system and solve it into the solution vector.
    ///
    /// The previous solution moves to `old_solution`.
    pub fn factor_and_solve(&mut self) -> Result<()> {
        let started = Instant::now();
        let reorderings = self.solver.reorderings();
        self.solver.factor()?;
        self.stats.factorings += 1;
        self.stats.reorderings += self.solver.reorderings() - reorderings;
        self.stats.factor_time += started.elapsed();

        let started = Instant::now();
        self.state.store_solution();
        self.solver.solve(&mut self.state.solution)?;
        self.stats.solves += 1;
        self.stats.solve_time += started.elapsed();
        Ok(())
    }

    /// Fail when the solution holds a value that is not a number.
    pub fn check_finite(&self) -> Result<()> {
        for variable in self.variables.iter() {
            if self.state.solution[variable.id.0].is_nan() {
                return Err(EngineError::NotANumber {
                    variable: variable.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Compare the last two iterates and ask the behaviors.
    pub fn is_convergent(&self, config: &BiasingConfig) -> Result<bool> {
        self.check_finite()?;
        let solution = &self.state.solution;
        let old = &self.state.old_solution;
        for variable in self.variables.iter() {
            let i = variable.id.0;
            let abstol = match variable.kind {
                VariableKind::Voltage => config.voltage_abstol,
                VariableKind::Current => config.current_abstol,
            };
            let tol = config.reltol * solution[i].abs().max(old[i].abs()) + abstol;
            if (solution[i] - old[i]).abs() > tol {
                tracing::trace!(variable = %variable, new = solution[i], old = old[i], "not converged");
                return Ok(false);
            }
        }

        let ctx = ConvergenceContext {
            solution,
            reltol: config.reltol,
            voltage_abstol: config.voltage_abstol,
            current_abstol: config.current_abstol,
        };
        Ok(self
            .groups
            .iter()
            .flat_map(|g| &g.behaviors)
            .all(|b| b.is_convergent(&ctx)))
    }

    /// Let the behaviors seed their states for the first timepoint.
    pub fn initialize_states(&mut self, method: &mut IntegrationMethod, use_ic: bool) -> Result<()> {
        let time = method.time();
        let (current, previous, coefficients, rule) = method.load_parts();
        let parts = TransientParts {
            time,
            previous,
            coefficients,
            rule,
        };
        let slices = split_states(&mut current.states, &self.groups);
        for (group, (offset, states)) in self.groups.iter_mut().zip(slices) {
            let mut ctx = InitContext {
                solution: &mut self.state.solution,
                states: parts.context(offset, states).states,
                use_ic,
            };
            for behavior in &mut group.behaviors {
                behavior.initialize_states(&mut ctx)?;
            }
        }
        Ok(())
    }

    /// Notify the behaviors of an accepted timepoint.
    pub fn accept(&mut self, method: &mut IntegrationMethod) -> Result<()> {
        let mut ctx = AcceptContext {
            time: method.time(),
            solution: &self.state.solution,
            breakpoints: method.breakpoints_mut(),
        };
        for behavior in self.groups.iter_mut().flat_map(|g| &mut g.behaviors) {
            behavior.accept(&mut ctx)?;
        }
        Ok(())
    }

    /// Request a full pivot search on the next factorization.
    pub fn force_reorder(&mut self) {
        self.solver.force_reorder();
    }

    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn solver(&self) -> &SparseSolver<f64> {
        &self.solver
    }

    pub fn states(&self) -> &StateAllocator {
        &self.states
    }

    /// Node voltage rows of the solution vector.
    pub fn voltage_rows(&self) -> &[usize] {
        &self.voltage_rows
    }

    /// Length of the solution vector, ground included.
    pub fn solution_len(&self) -> usize {
        self.variables.len() + 1
    }

    pub fn state(&self) -> &BiasingState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BiasingState {
        &mut self.state
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    /// Solution value of a named unknown.
    pub fn value(&self, name: &str) -> Result<f64> {
        let id = self.variables.get(name)?;
        Ok(self.state.solution[id.0])
    }
}

impl std::fmt::Debug for NodalSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodalSystem")
            .field("unknowns", &self.variables.len())
            .field("groups", &self.groups.len())
            .field("states", &self.states.len())
            .field("nonlinear", &self.nonlinear)
            .finish()
    }
}
