//! Variable-order, variable-step implicit time integration.
//!
//! [`IntegrationMethod`] owns the history of accepted timepoints, the
//! breakpoint set and the step-size controller. The actual formulas come
//! from an [`IntegrationRule`]: [`Trapezoidal`] or [`Gear`].
//!
//! A transient sweep drives the method through a fixed cycle:
//!
//! 1. [`probe`](IntegrationMethod::probe) a candidate step, which fixes the
//!    corrector coefficients and computes the predicted solution;
//! 2. correct the timepoint with Newton-Raphson (outside this module);
//! 3. [`evaluate`](IntegrationMethod::evaluate) the truncation error, which
//!    either accepts the timepoint or proposes a smaller step;
//! 4. [`accept`](IntegrationMethod::accept) the timepoint, which commits
//!    it to the history and limits the next step to the next breakpoint.
//!
//! A failed correction goes through
//! [`non_convergence`](IntegrationMethod::non_convergence) instead.

mod breakpoints;
mod gear;
mod history;
mod states;
mod trapezoidal;

pub use breakpoints::Breakpoints;
pub use gear::Gear;
pub use history::{History, IntegrationState};
pub use states::{Companion, HistorySlot, StateAllocator, StateSlot, StateView};
pub use trapezoidal::Trapezoidal;

use std::fmt::Debug;

use crate::error::{EngineError, Result};
use crate::solver::TimeConfig;

/// Highest integration order any rule supports.
pub const MAX_SUPPORTED_ORDER: usize = 6;

/// Corrector and predictor coefficients for the active step.
#[derive(Debug, Clone, Default)]
pub struct Coefficients {
    pub order: usize,
    pub delta: f64,
    /// Corrector weights: `dq/dt = sum(ag[i] * q[i])` for Gear, see the
    /// rule for the trapezoidal form.
    pub ag: [f64; MAX_SUPPORTED_ORDER + 2],
    /// Predictor weights applied to the accepted solutions.
    pub agp: [f64; MAX_SUPPORTED_ORDER + 2],
}

impl Coefficients {
    pub(crate) fn reset(&mut self, order: usize, delta: f64) {
        self.order = order;
        self.delta = delta;
        self.ag = [0.0; MAX_SUPPORTED_ORDER + 2];
        self.agp = [0.0; MAX_SUPPORTED_ORDER + 2];
    }
}

/// Formulas of one family of implicit integration methods.
pub trait IntegrationRule: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn max_order(&self) -> usize;

    /// Compute the coefficients for `order`.
    ///
    /// `deltas[i]` is the step that led to history entry `i`, so
    /// `deltas[0]` is the step being probed.
    fn compute_coefficients(&self, order: usize, deltas: &[f64], coefficients: &mut Coefficients);

    /// Time derivative of a state from its current and previous values
    /// (`values[0]` is current).
    fn derivative(&self, coefficients: &Coefficients, values: &[f64], previous_derivative: f64)
        -> f64;

    /// Extrapolate the accepted solutions to the probed timepoint.
    fn predict(&self, coefficients: &Coefficients, history: &History, prediction: &mut [f64]);

    /// Error constant of the formula at `order`.
    fn lte_factor(&self, order: usize) -> f64;

    /// Step allowed by the difference `diff` between the corrected and the
    /// predicted value of a node.
    fn truncate_node(
        &self,
        coefficients: &Coefficients,
        history: &History,
        diff: f64,
        tol: f64,
        trtol: f64,
    ) -> f64;
}

/// Root applied to the truncation ratio of a state at `order`.
fn lte_root(del: f64, order: usize) -> f64 {
    match order {
        0 | 1 => del,
        2 => del.sqrt(),
        _ => (del.ln() / order as f64).exp(),
    }
}

/// Result of [`IntegrationMethod::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Whether the timepoint is within tolerance.
    pub accepted: bool,
    /// Next step when accepted, retry step when rejected.
    pub delta: f64,
}

#[derive(Debug, Clone)]
struct Tolerances {
    reltol: f64,
    abstol: f64,
    trtol: f64,
    lte_reltol: f64,
    lte_abstol: f64,
    chgtol: f64,
    expansion: f64,
    truncate_nodes: bool,
}

/// Time integration driver.
#[derive(Debug)]
pub struct IntegrationMethod {
    rule: Box<dyn IntegrationRule>,
    max_order: usize,
    order: usize,
    history: History,
    coefficients: Coefficients,
    prediction: Vec<f64>,
    breakpoints: Breakpoints,
    time: f64,
    base_time: f64,
    save_delta: f64,
    next_delta: f64,
    accepted: usize,
    start: f64,
    stop: f64,
    step: f64,
    max_step: f64,
    min_step: f64,
    tolerances: Tolerances,
    truncatable: Vec<StateSlot>,
    node_rows: Vec<usize>,
}

impl IntegrationMethod {
    /// Create a method for a system of `solution_len` unknowns (ground
    /// included) and the states reserved in `states`.
    ///
    /// `reltol` and `abstol` are the Newton tolerances used for the state
    /// truncation error; `node_rows` are the solution entries checked when
    /// node truncation is enabled.
    pub fn new(
        config: &TimeConfig,
        reltol: f64,
        abstol: f64,
        solution_len: usize,
        states: &StateAllocator,
        node_rows: Vec<usize>,
    ) -> Result<Self> {
        config.validate()?;
        let rule = config.method.rule();
        let max_order = config.max_order.min(rule.max_order());
        let min_step = config.effective_min_step();
        Ok(Self {
            history: History::new(rule.max_order() + 2, solution_len, states.len()),
            rule,
            max_order,
            order: 1,
            coefficients: Coefficients::default(),
            prediction: vec![0.0; solution_len],
            breakpoints: Breakpoints::new(min_step),
            time: 0.0,
            base_time: 0.0,
            save_delta: f64::INFINITY,
            next_delta: 0.0,
            accepted: 0,
            start: config.start,
            stop: config.stop,
            step: config.step,
            max_step: config.effective_max_step(),
            min_step,
            tolerances: Tolerances {
                reltol,
                abstol,
                trtol: config.trtol,
                lte_reltol: config.lte_reltol,
                lte_abstol: config.lte_abstol,
                chgtol: config.chgtol,
                expansion: config.expansion,
                truncate_nodes: config.truncate_nodes,
            },
            truncatable: states.truncatable().to_vec(),
            node_rows,
        })
    }

    /// Reset to `t = 0`, seeding the current timepoint with `solution`.
    pub fn initialize(&mut self, solution: &[f64]) -> Result<()> {
        self.order = 1;
        self.time = 0.0;
        self.base_time = 0.0;
        self.save_delta = f64::INFINITY;
        self.accepted = 0;
        self.breakpoints.clear();
        if self.start > 0.0 {
            self.breakpoints.set_breakpoint(self.start)?;
        }
        self.breakpoints.set_breakpoint(self.stop)?;

        let delta = (self.stop / 50.0).min(self.step) / 10.0;
        self.next_delta = delta;
        let current = self.history.current_mut();
        current.solution.copy_from_slice(solution);
        current.states.iter_mut().for_each(|s| *s = 0.0);
        current.delta = delta;
        self.rule
            .compute_coefficients(1, &self.deltas(), &mut self.coefficients);
        tracing::debug!(
            method = self.rule.name(),
            max_order = self.max_order,
            delta,
            "integration initialized"
        );
        Ok(())
    }

    /// Commit the current timepoint and prepare the next one.
    ///
    /// Returns the step to probe next.
    pub fn accept(&mut self, solution: &[f64]) -> Result<f64> {
        self.history
            .current_mut()
            .solution
            .copy_from_slice(solution);

        if self.accepted == 0 {
            let max_step = self.max_step;
            let current = self.history.current().clone();
            for entry in self.history.iter_mut() {
                entry.solution.copy_from_slice(&current.solution);
                entry.states.copy_from_slice(&current.states);
                entry.delta = max_step;
            }
        }
        self.accepted += 1;

        // Consume the breakpoints that were reached.
        let mut at_breakpoint = false;
        let mut breakpoint_delta = f64::INFINITY;
        while self.breakpoints.first() <= self.time + self.min_step {
            let reached = self.breakpoints.first();
            self.breakpoints.clear_breakpoint();
            breakpoint_delta = self.breakpoints.first() - reached;
            at_breakpoint = true;
        }

        let mut delta = self.next_delta.min(self.max_step);
        if at_breakpoint {
            self.order = 1;
            delta = delta.min(0.1 * self.save_delta.min(breakpoint_delta));
            if self.time == 0.0 {
                delta /= 10.0;
            }
            delta = delta.max(2.0 * self.min_step);
        } else if self.time + delta >= self.breakpoints.first() {
            self.save_delta = delta;
            delta = self.breakpoints.first() - self.time;
        }

        self.history.cycle();
        self.base_time = self.time;
        self.history.current_mut().delta = delta;
        self.next_delta = delta;
        tracing::trace!(time = self.time, delta, order = self.order, "timepoint accepted");
        Ok(delta)
    }

    /// Set up the timepoint at `base_time + delta`.
    ///
    /// The step is clamped so the timepoint never passes the next
    /// breakpoint. Returns the step actually used.
    pub fn probe(&mut self, delta: f64) -> f64 {
        let first = self.breakpoints.first();
        let mut delta = delta;
        if self.base_time + delta >= first - self.breakpoints.min_spacing() {
            self.save_delta = delta;
            delta = first - self.base_time;
            self.time = first;
        } else {
            self.time = self.base_time + delta;
        }
        self.history.current_mut().delta = delta;
        self.rule
            .compute_coefficients(self.order, &self.deltas(), &mut self.coefficients);
        self.rule
            .predict(&self.coefficients, &self.history, &mut self.prediction);
        delta
    }

    /// Judge the corrected timepoint against the truncation error.
    ///
    /// The first timepoint out of `t = 0` is always accepted whatever its
    /// step; the step proposed for the next one is capped at the maximum
    /// step instead.
    pub fn evaluate(&mut self, solution: &[f64]) -> Result<Evaluation> {
        self.history
            .current_mut()
            .solution
            .copy_from_slice(solution);
        let delta = self.delta();

        // The first step out of the initial point carries no usable history.
        if self.base_time == 0.0 {
            self.next_delta = delta.min(self.max_step);
            return Ok(Evaluation {
                accepted: true,
                delta: self.next_delta,
            });
        }

        let mut new_delta = self.truncate(self.order);
        if !(new_delta > 0.0) {
            return Err(EngineError::TimestepTooSmall {
                time: self.time,
                delta: new_delta,
            });
        }

        if new_delta > 0.9 * delta {
            if self.order < self.max_order {
                let raised = self.truncate(self.order + 1);
                if raised > 1.05 * delta {
                    self.order += 1;
                    new_delta = raised;
                }
            }
            new_delta = new_delta
                .min(self.tolerances.expansion * delta)
                .min(self.max_step);
            if new_delta <= self.min_step {
                if delta <= self.min_step {
                    return Err(EngineError::TimestepTooSmall {
                        time: self.time,
                        delta: new_delta,
                    });
                }
                new_delta = self.min_step;
                self.order = 1;
            }
            self.next_delta = new_delta;
            Ok(Evaluation {
                accepted: true,
                delta: new_delta,
            })
        } else {
            new_delta = new_delta.min(self.max_step);
            if new_delta < self.min_step {
                if delta <= self.min_step {
                    return Err(EngineError::TimestepTooSmall {
                        time: self.time,
                        delta: new_delta,
                    });
                }
                new_delta = self.min_step;
            }
            tracing::debug!(time = self.time, delta, new_delta, "timepoint rejected");
            Ok(Evaluation {
                accepted: false,
                delta: new_delta,
            })
        }
    }

    /// Recover from a failed correction.
    ///
    /// Restores `solution` to the last accepted timepoint and returns the
    /// reduced step to retry with.
    pub fn non_convergence(&mut self, solution: &mut [f64]) -> Result<f64> {
        solution.copy_from_slice(&self.history.get(1).solution);
        let delta = self.delta();
        if delta <= self.min_step {
            return Err(EngineError::TimestepTooSmall {
                time: self.time,
                delta,
            });
        }
        self.order = 1;
        self.time = self.base_time;
        let delta = (delta / 8.0).max(self.min_step);
        tracing::debug!(time = self.base_time, delta, "timepoint did not converge");
        Ok(delta)
    }

    fn deltas(&self) -> [f64; MAX_SUPPORTED_ORDER + 2] {
        let mut deltas = [0.0; MAX_SUPPORTED_ORDER + 2];
        for (d, entry) in deltas.iter_mut().zip(self.history.iter()) {
            *d = entry.delta;
        }
        deltas
    }

    /// Largest step allowed by the truncation error at `order`.
    fn truncate(&self, order: usize) -> f64 {
        let mut new_delta = f64::INFINITY;
        for &slot in &self.truncatable {
            new_delta = new_delta.min(self.truncate_state(slot, order));
        }
        if self.tolerances.truncate_nodes {
            new_delta = new_delta.min(self.truncate_nodes(order));
        }
        new_delta.min(self.tolerances.expansion * self.delta())
    }

    fn truncate_state(&self, slot: StateSlot, order: usize) -> f64 {
        let t = &self.tolerances;
        let q = slot.0;
        let current = self.history.get(0);
        let previous = self.history.get(1);

        let volttol = t.abstol
            + t.reltol * current.states[q + 1].abs().max(previous.states[q + 1].abs());
        let charge = current.states[q].abs().max(previous.states[q].abs());
        let chargetol = t.reltol * charge.max(t.chgtol) / self.delta();
        let tol = volttol.max(chargetol);

        let points = (order + 2).min(self.history.len());
        let mut diff = [0.0; MAX_SUPPORTED_ORDER + 3];
        let mut deltmp = [0.0; MAX_SUPPORTED_ORDER + 3];
        for i in 0..points {
            diff[i] = self.history.get(i).states[q];
            deltmp[i] = self.history.get(i).delta;
        }

        let mut j = points - 1;
        while j > 0 {
            for i in 0..j {
                diff[i] = (diff[i] - diff[i + 1]) / deltmp[i];
            }
            j -= 1;
            for i in 0..j {
                deltmp[i] = deltmp[i + 1] + self.history.get(i).delta;
            }
        }

        let factor = self.rule.lte_factor(order);
        let del = t.trtol * tol / t.abstol.max(factor * diff[0].abs());
        lte_root(del, order)
    }

    fn truncate_nodes(&self, order: usize) -> f64 {
        let t = &self.tolerances;
        let mut coefficients = self.coefficients.clone();
        coefficients.order = order;
        let current = &self.history.current().solution;
        let mut new_delta = f64::INFINITY;
        for &row in &self.node_rows {
            let value = current[row];
            let predicted = self.prediction[row];
            let tol = value.abs().max(predicted.abs()) * t.lte_reltol + t.lte_abstol;
            let diff = value - predicted;
            new_delta = new_delta.min(self.rule.truncate_node(
                &coefficients,
                &self.history,
                diff,
                tol,
                t.trtol,
            ));
        }
        new_delta
    }

    /// Time of the timepoint being solved (or last accepted after `accept`).
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time of the last accepted timepoint.
    pub fn base_time(&self) -> f64 {
        self.base_time
    }

    /// Step of the current timepoint.
    pub fn delta(&self) -> f64 {
        self.history.current().delta
    }

    /// Override the step that the next probe starts from.
    pub fn set_delta(&mut self, delta: f64) {
        self.history.current_mut().delta = delta;
        self.next_delta = delta;
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    pub fn min_step(&self) -> f64 {
        self.min_step
    }

    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    /// Predicted solution of the probed timepoint.
    pub fn prediction(&self) -> &[f64] {
        &self.prediction
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    #[cfg(test)]
    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn rule(&self) -> &dyn IntegrationRule {
        self.rule.as_ref()
    }

    /// Split borrows used to build [`StateView`]s while loading.
    pub(crate) fn load_parts(
        &mut self,
    ) -> (&mut IntegrationState, &[IntegrationState], &Coefficients, &dyn IntegrationRule) {
        let (current, previous) = self.history.split_current_mut();
        (current, previous, &self.coefficients, self.rule.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{Method, TimeConfig};
    use approx::assert_relative_eq;

    fn method(config: &TimeConfig, charge: bool) -> (IntegrationMethod, Option<StateSlot>) {
        let mut states = StateAllocator::new();
        let slot = charge.then(|| states.allocate_derivative(true));
        let method = IntegrationMethod::new(config, 1e-3, 1e-12, 2, &states, vec![1]).unwrap();
        (method, slot)
    }

    #[test]
    fn test_lte_root() {
        assert_relative_eq!(lte_root(4.0, 1), 4.0);
        assert_relative_eq!(lte_root(4.0, 2), 2.0);
        assert_relative_eq!(lte_root(27.0, 3), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_initial_step_and_breakpoints() {
        let config = TimeConfig::new(1e-3, 1e-1);
        let (mut m, _) = method(&config, false);
        m.initialize(&[0.0, 1.0]).unwrap();
        assert_eq!(m.breakpoints().first(), 0.0);

        // min(stop / 50, step) / 10, divided again when leaving t = 0
        let delta = m.accept(&[0.0, 1.0]).unwrap();
        assert_relative_eq!(delta, 1e-5);
        assert_eq!(m.breakpoints().first(), 1e-1);
        assert_eq!(m.order(), 1);
    }

    #[test]
    fn test_probe_lands_on_breakpoint() {
        let config = TimeConfig::new(1e-3, 1e-2);
        let (mut m, _) = method(&config, false);
        m.initialize(&[0.0, 0.0]).unwrap();
        m.accept(&[0.0, 0.0]).unwrap();
        m.breakpoints_mut().set_breakpoint(2e-5).unwrap();

        let used = m.probe(5e-5);
        assert_eq!(m.time(), 2e-5);
        assert_relative_eq!(used, 2e-5);
    }

    #[test]
    fn test_first_step_is_always_accepted() {
        let config = TimeConfig::new(1e-3, 1e-2);
        let (mut m, _) = method(&config, true);
        m.initialize(&[0.0, 0.0]).unwrap();
        let delta = m.accept(&[0.0, 0.0]).unwrap();
        m.probe(delta);
        let evaluation = m.evaluate(&[0.0, 5.0]).unwrap();
        assert!(evaluation.accepted);
        assert_relative_eq!(evaluation.delta, delta);
    }

    #[test]
    fn test_large_charge_jump_is_rejected() {
        let config = TimeConfig::new(1e-3, 1e-2).with_method(Method::Gear);
        let (mut m, slot) = method(&config, true);
        let slot = slot.unwrap();
        m.initialize(&[0.0, 0.0]).unwrap();
        let mut delta = m.accept(&[0.0, 0.0]).unwrap();

        // Two smooth timepoints to get past the start-up step.
        for _ in 0..2 {
            m.probe(delta);
            let evaluation = m.evaluate(&[0.0, 0.0]).unwrap();
            assert!(evaluation.accepted);
            delta = m.accept(&[0.0, 0.0]).unwrap();
        }

        m.probe(delta);
        m.history_mut().current_mut().states[slot.0] = 1.0;
        let evaluation = m.evaluate(&[0.0, 0.0]).unwrap();
        assert!(!evaluation.accepted);
        assert!(evaluation.delta < delta);
    }

    #[test]
    fn test_non_convergence_cuts_step() {
        let config = TimeConfig::new(1e-3, 1e-2);
        let (mut m, _) = method(&config, false);
        m.initialize(&[0.0, 3.0]).unwrap();
        let delta = m.accept(&[0.0, 3.0]).unwrap();
        m.probe(delta);

        let mut solution = vec![0.0, 7.0];
        let retry = m.non_convergence(&mut solution).unwrap();
        assert_relative_eq!(retry, delta / 8.0);
        assert_eq!(solution, vec![0.0, 3.0]);
        assert_eq!(m.time(), m.base_time());
    }
}
