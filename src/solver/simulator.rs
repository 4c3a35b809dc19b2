//! Main simulator interface.

use std::ops::ControlFlow;

use crate::circuit::{Circuit, VariableSet};
use crate::error::{EngineError, Result};
use crate::integration::{Evaluation, IntegrationMethod};

use super::config::{BiasingConfig, TimeConfig};
use super::newton::NewtonRaphson;
use super::state::InitMode;
use super::stats::Statistics;
use super::system::NodalSystem;

/// The main circuit simulator.
#[derive(Debug)]
pub struct Simulator {
    /// The bound circuit and its linear system
    system: NodalSystem,
    /// Newton-Raphson controller
    newton: NewtonRaphson,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Result<Self> {
        Self::with_config(circuit, BiasingConfig::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: BiasingConfig) -> Result<Self> {
        let system = NodalSystem::build(circuit, &config)?;
        Ok(Self {
            system,
            newton: NewtonRaphson::new(config),
        })
    }

    pub fn config(&self) -> &BiasingConfig {
        &self.newton.config
    }

    /// Solve the DC operating point. Returns the Newton iterations used.
    pub fn operating_point(&mut self) -> Result<usize> {
        self.newton.operating_point(&mut self.system)
    }

    /// Start a transient analysis that the caller steps through.
    ///
    /// Unless the configuration asks for initial conditions, the operating
    /// point is solved first. The returned stepper sits on the accepted
    /// timepoint `t = 0`.
    pub fn transient(&mut self, config: TimeConfig) -> Result<Transient<'_>> {
        config.validate()?;
        let biasing = &self.newton.config;
        let mut method = IntegrationMethod::new(
            &config,
            biasing.reltol,
            biasing.current_abstol,
            self.system.solution_len(),
            self.system.states(),
            self.system.voltage_rows().to_vec(),
        )?;

        if config.use_ic {
            self.system.state_mut().reset();
        } else {
            self.newton.operating_point(&mut self.system)?;
        }

        method.initialize(&self.system.state().solution)?;
        self.system.initialize_states(&mut method, config.use_ic)?;

        let mut transient = Transient {
            system: &mut self.system,
            newton: &self.newton,
            method,
        };
        transient.accept()?;
        Ok(transient)
    }

    /// Run a transient analysis to its stop time.
    ///
    /// `listener` receives every accepted timepoint from the start time on
    /// and may stop the sweep early by returning [`ControlFlow::Break`].
    pub fn run_transient<F>(&mut self, config: TimeConfig, mut listener: F) -> Result<()>
    where
        F: FnMut(&ExportData<'_>) -> ControlFlow<()>,
    {
        let _span = tracing::info_span!("transient", stop = config.stop).entered();
        let start = config.start;
        let mut transient = self.transient(config)?;

        if transient.time() >= start && listener(&transient.export()).is_break() {
            return Ok(());
        }
        while !transient.is_finished() {
            transient.step()?;
            if transient.time() >= start && listener(&transient.export()).is_break() {
                break;
            }
        }

        let stats = transient.statistics();
        tracing::info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            iterations = stats.transient_iterations,
            "transient finished"
        );
        Ok(())
    }

    /// Current solution, indexed by variable (ground at 0).
    pub fn solution(&self) -> &[f64] {
        &self.system.state().solution
    }

    /// Solution value of a named unknown.
    pub fn value(&self, name: &str) -> Result<f64> {
        self.system.value(name)
    }

    pub fn variables(&self) -> &VariableSet {
        self.system.variables()
    }

    pub fn statistics(&self) -> &Statistics {
        self.system.stats()
    }

    pub fn system(&self) -> &NodalSystem {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut NodalSystem {
        &mut self.system
    }
}

/// An accepted timepoint handed to a transient listener.
#[derive(Debug)]
pub struct ExportData<'a> {
    pub time: f64,
    /// Step that led to this timepoint.
    pub delta: f64,
    pub order: usize,
    pub solution: &'a [f64],
    variables: &'a VariableSet,
}

impl ExportData<'_> {
    /// Solution value of a named unknown.
    pub fn value(&self, name: &str) -> Result<f64> {
        let id = self.variables.get(name)?;
        Ok(self.solution[id.0])
    }
}

/// A running transient analysis.
///
/// [`step`](Self::step) advances by one accepted timepoint. Callers that
/// need control over each phase use [`probe`](Self::probe),
/// [`correct`](Self::correct), [`evaluate`](Self::evaluate),
/// [`accept`](Self::accept) and [`non_convergence`](Self::non_convergence)
/// directly.
#[derive(Debug)]
pub struct Transient<'s> {
    system: &'s mut NodalSystem,
    newton: &'s NewtonRaphson,
    method: IntegrationMethod,
}

impl Transient<'_> {
    /// Set up the next timepoint; the prediction becomes the starting guess.
    ///
    /// Returns the step actually used.
    pub fn probe(&mut self, delta: f64) -> f64 {
        let delta = self.method.probe(delta);
        let state = self.system.state_mut();
        state.solution.copy_from_slice(self.method.prediction());
        state.mode = InitMode::Transient;
        self.system.stats_mut().timepoints += 1;
        delta
    }

    /// Solve the probed timepoint. Returns the Newton iterations used.
    pub fn correct(&mut self) -> Result<usize> {
        let max = self.newton.config.tran_max_iterations;
        let before = self.system.stats().iterations;
        let result = self.newton.iterate(self.system, Some(&mut self.method), max);
        let stats = self.system.stats_mut();
        stats.transient_iterations += stats.iterations - before;
        result
    }

    /// Check the truncation error of the corrected timepoint.
    pub fn evaluate(&mut self) -> Result<Evaluation> {
        let evaluation = self.method.evaluate(&self.system.state().solution)?;
        if !evaluation.accepted {
            self.system.stats_mut().rejected += 1;
        }
        Ok(evaluation)
    }

    /// Roll back a timepoint that did not converge. Returns the step to retry with.
    pub fn non_convergence(&mut self) -> Result<f64> {
        self.system.stats_mut().rejected += 1;
        self.method
            .non_convergence(&mut self.system.state_mut().solution)
    }

    /// Commit the timepoint. Returns the next step.
    pub fn accept(&mut self) -> Result<f64> {
        self.system.accept(&mut self.method)?;
        let delta = self.method.accept(&self.system.state().solution)?;
        self.system.stats_mut().accepted += 1;
        Ok(delta)
    }

    /// Advance to the next accepted timepoint.
    pub fn step(&mut self) -> Result<()> {
        if self.is_finished() {
            return Err(EngineError::invalid_param(
                "transient analysis already reached its stop time",
            ));
        }
        let mut delta = self.method.delta();
        loop {
            self.probe(delta);
            match self.correct() {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    delta = self.non_convergence()?;
                    continue;
                }
                Err(e) => return Err(e),
            }
            let evaluation = self.evaluate()?;
            if evaluation.accepted {
                self.accept()?;
                return Ok(());
            }
            delta = evaluation.delta;
        }
    }

    /// Whether the stop time was reached.
    pub fn is_finished(&self) -> bool {
        self.method.time() + self.method.min_step() >= self.method.stop()
    }

    /// Time of the last accepted timepoint.
    pub fn time(&self) -> f64 {
        self.method.time()
    }

    pub fn solution(&self) -> &[f64] {
        &self.system.state().solution
    }

    pub fn value(&self, name: &str) -> Result<f64> {
        self.system.value(name)
    }

    pub fn method(&self) -> &IntegrationMethod {
        &self.method
    }

    pub fn method_mut(&mut self) -> &mut IntegrationMethod {
        &mut self.method
    }

    pub fn statistics(&self) -> &Statistics {
        self.system.stats()
    }

    /// Snapshot of the current timepoint for listeners.
    pub fn export(&self) -> ExportData<'_> {
        ExportData {
            time: self.method.time(),
            delta: self.method.history().get(1).delta,
            order: self.method.order(),
            solution: &self.system.state().solution,
            variables: self.system.variables(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Capacitor, Resistor, VoltageSource};
    use approx::assert_relative_eq;

    fn rc() -> Circuit {
        let mut circuit = Circuit::new();
        circuit
            .add(VoltageSource::new("V1", "in", "0", 1.0))
            .add(Resistor::new("R1", "in", "out", 1e3))
            .add(Capacitor::new("C1", "out", "0", 1e-6).with_initial_condition(0.0));
        circuit
    }

    #[test]
    fn test_operating_point_ignores_capacitor() {
        let mut sim = Simulator::new(rc()).unwrap();
        assert_eq!(sim.operating_point().unwrap(), 1);
        assert_relative_eq!(sim.value("out").unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rc_charging_curve() {
        let mut sim = Simulator::new(rc()).unwrap();
        let config = TimeConfig::new(1e-5, 5e-3).with_use_ic(true);
        let mut samples = Vec::new();
        sim.run_transient(config, |data| {
            samples.push((data.time, data.value("out").unwrap()));
            ControlFlow::Continue(())
        })
        .unwrap();

        let (last_time, _) = *samples.last().unwrap();
        assert_relative_eq!(last_time, 5e-3);
        for &(t, v) in samples.iter().filter(|(t, _)| *t > 1e-4) {
            let expected = 1.0 - (-t / 1e-3).exp();
            assert!((v - expected).abs() < 5e-3, "t = {t}: {v} vs {expected}");
        }
        assert!(sim.statistics().accepted > 10);
    }

    #[test]
    fn test_linear_timepoint_stores_solved_charge() {
        let mut sim = Simulator::new(rc()).unwrap();
        let mut transient = sim
            .transient(TimeConfig::new(1e-5, 5e-3).with_use_ic(true))
            .unwrap();

        for _ in 0..5 {
            let mut delta = transient.method().delta();
            loop {
                transient.probe(delta);
                // One load at the prediction, one at the solved point.
                assert_eq!(transient.correct().unwrap(), 2);
                let evaluation = transient.evaluate().unwrap();
                if evaluation.accepted {
                    break;
                }
                delta = evaluation.delta;
            }
            transient.accept().unwrap();

            let v = transient.value("out").unwrap();
            let charge = transient.method().history().get(1).states[0];
            assert_relative_eq!(charge, 1e-6 * v, max_relative = 1e-9);
        }
        assert!(transient.value("out").unwrap() > 0.0);
    }

    #[test]
    fn test_listener_can_stop_the_sweep() {
        let mut sim = Simulator::new(rc()).unwrap();
        let config = TimeConfig::new(1e-5, 5e-3).with_use_ic(true);
        let mut count = 0;
        sim.run_transient(config, |_| {
            count += 1;
            if count == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_step_after_stop_is_an_error() {
        let mut sim = Simulator::new(rc()).unwrap();
        let mut transient = sim
            .transient(TimeConfig::new(1e-4, 1e-3).with_use_ic(true))
            .unwrap();
        while !transient.is_finished() {
            transient.step().unwrap();
        }
        assert!(transient.step().is_err());
    }
}
