//! Newton-Raphson iteration and operating point convergence aids.

use crate::error::{EngineError, Result};
use crate::integration::IntegrationMethod;

use super::config::BiasingConfig;
use super::state::InitMode;
use super::system::NodalSystem;

/// Newton-Raphson controller.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    pub config: BiasingConfig,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new(BiasingConfig::default())
    }
}

impl NewtonRaphson {
    pub fn new(config: BiasingConfig) -> Self {
        Self { config }
    }

    /// Iterate until the solution converges.
    ///
    /// A linear system is solved once for an operating point. Otherwise
    /// convergence is never declared on the first iteration: behaviors
    /// store their states from the iterate they load, so a transient
    /// timepoint needs a second load at the solved point. During an
    /// operating point only a converged iteration in [`InitMode::Float`]
    /// ends the loop.
    ///
    /// Returns the number of iterations used.
    pub fn iterate(
        &self,
        system: &mut NodalSystem,
        mut method: Option<&mut IntegrationMethod>,
        max_iterations: usize,
    ) -> Result<usize> {
        let nonlinear = system.is_nonlinear();

        for iteration in 1..=max_iterations {
            system.load(method.as_deref_mut())?;
            // A singular matrix is a structural problem: no retry.
            system.factor_and_solve()?;
            system.stats_mut().iterations += 1;

            if !nonlinear && method.is_none() {
                system.check_finite()?;
                return Ok(iteration);
            }

            let converged = iteration > 1 && system.is_convergent(&self.config)?;
            if iteration == 1 {
                system.check_finite()?;
            }
            tracing::trace!(iteration, converged, mode = ?system.state().mode, "newton iteration");

            let state = system.state_mut();
            match state.mode {
                InitMode::Junction => {
                    state.mode = InitMode::Fix;
                    system.force_reorder();
                }
                InitMode::Fix => {
                    if converged {
                        state.mode = InitMode::Float;
                    }
                }
                InitMode::Float | InitMode::Transient => {
                    if converged {
                        return Ok(iteration);
                    }
                }
            }
        }

        Err(EngineError::convergence_failure(max_iterations))
    }

    /// Find the DC operating point.
    ///
    /// Plain iteration is tried first, then gmin stepping, then source
    /// stepping. Errors other than convergence failures abort immediately.
    pub fn operating_point(&self, system: &mut NodalSystem) -> Result<usize> {
        let _span = tracing::info_span!("operating_point").entered();
        let max = self.config.dc_max_iterations;

        let state = system.state_mut();
        state.mode = InitMode::Junction;
        state.diagonal_gmin = 0.0;
        state.source_factor = 1.0;

        let iterations = match self.iterate(system, None, max) {
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "operating point failed, trying gmin stepping");
                None
            }
            result => Some(result?),
        };
        if let Some(iterations) = iterations {
            system.stats_mut().op_iterations += iterations;
            return Ok(iterations);
        }

        if self.config.gmin_steps > 0 {
            match self.gmin_stepping(system) {
                Ok(iterations) => {
                    system.stats_mut().op_iterations += iterations;
                    return Ok(iterations);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "gmin stepping failed, trying source stepping");
                }
                Err(e) => return Err(e),
            }
        }

        if self.config.source_steps > 0 {
            match self.source_stepping(system) {
                Ok(iterations) => {
                    system.stats_mut().op_iterations += iterations;
                    return Ok(iterations);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "source stepping failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::NoOperatingPoint)
    }

    /// Shunt every node to ground and relax the shunt by decades.
    fn gmin_stepping(&self, system: &mut NodalSystem) -> Result<usize> {
        let steps = self.config.gmin_steps;
        let state = system.state_mut();
        state.reset();
        state.mode = InitMode::Junction;
        state.diagonal_gmin = self.config.gmin * 10f64.powi(steps as i32);

        let result = self.relax_gmin(system, steps);
        system.state_mut().diagonal_gmin = 0.0;
        result
    }

    fn relax_gmin(&self, system: &mut NodalSystem, steps: usize) -> Result<usize> {
        let max = self.config.dc_max_iterations;
        let mut total = 0;
        for _ in 0..=steps {
            tracing::debug!(gmin = system.state().diagonal_gmin, "gmin step");
            total += self.iterate(system, None, max)?;
            let state = system.state_mut();
            state.diagonal_gmin /= 10.0;
            state.mode = InitMode::Float;
        }
        system.state_mut().diagonal_gmin = 0.0;
        total += self.iterate(system, None, max)?;
        Ok(total)
    }

    /// Ramp the independent sources up from zero.
    fn source_stepping(&self, system: &mut NodalSystem) -> Result<usize> {
        let steps = self.config.source_steps;
        let state = system.state_mut();
        state.reset();
        state.mode = InitMode::Junction;
        state.source_factor = 0.0;

        let result = self.ramp_sources(system, steps);
        system.state_mut().source_factor = 1.0;
        result
    }

    fn ramp_sources(&self, system: &mut NodalSystem, steps: usize) -> Result<usize> {
        let max = self.config.dc_max_iterations;
        tracing::debug!(source_factor = 0.0, "source step");
        let mut total = self.iterate(system, None, max)?;
        for k in 1..=steps {
            let factor = 0.5f64.powi((steps - k) as i32);
            let state = system.state_mut();
            state.source_factor = factor;
            state.mode = InitMode::Float;
            tracing::debug!(source_factor = factor, "source step");
            total += self.iterate(system, None, max)?;
        }
        Ok(total)
    }
}
