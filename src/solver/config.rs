//! Simulation parameters.

use crate::algebra::{DEFAULT_ABSOLUTE_THRESHOLD, DEFAULT_RELATIVE_THRESHOLD};
use crate::error::{EngineError, Result};
use crate::integration::{Gear, IntegrationRule, Trapezoidal};

/// Parameters of the nonlinear solve shared by every analysis.
#[derive(Debug, Clone)]
pub struct BiasingConfig {
    /// Relative convergence tolerance.
    pub reltol: f64,
    /// Absolute tolerance on node voltages (volts).
    pub voltage_abstol: f64,
    /// Absolute tolerance on branch currents (amperes).
    pub current_abstol: f64,
    /// Minimum conductance devices put across their junctions.
    pub gmin: f64,
    /// Number of gmin stepping stages; zero disables gmin stepping.
    pub gmin_steps: usize,
    /// Number of source stepping stages; zero disables source stepping.
    pub source_steps: usize,
    /// Iteration limit for the operating point.
    pub dc_max_iterations: usize,
    /// Iteration limit for a transient timepoint.
    pub tran_max_iterations: usize,
    pub pivot_relative_threshold: f64,
    pub pivot_absolute_threshold: f64,
    /// Use a parallel executor when the circuit has several behavior groups.
    pub parallel: bool,
}

impl Default for BiasingConfig {
    fn default() -> Self {
        Self {
            reltol: 1e-3,
            voltage_abstol: 1e-6,
            current_abstol: 1e-12,
            gmin: 1e-12,
            gmin_steps: 10,
            source_steps: 10,
            dc_max_iterations: 100,
            tran_max_iterations: 10,
            pivot_relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            pivot_absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
            parallel: cfg!(feature = "parallel"),
        }
    }
}

impl BiasingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative and absolute convergence tolerances.
    pub fn with_tolerances(mut self, reltol: f64, voltage_abstol: f64, current_abstol: f64) -> Self {
        self.reltol = reltol;
        self.voltage_abstol = voltage_abstol;
        self.current_abstol = current_abstol;
        self
    }

    pub fn with_gmin(mut self, gmin: f64) -> Self {
        self.gmin = gmin;
        self
    }

    /// Set the number of gmin and source stepping stages.
    ///
    /// Zero disables the corresponding convergence aid.
    pub fn with_stepping(mut self, gmin_steps: usize, source_steps: usize) -> Self {
        self.gmin_steps = gmin_steps;
        self.source_steps = source_steps;
        self
    }

    /// Set the iteration limits for the operating point and for transient timepoints.
    pub fn with_max_iterations(mut self, dc: usize, transient: usize) -> Self {
        self.dc_max_iterations = dc;
        self.tran_max_iterations = transient;
        self
    }

    /// Set the pivot thresholds of the sparse solver.
    ///
    /// A relative threshold of 1.0 gives strict partial pivoting.
    pub fn with_pivot_thresholds(mut self, relative: f64, absolute: f64) -> Self {
        self.pivot_relative_threshold = relative;
        self.pivot_absolute_threshold = absolute;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the parameters for consistency.
    pub fn validate(&self) -> Result<()> {
        positive("reltol", self.reltol)?;
        positive("voltage_abstol", self.voltage_abstol)?;
        positive("current_abstol", self.current_abstol)?;
        if !(self.gmin >= 0.0) {
            return Err(EngineError::invalid_param(format!(
                "gmin must be non-negative, got {}",
                self.gmin
            )));
        }
        if self.dc_max_iterations == 0 || self.tran_max_iterations == 0 {
            return Err(EngineError::invalid_param(
                "iteration limits must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Integration formula family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Trapezoidal,
    Gear,
}

impl Method {
    pub fn rule(self) -> Box<dyn IntegrationRule> {
        match self {
            Method::Trapezoidal => Box::new(Trapezoidal),
            Method::Gear => Box::new(Gear),
        }
    }

    /// Highest order the formula family supports.
    pub fn max_order(self) -> usize {
        match self {
            Method::Trapezoidal => 2,
            Method::Gear => crate::integration::MAX_SUPPORTED_ORDER,
        }
    }
}

/// Parameters of a transient analysis.
#[derive(Debug, Clone)]
pub struct TimeConfig {
    /// First time that is reported to the listener.
    pub start: f64,
    pub stop: f64,
    /// Suggested output step.
    pub step: f64,
    /// Largest step; defaults to `min(step, (stop - start) / 50)`.
    pub max_step: Option<f64>,
    /// Smallest step; defaults to `stop * 1e-9`.
    pub min_step: Option<f64>,
    pub method: Method,
    pub max_order: usize,
    /// Truncation error overestimation factor.
    pub trtol: f64,
    pub lte_reltol: f64,
    pub lte_abstol: f64,
    /// Charge tolerance used by the state truncation error.
    pub chgtol: f64,
    /// Maximum growth of the step between two timepoints.
    pub expansion: f64,
    /// Skip the operating point and start from the device initial conditions.
    pub use_ic: bool,
    /// Also limit the step with the truncation error of node voltages.
    pub truncate_nodes: bool,
}

impl TimeConfig {
    /// Create a configuration for a sweep from 0 to `stop`.
    pub fn new(step: f64, stop: f64) -> Self {
        Self {
            start: 0.0,
            stop,
            step,
            max_step: None,
            min_step: None,
            method: Method::Trapezoidal,
            max_order: 2,
            trtol: 7.0,
            lte_reltol: 1e-3,
            lte_abstol: 1e-6,
            chgtol: 1e-14,
            expansion: 2.0,
            use_ic: false,
            truncate_nodes: false,
        }
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = Some(min_step);
        self
    }

    /// Select the integration method; the maximum order is clamped to what it supports.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self.max_order = self.max_order.min(method.max_order());
        self
    }

    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    pub fn with_trtol(mut self, trtol: f64) -> Self {
        self.trtol = trtol;
        self
    }

    pub fn with_use_ic(mut self, use_ic: bool) -> Self {
        self.use_ic = use_ic;
        self
    }

    pub fn with_truncate_nodes(mut self, truncate_nodes: bool) -> Self {
        self.truncate_nodes = truncate_nodes;
        self
    }

    pub fn effective_max_step(&self) -> f64 {
        self.max_step
            .unwrap_or_else(|| self.step.min((self.stop - self.start) / 50.0))
    }

    pub fn effective_min_step(&self) -> f64 {
        self.min_step.unwrap_or(self.stop * 1e-9)
    }

    /// Check the parameters for consistency.
    pub fn validate(&self) -> Result<()> {
        positive("step", self.step)?;
        positive("stop", self.stop)?;
        if !(self.start >= 0.0 && self.start < self.stop) {
            return Err(EngineError::invalid_param(format!(
                "start time {} must lie in [0, {})",
                self.start, self.stop
            )));
        }
        positive("max_step", self.effective_max_step())?;
        positive("min_step", self.effective_min_step())?;
        if self.effective_min_step() >= self.effective_max_step() {
            return Err(EngineError::invalid_param(
                "min_step must be smaller than max_step",
            ));
        }
        let max = self.method.max_order();
        if self.max_order == 0 || self.max_order > max {
            return Err(EngineError::InvalidOrder {
                order: self.max_order,
                max,
            });
        }
        positive("trtol", self.trtol)?;
        positive("lte_reltol", self.lte_reltol)?;
        positive("lte_abstol", self.lte_abstol)?;
        positive("chgtol", self.chgtol)?;
        if !(self.expansion > 1.0) {
            return Err(EngineError::invalid_param(format!(
                "expansion must exceed 1, got {}",
                self.expansion
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::invalid_param(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biasing_defaults() {
        let config = BiasingConfig::default();
        assert_eq!(config.reltol, 1e-3);
        assert_eq!(config.gmin_steps, 10);
        assert!(config.validate().is_ok());
        assert!(config.with_tolerances(0.0, 1e-6, 1e-12).validate().is_err());
    }

    #[test]
    fn test_derived_steps() {
        let config = TimeConfig::new(1e-3, 1e-2);
        assert_eq!(config.effective_max_step(), 1e-3f64.min(1e-2 / 50.0));
        assert_eq!(config.effective_min_step(), 1e-2 * 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_time_config() {
        assert!(TimeConfig::new(1e-3, -1.0).validate().is_err());
        assert!(TimeConfig::new(1e-3, 1.0).with_start(2.0).validate().is_err());
        assert!(matches!(
            TimeConfig::new(1e-3, 1.0).with_max_order(3).validate(),
            Err(EngineError::InvalidOrder { order: 3, max: 2 })
        ));
        assert!(TimeConfig::new(1e-3, 1.0)
            .with_method(Method::Gear)
            .with_max_order(6)
            .validate()
            .is_ok());
    }
}
