//! Error types for the nodal simulation engine.
//!
//! This module provides a unified error type [`EngineError`] that covers
//! all error conditions that can occur while building the linear system,
//! factoring it, iterating the nonlinear equations and integrating in time.

use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ============ Algebra Errors ============
    /// Matrix or vector index out of range (indices start at 1)
    #[error("Invalid matrix index ({row}, {column}) - indices start at 1")]
    InvalidIndex { row: usize, column: usize },

    /// No acceptable pivot could be found
    #[error("Singular matrix at index {index}")]
    SingularMatrix { index: usize },

    /// Solve requested without a successful factorization
    #[error("Cannot solve: the matrix has not been factored")]
    NotFactored,

    /// Vector passed to a solve has the wrong length
    #[error("Vector of length {actual} does not match system size {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    // ============ Convergence Errors ============
    /// Newton-Raphson iteration did not converge
    #[error("Newton-Raphson did not converge after {iterations} iterations")]
    ConvergenceFailure { iterations: usize },

    /// All convergence aids failed to find an operating point
    #[error("Could not find an operating point: gmin and source stepping failed")]
    NoOperatingPoint,

    /// The solution contains a value that is not a number
    #[error("Solution of variable '{variable}' is not a number")]
    NotANumber { variable: String },

    // ============ Integration Errors ============
    /// The timestep dropped below the minimum step
    #[error("Timestep too small at t = {time:.6e}s (delta = {delta:.3e}s)")]
    TimestepTooSmall { time: f64, delta: f64 },

    /// Requested integration order is not supported
    #[error("Integration order {order} is not supported (maximum {max})")]
    InvalidOrder { order: usize, max: usize },

    /// Breakpoint lies in the past or is not finite
    #[error("Invalid breakpoint at t = {time:.6e}s")]
    InvalidBreakpoint { time: f64 },

    // ============ Circuit Errors ============
    /// Variable name not found
    #[error("Variable '{name}' not found")]
    UnknownVariable { name: String },

    /// Variable was declared twice
    #[error("Duplicate variable '{name}'")]
    DuplicateVariable { name: String },

    /// Behavior name used twice
    #[error("Duplicate behavior name '{name}'")]
    DuplicateBehavior { name: String },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    /// A behavior reported an error while binding or loading
    #[error("Behavior '{name}': {message}")]
    Behavior { name: String, message: String },

    // ============ Input Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },
}

impl EngineError {
    /// Create a singular matrix error
    pub fn singular(index: usize) -> Self {
        Self::SingularMatrix { index }
    }

    /// Create a convergence failure error
    pub fn convergence_failure(iterations: usize) -> Self {
        Self::ConvergenceFailure { iterations }
    }

    /// Create an invalid parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a behavior error
    pub fn behavior(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Behavior {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether a transient analysis may retry the timepoint with a smaller step.
    ///
    /// Structural algebra errors and input errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConvergenceFailure { .. } | Self::NotANumber { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::singular(3);
        assert_eq!(err.to_string(), "Singular matrix at index 3");

        let err = EngineError::convergence_failure(100);
        assert!(err.to_string().contains("100 iterations"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(EngineError::convergence_failure(10).is_recoverable());
        assert!(!EngineError::singular(1).is_recoverable());
        assert!(!EngineError::NotFactored.is_recoverable());
    }
}
