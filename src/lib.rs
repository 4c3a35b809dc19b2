//! # Nodal Core
//!
//! The numerical engine of a circuit simulator.
//!
//! This library provides:
//! - A sparse linear system with an LU solver (Markowitz pivoting, real and complex)
//! - A Newton-Raphson controller with gmin and source stepping
//! - Variable-step, variable-order time integration (trapezoidal and Gear)
//!   with breakpoints and truncation error control
//!
//! ## Architecture
//!
//! - [`algebra`] - Sparse matrix, pivot search and direct solver
//! - [`circuit`] - Unknowns and behavior registration
//! - [`behavior`] - The interface device models implement
//! - [`components`] - Reference device behaviors (R, C, L, sources, diode)
//! - [`integration`] - Integration rules, history and breakpoints
//! - [`solver`] - Newton-Raphson controller and the analysis drivers
//!
//! ## Usage
//!
//! ```no_run
//! use std::ops::ControlFlow;
//! use nodal_core::components::{Capacitor, Resistor, VoltageSource};
//! use nodal_core::{Circuit, Simulator, TimeConfig};
//!
//! # fn main() -> nodal_core::Result<()> {
//! let mut circuit = Circuit::new();
//! circuit
//!     .add(VoltageSource::new("V1", "in", "0", 1.0))
//!     .add(Resistor::new("R1", "in", "out", 1e3))
//!     .add(Capacitor::new("C1", "out", "0", 1e-6));
//!
//! let mut sim = Simulator::new(circuit)?;
//! sim.operating_point()?;
//! sim.run_transient(TimeConfig::new(1e-5, 5e-3), |data| {
//!     println!("{} {}", data.time, data.value("out").unwrap_or(f64::NAN));
//!     ControlFlow::Continue(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Simulation Method
//!
//! Every timepoint is predicted from the history, corrected by Newton
//! iteration and then judged by the local truncation error:
//!
//! 1. Behaviors stamp their linearized contribution into the sparse system
//! 2. The system is factored and solved until the iterates converge
//! 3. The step is accepted or retried with a smaller step
//!
//! The library emits `tracing` events and spans but never installs a
//! subscriber.

pub mod algebra;
pub mod behavior;
pub mod circuit;
pub mod components;
pub mod error;
pub mod integration;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{EngineError, Result};
pub use solver::{BiasingConfig, Simulator, TimeConfig};

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
