//! Nonlinear solver and analysis drivers.
//!
//! A [`NodalSystem`] owns the bound circuit and its sparse matrix. The
//! [`NewtonRaphson`] controller iterates it to convergence, stepping gmin
//! or the sources when the operating point is hard to find. The
//! [`Simulator`] ties both to the time integration for transient analysis.
//!
//! Each Newton iteration:
//!
//! 1. Clears the matrix and lets every behavior stamp its linearization
//! 2. Factors and solves the system, keeping the previous iterate
//! 3. Compares the two iterates and asks nonlinear behaviors to confirm

mod config;
mod newton;
mod simulator;
mod state;
mod stats;
mod system;

pub use config::{BiasingConfig, Method, TimeConfig};
pub use newton::NewtonRaphson;
pub use simulator::{ExportData, Simulator, Transient};
pub use state::{BiasingState, InitMode};
pub use stats::Statistics;
pub use system::NodalSystem;
