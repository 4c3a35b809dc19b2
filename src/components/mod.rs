//! Reference device behaviors.
//!
//! This module provides the devices used to exercise the engine:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source, Step Source
//! - Nonlinear: Diode
//!
//! Each component implements [`Behavior`](crate::behavior::Behavior) and
//! stamps its contribution through the element handles it kept at bind time.

mod diode;
mod linear;
mod sources;

pub use diode::{limit_junction, Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, StepSource, VoltageSource};
