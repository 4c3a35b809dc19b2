//! Independent voltage and current sources.
//!
//! Source values are scaled by the source factor so source stepping can
//! ramp them up from zero.

use crate::algebra::{ElementId, RhsId, Stamp};
use crate::behavior::{AcceptContext, Behavior, BindContext, CurrentStamp, LoadContext};
use crate::error::{EngineError, Result};

/// Branch equation `V+ - V- = value` with its current as unknown.
#[derive(Debug, Clone, Copy, Default)]
struct SourceBranch {
    pos_branch: Option<ElementId>,
    neg_branch: Option<ElementId>,
    branch_pos: Option<ElementId>,
    branch_neg: Option<ElementId>,
    rhs: Option<RhsId>,
}

impl SourceBranch {
    fn bind(ctx: &mut BindContext<'_>, name: &str, nodes: &[String; 2]) -> Result<Self> {
        let pos = ctx.node(&nodes[0]);
        let neg = ctx.node(&nodes[1]);
        if pos == neg {
            return Err(EngineError::behavior(name, "source terminals are shorted"));
        }
        let branch = ctx.create_branch(name)?;
        Ok(Self {
            pos_branch: ctx.element(pos, branch)?,
            neg_branch: ctx.element(neg, branch)?,
            branch_pos: ctx.element(branch, pos)?,
            branch_neg: ctx.element(branch, neg)?,
            rhs: ctx.rhs(branch)?,
        })
    }

    fn load(&self, stamp: &mut dyn Stamp<f64>, value: f64) {
        stamp.stamp(self.pos_branch, 1.0);
        stamp.stamp(self.neg_branch, -1.0);
        stamp.stamp(self.branch_pos, 1.0);
        stamp.stamp(self.branch_neg, -1.0);
        stamp.stamp_rhs(self.rhs, value);
    }
}

/// A constant voltage source.
///
/// Its branch current, named after the source, flows from the positive
/// terminal through the source into the negative one.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    name: String,
    nodes: [String; 2], // [positive, negative]
    pub voltage: f64,
    branch: SourceBranch,
}

impl VoltageSource {
    pub fn new(name: &str, pos: &str, neg: &str, voltage: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            voltage,
            branch: SourceBranch::default(),
        }
    }
}

impl Behavior for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        self.branch = SourceBranch::bind(ctx, &self.name, &self.nodes)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        self.branch
            .load(ctx.stamp, self.voltage * ctx.source_factor);
        Ok(())
    }
}

/// A constant current source, driving current from the positive terminal
/// through the source into the negative one.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    name: String,
    nodes: [String; 2],
    pub current: f64,
    injection: CurrentStamp,
}

impl CurrentSource {
    pub fn new(name: &str, pos: &str, neg: &str, current: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            current,
            injection: CurrentStamp::default(),
        }
    }
}

impl Behavior for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        let pos = ctx.node(&self.nodes[0]);
        let neg = ctx.node(&self.nodes[1]);
        self.injection = CurrentStamp::bind(ctx, pos, neg)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        self.injection
            .load(ctx.stamp, self.current * ctx.source_factor);
        Ok(())
    }
}

/// A voltage source that ramps linearly from `initial` to `pulsed`
/// between `delay` and `delay + rise`.
///
/// Both corners of the ramp are registered as breakpoints.
#[derive(Debug, Clone)]
pub struct StepSource {
    name: String,
    nodes: [String; 2],
    pub initial: f64,
    pub pulsed: f64,
    pub delay: f64,
    pub rise: f64,
    branch: SourceBranch,
}

impl StepSource {
    pub fn new(name: &str, pos: &str, neg: &str, initial: f64, pulsed: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            initial,
            pulsed,
            delay: 0.0,
            rise: 0.0,
            branch: SourceBranch::default(),
        }
    }

    pub fn with_timing(mut self, delay: f64, rise: f64) -> Self {
        self.delay = delay;
        self.rise = rise;
        self
    }

    /// Source value at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        if time <= self.delay {
            self.initial
        } else if time >= self.delay + self.rise {
            self.pulsed
        } else {
            self.initial + (self.pulsed - self.initial) * (time - self.delay) / self.rise
        }
    }
}

impl Behavior for StepSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        if !(self.delay >= 0.0 && self.rise >= 0.0) {
            return Err(EngineError::behavior(
                &self.name,
                "delay and rise time must be non-negative",
            ));
        }
        self.branch = SourceBranch::bind(ctx, &self.name, &self.nodes)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let time = ctx.transient.as_ref().map_or(0.0, |t| t.time);
        self.branch
            .load(ctx.stamp, self.value_at(time) * ctx.source_factor);
        Ok(())
    }

    fn accept(&mut self, ctx: &mut AcceptContext<'_>) -> Result<()> {
        for corner in [self.delay, self.delay + self.rise] {
            if ctx.time < corner {
                ctx.breakpoints.set_breakpoint(corner)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_waveform() {
        let step = StepSource::new("V1", "a", "0", 0.0, 2.0).with_timing(1e-3, 1e-3);
        assert_eq!(step.value_at(0.0), 0.0);
        assert_eq!(step.value_at(1e-3), 0.0);
        assert_relative_eq!(step.value_at(1.5e-3), 1.0, epsilon = 1e-12);
        assert_eq!(step.value_at(5e-3), 2.0);
    }

    #[test]
    fn test_zero_rise_is_a_step() {
        let step = StepSource::new("V1", "a", "0", 1.0, 3.0).with_timing(1e-3, 0.0);
        assert_eq!(step.value_at(1e-3), 1.0);
        assert_eq!(step.value_at(1e-3 + 1e-12), 3.0);
    }
}
