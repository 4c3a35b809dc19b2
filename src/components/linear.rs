//! Linear passive components: Resistor, Capacitor, Inductor.

use crate::algebra::{ElementId, RhsId};
use crate::behavior::{
    Behavior, BindContext, ConductanceStamp, CurrentStamp, InitContext, LoadContext,
};
use crate::circuit::VariableId;
use crate::error::{EngineError, Result};
use crate::integration::StateSlot;

/// A resistor between two nodes.
#[derive(Debug, Clone)]
pub struct Resistor {
    name: String,
    nodes: [String; 2], // [positive, negative]
    pub resistance: f64,
    conductance: ConductanceStamp,
}

impl Resistor {
    pub fn new(name: &str, pos: &str, neg: &str, resistance: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            resistance,
            conductance: ConductanceStamp::default(),
        }
    }
}

impl Behavior for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        if !(self.resistance > 0.0) {
            return Err(EngineError::behavior(
                &self.name,
                format!("resistance must be positive, got {}", self.resistance),
            ));
        }
        let pos = ctx.node(&self.nodes[0]);
        let neg = ctx.node(&self.nodes[1]);
        self.conductance = ConductanceStamp::bind(ctx, pos, neg)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        self.conductance.load(ctx.stamp, 1.0 / self.resistance);
        Ok(())
    }
}

/// A capacitor. Open in the operating point; its charge is integrated
/// during a transient sweep.
#[derive(Debug, Clone)]
pub struct Capacitor {
    name: String,
    nodes: [String; 2],
    pub capacitance: f64,
    /// Voltage across the capacitor at `t = 0` when starting from
    /// initial conditions.
    pub initial_condition: Option<f64>,
    terminals: [VariableId; 2],
    conductance: ConductanceStamp,
    current: CurrentStamp,
    charge: Option<StateSlot>,
}

impl Capacitor {
    pub fn new(name: &str, pos: &str, neg: &str, capacitance: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            capacitance,
            initial_condition: None,
            terminals: [VariableId::GROUND; 2],
            conductance: ConductanceStamp::default(),
            current: CurrentStamp::default(),
            charge: None,
        }
    }

    pub fn with_initial_condition(mut self, voltage: f64) -> Self {
        self.initial_condition = Some(voltage);
        self
    }

    fn charge(&self) -> Result<StateSlot> {
        self.charge
            .ok_or_else(|| EngineError::behavior(&self.name, "capacitor is not bound"))
    }
}

impl Behavior for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        if !(self.capacitance >= 0.0) {
            return Err(EngineError::behavior(
                &self.name,
                format!("capacitance must be non-negative, got {}", self.capacitance),
            ));
        }
        let pos = ctx.node(&self.nodes[0]);
        let neg = ctx.node(&self.nodes[1]);
        self.terminals = [pos, neg];
        self.conductance = ConductanceStamp::bind(ctx, pos, neg)?;
        self.current = CurrentStamp::bind(ctx, pos, neg)?;
        self.charge = Some(ctx.allocate_derivative(true));
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let charge = self.charge()?;
        let v = ctx.value(self.terminals[0]) - ctx.value(self.terminals[1]);
        let Some(transient) = ctx.transient.as_mut() else {
            return Ok(());
        };
        transient.states.set_value(charge, self.capacitance * v);
        let companion = transient.states.companion(charge, self.capacitance, v);
        self.conductance.load(ctx.stamp, companion.jacobian);
        self.current.load(ctx.stamp, companion.rhs);
        Ok(())
    }

    fn initialize_states(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        let charge = self.charge()?;
        let v = match self.initial_condition {
            Some(ic) if ctx.use_ic => ic,
            _ => ctx.solution[self.terminals[0].0] - ctx.solution[self.terminals[1].0],
        };
        ctx.states.set_value(charge, self.capacitance * v);
        Ok(())
    }
}

/// An inductor. Its branch current is an unknown of the system; the flux
/// is integrated during a transient sweep and it is a short in the
/// operating point.
#[derive(Debug, Clone)]
pub struct Inductor {
    name: String,
    nodes: [String; 2],
    pub inductance: f64,
    /// Current through the inductor at `t = 0` when starting from
    /// initial conditions.
    pub initial_condition: Option<f64>,
    branch: VariableId,
    pos_branch: Option<ElementId>,
    neg_branch: Option<ElementId>,
    branch_pos: Option<ElementId>,
    branch_neg: Option<ElementId>,
    branch_branch: Option<ElementId>,
    branch_rhs: Option<RhsId>,
    flux: Option<StateSlot>,
}

impl Inductor {
    pub fn new(name: &str, pos: &str, neg: &str, inductance: f64) -> Self {
        Self {
            name: name.to_string(),
            nodes: [pos.to_string(), neg.to_string()],
            inductance,
            initial_condition: None,
            branch: VariableId::GROUND,
            pos_branch: None,
            neg_branch: None,
            branch_pos: None,
            branch_neg: None,
            branch_branch: None,
            branch_rhs: None,
            flux: None,
        }
    }

    pub fn with_initial_condition(mut self, current: f64) -> Self {
        self.initial_condition = Some(current);
        self
    }

    fn flux(&self) -> Result<StateSlot> {
        self.flux
            .ok_or_else(|| EngineError::behavior(&self.name, "inductor is not bound"))
    }
}

impl Behavior for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        if !(self.inductance >= 0.0) {
            return Err(EngineError::behavior(
                &self.name,
                format!("inductance must be non-negative, got {}", self.inductance),
            ));
        }
        let pos = ctx.node(&self.nodes[0]);
        let neg = ctx.node(&self.nodes[1]);
        let branch = ctx.create_branch(&self.name)?;
        self.branch = branch;
        self.pos_branch = ctx.element(pos, branch)?;
        self.neg_branch = ctx.element(neg, branch)?;
        self.branch_pos = ctx.element(branch, pos)?;
        self.branch_neg = ctx.element(branch, neg)?;
        self.branch_branch = ctx.element(branch, branch)?;
        self.branch_rhs = ctx.rhs(branch)?;
        self.flux = Some(ctx.allocate_derivative(true));
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let flux = self.flux()?;
        let stamp = &mut *ctx.stamp;
        stamp.stamp(self.pos_branch, 1.0);
        stamp.stamp(self.neg_branch, -1.0);
        stamp.stamp(self.branch_pos, 1.0);
        stamp.stamp(self.branch_neg, -1.0);

        let i = ctx.solution[self.branch.0];
        if let Some(transient) = ctx.transient.as_mut() {
            transient.states.set_value(flux, self.inductance * i);
            let companion = transient.states.companion(flux, self.inductance, i);
            stamp.stamp(self.branch_branch, -companion.jacobian);
            stamp.stamp_rhs(self.branch_rhs, companion.rhs);
        }
        Ok(())
    }

    fn initialize_states(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        let flux = self.flux()?;
        let i = match self.initial_condition {
            Some(ic) if ctx.use_ic => {
                ctx.solution[self.branch.0] = ic;
                ic
            }
            _ => ctx.solution[self.branch.0],
        };
        ctx.states.set_value(flux, self.inductance * i);
        Ok(())
    }
}
