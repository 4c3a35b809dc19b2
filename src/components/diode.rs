//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt)). The junction voltage is
//! limited between iterations so the exponential cannot run away, and gmin
//! is added in parallel with the junction.

use crate::behavior::{
    Behavior, BindContext, ConductanceStamp, ConvergenceContext, CurrentStamp, LoadContext,
};
use crate::circuit::VariableId;
use crate::error::{EngineError, Result};
use crate::solver::InitMode;
use crate::THERMAL_VOLTAGE;

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self { is: 1e-14, n: 1.0 }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self { is: 1e-9, n: 1.5 }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }

    /// Voltage above which the junction voltage is limited.
    pub fn v_crit(&self) -> f64 {
        let n_vt = self.n_vt();
        n_vt * (n_vt / (std::f64::consts::SQRT_2 * self.is)).ln()
    }
}

/// A junction diode from anode to cathode.
#[derive(Debug, Clone)]
pub struct Diode {
    name: String,
    nodes: [String; 2], // [anode, cathode]
    pub params: DiodeParams,
    terminals: [VariableId; 2],
    conductance: ConductanceStamp,
    current: CurrentStamp,
    /// Junction voltage, current and conductance of the last load.
    v_op: f64,
    i_op: f64,
    g_op: f64,
}

impl Diode {
    pub fn new(name: &str, anode: &str, cathode: &str, params: DiodeParams) -> Self {
        Self {
            name: name.to_string(),
            nodes: [anode.to_string(), cathode.to_string()],
            params,
            terminals: [VariableId::GROUND; 2],
            conductance: ConductanceStamp::default(),
            current: CurrentStamp::default(),
            v_op: 0.0,
            i_op: 0.0,
            g_op: 0.0,
        }
    }

    /// Junction current and conductance at `v`, gmin excluded.
    pub fn evaluate(&self, v: f64) -> (f64, f64) {
        let n_vt = self.params.n_vt();
        let is = self.params.is;
        if v >= -3.0 * n_vt {
            let e = (v / n_vt).exp();
            (is * (e - 1.0), is * e / n_vt)
        } else {
            // Smooth reverse region
            let arg = 3.0 * n_vt / (v * std::f64::consts::E);
            let arg = arg * arg * arg;
            (-is * (1.0 + arg), is * 3.0 * arg / v)
        }
    }

    /// Junction voltage seen by the model at the current iterate.
    fn junction_voltage(&self, ctx: &LoadContext<'_>) -> f64 {
        let v_crit = self.params.v_crit();
        match ctx.mode {
            InitMode::Junction => v_crit,
            _ => {
                let v = ctx.value(self.terminals[0]) - ctx.value(self.terminals[1]);
                limit_junction(v, self.v_op, self.params.n_vt(), v_crit)
            }
        }
    }
}

/// Limit the change of a pn-junction voltage between iterations.
pub fn limit_junction(v_new: f64, v_old: f64, n_vt: f64, v_crit: f64) -> f64 {
    if v_new > v_crit && (v_new - v_old).abs() > 2.0 * n_vt {
        if v_old > 0.0 {
            let arg = 1.0 + (v_new - v_old) / n_vt;
            if arg > 0.0 {
                v_old + n_vt * arg.ln()
            } else {
                v_crit
            }
        } else {
            n_vt * (v_new / n_vt).ln()
        }
    } else {
        v_new
    }
}

impl Behavior for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()> {
        if !(self.params.is > 0.0 && self.params.n > 0.0) {
            return Err(EngineError::behavior(
                &self.name,
                "saturation current and ideality factor must be positive",
            ));
        }
        let anode = ctx.node(&self.nodes[0]);
        let cathode = ctx.node(&self.nodes[1]);
        self.terminals = [anode, cathode];
        self.conductance = ConductanceStamp::bind(ctx, anode, cathode)?;
        self.current = CurrentStamp::bind(ctx, anode, cathode)?;
        Ok(())
    }

    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()> {
        let v = self.junction_voltage(ctx);
        let (i, g) = self.evaluate(v);
        let i = i + ctx.gmin * v;
        let g = g + ctx.gmin;
        self.v_op = v;
        self.i_op = i;
        self.g_op = g;

        // I = G * V + I_eq
        let i_eq = i - g * v;
        self.conductance.load(ctx.stamp, g);
        self.current.load(ctx.stamp, i_eq);
        Ok(())
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn is_convergent(&self, ctx: &ConvergenceContext<'_>) -> bool {
        let v = ctx.solution[self.terminals[0].0] - ctx.solution[self.terminals[1].0];
        let predicted = self.i_op + self.g_op * (v - self.v_op);
        let tol = ctx.reltol * predicted.abs().max(self.i_op.abs()) + ctx.current_abstol;
        (predicted - self.i_op).abs() <= tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diode_forward_bias() {
        let d = Diode::new("D1", "a", "0", DiodeParams::default());

        // At 0V, current should be approximately 0
        assert!(d.evaluate(0.0).0.abs() < 1e-10);

        // At forward bias, current should increase exponentially
        let i_small = d.evaluate(0.3).0;
        let i_large = d.evaluate(0.6).0;
        assert!(i_large > i_small * 100.0);
    }

    #[test]
    fn test_diode_reverse_bias() {
        let d = Diode::new("D1", "a", "0", DiodeParams::default());

        // In reverse bias, current should approach -Is
        let (i_rev, g_rev) = d.evaluate(-1.0);
        assert!(i_rev < 0.0);
        assert!(i_rev > -2.0 * d.params.is);
        assert!(g_rev > 0.0);
    }

    #[test]
    fn test_conductance_matches_slope() {
        let d = Diode::new("D1", "a", "0", DiodeParams::default());
        let h = 1e-7;
        let (i1, g) = d.evaluate(0.55);
        let (i2, _) = d.evaluate(0.55 + h);
        assert_relative_eq!((i2 - i1) / h, g, max_relative = 1e-4);
    }

    #[test]
    fn test_junction_limiting() {
        let p = DiodeParams::default();
        let v_crit = p.v_crit();
        // Small steps pass through unchanged
        assert_eq!(limit_junction(0.61, 0.6, p.n_vt(), v_crit), 0.61);
        // A large forward jump is compressed logarithmically
        let limited = limit_junction(5.0, 0.6, p.n_vt(), v_crit);
        assert!(limited > 0.6 && limited < 1.0);
    }
}
