//! Interface between the engine and device models.
//!
//! A behavior binds to its unknowns once, keeping the element handles it
//! needs, and then loads its linearized contribution on every Newton
//! iteration. Device equations live entirely in the behaviors; the engine
//! only sees matrix additions, state slots and convergence votes.

use crate::algebra::{ElementId, RhsId, SparseSolver, Stamp};
use crate::circuit::{VariableId, VariableSet};
use crate::error::Result;
use crate::integration::{Breakpoints, HistorySlot, StateAllocator, StateSlot, StateView};
use crate::solver::InitMode;

/// A device contribution to the circuit equations.
pub trait Behavior: Send {
    /// Unique instance name.
    fn name(&self) -> &str;

    /// Create unknowns, reserve matrix elements and state slots.
    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<()>;

    /// Add the linearized contribution at the current iterate.
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<()>;

    /// Whether the contribution depends on the solution.
    fn is_nonlinear(&self) -> bool {
        false
    }

    /// Device-specific convergence test, run after the generic one passed.
    fn is_convergent(&self, _ctx: &ConvergenceContext<'_>) -> bool {
        true
    }

    /// Seed the state slots before the first timepoint.
    fn initialize_states(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after every accepted timepoint.
    fn accept(&mut self, _ctx: &mut AcceptContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Setup access handed to [`Behavior::bind`].
pub struct BindContext<'a> {
    variables: &'a mut VariableSet,
    solver: &'a mut SparseSolver<f64>,
    states: &'a mut StateAllocator,
}

impl<'a> BindContext<'a> {
    pub(crate) fn new(
        variables: &'a mut VariableSet,
        solver: &'a mut SparseSolver<f64>,
        states: &'a mut StateAllocator,
    ) -> Self {
        Self {
            variables,
            solver,
            states,
        }
    }

    /// Node voltage unknown, created on first use.
    pub fn node(&mut self, name: &str) -> VariableId {
        self.variables.node(name)
    }

    /// New branch current unknown.
    pub fn create_branch(&mut self, name: &str) -> Result<VariableId> {
        self.variables.create_branch(name)
    }

    /// Matrix element handle, `None` when either side is ground.
    pub fn element(&mut self, row: VariableId, column: VariableId) -> Result<Option<ElementId>> {
        match (row.index(), column.index()) {
            (Some(r), Some(c)) => self.solver.get_element(r, c).map(Some),
            _ => Ok(None),
        }
    }

    /// Right-hand side handle, `None` for ground.
    pub fn rhs(&mut self, row: VariableId) -> Result<Option<RhsId>> {
        match row.index() {
            Some(r) => self.solver.rhs_element(r).map(Some),
            None => Ok(None),
        }
    }

    /// Reserve a state whose derivative is integrated.
    pub fn allocate_derivative(&mut self, track: bool) -> StateSlot {
        self.states.allocate_derivative(track)
    }

    /// Reserve a state that only keeps history.
    pub fn allocate_history(&mut self) -> HistorySlot {
        self.states.allocate_history()
    }
}

/// Transient part of a [`LoadContext`].
pub struct TransientContext<'a> {
    /// Time of the timepoint being solved.
    pub time: f64,
    pub states: StateView<'a>,
}

/// Everything a behavior sees while loading.
pub struct LoadContext<'a> {
    pub stamp: &'a mut dyn Stamp<f64>,
    /// Current iterate, indexed by [`VariableId`].
    pub solution: &'a [f64],
    pub mode: InitMode,
    /// Junction conductance floor.
    pub gmin: f64,
    /// Scale applied to independent sources.
    pub source_factor: f64,
    /// Present during transient timepoints.
    pub transient: Option<TransientContext<'a>>,
}

impl LoadContext<'_> {
    /// Solution value of an unknown; ground reads as zero.
    pub fn value(&self, id: VariableId) -> f64 {
        self.solution[id.0]
    }
}

/// Data for [`Behavior::is_convergent`].
pub struct ConvergenceContext<'a> {
    pub solution: &'a [f64],
    pub reltol: f64,
    pub voltage_abstol: f64,
    pub current_abstol: f64,
}

/// Data for [`Behavior::initialize_states`].
pub struct InitContext<'a> {
    /// Starting solution; behaviors may write initial branch values.
    pub solution: &'a mut [f64],
    pub states: StateView<'a>,
    /// Whether the sweep starts from initial conditions instead of an
    /// operating point.
    pub use_ic: bool,
}

/// Data for [`Behavior::accept`].
pub struct AcceptContext<'a> {
    pub time: f64,
    pub solution: &'a [f64],
    pub breakpoints: &'a mut Breakpoints,
}

/// Handles for a two-terminal conductance between `pos` and `neg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConductanceStamp {
    pp: Option<ElementId>,
    pn: Option<ElementId>,
    np: Option<ElementId>,
    nn: Option<ElementId>,
}

impl ConductanceStamp {
    pub fn bind(ctx: &mut BindContext<'_>, pos: VariableId, neg: VariableId) -> Result<Self> {
        Ok(Self {
            pp: ctx.element(pos, pos)?,
            pn: ctx.element(pos, neg)?,
            np: ctx.element(neg, pos)?,
            nn: ctx.element(neg, neg)?,
        })
    }

    /// Add conductance `g` between the two terminals.
    pub fn load(&self, stamp: &mut dyn Stamp<f64>, g: f64) {
        stamp.stamp(self.pp, g);
        stamp.stamp(self.nn, g);
        stamp.stamp(self.pn, -g);
        stamp.stamp(self.np, -g);
    }
}

/// Handles for a current injected between two terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentStamp {
    pos: Option<RhsId>,
    neg: Option<RhsId>,
}

impl CurrentStamp {
    pub fn bind(ctx: &mut BindContext<'_>, pos: VariableId, neg: VariableId) -> Result<Self> {
        Ok(Self {
            pos: ctx.rhs(pos)?,
            neg: ctx.rhs(neg)?,
        })
    }

    /// Current `i` flowing through the device from `pos` to `neg`.
    pub fn load(&self, stamp: &mut dyn Stamp<f64>, i: f64) {
        stamp.stamp_rhs(self.pos, -i);
        stamp.stamp_rhs(self.neg, i);
    }
}
