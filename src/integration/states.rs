//! Device state slots.
//!
//! Behaviors reserve their slots while binding. Allocation is a single
//! build-time pass, after which every timepoint of the history carries one
//! contiguous state vector. Slots reserved by the behaviors of one group are
//! contiguous too, which lets groups load in parallel on disjoint slices.

use super::history::IntegrationState;
use super::{Coefficients, IntegrationRule, MAX_SUPPORTED_ORDER};

/// A state whose time derivative is computed by the integration method.
///
/// Occupies two slots: the value and its derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateSlot(pub(crate) usize);

/// A state that only keeps history, without a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistorySlot(pub(crate) usize);

/// Build-time allocator for state slots.
#[derive(Debug, Clone, Default)]
pub struct StateAllocator {
    count: usize,
    truncatable: Vec<StateSlot>,
}

impl StateAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a value and its derivative.
    ///
    /// Tracked states take part in the local truncation error estimate.
    pub fn allocate_derivative(&mut self, track: bool) -> StateSlot {
        let slot = StateSlot(self.count);
        self.count += 2;
        if track {
            self.truncatable.push(slot);
        }
        slot
    }

    /// Reserve a value that is only kept in history.
    pub fn allocate_history(&mut self) -> HistorySlot {
        let slot = HistorySlot(self.count);
        self.count += 1;
        slot
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// States that take part in truncation.
    pub fn truncatable(&self) -> &[StateSlot] {
        &self.truncatable
    }
}

/// Companion model contribution of an integrated state.
///
/// The time derivative of the state, linearized around the current
/// solution, is `jacobian * x + rhs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Companion {
    pub jacobian: f64,
    pub rhs: f64,
}

/// View on the states of one behavior group at the timepoint being solved.
pub struct StateView<'a> {
    offset: usize,
    current: &'a mut [f64],
    previous: &'a [IntegrationState],
    coefficients: &'a Coefficients,
    rule: &'a dyn IntegrationRule,
}

impl<'a> StateView<'a> {
    pub(crate) fn new(
        offset: usize,
        current: &'a mut [f64],
        previous: &'a [IntegrationState],
        coefficients: &'a Coefficients,
        rule: &'a dyn IntegrationRule,
    ) -> Self {
        Self {
            offset,
            current,
            previous,
            coefficients,
            rule,
        }
    }

    fn local(&self, index: usize) -> usize {
        index - self.offset
    }

    /// Current value of a state.
    pub fn value(&self, slot: StateSlot) -> f64 {
        self.current[self.local(slot.0)]
    }

    pub fn set_value(&mut self, slot: StateSlot, value: f64) {
        let i = self.local(slot.0);
        self.current[i] = value;
    }

    /// Current derivative of a state, as computed by the last [`integrate`](Self::integrate).
    pub fn derivative(&self, slot: StateSlot) -> f64 {
        self.current[self.local(slot.0) + 1]
    }

    /// Value `back` accepted timepoints ago (`back >= 1`).
    pub fn previous_value(&self, slot: StateSlot, back: usize) -> f64 {
        self.previous[back - 1].states[slot.0]
    }

    pub fn previous_derivative(&self, slot: StateSlot, back: usize) -> f64 {
        self.previous[back - 1].states[slot.0 + 1]
    }

    pub fn history(&self, slot: HistorySlot) -> f64 {
        self.current[self.local(slot.0)]
    }

    pub fn set_history(&mut self, slot: HistorySlot, value: f64) {
        let i = self.local(slot.0);
        self.current[i] = value;
    }

    pub fn previous_history(&self, slot: HistorySlot, back: usize) -> f64 {
        self.previous[back - 1].states[slot.0]
    }

    /// Derivative of the current value with respect to the unknown of the
    /// integrated equation (`ag[0]`).
    pub fn slope(&self) -> f64 {
        self.coefficients.ag[0]
    }

    /// Compute and store the time derivative of a state.
    pub fn integrate(&mut self, slot: StateSlot) -> f64 {
        let mut values = [0.0; MAX_SUPPORTED_ORDER + 1];
        values[0] = self.value(slot);
        let order = self.coefficients.order.min(self.previous.len());
        for (back, value) in values.iter_mut().enumerate().take(order + 1).skip(1) {
            *value = self.previous_value(slot, back);
        }
        let previous_derivative = self.previous_derivative(slot, 1);
        let derivative = self
            .rule
            .derivative(self.coefficients, &values, previous_derivative);
        let i = self.local(slot.0) + 1;
        self.current[i] = derivative;
        derivative
    }

    /// Integrate a state and return its companion model.
    ///
    /// `capacitance` is `dq/dx` evaluated at the controlling unknown `x`.
    pub fn companion(&mut self, slot: StateSlot, capacitance: f64, x: f64) -> Companion {
        let derivative = self.integrate(slot);
        let jacobian = self.slope() * capacitance;
        Companion {
            jacobian,
            rhs: derivative - jacobian * x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_contiguous() {
        let mut alloc = StateAllocator::new();
        let q = alloc.allocate_derivative(true);
        let h = alloc.allocate_history();
        let q2 = alloc.allocate_derivative(false);
        assert_eq!((q.0, h.0, q2.0), (0, 2, 3));
        assert_eq!(alloc.len(), 5);
        assert_eq!(alloc.truncatable(), &[q]);
    }
}
