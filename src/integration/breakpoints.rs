//! Times the integrator has to land on exactly.

use crate::error::{EngineError, Result};

/// Ordered set of breakpoints.
///
/// The set always ends with `+inf`, so [`first`](Self::first) is defined
/// even when every finite breakpoint was consumed. Points closer than the
/// minimum spacing to an existing one are merged into it.
#[derive(Debug, Clone)]
pub struct Breakpoints {
    points: Vec<f64>,
    min_spacing: f64,
    first: f64,
    delta: f64,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Breakpoints {
    pub fn new(min_spacing: f64) -> Self {
        let mut breakpoints = Self {
            points: Vec::new(),
            min_spacing,
            first: 0.0,
            delta: f64::INFINITY,
        };
        breakpoints.clear();
        breakpoints
    }

    pub fn min_spacing(&self) -> f64 {
        self.min_spacing
    }

    pub fn set_min_spacing(&mut self, min_spacing: f64) {
        self.min_spacing = min_spacing;
    }

    /// Reset to `{0, +inf}`.
    pub fn clear(&mut self) {
        self.points.clear();
        self.points.push(0.0);
        self.points.push(f64::INFINITY);
        self.update();
    }

    /// Next breakpoint.
    pub fn first(&self) -> f64 {
        self.first
    }

    /// Distance between the next two breakpoints.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Number of finite breakpoints.
    pub fn len(&self) -> usize {
        self.points.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a breakpoint.
    pub fn set_breakpoint(&mut self, time: f64) -> Result<()> {
        if !time.is_finite() || time < 0.0 {
            return Err(EngineError::InvalidBreakpoint { time });
        }
        let position = self.points.partition_point(|&p| p < time);
        let near = |p: Option<&f64>| p.is_some_and(|&p| (p - time).abs() <= self.min_spacing);
        if near(self.points.get(position))
            || (position > 0 && near(self.points.get(position - 1)))
        {
            return Ok(());
        }
        self.points.insert(position, time);
        self.update();
        Ok(())
    }

    /// Remove the first breakpoint. The `+inf` sentinel is never removed.
    pub fn clear_breakpoint(&mut self) {
        if self.points.len() > 1 {
            self.points.remove(0);
            self.update();
        }
    }

    fn update(&mut self) {
        self.first = self.points[0];
        self.delta = match self.points.get(1) {
            Some(&next) => next - self.first,
            None => f64::INFINITY,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_insert_and_cache() {
        let mut bp = Breakpoints::new(1e-12);
        bp.set_breakpoint(3.0).unwrap();
        bp.set_breakpoint(1.0).unwrap();
        assert_eq!(bp.first(), 0.0);
        assert_eq!(bp.delta(), 1.0);

        bp.clear_breakpoint();
        assert_eq!(bp.first(), 1.0);
        assert_eq!(bp.delta(), 2.0);

        bp.clear_breakpoint();
        bp.clear_breakpoint();
        assert_eq!(bp.first(), f64::INFINITY);
        bp.clear_breakpoint();
        assert_eq!(bp.first(), f64::INFINITY);
    }

    #[test]
    fn test_close_points_are_merged() {
        let mut bp = Breakpoints::new(1e-6);
        bp.set_breakpoint(1.0).unwrap();
        bp.set_breakpoint(1.0 + 1e-9).unwrap();
        bp.set_breakpoint(1.0 - 1e-9).unwrap();
        assert_eq!(bp.len(), 2);
    }

    #[test]
    fn test_invalid_breakpoints() {
        let mut bp = Breakpoints::new(0.0);
        assert!(bp.set_breakpoint(f64::NAN).is_err());
        assert!(bp.set_breakpoint(-1.0).is_err());
        assert!(bp.set_breakpoint(f64::INFINITY).is_err());
    }
}
