//! Trapezoidal rule.
//!
//! Order 1 is backward Euler, order 2 the trapezoidal rule proper. The
//! predictor is a divided difference extrapolation (order 1) or a variable
//! step Adams-Bashforth formula (order 2).

use super::history::History;
use super::{Coefficients, IntegrationRule};

/// Weighting between the current and previous derivative at order 2.
const XMU: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct Trapezoidal;

impl IntegrationRule for Trapezoidal {
    fn name(&self) -> &'static str {
        "trapezoidal"
    }

    fn max_order(&self) -> usize {
        2
    }

    fn compute_coefficients(&self, order: usize, deltas: &[f64], coefficients: &mut Coefficients) {
        let delta = deltas[0];
        coefficients.reset(order, delta);
        match order {
            1 => {
                coefficients.ag[0] = 1.0 / delta;
                coefficients.ag[1] = -1.0 / delta;
            }
            _ => {
                coefficients.ag[0] = 1.0 / delta / (1.0 - XMU);
                coefficients.ag[1] = XMU / (1.0 - XMU);
            }
        }
    }

    fn derivative(&self, c: &Coefficients, values: &[f64], previous_derivative: f64) -> f64 {
        match c.order {
            1 => c.ag[0] * values[0] + c.ag[1] * values[1],
            _ => -previous_derivative * c.ag[1] + c.ag[0] * (values[0] - values[1]),
        }
    }

    fn predict(&self, c: &Coefficients, history: &History, prediction: &mut [f64]) {
        let delta = history.get(0).delta;
        let x1 = &history.get(1).solution;
        let x2 = &history.get(2).solution;
        let delta1 = history.get(1).delta;

        match c.order {
            1 => {
                for (i, p) in prediction.iter_mut().enumerate() {
                    let dd0 = (x1[i] - x2[i]) / delta1;
                    *p = x1[i] + delta * dd0;
                }
            }
            _ => {
                let x3 = &history.get(3).solution;
                let delta2 = history.get(2).delta;
                let b = -delta / (2.0 * delta1);
                let a = 1.0 - b;
                for (i, p) in prediction.iter_mut().enumerate() {
                    let dd0 = (x1[i] - x2[i]) / delta1;
                    let dd1 = (x2[i] - x3[i]) / delta2;
                    *p = x1[i] + (b * dd1 + a * dd0) * delta;
                }
            }
        }
    }

    fn lte_factor(&self, order: usize) -> f64 {
        match order {
            1 => 0.5,
            _ => 0.083_333_333_3,
        }
    }

    fn truncate_node(
        &self,
        c: &Coefficients,
        history: &History,
        diff: f64,
        tol: f64,
        trtol: f64,
    ) -> f64 {
        if diff == 0.0 {
            return f64::INFINITY;
        }
        let delta = c.delta;
        match c.order {
            1 => delta * (2.0 * trtol * tol / diff).abs().sqrt(),
            _ => {
                let ratio = history.get(1).delta / delta;
                let deriv = diff * 4.0 / (1.0 + ratio * ratio);
                delta * (12.0 * trtol * tol / deriv).abs().cbrt()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_order_two_coefficients() {
        let mut c = Coefficients::default();
        Trapezoidal.compute_coefficients(2, &[0.1, 0.1, 0.1, 0.1], &mut c);
        assert_relative_eq!(c.ag[0], 20.0);
        assert_relative_eq!(c.ag[1], 1.0);

        // q = t^2 with q'(0.1) = 0.2 previously: exact for the trapezoidal rule
        let d = Trapezoidal.derivative(&c, &[0.04, 0.01], 0.2);
        assert_relative_eq!(d, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_prediction() {
        let mut history = History::new(4, 2, 0);
        history.current_mut().solution[1] = 1.0;
        history.cycle();
        history.current_mut().solution[1] = 2.0;
        history.cycle();
        for (entry, delta) in history.iter_mut().zip([0.5, 1.0]) {
            entry.delta = delta;
        }

        let c = Coefficients {
            order: 1,
            ..Coefficients::default()
        };
        let mut prediction = vec![0.0; 2];
        Trapezoidal.predict(&c, &history, &mut prediction);
        // slope 1 per unit time, extrapolated over half a unit
        assert_relative_eq!(prediction[1], 2.5);
    }
}
