//! Variable step Gear (backward differentiation) formulas of order 1 to 6.

use super::history::History;
use super::{Coefficients, IntegrationRule, MAX_SUPPORTED_ORDER};

const N: usize = MAX_SUPPORTED_ORDER + 1;

/// Error constants of the backward differentiation formulas.
const LTE_FACTORS: [f64; MAX_SUPPORTED_ORDER] = [
    0.5,
    0.222_222_222_2,
    0.136_363_636_4,
    0.096,
    0.072_992_700_73,
    0.058_309_037_90,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Gear;

/// Solve `mat * x = rhs` in place for the leading `n` x `n` block.
///
/// The systems are tiny Vandermonde matrices, so plain Gaussian elimination
/// with partial pivoting is enough.
fn solve_dense(mat: &mut [[f64; N]; N], rhs: &mut [f64], n: usize) {
    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&a, &b| mat[a][k].abs().total_cmp(&mat[b][k].abs()))
            .unwrap_or(k);
        if pivot != k {
            mat.swap(pivot, k);
            rhs.swap(pivot, k);
        }
        let diagonal = mat[k][k];
        if diagonal == 0.0 {
            continue;
        }
        for i in k + 1..n {
            let factor = mat[i][k] / diagonal;
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                mat[i][j] -= factor * mat[k][j];
            }
            rhs[i] -= factor * rhs[k];
        }
    }
    for k in (0..n).rev() {
        let mut sum = rhs[k];
        for j in k + 1..n {
            sum -= mat[k][j] * rhs[j];
        }
        rhs[k] = if mat[k][k] == 0.0 { 0.0 } else { sum / mat[k][k] };
    }
}

/// Fill rows `1..=order` with powers of the normalized time offsets.
fn vandermonde(order: usize, offsets: &[f64], delta: f64) -> [[f64; N]; N] {
    let mut mat = [[0.0; N]; N];
    for (i, &offset) in offsets.iter().enumerate().take(order + 1) {
        mat[0][i] = 1.0;
        let mut power = 1.0;
        for row in mat.iter_mut().take(order + 1).skip(1) {
            power *= offset / delta;
            row[i] = power;
        }
    }
    mat
}

impl IntegrationRule for Gear {
    fn name(&self) -> &'static str {
        "gear"
    }

    fn max_order(&self) -> usize {
        MAX_SUPPORTED_ORDER
    }

    fn compute_coefficients(&self, order: usize, deltas: &[f64], coefficients: &mut Coefficients) {
        let delta = deltas[0];
        coefficients.reset(order, delta);

        // Corrector: offsets of the timepoints used by the formula.
        let mut offsets = [0.0; N];
        for i in 1..=order {
            offsets[i] = offsets[i - 1] + deltas[i - 1];
        }
        let mut mat = vandermonde(order, &offsets, delta);
        coefficients.ag[1] = -1.0 / delta;
        solve_dense(&mut mat, &mut coefficients.ag, order + 1);

        // Predictor: extrapolate from the accepted timepoints only.
        let mut sum = 0.0;
        for (i, offset) in offsets.iter_mut().enumerate().take(order + 1) {
            sum += deltas[i];
            *offset = sum;
        }
        let mut mat = vandermonde(order, &offsets, delta);
        coefficients.agp[0] = 1.0;
        solve_dense(&mut mat, &mut coefficients.agp, order + 1);
    }

    fn derivative(&self, c: &Coefficients, values: &[f64], _previous_derivative: f64) -> f64 {
        c.ag
            .iter()
            .zip(values)
            .take(c.order + 1)
            .map(|(a, q)| a * q)
            .sum()
    }

    fn predict(&self, c: &Coefficients, history: &History, prediction: &mut [f64]) {
        prediction.iter_mut().for_each(|p| *p = 0.0);
        for (k, &weight) in c.agp.iter().enumerate().take(c.order + 1) {
            let solution = &history.get(k + 1).solution;
            for (p, x) in prediction.iter_mut().zip(solution) {
                *p += weight * x;
            }
        }
    }

    fn lte_factor(&self, order: usize) -> f64 {
        LTE_FACTORS[order.clamp(1, MAX_SUPPORTED_ORDER) - 1]
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
        let delsum: f64 = (0..=c.order).map(|i| history.get(i).delta).sum();
        let ratio = (tol * trtol * delsum / (diff * delta)).abs();
        let root = match c.order {
            1 => ratio.sqrt(),
            order => (ratio.ln() / (order + 1) as f64).exp(),
        };
        root * delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_order_is_backward_euler() {
        let mut c = Coefficients::default();
        let deltas = [0.1, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2];
        Gear.compute_coefficients(1, &deltas, &mut c);
        assert_relative_eq!(c.ag[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(c.ag[1], -10.0, epsilon = 1e-12);
        assert_relative_eq!(c.agp[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(c.agp[1], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_second_order_uniform_step() {
        // BDF2: q' = (3 q0 - 4 q1 + q2) / (2h)
        let mut c = Coefficients::default();
        Gear.compute_coefficients(2, &[0.5; 8], &mut c);
        assert_relative_eq!(c.ag[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(c.ag[1], -4.0, epsilon = 1e-12);
        assert_relative_eq!(c.ag[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_is_exact_for_polynomials() {
        let mut c = Coefficients::default();
        let deltas = [0.1, 0.15, 0.2, 0.1, 0.1, 0.1, 0.1, 0.1];
        Gear.compute_coefficients(3, &deltas, &mut c);

        // q(t) = t^3 sampled at t = 1, 0.9, 0.75, 0.55
        let times = [1.0f64, 0.9, 0.75, 0.55];
        let values: Vec<f64> = times.iter().map(|t| t.powi(3)).collect();
        let d = Gear.derivative(&c, &values, 0.0);
        assert_relative_eq!(d, 3.0, epsilon = 1e-9);
    }
}
