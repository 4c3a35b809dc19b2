//! Markowitz pivot selection.
//!
//! A candidate pivot must be numerically acceptable: its magnitude exceeds
//! the absolute threshold and is at least `relative_threshold` times the
//! largest magnitude in the unreduced part of its column. Among acceptable
//! candidates the one with the smallest Markowitz product
//! `(row count - 1) * (column count - 1)` wins, which bounds the fill-in the
//! elimination step can create. Ties prefer the larger magnitude relative to
//! the column maximum.
//!
//! Setting the relative threshold to 1.0 turns this into partial pivoting
//! on the largest entry with fill-in as the tie breaker.

use super::matrix::{ElementId, SparseMatrix};
use super::scalar::Scalar;
use super::translation::Translation;

/// Default relative pivot threshold.
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 1e-3;

/// Default absolute pivot threshold.
pub const DEFAULT_ABSOLUTE_THRESHOLD: f64 = 1e-13;

/// Largest Markowitz product that is tracked exactly.
const MAX_MARKOWITZ_COUNT: usize = 46340;

/// Pivot search state.
#[derive(Debug, Clone)]
pub struct Markowitz {
    pub relative_threshold: f64,
    pub absolute_threshold: f64,
    row_count: Vec<usize>,
    column_count: Vec<usize>,
}

impl Default for Markowitz {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
struct Candidate {
    element: ElementId,
    product: usize,
    ratio: f64,
}

impl Candidate {
    fn is_better_than(&self, other: &Option<Candidate>) -> bool {
        match other {
            None => true,
            Some(best) => {
                self.product < best.product
                    || (self.product == best.product && self.ratio > best.ratio)
            }
        }
    }
}

impl Markowitz {
    pub fn new() -> Self {
        Self {
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
            row_count: Vec::new(),
            column_count: Vec::new(),
        }
    }

    /// Count the structural elements of the unreduced submatrix starting at `step`.
    pub fn count<T: Scalar>(
        &mut self,
        matrix: &SparseMatrix<T>,
        rows: &Translation,
        columns: &Translation,
        step: usize,
    ) {
        let size = matrix.size();
        self.row_count.clear();
        self.row_count.resize(size + 1, 0);
        self.column_count.clear();
        self.column_count.resize(size + 1, 0);

        for s in step..=size {
            let row = rows.index(s);
            self.row_count[row] = matrix
                .row_elements(row)
                .filter(|&id| columns.step(matrix.column(id)) >= step)
                .count();
            let column = columns.index(s);
            self.column_count[column] = matrix
                .column_elements(column)
                .filter(|&id| rows.step(matrix.row(id)) >= step)
                .count();
        }
    }

    /// Remove the pivot row and column from the counts.
    pub fn eliminated(&mut self, lower_rows: &[usize], upper_columns: &[usize]) {
        for &row in lower_rows {
            self.row_count[row] = self.row_count[row].saturating_sub(1);
        }
        for &column in upper_columns {
            self.column_count[column] = self.column_count[column].saturating_sub(1);
        }
    }

    /// Account for a fill-in created at (`row`, `column`).
    pub fn fillin(&mut self, row: usize, column: usize) {
        self.row_count[row] += 1;
        self.column_count[column] += 1;
    }

    fn product(&self, row: usize, column: usize) -> usize {
        let r = self.row_count[row].saturating_sub(1);
        let c = self.column_count[column].saturating_sub(1);
        if r > MAX_MARKOWITZ_COUNT || c > MAX_MARKOWITZ_COUNT {
            usize::MAX
        } else {
            (r * c).min(MAX_MARKOWITZ_COUNT * MAX_MARKOWITZ_COUNT)
        }
    }

    fn column_maximum<T: Scalar>(
        matrix: &SparseMatrix<T>,
        rows: &Translation,
        column: usize,
        step: usize,
    ) -> f64 {
        matrix
            .column_elements(column)
            .filter(|&id| rows.step(matrix.row(id)) >= step)
            .map(|id| matrix.value(id).magnitude())
            .fold(0.0, f64::max)
    }

    /// Check whether `element` is still an acceptable pivot at `step`.
    pub fn is_valid_pivot<T: Scalar>(
        &self,
        matrix: &SparseMatrix<T>,
        rows: &Translation,
        element: ElementId,
        step: usize,
    ) -> bool {
        let magnitude = matrix.value(element).magnitude();
        if !(magnitude > self.absolute_threshold) {
            return false;
        }
        let largest = Self::column_maximum(matrix, rows, matrix.column(element), step);
        magnitude >= self.relative_threshold * largest
    }

    fn candidate<T: Scalar>(
        &self,
        matrix: &SparseMatrix<T>,
        rows: &Translation,
        element: ElementId,
        step: usize,
    ) -> Option<Candidate> {
        let magnitude = matrix.value(element).magnitude();
        if !(magnitude > self.absolute_threshold) {
            return None;
        }
        let largest = Self::column_maximum(matrix, rows, matrix.column(element), step);
        if magnitude < self.relative_threshold * largest {
            return None;
        }
        Some(Candidate {
            element,
            product: self.product(matrix.row(element), matrix.column(element)),
            ratio: magnitude / largest,
        })
    }

    /// Search the unreduced submatrix for the best pivot at `step`.
    ///
    /// This is threshold Markowitz pivoting: among the entries that pass
    /// the relative and absolute thresholds the one with the smallest
    /// Markowitz product wins, not the one with the largest magnitude.
    ///
    /// Diagonal entries are tried first; a diagonal singleton is taken
    /// immediately. The whole submatrix is searched only when no diagonal
    /// entry is acceptable.
    pub fn find_pivot<T: Scalar>(
        &self,
        matrix: &SparseMatrix<T>,
        rows: &Translation,
        columns: &Translation,
        step: usize,
    ) -> Option<ElementId> {
        let size = matrix.size();
        let mut best: Option<Candidate> = None;

        for s in step..=size {
            let Some(diagonal) = matrix.find(rows.index(s), columns.index(s)) else {
                continue;
            };
            if let Some(candidate) = self.candidate(matrix, rows, diagonal, step) {
                if candidate.product == 0 {
                    return Some(candidate.element);
                }
                if candidate.is_better_than(&best) {
                    best = Some(candidate);
                }
            }
        }
        if let Some(best) = best {
            return Some(best.element);
        }

        for s in step..=size {
            let column = columns.index(s);
            for id in matrix.column_elements(column) {
                if rows.step(matrix.row(id)) < step {
                    continue;
                }
                if let Some(candidate) = self.candidate(matrix, rows, id, step) {
                    if candidate.is_better_than(&best) {
                        best = Some(candidate);
                    }
                }
            }
        }
        best.map(|c| c.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(entries: &[(usize, usize, f64)]) -> (SparseMatrix<f64>, Translation, Translation) {
        let mut m = SparseMatrix::new();
        for &(r, c, v) in entries {
            let id = m.get_or_create(r, c);
            *m.value_mut(id) = v;
        }
        let mut rows = Translation::new();
        let mut columns = Translation::new();
        rows.ensure(m.size());
        columns.ensure(m.size());
        (m, rows, columns)
    }

    #[test]
    fn test_prefers_sparse_diagonal() {
        // Row 1 is dense, row 2 holds a singleton on the diagonal.
        let (m, rows, columns) = setup(&[
            (1, 1, 4.0),
            (1, 2, 1.0),
            (1, 3, 1.0),
            (2, 2, 2.0),
            (3, 1, 1.0),
            (3, 3, 3.0),
        ]);
        let mut mk = Markowitz::new();
        mk.count(&m, &rows, &columns, 1);
        let pivot = mk.find_pivot(&m, &rows, &columns, 1).unwrap();
        assert_eq!((m.row(pivot), m.column(pivot)), (2, 2));
    }

    #[test]
    fn test_rejects_small_relative_pivot() {
        let (m, rows, columns) = setup(&[(1, 1, 1e-9), (2, 1, 1.0), (1, 2, 1.0), (2, 2, 1e-9)]);
        let mut mk = Markowitz::new();
        mk.count(&m, &rows, &columns, 1);
        let pivot = mk.find_pivot(&m, &rows, &columns, 1).unwrap();
        assert_ne!(m.row(pivot), m.column(pivot));
        assert!(!mk.is_valid_pivot(&m, &rows, m.find(1, 1).unwrap(), 1));
    }

    #[test]
    fn test_no_pivot_in_zero_matrix() {
        let (m, rows, columns) = setup(&[(1, 1, 0.0), (2, 2, 0.0)]);
        let mut mk = Markowitz::new();
        mk.count(&m, &rows, &columns, 1);
        assert!(mk.find_pivot(&m, &rows, &columns, 1).is_none());
    }
}
