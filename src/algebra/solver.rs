//! Sparse LU solver.
//!
//! The matrix is factored in place as `P A Q = L U` with `U` unit upper
//! triangular. The reciprocal of each pivot is stored on its diagonal
//! element, the multipliers of `L` below it and the scaled rows of `U` to
//! its right. Pivots found by a reordering are reused by later
//! factorizations as long as they stay numerically acceptable.

use super::markowitz::Markowitz;
use super::matrix::{ElementId, SparseMatrix};
use super::scalar::Scalar;
use super::translation::Translation;
use crate::error::{EngineError, Result};

/// Handle to a right-hand side entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RhsId(pub(crate) usize);

/// Sparse linear system `A x = b` with an LU factorization.
#[derive(Debug, Clone)]
pub struct SparseSolver<T> {
    matrix: SparseMatrix<T>,
    rhs: Vec<T>,
    rows: Translation,
    columns: Translation,
    markowitz: Markowitz,
    pivots: Vec<Option<ElementId>>,
    intermediate: Vec<T>,
    lower: Vec<ElementId>,
    upper: Vec<ElementId>,
    factored: bool,
    ordered: bool,
    needs_reorder: bool,
    reorderings: usize,
}

impl<T: Scalar> Default for SparseSolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> SparseSolver<T> {
    /// Create an empty solver.
    pub fn new() -> Self {
        Self {
            matrix: SparseMatrix::new(),
            rhs: vec![T::zero()],
            rows: Translation::new(),
            columns: Translation::new(),
            markowitz: Markowitz::new(),
            pivots: vec![None],
            intermediate: vec![T::zero()],
            lower: Vec::new(),
            upper: Vec::new(),
            factored: false,
            ordered: false,
            needs_reorder: true,
            reorderings: 0,
        }
    }

    /// Set the relative and absolute pivot thresholds.
    pub fn set_pivot_thresholds(&mut self, relative: f64, absolute: f64) -> Result<()> {
        if !(relative > 0.0 && relative <= 1.0) {
            return Err(EngineError::invalid_param(format!(
                "relative pivot threshold must lie in (0, 1], got {relative}"
            )));
        }
        if !(absolute >= 0.0) {
            return Err(EngineError::invalid_param(format!(
                "absolute pivot threshold must be non-negative, got {absolute}"
            )));
        }
        self.markowitz.relative_threshold = relative;
        self.markowitz.absolute_threshold = absolute;
        Ok(())
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.matrix.size()
    }

    /// Underlying matrix, for inspection.
    pub fn matrix(&self) -> &SparseMatrix<T> {
        &self.matrix
    }

    /// Whether the last factorization succeeded and the matrix was not
    /// modified structurally since.
    pub fn is_factored(&self) -> bool {
        self.factored
    }

    /// Number of times a (partial) reordering was performed.
    pub fn reorderings(&self) -> usize {
        self.reorderings
    }

    /// Request a complete reordering on the next factorization.
    pub fn force_reorder(&mut self) {
        self.needs_reorder = true;
    }

    fn grow(&mut self, size: usize) {
        if size <= self.matrix.size() {
            return;
        }
        self.matrix.resize(size);
        self.rows.ensure(size);
        self.columns.ensure(size);
        self.rhs.resize(size + 1, T::zero());
        self.intermediate.resize(size + 1, T::zero());
        self.pivots.resize(size + 1, None);
        self.needs_reorder = true;
        self.factored = false;
    }

    /// Get the element at (`row`, `column`), allocating it on first access.
    pub fn get_element(&mut self, row: usize, column: usize) -> Result<ElementId> {
        if row == 0 || column == 0 {
            return Err(EngineError::InvalidIndex { row, column });
        }
        self.grow(row.max(column));
        if let Some(id) = self.matrix.find(row, column) {
            return Ok(id);
        }
        self.needs_reorder = true;
        self.factored = false;
        Ok(self.matrix.get_or_create(row, column))
    }

    /// Find an element without allocating.
    pub fn find_element(&self, row: usize, column: usize) -> Option<ElementId> {
        self.matrix.find(row, column)
    }

    /// Get a handle to a right-hand side entry.
    pub fn rhs_element(&mut self, row: usize) -> Result<RhsId> {
        if row == 0 {
            return Err(EngineError::InvalidIndex { row, column: 0 });
        }
        self.grow(row);
        Ok(RhsId(row))
    }

    pub fn add(&mut self, element: ElementId, value: T) {
        *self.matrix.value_mut(element) += value;
    }

    pub fn subtract(&mut self, element: ElementId, value: T) {
        *self.matrix.value_mut(element) -= value;
    }

    pub fn add_rhs(&mut self, rhs: RhsId, value: T) {
        self.rhs[rhs.0] += value;
    }

    pub fn subtract_rhs(&mut self, rhs: RhsId, value: T) {
        self.rhs[rhs.0] -= value;
    }

    /// Current value of an element.
    pub fn value(&self, element: ElementId) -> T {
        self.matrix.value(element)
    }

    /// Current right-hand side value of a row (zero for ground).
    pub fn rhs_value(&self, row: usize) -> T {
        self.rhs.get(row).copied().unwrap_or_else(T::zero)
    }

    /// Reset matrix and right-hand side to zero, keeping the structure.
    pub fn clear(&mut self) {
        self.matrix.clear();
        for value in &mut self.rhs {
            *value = T::zero();
        }
        self.factored = false;
    }

    /// Factor the matrix.
    ///
    /// Reuses the previous pivot order while every pivot remains acceptable
    /// and reorders from the first step where one does not.
    pub fn factor(&mut self) -> Result<()> {
        self.factored = false;
        let size = self.matrix.size();
        if size == 0 {
            self.factored = true;
            return Ok(());
        }

        let mut step = 1;
        if self.ordered && !self.needs_reorder {
            while step <= size {
                let pivot = self
                    .matrix
                    .find(self.rows.index(step), self.columns.index(step));
                match pivot {
                    Some(pivot)
                        if self
                            .markowitz
                            .is_valid_pivot(&self.matrix, &self.rows, pivot, step) =>
                    {
                        self.eliminate(step, pivot);
                        step += 1;
                    }
                    _ => break,
                }
            }
            if step > size {
                self.factored = true;
                return Ok(());
            }
            tracing::debug!(step, "pivot no longer acceptable, reordering");
        } else {
            self.ensure_diagonals();
        }

        self.reorderings += 1;
        self.markowitz
            .count(&self.matrix, &self.rows, &self.columns, step);
        while step <= size {
            match self
                .markowitz
                .find_pivot(&self.matrix, &self.rows, &self.columns, step)
            {
                Some(pivot) => {
                    self.move_pivot(step, pivot);
                    self.eliminate(step, pivot);
                    step += 1;
                }
                None => {
                    self.ordered = false;
                    self.needs_reorder = true;
                    return Err(EngineError::singular(self.singular_index(step)));
                }
            }
        }

        self.ordered = true;
        self.needs_reorder = false;
        self.factored = true;
        Ok(())
    }

    fn ensure_diagonals(&mut self) {
        for i in 1..=self.matrix.size() {
            self.matrix.get_or_create(i, i);
        }
    }

    fn move_pivot(&mut self, step: usize, pivot: ElementId) {
        let row_step = self.rows.step(self.matrix.row(pivot));
        let column_step = self.columns.step(self.matrix.column(pivot));
        self.rows.swap(step, row_step);
        self.columns.swap(step, column_step);
    }

    fn eliminate(&mut self, step: usize, pivot: ElementId) {
        let reciprocal = self.matrix.value(pivot).reciprocal();
        *self.matrix.value_mut(pivot) = reciprocal;
        self.pivots[step] = Some(pivot);

        let row = self.matrix.row(pivot);
        let column = self.matrix.column(pivot);

        let mut upper = std::mem::take(&mut self.upper);
        let mut lower = std::mem::take(&mut self.lower);
        upper.clear();
        lower.clear();
        upper.extend(
            self.matrix
                .row_elements(row)
                .filter(|&id| self.columns.step(self.matrix.column(id)) > step),
        );
        lower.extend(
            self.matrix
                .column_elements(column)
                .filter(|&id| self.rows.step(self.matrix.row(id)) > step),
        );

        let lower_rows: Vec<usize> = lower.iter().map(|&id| self.matrix.row(id)).collect();
        let upper_columns: Vec<usize> = upper.iter().map(|&id| self.matrix.column(id)).collect();
        self.markowitz.eliminated(&lower_rows, &upper_columns);

        for &u in &upper {
            let scaled = self.matrix.value(u) * reciprocal;
            *self.matrix.value_mut(u) = scaled;
            if scaled.is_zero() {
                continue;
            }
            let target_column = self.matrix.column(u);
            for &l in &lower {
                let multiplier = self.matrix.value(l);
                if multiplier.is_zero() {
                    continue;
                }
                let target_row = self.matrix.row(l);
                let sub = match self.matrix.find(target_row, target_column) {
                    Some(sub) => sub,
                    None => {
                        self.markowitz.fillin(target_row, target_column);
                        self.matrix.create_fillin(target_row, target_column)
                    }
                };
                let update = if multiplier.is_one() {
                    scaled
                } else {
                    scaled * multiplier
                };
                *self.matrix.value_mut(sub) -= update;
            }
        }

        self.upper = upper;
        self.lower = lower;
    }

    /// Row to blame when no pivot exists at `step`: an unreduced row with no
    /// acceptable entry left, or the row of the current step.
    fn singular_index(&self, step: usize) -> usize {
        let threshold = self.markowitz.absolute_threshold;
        for s in step..=self.matrix.size() {
            let row = self.rows.index(s);
            let empty = self
                .matrix
                .row_elements(row)
                .filter(|&id| self.columns.step(self.matrix.column(id)) >= step)
                .all(|id| self.matrix.value(id).magnitude() <= threshold);
            if empty {
                return row;
            }
        }
        self.rows.index(step)
    }

    fn check_solve(&self, solution: &[T]) -> Result<usize> {
        if !self.factored {
            return Err(EngineError::NotFactored);
        }
        let size = self.matrix.size();
        if solution.len() < size + 1 {
            return Err(EngineError::SizeMismatch {
                expected: size + 1,
                actual: solution.len(),
            });
        }
        Ok(size)
    }

    fn pivot(&self, step: usize) -> Result<ElementId> {
        self.pivots[step].ok_or(EngineError::NotFactored)
    }

    /// Solve `A x = b` using the stored right-hand side.
    ///
    /// `solution` is indexed like the variables, with index 0 (ground)
    /// set to zero.
    pub fn solve(&mut self, solution: &mut [T]) -> Result<()> {
        let size = self.check_solve(solution)?;
        let mut work = std::mem::take(&mut self.intermediate);

        for step in 1..=size {
            work[step] = self.rhs[self.rows.index(step)];
        }

        // Forward substitution with L
        for step in 1..=size {
            let value = work[step];
            if value.is_zero() {
                continue;
            }
            let pivot = self.pivot(step)?;
            let value = value * self.matrix.value(pivot);
            work[step] = value;
            for id in self.matrix.column_elements(self.matrix.column(pivot)) {
                let target = self.rows.step(self.matrix.row(id));
                if target > step {
                    work[target] -= value * self.matrix.value(id);
                }
            }
        }

        // Backward substitution with U
        for step in (1..=size).rev() {
            let pivot = self.pivot(step)?;
            let mut value = work[step];
            for id in self.matrix.row_elements(self.matrix.row(pivot)) {
                let source = self.columns.step(self.matrix.column(id));
                if source > step {
                    value -= self.matrix.value(id) * work[source];
                }
            }
            work[step] = value;
        }

        solution[0] = T::zero();
        for step in 1..=size {
            solution[self.columns.index(step)] = work[step];
        }
        self.intermediate = work;
        Ok(())
    }

    /// Solve `A^T x = b` using the stored right-hand side.
    pub fn solve_transposed(&mut self, solution: &mut [T]) -> Result<()> {
        let size = self.check_solve(solution)?;
        let mut work = std::mem::take(&mut self.intermediate);

        for step in 1..=size {
            work[step] = self.rhs[self.columns.index(step)];
        }

        // Forward substitution with U^T
        for step in 1..=size {
            let value = work[step];
            if value.is_zero() {
                continue;
            }
            let pivot = self.pivot(step)?;
            for id in self.matrix.row_elements(self.matrix.row(pivot)) {
                let target = self.columns.step(self.matrix.column(id));
                if target > step {
                    work[target] -= value * self.matrix.value(id);
                }
            }
        }

        // Backward substitution with L^T
        for step in (1..=size).rev() {
            let pivot = self.pivot(step)?;
            let mut value = work[step];
            for id in self.matrix.column_elements(self.matrix.column(pivot)) {
                let source = self.rows.step(self.matrix.row(id));
                if source > step {
                    value -= self.matrix.value(id) * work[source];
                }
            }
            work[step] = value * self.matrix.value(pivot);
        }

        solution[0] = T::zero();
        for step in 1..=size {
            solution[self.rows.index(step)] = work[step];
        }
        self.intermediate = work;
        Ok(())
    }
}
