//! Arena-backed sparse matrix.
//!
//! Elements live in a single `Vec` and are chained into per-row and
//! per-column lists through indices instead of pointers. Rows and columns
//! use 1-based indices; index 0 is reserved for the ground reference and
//! never stored.

use super::scalar::Scalar;

/// Handle to a matrix element.
///
/// Handles stay valid for the lifetime of the matrix: elements are never
/// released, only cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) usize);

#[derive(Debug, Clone)]
struct Element<T> {
    row: usize,
    column: usize,
    value: T,
    next_in_row: Option<ElementId>,
    next_in_column: Option<ElementId>,
}

/// A sparse matrix with linked row and column structure.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    elements: Vec<Element<T>>,
    row_head: Vec<Option<ElementId>>,
    column_head: Vec<Option<ElementId>>,
    size: usize,
    fillins: usize,
}

impl<T: Scalar> Default for SparseMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> SparseMatrix<T> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            row_head: vec![None],
            column_head: vec![None],
            size: 0,
            fillins: 0,
        }
    }

    /// Number of rows (and columns) of the square matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored elements, fill-ins included.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of elements created during elimination.
    pub fn fillins(&self) -> usize {
        self.fillins
    }

    /// Grow the matrix so that it is at least `size` x `size`.
    pub fn resize(&mut self, size: usize) {
        if size > self.size {
            self.row_head.resize(size + 1, None);
            self.column_head.resize(size + 1, None);
            self.size = size;
        }
    }

    /// Find an existing element without allocating.
    pub fn find(&self, row: usize, column: usize) -> Option<ElementId> {
        if row == 0 || column == 0 || row > self.size || column > self.size {
            return None;
        }
        self.row_elements(row).find(|&id| self.elements[id.0].column == column)
    }

    /// Return the element at (`row`, `column`), creating it when missing.
    ///
    /// Both indices must be at least 1; the matrix grows as needed.
    pub fn get_or_create(&mut self, row: usize, column: usize) -> ElementId {
        debug_assert!(row > 0 && column > 0);
        self.resize(row.max(column));
        match self.find(row, column) {
            Some(id) => id,
            None => self.link(row, column),
        }
    }

    /// Create an element that appeared during elimination.
    pub(crate) fn create_fillin(&mut self, row: usize, column: usize) -> ElementId {
        self.fillins += 1;
        self.link(row, column)
    }

    fn link(&mut self, row: usize, column: usize) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            row,
            column,
            value: T::zero(),
            next_in_row: self.row_head[row],
            next_in_column: self.column_head[column],
        });
        self.row_head[row] = Some(id);
        self.column_head[column] = Some(id);
        id
    }

    pub fn row(&self, id: ElementId) -> usize {
        self.elements[id.0].row
    }

    pub fn column(&self, id: ElementId) -> usize {
        self.elements[id.0].column
    }

    pub fn value(&self, id: ElementId) -> T {
        self.elements[id.0].value
    }

    pub fn value_mut(&mut self, id: ElementId) -> &mut T {
        &mut self.elements[id.0].value
    }

    /// Reset every value to zero, keeping the structure.
    pub fn clear(&mut self) {
        for element in &mut self.elements {
            element.value = T::zero();
        }
    }

    /// Iterate the elements stored in a row.
    pub fn row_elements(&self, row: usize) -> RowElements<'_, T> {
        RowElements {
            matrix: self,
            current: self.row_head.get(row).copied().flatten(),
        }
    }

    /// Iterate the elements stored in a column.
    pub fn column_elements(&self, column: usize) -> ColumnElements<'_, T> {
        ColumnElements {
            matrix: self,
            current: self.column_head.get(column).copied().flatten(),
        }
    }
}

/// Iterator over the elements of one row.
pub struct RowElements<'a, T> {
    matrix: &'a SparseMatrix<T>,
    current: Option<ElementId>,
}

impl<T> Iterator for RowElements<'_, T> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.current?;
        self.current = self.matrix.elements[id.0].next_in_row;
        Some(id)
    }
}

/// Iterator over the elements of one column.
pub struct ColumnElements<'a, T> {
    matrix: &'a SparseMatrix<T>,
    current: Option<ElementId>,
}

impl<T> Iterator for ColumnElements<'_, T> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.current?;
        self.current = self.matrix.elements[id.0].next_in_column;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_unique() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_or_create(2, 3);
        let b = m.get_or_create(2, 3);
        assert_eq!(a, b);
        assert_eq!(m.size(), 3);
        assert_eq!(m.element_count(), 1);
        assert_eq!(m.find(3, 2), None);
    }

    #[test]
    fn test_row_and_column_links() {
        let mut m = SparseMatrix::<f64>::new();
        m.get_or_create(1, 1);
        m.get_or_create(1, 2);
        m.get_or_create(2, 2);

        let mut columns: Vec<usize> = m.row_elements(1).map(|id| m.column(id)).collect();
        columns.sort_unstable();
        assert_eq!(columns, vec![1, 2]);

        let mut rows: Vec<usize> = m.column_elements(2).map(|id| m.row(id)).collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![1, 2]);
    }

    #[test]
    fn test_clear_keeps_structure() {
        let mut m = SparseMatrix::<f64>::new();
        let id = m.get_or_create(1, 1);
        *m.value_mut(id) = 4.0;
        m.clear();
        assert_eq!(m.value(id), 0.0);
        assert_eq!(m.find(1, 1), Some(id));
    }
}
