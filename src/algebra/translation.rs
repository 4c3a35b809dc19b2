//! Pivot permutation between storage indices and elimination steps.

/// A bijection on `{1..=n}` mapping elimination steps to storage indices.
///
/// Pivoting swaps entries here instead of moving matrix elements.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    step_to_index: Vec<usize>,
    index_to_step: Vec<usize>,
}

impl Translation {
    pub fn new() -> Self {
        Self {
            step_to_index: vec![0],
            index_to_step: vec![0],
        }
    }

    /// Number of mapped indices.
    pub fn len(&self) -> usize {
        self.step_to_index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend the map with identity entries up to `size`.
    pub fn ensure(&mut self, size: usize) {
        for i in self.step_to_index.len()..=size {
            self.step_to_index.push(i);
            self.index_to_step.push(i);
        }
    }

    /// Storage index eliminated at `step`.
    pub fn index(&self, step: usize) -> usize {
        self.step_to_index[step]
    }

    /// Elimination step of a storage index.
    pub fn step(&self, index: usize) -> usize {
        self.index_to_step[index]
    }

    /// Exchange the storage indices assigned to two steps.
    pub fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.step_to_index.swap(a, b);
        self.index_to_step[self.step_to_index[a]] = a;
        self.index_to_step[self.step_to_index[b]] = b;
    }

    /// Restore the identity permutation.
    pub fn reset(&mut self) {
        for (i, (s, x)) in self
            .step_to_index
            .iter_mut()
            .zip(self.index_to_step.iter_mut())
            .enumerate()
        {
            *s = i;
            *x = i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_keeps_bijection() {
        let mut t = Translation::new();
        t.ensure(4);
        t.swap(1, 3);
        t.swap(3, 4);

        for step in 1..=4 {
            assert_eq!(t.step(t.index(step)), step);
        }
        assert_eq!(t.index(1), 3);
        assert_eq!(t.index(3), 4);
        assert_eq!(t.index(4), 1);

        t.reset();
        assert_eq!(t.index(1), 1);
    }
}
