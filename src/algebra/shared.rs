//! Stamping targets and the executor used for parallel loads.
//!
//! Device behaviors write their contributions through the [`Stamp`] trait.
//! A [`SparseSolver`] is a stamp target on its own. When several behavior
//! groups load concurrently each job gets a [`LockedStamp`], which takes the
//! solver-wide lock for the full duration of every addition. Factoring only
//! starts after the executor has joined all jobs.

use std::sync::{Mutex, MutexGuard};

use super::matrix::ElementId;
use super::scalar::Scalar;
use super::solver::{RhsId, SparseSolver};
use crate::error::Result;

/// Something that accepts matrix and right-hand side contributions.
pub trait Stamp<T: Scalar> {
    fn add_element(&mut self, element: ElementId, value: T);

    fn add_rhs(&mut self, rhs: RhsId, value: T);

    /// Add to an element, ignoring ground handles.
    fn stamp(&mut self, element: Option<ElementId>, value: T) {
        if let Some(element) = element {
            self.add_element(element, value);
        }
    }

    /// Add to a right-hand side entry, ignoring ground handles.
    fn stamp_rhs(&mut self, rhs: Option<RhsId>, value: T) {
        if let Some(rhs) = rhs {
            self.add_rhs(rhs, value);
        }
    }
}

impl<T: Scalar> Stamp<T> for SparseSolver<T> {
    fn add_element(&mut self, element: ElementId, value: T) {
        self.add(element, value);
    }

    fn add_rhs(&mut self, rhs: RhsId, value: T) {
        SparseSolver::add_rhs(self, rhs, value);
    }
}

/// Stamp target that serializes additions on a shared solver.
pub struct LockedStamp<'a, 'b, T> {
    solver: &'a Mutex<&'b mut SparseSolver<T>>,
}

impl<'a, 'b, T: Scalar> LockedStamp<'a, 'b, T> {
    pub fn new(solver: &'a Mutex<&'b mut SparseSolver<T>>) -> Self {
        Self { solver }
    }

    fn lock(&self) -> MutexGuard<'a, &'b mut SparseSolver<T>> {
        // A panicking job cannot leave an addition half done.
        self.solver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Scalar> Stamp<T> for LockedStamp<'_, '_, T> {
    fn add_element(&mut self, element: ElementId, value: T) {
        self.lock().add(element, value);
    }

    fn add_rhs(&mut self, rhs: RhsId, value: T) {
        self.lock().add_rhs(rhs, value);
    }
}

/// A unit of work submitted to an [`Executor`].
pub type Job<'s> = Box<dyn FnOnce() -> Result<()> + Send + 's>;

/// Runs a batch of independent jobs and waits for all of them.
pub trait Executor: Send + Sync {
    /// Run every job; returns the first error encountered.
    fn execute<'s>(&self, jobs: Vec<Job<'s>>) -> Result<()>;
}

/// Runs jobs one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Executor for Sequential {
    fn execute<'s>(&self, jobs: Vec<Job<'s>>) -> Result<()> {
        for job in jobs {
            job()?;
        }
        Ok(())
    }
}

/// Runs jobs on the rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

#[cfg(feature = "parallel")]
impl Executor for RayonExecutor {
    fn execute<'s>(&self, jobs: Vec<Job<'s>>) -> Result<()> {
        use rayon::prelude::*;

        jobs.into_par_iter().map(|job| job()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp_jobs<'s, 'b: 's>(
        lock: &'s Mutex<&'b mut SparseSolver<f64>>,
        shared: ElementId,
        count: usize,
    ) -> Vec<Job<'s>> {
        (0..count)
            .map(|_| {
                Box::new(move || {
                    let mut stamp = LockedStamp::new(lock);
                    for _ in 0..100 {
                        stamp.add_element(shared, 1.0);
                    }
                    Ok(())
                }) as Job<'s>
            })
            .collect()
    }

    #[test]
    fn test_sequential_executor() {
        let mut solver = SparseSolver::<f64>::new();
        let shared = solver.get_element(1, 1).unwrap();
        {
            let lock = Mutex::new(&mut solver);
            Sequential.execute(stamp_jobs(&lock, shared, 4)).unwrap();
        }
        assert_eq!(solver.value(shared), 400.0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_executor_serializes_shared_element() {
        let mut solver = SparseSolver::<f64>::new();
        let shared = solver.get_element(1, 1).unwrap();
        {
            let lock = Mutex::new(&mut solver);
            RayonExecutor.execute(stamp_jobs(&lock, shared, 8)).unwrap();
        }
        assert_eq!(solver.value(shared), 800.0);
    }

    #[test]
    fn test_ground_handles_are_skipped() {
        let mut solver = SparseSolver::<f64>::new();
        let id = solver.get_element(1, 1).unwrap();
        solver.stamp(None, 5.0);
        solver.stamp(Some(id), 2.0);
        solver.stamp_rhs(None, 1.0);
        assert_eq!(solver.value(id), 2.0);
    }
}
