//! Sparse linear algebra.
//!
//! This module provides the linear system every analysis is built on:
//!
//! - [`SparseMatrix`] - arena of elements chained by row and column
//! - [`Translation`] - pivot permutation, a bijection on `{1..=n}`
//! - [`Markowitz`] - threshold pivot search that limits fill-in
//! - [`SparseSolver`] - element handles, LU factorization, forward and
//!   backward substitution (plain and transposed)
//! - [`Stamp`], [`Executor`] - the seam used by device behaviors to write
//!   into the system, optionally from several threads
//!
//! Indices are 1-based. Index 0 stands for the ground reference, which is
//! not part of the system.

mod markowitz;
mod matrix;
mod scalar;
mod shared;
mod solver;
mod translation;

pub use markowitz::{Markowitz, DEFAULT_ABSOLUTE_THRESHOLD, DEFAULT_RELATIVE_THRESHOLD};
pub use matrix::{ElementId, SparseMatrix};
pub use scalar::Scalar;
#[cfg(feature = "parallel")]
pub use shared::RayonExecutor;
pub use shared::{Executor, Job, LockedStamp, Sequential, Stamp};
pub use solver::{RhsId, SparseSolver};
pub use translation::Translation;
