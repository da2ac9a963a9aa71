//! Operator accounting for matrix-free algorithms.
//!
//! The thick-restart process never reads an entry of `A`: its only access is through
//! the products `A x` and `Aᵗ x` of [`faer::matrix_free::BiLinOp`]. This lets the same
//! code run on dense matrices, sparse matrices, or implicit operators that are never
//! stored at all.
//!
//! [`CountingOperator`] makes that contract observable. It wraps any operator, delegates
//! every call, and counts how many forward and transpose products were requested, which
//! is the true cost measure of a Krylov method on large sparse inputs.

use faer::{
    MatMut, MatRef, Par,
    dyn_stack::{MemStack, StackReq},
    matrix_free::{BiLinOp, LinOp},
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A transparent wrapper around an operator that counts its products.
///
/// Counters are atomic so the wrapper stays `Sync`, as [`LinOp`] requires.
#[derive(Debug)]
pub struct CountingOperator<O> {
    inner: O,
    forward: AtomicUsize,
    transpose: AtomicUsize,
}

impl<O> CountingOperator<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            forward: AtomicUsize::new(0),
            transpose: AtomicUsize::new(0),
        }
    }

    /// Number of columns multiplied by `A` so far.
    pub fn forward_products(&self) -> usize {
        self.forward.load(Ordering::Relaxed)
    }

    /// Number of columns multiplied by `Aᵗ` (or `Aᴴ`) so far.
    pub fn transpose_products(&self) -> usize {
        self.transpose.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.forward.store(0, Ordering::Relaxed);
        self.transpose.store(0, Ordering::Relaxed);
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: LinOp<f64>> LinOp<f64> for CountingOperator<O> {
    fn apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        self.inner.apply_scratch(rhs_ncols, par)
    }

    fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    fn apply(&self, out: MatMut<'_, f64>, rhs: MatRef<'_, f64>, par: Par, stack: &mut MemStack) {
        self.forward.fetch_add(rhs.ncols(), Ordering::Relaxed);
        self.inner.apply(out, rhs, par, stack);
    }

    fn conj_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.forward.fetch_add(rhs.ncols(), Ordering::Relaxed);
        self.inner.conj_apply(out, rhs, par, stack);
    }
}

impl<O: BiLinOp<f64>> BiLinOp<f64> for CountingOperator<O> {
    fn transpose_apply_scratch(&self, rhs_ncols: usize, par: Par) -> StackReq {
        self.inner.transpose_apply_scratch(rhs_ncols, par)
    }

    fn transpose_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.transpose.fetch_add(rhs.ncols(), Ordering::Relaxed);
        self.inner.transpose_apply(out, rhs, par, stack);
    }

    fn adjoint_apply(
        &self,
        out: MatMut<'_, f64>,
        rhs: MatRef<'_, f64>,
        par: Par,
        stack: &mut MemStack,
    ) {
        self.transpose.fetch_add(rhs.ncols(), Ordering::Relaxed);
        self.inner.adjoint_apply(out, rhs, par, stack);
    }
}
