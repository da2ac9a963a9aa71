//! Thick-restarted Golub–Kahan–Lanczos bidiagonalization for partial SVDs.
//!
//! This crate computes the `l` largest singular values of a large, possibly sparse,
//! `m×n` matrix `A` together with approximate singular vectors. `A` is only touched
//! through the products `A x` and `Aᵗ x` of a [`faer::matrix_free::BiLinOp`], so dense
//! matrices, sparse matrices and implicit operators are all valid inputs.
//!
//! ## Algorithm
//!
//! A `k`-step Golub–Kahan bidiagonalization (`k > l`) builds orthonormal bases `P`, `Q`
//! and a small upper bidiagonal `B` with `A Q_k = P_k B_k`. The SVD of `B` yields Ritz
//! approximations of the singular triplets of `A`. When they are not yet accurate the
//! factorization is *thick-restarted*: both bases are compressed onto the best `l` Ritz
//! directions, which turns `B` into a *broken-arrow* matrix, and the bidiagonalization is
//! resumed up to size `k` again. Memory therefore stays at `O((m + n) k)` for any number
//! of restarts.
//!
//! Convergence is decided on Rayleigh–Ritz refined error bounds, see
//! [`algorithms::convergence`].
//!
//! ## Modules
//!
//! - [`solvers`]: the driver [`thick_restart_svd`] and its parameters.
//! - [`algorithms`]: the individual stages (build, truncate, extend, convergence).
//! - [`bidiagonal`]: the small working matrices and their densification.
//! - [`matrix`]: [`matrix::CountingOperator`], a product-counting operator wrapper.
//!
//! ## Example Usage
//!
//! ```rust
//! use faer::{Mat, Par, dyn_stack::{MemBuffer, MemStack}};
//! use thick_restart_svd::{ThickRestartParams, thick_restart_svd, thick_restart_svd_scratch};
//!
//! // A 60×40 matrix with singular values 1, 0.8, 0.64, ...
//! let a = Mat::from_fn(60, 40, |i, j| if i == j { 0.8_f64.powi(j as i32) } else { 0.0 });
//!
//! // Any unit-norm starting vector works.
//! let n = 40.0_f64;
//! let q0 = Mat::from_fn(40, 1, |_, _| 1.0 / n.sqrt());
//!
//! let mut mem = MemBuffer::new(thick_restart_svd_scratch(&a.as_ref(), Par::Seq));
//! let stack = MemStack::new(&mut mem);
//!
//! let params = ThickRestartParams {
//!     nvals: 3,
//!     working_size: Some(10),
//!     tol: 1e-8,
//!     ..ThickRestartParams::default()
//! };
//! let output = thick_restart_svd(&a.as_ref(), q0.as_ref(), params, stack, None).unwrap();
//!
//! assert!(output.converged());
//! assert!((output.values[0] - 1.0).abs() < 1e-6);
//! assert!((output.values[2] - 0.64).abs() < 1e-6);
//! ```
//!
//! ## Performance Characteristics
//!
//! Every stage works on preallocated column buffers and a caller-provided
//! [`faer::dyn_stack::MemStack`] for the operator products. Dense kernels (projections,
//! basis compression) go through [`faer`]'s `matmul` and honour the requested
//! [`faer::Par`].

pub mod algorithms;
pub mod bidiagonal;
pub mod error;
pub mod matrix;
pub mod solvers;
pub mod utils;

pub use solvers::{
    Termination, ThickRestartOutput, ThickRestartParams, thick_restart_svd,
    thick_restart_svd_scratch,
};
