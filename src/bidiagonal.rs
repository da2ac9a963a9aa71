//! Structured working matrices for the thick-restart bidiagonalization.
//!
//! The projected matrix `B` that links the two Lanczos bases (`A Q = P B`) only ever
//! takes one of two shapes:
//!
//! - **Upper bidiagonal** ([`Bidiagonal`]), produced by the initial Golub–Kahan build.
//!   The diagonal holds `α_1..α_k` and the superdiagonal holds `β_1..β_{k-1}`.
//! - **Broken-arrow bidiagonal** ([`BrokenArrowBidiagonal`]), produced by every restart.
//!   It is diagonal in its first `l` columns (the retained Ritz values), has one dense
//!   "arrow" column `l` holding the coupling vector `ρ`, and is upper bidiagonal from
//!   there on. Layout for `l = 3`, `n = 6`:
//!
//! ```text
//!     | d0  .   .   a0  .   .  |
//!     | .   d1  .   a1  .   .  |
//!     | .   .   d2  a2  .   .  |
//!     | .   .   .   d3  e0  .  |
//!     | .   .   .   .   d4  e1 |
//!     | .   .   .   .   .   d5 |
//! ```
//!
//! [`WorkingMatrix`] is the closed variant over the two. The Decompose step only needs
//! a small dense SVD of it, obtained via [`WorkingMatrix::svd`].

use crate::error::{ThickSvdError, ThickSvdErrorKind, input_error};
use faer::{Mat, linalg::solvers::Svd};

/// An upper bidiagonal matrix stored as its diagonal and superdiagonal.
#[derive(Clone, Debug, PartialEq)]
pub struct Bidiagonal {
    diag: Vec<f64>,
    superdiag: Vec<f64>,
}

impl Bidiagonal {
    /// Creates an `n×n` upper bidiagonal matrix. `superdiag` must hold `n - 1` entries.
    pub fn new(diag: Vec<f64>, superdiag: Vec<f64>) -> Result<Self, ThickSvdError> {
        let expected = diag.len().saturating_sub(1);
        if superdiag.len() != expected {
            return Err(ThickSvdErrorKind::ParameterMismatch {
                param_name: "superdiag".to_string(),
                expected,
                actual: superdiag.len(),
            }
            .into());
        }
        Ok(Self { diag, superdiag })
    }

    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    pub fn superdiag(&self) -> &[f64] {
        &self.superdiag
    }

    pub fn size(&self) -> usize {
        self.diag.len()
    }

    /// Assembles the explicit dense representation.
    pub fn to_dense(&self) -> Mat<f64> {
        let n = self.size();
        let mut dense = Mat::zeros(n, n);
        for (i, &alpha) in self.diag.iter().enumerate() {
            dense.as_mut()[(i, i)] = alpha;
        }
        for (i, &beta) in self.superdiag.iter().enumerate() {
            dense.as_mut()[(i, i + 1)] = beta;
        }
        dense
    }
}

/// A bidiagonal matrix with a dense arrow column, as produced by a thick restart.
///
/// With `n = d.len()` and `l = a.len()`, the densified matrix `M` is
/// `M[i, i] = d[i]`, `M[i, l] = a[i]` for `i < l`, and `M[i, i + 1] = e[i - l]` for
/// `l <= i < n - 1`. Every other entry is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokenArrowBidiagonal {
    d: Vec<f64>,
    a: Vec<f64>,
    e: Vec<f64>,
}

impl BrokenArrowBidiagonal {
    /// Creates a broken-arrow matrix from its diagonal `d`, arrow `a` and superdiagonal `e`.
    ///
    /// # Errors
    /// Returns an input error if the arrow column would fall outside the matrix
    /// (`a.len() >= d.len()` for a non-empty arrow), and a parameter mismatch if `e`
    /// does not hold exactly `d.len() - a.len() - 1` entries.
    pub fn new(d: Vec<f64>, a: Vec<f64>, e: Vec<f64>) -> Result<Self, ThickSvdError> {
        if d.len() < a.len() || (!a.is_empty() && d.len() == a.len()) {
            return Err(input_error(format!(
                "The arrow of length {} does not fit a diagonal of length {}.",
                a.len(),
                d.len()
            )));
        }
        let expected = d.len().saturating_sub(a.len() + 1);
        if e.len() != expected {
            return Err(ThickSvdErrorKind::ParameterMismatch {
                param_name: "e".to_string(),
                expected,
                actual: e.len(),
            }
            .into());
        }
        Ok(Self { d, a, e })
    }

    pub fn diag(&self) -> &[f64] {
        &self.d
    }

    pub fn arrow(&self) -> &[f64] {
        &self.a
    }

    pub fn superdiag(&self) -> &[f64] {
        &self.e
    }

    pub fn size(&self) -> usize {
        self.d.len()
    }

    /// Reserves room so that the diagonal can grow to `capacity` entries without
    /// reallocating during an extension.
    pub(crate) fn reserve_to(&mut self, capacity: usize) {
        self.d.reserve(capacity.saturating_sub(self.d.len()));
        self.e
            .reserve(capacity.saturating_sub(self.a.len() + 1 + self.e.len()));
    }

    // The extender pushes `e` before `d`; the layout invariant only holds again once
    // the matching diagonal entry has been appended.
    pub(crate) fn push_superdiag(&mut self, beta: f64) {
        self.e.push(beta);
    }

    pub(crate) fn push_diag(&mut self, alpha: f64) {
        self.d.push(alpha);
    }

    /// Assembles the explicit dense representation.
    pub fn to_dense(&self) -> Mat<f64> {
        let n = self.size();
        let l = self.a.len();
        debug_assert_eq!(self.e.len(), n.saturating_sub(l + 1));

        let mut dense = Mat::zeros(n, n);
        for (i, &d) in self.d.iter().enumerate() {
            dense.as_mut()[(i, i)] = d;
        }
        for (i, &a) in self.a.iter().enumerate() {
            dense.as_mut()[(i, l)] = a;
        }
        for (offset, &e) in self.e.iter().enumerate() {
            let row = l + offset;
            dense.as_mut()[(row, row + 1)] = e;
        }
        dense
    }
}

/// The projected working matrix `B` of a factorization `A Q = P B`.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkingMatrix {
    /// Plain upper bidiagonal form, only seen right after the initial build.
    Bidiagonal(Bidiagonal),
    /// Broken-arrow form, seen after every restart.
    BrokenArrow(BrokenArrowBidiagonal),
}

impl WorkingMatrix {
    /// The order `n` of the (square) working matrix.
    pub fn size(&self) -> usize {
        match self {
            WorkingMatrix::Bidiagonal(b) => b.size(),
            WorkingMatrix::BrokenArrow(b) => b.size(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.size(), self.size())
    }

    /// Size along `axis` (0 for rows, 1 for columns).
    pub fn dim(&self, axis: usize) -> Result<usize, ThickSvdError> {
        match axis {
            0 | 1 => Ok(self.size()),
            _ => Err(ThickSvdErrorKind::InvalidAxis { axis }.into()),
        }
    }

    pub fn diag(&self) -> &[f64] {
        match self {
            WorkingMatrix::Bidiagonal(b) => b.diag(),
            WorkingMatrix::BrokenArrow(b) => b.diag(),
        }
    }

    pub fn to_dense(&self) -> Mat<f64> {
        match self {
            WorkingMatrix::Bidiagonal(b) => b.to_dense(),
            WorkingMatrix::BrokenArrow(b) => b.to_dense(),
        }
    }

    /// The Decompose step: a dense thin SVD of `B`, singular values in descending order.
    ///
    /// `B` is at most `k×k`, so densifying it is negligible next to a single product
    /// with `A`.
    pub fn svd(&self) -> Result<Svd<f64>, ThickSvdError> {
        self.to_dense()
            .thin_svd()
            .map_err(|e| ThickSvdErrorKind::SvdError(e).into())
    }
}

impl From<Bidiagonal> for WorkingMatrix {
    fn from(b: Bidiagonal) -> Self {
        WorkingMatrix::Bidiagonal(b)
    }
}

impl From<BrokenArrowBidiagonal> for WorkingMatrix {
    fn from(b: BrokenArrowBidiagonal) -> Self {
        WorkingMatrix::BrokenArrow(b)
    }
}
