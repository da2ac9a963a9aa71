//! This module defines the custom error types for the library.
//!
//! All failure conditions of the thick-restart process are collected into a single
//! enum, [`ThickSvdErrorKind`], wrapped by the opaque [`ThickSvdError`]. The kinds fall
//! into two families:
//!
//! - **Precondition violations** (`DimensionMismatch`, `InputError`, `ParameterMismatch`,
//!   `InvalidAxis`) are raised at the API boundary before any matrix-vector product.
//! - **Numerical conditions** (`Breakdown`, `SvdError`) are raised mid-computation. A
//!   breakdown means the recurrence found an invariant subspace and there is no residual
//!   direction left to extend with.
//!
//! Note that [`faer::linalg::svd::SvdError`] does not implement the standard
//! [`std::error::Error`] trait, so we wrap it manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur during a thick-restart SVD computation.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ThickSvdError(#[from] ThickSvdErrorKind);

/// The distinct kinds of errors. Exposed through [`ThickSvdError::kind`] so callers can
/// tell a degenerate recurrence apart from a misuse of the API.
#[derive(Error, Debug, PartialEq)]
pub enum ThickSvdErrorKind {
    /// A normalization step met a (numerically) zero vector: the bidiagonalization has
    /// found an invariant subspace of dimension below the requested working size.
    #[error(
        "Bidiagonalization breakdown at step {step}: residual norm is zero. The Krylov subspace is invariant."
    )]
    Breakdown { step: usize },

    /// The dimensions of the operator and the input vector are incompatible.
    #[error(
        "Dimension mismatch: operator has {operator_cols} columns but vector has {vector_rows} rows."
    )]
    DimensionMismatch {
        operator_cols: usize,
        vector_rows: usize,
    },

    /// An invalid input parameter was provided to a function.
    #[error("Invalid input parameter: {0}")]
    InputError(String),

    /// A matrix or vector handed between stages does not have the expected size.
    #[error("Parameter mismatch for `{param_name}`: expected {expected}, got {actual}.")]
    ParameterMismatch {
        param_name: String,
        expected: usize,
        actual: usize,
    },

    /// A shape query asked for an axis other than 0 (rows) or 1 (columns).
    #[error("Invalid axis {axis}: a matrix only has axes 0 and 1.")]
    InvalidAxis { axis: usize },

    /// Wraps an error originating from [`faer`]'s dense SVD module.
    #[error("A numerical error occurred during the SVD of the working matrix B: {0:?}")]
    SvdError(faer::linalg::svd::SvdError),
}

impl ThickSvdError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> &ThickSvdErrorKind {
        &self.0
    }

    /// Returns `true` if the error reports an invariant subspace (numerical degeneracy).
    pub fn is_breakdown(&self) -> bool {
        matches!(self.0, ThickSvdErrorKind::Breakdown { .. })
    }

    /// Returns `true` if the error was raised by input validation, before any computation.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self.0,
            ThickSvdErrorKind::DimensionMismatch { .. }
                | ThickSvdErrorKind::InputError(_)
                | ThickSvdErrorKind::ParameterMismatch { .. }
                | ThickSvdErrorKind::InvalidAxis { .. }
        )
    }
}

// Manually implement PartialEq for the public error type.
// We compare the inner `ThickSvdErrorKind`.
impl PartialEq for ThickSvdError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Shorthand used by the crate to raise an [`ThickSvdErrorKind::InputError`].
pub(crate) fn input_error(message: impl Into<String>) -> ThickSvdError {
    ThickSvdErrorKind::InputError(message.into()).into()
}
