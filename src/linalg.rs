//! Shared numeric kernels: RMS/max reductions and the symmetric
//! (generalized) matrix inverse used throughout the engine.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use thiserror::Error;

/// Eigenvalues with magnitude at or below this threshold are treated as
/// exact zeros by the redundant generalized inverse. Linear dependencies
/// among redundant internal coordinates land here.
pub const REDUNDANT_EVAL_TOL: f64 = 1.0e-10;

/// Errors from the exact symmetric inverse.
#[derive(Error, Debug)]
pub enum LinalgError {
    /// An exact inverse was requested but an eigenvalue is numerically zero.
    #[error("symmetric matrix is numerically singular")]
    SingularMatrix,
}

/// Root-mean-square of a vector; zero for an empty vector.
pub fn rms(v: &DVector<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    (v.norm_squared() / v.len() as f64).sqrt()
}

/// Largest absolute element of a vector; zero for an empty vector.
pub fn abs_max(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| x.abs()).fold(0.0, f64::max)
}

/// Sign of a value as `-1.0` or `1.0` (zero counts as positive).
pub fn sign_of(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Generalized inverse of a symmetric matrix by eigendecomposition.
///
/// Reciprocal eigenvalues with `|lambda| <= REDUNDANT_EVAL_TOL` are set to
/// zero, so the result is the Moore-Penrose pseudo-inverse restricted to
/// the numerically non-null space. This is the inverse the engine uses for
/// the generically singular G-matrix of a redundant coordinate set.
pub fn symm_mat_inv_redundant(a: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(a.clone());
    let mut inv_evals = eig.eigenvalues.clone();
    for v in inv_evals.iter_mut() {
        *v = if v.abs() > REDUNDANT_EVAL_TOL { 1.0 / *v } else { 0.0 };
    }
    &eig.eigenvectors * DMatrix::from_diagonal(&inv_evals) * eig.eigenvectors.transpose()
}

/// Exact inverse of a symmetric matrix by eigendecomposition.
///
/// Fails with [`LinalgError::SingularMatrix`] if any eigenvalue is
/// numerically zero; use [`symm_mat_inv_redundant`] when the null space is
/// expected.
pub fn symm_mat_inv(a: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    let eig = SymmetricEigen::new(a.clone());
    if eig.eigenvalues.iter().any(|v| v.abs() <= REDUNDANT_EVAL_TOL) {
        return Err(LinalgError::SingularMatrix);
    }
    let inv_evals = eig.eigenvalues.map(|v| 1.0 / v);
    Ok(&eig.eigenvectors * DMatrix::from_diagonal(&inv_evals) * eig.eigenvectors.transpose())
}
