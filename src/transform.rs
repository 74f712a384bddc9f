//! Wilson B-matrix and derived transforms between Cartesian and internal
//! coordinate spaces.
//!
//! `B[i] = dq_i/dx` is assembled row by row from each coordinate's
//! [`dq_dx`](crate::coordinate::Coordinate::dq_dx). The metric
//! `G = B·Bᵀ` is generically singular for redundant coordinate sets, so
//! everything downstream uses the threshold-truncated generalized inverse
//! from [`crate::linalg`].

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::coordinate::Coordinate;
use crate::geometry::Geometry;
use crate::linalg::{symm_mat_inv_redundant, LinalgError};

/// Build the Wilson B-matrix, one row per internal coordinate.
///
/// With `masses`, each column triple is divided by the square root of the
/// corresponding atomic mass. Pure function: no state is touched beyond
/// the returned matrix.
pub fn b_matrix(
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    masses: Option<&[f64]>,
) -> DMatrix<f64> {
    let nint = intcos.len();
    let ncart = geom.ncart();
    let mut b = DMatrix::zeros(nint, ncart);

    let mut row = vec![0.0; ncart];
    for (i, intco) in intcos.iter().enumerate() {
        row.iter_mut().for_each(|v| *v = 0.0);
        intco.dq_dx(geom, &mut row);
        for (j, v) in row.iter().enumerate() {
            b[(i, j)] = *v;
        }
    }

    if let Some(masses) = masses {
        debug!("mass weighting B matrix");
        for i in 0..nint {
            for a in 0..geom.num_atoms {
                let w = masses[a].sqrt();
                for xyz in 0..3 {
                    b[(i, 3 * a + xyz)] /= w;
                }
            }
        }
    }

    b
}

/// The G-matrix `B·Bᵀ`, symmetric positive semi-definite.
pub fn g_matrix(
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    masses: Option<&[f64]>,
) -> DMatrix<f64> {
    let b = b_matrix(intcos, geom, masses);
    &b * b.transpose()
}

/// Internal-coordinate forces `f_q = G⁻¹·B·(-gradient)`.
///
/// Uses the redundant generalized inverse since G is singular whenever the
/// coordinate set is redundant. Empty input yields an empty result.
pub fn q_forces(
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    gradient: &DVector<f64>,
) -> DVector<f64> {
    if intcos.is_empty() || geom.is_empty() {
        return DVector::zeros(0);
    }
    let b = b_matrix(intcos, geom, None);
    let fx = -gradient;
    let bf = &b * fx;
    let g = &b * b.transpose();
    let g_inv = symm_mat_inv_redundant(&g);
    g_inv * bf
}

/// Convert a Cartesian Hessian to internal coordinates, `Hq = A·Hx·Aᵀ`
/// with `A = G⁻¹·B`.
///
/// Only correct at stationary points: the gradient-dependent derivative
/// B-matrix term is omitted. Fails if G is numerically singular; a
/// redundant coordinate set has no exact internal Hessian representation.
pub fn hessian_to_internals(
    hx: &DMatrix<f64>,
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    masses: Option<&[f64]>,
) -> Result<DMatrix<f64>, LinalgError> {
    debug!("converting Hessian from Cartesian to internal coordinates");
    let b = b_matrix(intcos, geom, masses);
    let g = &b * b.transpose();
    let g_inv = crate::linalg::symm_mat_inv(&g)?;
    let a_t = g_inv * b;
    Ok(&a_t * hx * a_t.transpose())
}

/// Convert an internal-coordinate Hessian to Cartesians, `Hx = Bᵀ·Hq·B`.
///
/// Only correct at stationary points, as with [`hessian_to_internals`].
pub fn hessian_to_cartesians(
    hq: &DMatrix<f64>,
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    masses: Option<&[f64]>,
) -> DMatrix<f64> {
    debug!("converting Hessian from internal to Cartesian coordinates");
    let b = b_matrix(intcos, geom, masses);
    b.transpose() * hq * b
}
