//! Projection of redundancies and constraints out of internal forces and
//! the Hessian.
//!
//! Force and curvature components along redundant directions (null space
//! of G) or frozen coordinates destabilize the optimizer's step; they are
//! removed here before each iteration. Coordinates held at a target value
//! get an artificial restoring force instead, decoupled from everything
//! else.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};

use crate::config::Params;
use crate::coordinate::{Coordinate, Fragment};
use crate::geometry::Geometry;
use crate::linalg::symm_mat_inv_redundant;
use crate::transform::g_matrix;

/// Diagonal 0/1 matrix marking frozen coordinates.
///
/// Returns `None` when no coordinate in the set is frozen.
pub fn constraint_matrix(intcos: &[Box<dyn Coordinate>]) -> Option<DMatrix<f64>> {
    if !intcos.iter().any(|c| c.frozen()) {
        return None;
    }
    let n = intcos.len();
    let mut c = DMatrix::zeros(n, n);
    for (i, intco) in intcos.iter().enumerate() {
        if intco.frozen() {
            c[(i, i)] = 1.0;
        }
    }
    Some(c)
}

/// Project redundant and frozen directions out of `fq` and `h` in place.
///
/// The base projector is `P' = G·G⁻¹`. With frozen coordinates, the
/// constraint matrix C combines into
/// `P = P' - P'·C·(C·P'·C)⁻¹·C·P'`, and then `fq <- P·fq`,
/// `H <- P·H·P`. P is idempotent.
pub fn project_redundancies_and_constraints(
    intcos: &[Box<dyn Coordinate>],
    geom: &Geometry,
    fq: &mut DVector<f64>,
    h: &mut DMatrix<f64>,
    print_lvl: u8,
) {
    let g = g_matrix(intcos, geom, None);
    let g_inv = symm_mat_inv_redundant(&g);
    let p_prime = &g * &g_inv;
    if print_lvl >= 3 {
        debug!("projection matrix for redundancies:\n{:.6}", p_prime);
    }

    let p = match constraint_matrix(intcos) {
        Some(c) => {
            debug!("adding constraints to projection");
            let cpc = &c * &p_prime * &c;
            let cpc_inv = symm_mat_inv_redundant(&cpc);
            &p_prime - &p_prime * &c * cpc_inv * &c * &p_prime
        }
        None => p_prime,
    };

    // fq~ = P fq
    let projected = &p * &*fq;
    fq.copy_from(&projected);
    if print_lvl >= 3 {
        debug!("internal forces after projection:\n{:.6}", fq);
    }

    // Peng, Ayala, Schlegel, JCC 1996 give H -> PHP + 1000(1-P).
    // The second term sometimes interferes with Hessian updating, so
    // only PHP is applied.
    let projected_h = &p * &*h * &p;
    h.copy_from(&projected_h);
    if print_lvl >= 3 {
        debug!("projected (PHP) Hessian:\n{:.6}", h);
    }
}

/// Inject artificial restoring forces for coordinates held at a target
/// value; `fq` and `h` are modified in place.
///
/// For each coordinate with a `fixed_eq_val`, the force constant grows
/// linearly with the step number, `k = (1 + 0.05*step_number) * base`,
/// the force becomes `k*(eq - val)`, the Hessian diagonal is overwritten
/// with `k`, and all off-diagonal coupling for that coordinate is zeroed,
/// decoupling it from the rest of the optimization.
pub fn apply_fixed_forces(
    fragments: &[Fragment],
    geom: &Geometry,
    fq: &mut DVector<f64>,
    h: &mut DMatrix<f64>,
    step_number: usize,
    params: &Params,
) {
    let mut offset = 0;
    for (i_frag, frag) in fragments.iter().enumerate() {
        for (i, intco) in frag.intcos.iter().enumerate() {
            let Some(eq_val) = intco.fixed_eq_val() else {
                continue;
            };
            let location = offset + i;
            let val = intco.q(geom);

            // Force constant grows by 5% of the base value per step.
            let k = (1.0 + 0.05 * step_number as f64) * params.fixed_coord_force_constant;
            let force = k * (eq_val - val);
            h[(location, location)] = k;
            fq[location] = force;

            info!(
                "holding coordinate {} of fragment {}: value = {:.6}, target = {:.6}, \
                 force = {:.6}, force constant = {:.6}",
                i + 1,
                i_frag + 1,
                val,
                eq_val,
                force,
                k
            );

            // Delete coupling between this coordinate and the others.
            for j in 0..h.nrows() {
                if j != location {
                    h[(j, location)] = 0.0;
                    h[(location, j)] = 0.0;
                }
            }
        }
        offset += frag.intcos.len();
    }
}
