//! Numerical consistency checks for coordinate derivatives.
//!
//! Analytic B-matrix rows and second-derivative blocks are compared to
//! 5-point finite-difference estimates. A 5-point formula is accurate to
//! O(step^4); a few unfortunates near discontinuities (torsions at 180
//! degrees, near-linear bends) will be worse, which is reported but not
//! treated as an engine failure.

use log::{debug, info, warn};
use nalgebra::DMatrix;

use crate::coordinate::{self, Coordinate};
use crate::geometry::Geometry;
use crate::transform::b_matrix;

/// Finite-difference displacement in Bohr.
const DISP_SIZE: f64 = 0.01;

/// Check every analytic B-matrix row against a 5-point finite-difference
/// estimate. Returns whether all rows agree within `50 * DISP_SIZE^4`.
pub fn test_b_matrix(intcos: &mut [Box<dyn Coordinate>], geom: &Geometry) -> bool {
    let natom = geom.num_atoms;
    let nint = intcos.len();
    let max_allowed = 50.0 * DISP_SIZE.powi(4);

    info!("testing B-matrix numerically");
    let b_analytic = b_matrix(intcos, geom, None);

    coordinate::update_dihedral_orientations(intcos, geom);
    coordinate::fix_bend_axes(intcos, geom);

    let mut coord = geom.clone();
    let mut b_fd = DMatrix::zeros(nint, 3 * natom);

    for atom in 0..natom {
        for xyz in 0..3 {
            let k = 3 * atom + xyz;
            coord.coords[k] -= DISP_SIZE;
            let q_m = coordinate::q_values(intcos, &coord);
            coord.coords[k] -= DISP_SIZE;
            let q_m2 = coordinate::q_values(intcos, &coord);
            coord.coords[k] += 3.0 * DISP_SIZE;
            let q_p = coordinate::q_values(intcos, &coord);
            coord.coords[k] += DISP_SIZE;
            let q_p2 = coordinate::q_values(intcos, &coord);
            coord.coords[k] -= 2.0 * DISP_SIZE; // back to the original
            for i in 0..nint {
                b_fd[(i, k)] =
                    (q_m2[i] - 8.0 * q_m[i] + 8.0 * q_p[i] - q_p2[i]) / (12.0 * DISP_SIZE);
            }
        }
    }

    coordinate::unfix_bend_axes(intcos);

    let mut max_error = -1.0;
    let mut max_error_intco = 0;
    for i in 0..nint {
        for j in 0..(3 * natom) {
            let err = (b_analytic[(i, j)] - b_fd[(i, j)]).abs();
            if err > max_error {
                max_error = err;
                max_error_intco = i;
            }
        }
    }

    debug!(
        "maximum difference is {:.1e} for coordinate {}",
        max_error,
        intcos[max_error_intco].label()
    );

    if max_error > max_allowed {
        warn!(
            "B-matrix could be in error (max difference {:.1e}); numerical tests may fail \
             for torsions at 180 degrees and slightly for near-linear bond angles",
            max_error
        );
        false
    } else {
        info!("B-matrix test passed");
        true
    }
}

/// Check each coordinate's analytic second-derivative block against
/// 5-point finite differences of its B-matrix row. Returns whether every
/// coordinate agrees within `10 * DISP_SIZE^4`.
pub fn test_derivative_b_matrix(intcos: &mut [Box<dyn Coordinate>], geom: &Geometry) -> bool {
    let ncart = geom.ncart();
    let max_allowed = 10.0 * DISP_SIZE.powi(4);

    info!("testing derivative B-matrix numerically");

    let mut coord = geom.clone();
    let mut all_ok = true;

    for i in 0..intcos.len() {
        let mut analytic = DMatrix::zeros(ncart, ncart);
        intcos[i].dq2_dx2(&coord, &mut analytic);

        let mut fd = DMatrix::zeros(ncart, ncart);
        for k in 0..ncart {
            coord.coords[k] += DISP_SIZE;
            let b_p = b_matrix(intcos, &coord, None);
            coord.coords[k] += DISP_SIZE;
            let b_p2 = b_matrix(intcos, &coord, None);
            coord.coords[k] -= 3.0 * DISP_SIZE;
            let b_m = b_matrix(intcos, &coord, None);
            coord.coords[k] -= DISP_SIZE;
            let b_m2 = b_matrix(intcos, &coord, None);
            coord.coords[k] += 2.0 * DISP_SIZE; // back to the original

            for col in 0..ncart {
                fd[(k, col)] = (b_m2[(i, col)] - 8.0 * b_m[(i, col)] + 8.0 * b_p[(i, col)]
                    - b_p2[(i, col)])
                    / (12.0 * DISP_SIZE);
            }
        }

        let mut max_error = -1.0;
        for r in 0..ncart {
            for c in 0..ncart {
                let err = (analytic[(r, c)] - fd[(r, c)]).abs();
                if err > max_error {
                    max_error = err;
                }
            }
        }
        debug!(
            "coordinate {}: max second-derivative difference {:.1e}",
            intcos[i].label(),
            max_error
        );
        if max_error > max_allowed {
            warn!(
                "second derivatives of {} disagree with finite differences ({:.1e}); \
                 this is expected near linear angles and 180-degree torsions",
                intcos[i].label(),
                max_error
            );
            all_ok = false;
        }
    }

    all_ok
}
