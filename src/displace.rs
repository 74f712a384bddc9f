//! Back-transformation: converting an internal-coordinate displacement
//! into a new Cartesian geometry.
//!
//! The mapping from internals to Cartesians is nonlinear, so a requested
//! step `dq` is realized iteratively: each Newton iteration solves
//! `dx = Bᵀ·G⁻¹·dq` for the current residual and updates the geometry in
//! place. The iteration stops on convergence, stagnation, an iteration
//! cap, or blow-up, and never returns a geometry worse (in RMS internal
//! error) than the best intermediate it visited.
//!
//! When `ensure_convergence` is requested, a stalled step is retried at
//! progressively smaller sizes and, once a reduced step converges, the
//! remainder is completed in equal partial steps. Frozen coordinates get
//! a final tight correction pass so their net displacement is zero.

use log::{debug, info, warn};
use nalgebra::DVector;
use thiserror::Error;

use crate::config::{OptType, Params};
use crate::coordinate::{self, Coordinate};
use crate::geometry::Geometry;
use crate::linalg::{abs_max, rms, symm_mat_inv_redundant};
use crate::transform::b_matrix;

/// RMS Cartesian displacement above which the Newton iteration is
/// declared to have blown up.
const DX_RMS_BLOWUP: f64 = 100.0;

/// Fatal back-transformation failures.
///
/// Ordinary non-convergence is a logged degradation: the best geometry
/// found is kept and the achieved displacement reported. Only an IRC walk,
/// which has no valid fallback geometry, turns non-convergence into an
/// error.
#[derive(Error, Debug)]
pub enum DisplaceError {
    /// The constrained step of an IRC computation could not be converged.
    #[error("could not take the constrained step of an IRC computation")]
    ConstraintFailure,
}

/// Tolerances for one inner Newton iteration run.
struct IterLimits {
    dx_conv: f64,
    dx_rms_change_conv: f64,
    max_iter: usize,
}

impl IterLimits {
    fn from_params(params: &Params) -> Self {
        Self {
            dx_conv: params.bt_dx_conv,
            dx_rms_change_conv: params.bt_dx_rms_change_conv,
            max_iter: params.bt_max_iter,
        }
    }
}

/// Realize the internal-coordinate step `dq` in Cartesian space.
///
/// `geom` is updated in place to the displaced geometry. The returned
/// vector is the displacement actually achieved (`q_final - q_orig`),
/// which differs from `dq` whenever the back-transformation only
/// partially converged; callers must use it, not the request, when
/// recording the step.
///
/// `fq` is used for reporting only. With `ensure_convergence`, a stalled
/// full step is retried at `dq/2, dq/4, ... dq/10`; if a reduced step
/// converges the rest of the displacement follows in equal partial steps,
/// and if even the tenth-size step stalls, the full step is attempted one
/// last time best-effort. Without it, a single best-effort iteration run
/// is made.
///
/// # Errors
///
/// [`DisplaceError::ConstraintFailure`] in IRC mode when the main
/// displacement did not converge. The frozen-coordinate correction pass
/// never escalates; its failure is logged and the best geometry kept.
pub fn displace(
    intcos: &mut [Box<dyn Coordinate>],
    geom: &mut Geometry,
    dq: &DVector<f64>,
    fq: Option<&DVector<f64>>,
    params: &Params,
    ensure_convergence: bool,
) -> Result<DVector<f64>, DisplaceError> {
    if intcos.is_empty() || geom.is_empty() || dq.is_empty() {
        return Ok(DVector::zeros(dq.len()));
    }

    coordinate::update_dihedral_orientations(intcos, geom);
    let geom_orig = geom.clone();
    let dq_orig = dq.clone();
    coordinate::unfix_bend_axes(intcos);
    let q_orig = coordinate::q_values(intcos, &geom_orig);

    info!("beginning displacement in Cartesian coordinates");

    let limits = IterLimits::from_params(params);
    let mut conv = false;

    if ensure_convergence {
        let mut cnt = 0usize;
        loop {
            let mut dq_work = if cnt > 0 {
                info!("reducing step size by a factor of {}", 2 * cnt);
                &dq_orig / (2.0 * cnt as f64)
            } else {
                dq_orig.clone()
            };

            coordinate::fix_bend_axes(intcos, geom);
            conv = step_iter(intcos, geom, &mut dq_work, &limits, params.print_lvl);
            coordinate::unfix_bend_axes(intcos);

            if conv {
                break;
            }
            if cnt == 5 {
                warn!(
                    "unable to back-transform even a tenth of the desired step rigorously; \
                     attempting the full step and keeping the best-effort geometry"
                );
                geom.coords.copy_from(&geom_orig.coords);
                let mut dq_full = dq_orig.clone();
                coordinate::fix_bend_axes(intcos, geom);
                conv = step_iter(intcos, geom, &mut dq_full, &limits, params.print_lvl);
                coordinate::unfix_bend_axes(intcos);
                break;
            }
            // Original geometry back for the next try at a smaller step.
            geom.coords.copy_from(&geom_orig.coords);
            cnt += 1;
        }

        if conv && cnt > 0 {
            // A reduced step converged; finish the displacement with the
            // remaining equal-sized partial back-transformations.
            info!("able to take a small step; completing the remaining partial back-transformations");
            let n_steps = 2 * cnt;
            let mut last_good = geom.coords.clone();

            for j in 1..n_steps {
                info!("mini-step {} of {}", j + 1, n_steps);
                let mut dq_work = &dq_orig / (n_steps as f64);
                last_good.copy_from(&geom.coords);

                coordinate::fix_bend_axes(intcos, geom);
                conv = step_iter(intcos, geom, &mut dq_work, &limits, params.print_lvl);
                coordinate::unfix_bend_axes(intcos);

                if !conv {
                    warn!("could not converge mini-step {}; quitting with the previous geometry", j + 1);
                    geom.coords.copy_from(&last_good);
                    break;
                }
            }
        }
    } else {
        // Best effort: continue even if the desired dq is not achieved.
        let mut dq_work = dq_orig.clone();
        coordinate::fix_bend_axes(intcos, geom);
        conv = step_iter(intcos, geom, &mut dq_work, &limits, params.print_lvl);
        coordinate::unfix_bend_axes(intcos);
    }

    // An IRC walk has no valid fallback geometry.
    if params.opt_type == OptType::Irc && !conv {
        return Err(DisplaceError::ConstraintFailure);
    }

    // Fix drift/error in any frozen coordinates: a tight second
    // back-transformation driving only the frozen coordinates back to
    // their original values.
    if intcos.iter().any(|c| c.frozen()) {
        let q_now = coordinate::q_values(intcos, geom);
        let mut dq_adjust = &q_orig - &q_now;
        for (i, intco) in intcos.iter().enumerate() {
            if !intco.frozen() {
                dq_adjust[i] = 0.0;
            }
        }

        let frozen_limits = IterLimits {
            dx_conv: 1.0e-12,
            dx_rms_change_conv: 1.0e-12,
            max_iter: 100,
        };
        coordinate::fix_bend_axes(intcos, geom);
        let check = step_iter(intcos, geom, &mut dq_adjust, &frozen_limits, params.print_lvl);
        coordinate::unfix_bend_axes(intcos);

        if check {
            info!("back-transformation to adjust frozen coordinates: successful");
        } else {
            warn!("back-transformation to adjust frozen coordinates: unsuccessful, but continuing");
        }
    }

    // The achieved displacement, not the requested one.
    let q_final = coordinate::q_values(intcos, geom);
    let dq_achieved = &q_final - &q_orig;

    if params.print_lvl >= 1 {
        let q_target = &q_orig + &dq_orig;
        let mut report = String::from(
            "report of back-transformation (au)\n    int        q_target           error\n",
        );
        for i in 0..intcos.len() {
            report += &format!(
                "  {:5} {:15.10} {:15.10}\n",
                i + 1,
                q_target[i],
                q_final[i] - q_target[i]
            );
        }
        debug!("{}", report);

        let q_show_final = coordinate::q_show_values(intcos, geom);
        let q_show_orig = coordinate::q_show_values(intcos, &geom_orig);
        let mut table = String::from(
            "internal coordinate step (display units)\n\
             \x20        coordinate      previous        change           new\n",
        );
        for (i, intco) in intcos.iter().enumerate() {
            let row = match fq {
                Some(fq) => format!(
                    "  {:>16} {:13.5} {:13.5} {:13.5} {:13.5}\n",
                    intco.label(),
                    q_show_orig[i],
                    fq[i] * intco.f_show_factor(),
                    q_show_final[i] - q_show_orig[i],
                    q_show_final[i]
                ),
                None => format!(
                    "  {:>16} {:13.5} {:13.5} {:13.5}\n",
                    intco.label(),
                    q_show_orig[i],
                    q_show_final[i] - q_show_orig[i],
                    q_show_final[i]
                ),
            };
            table += &row;
        }
        info!("{}", table);
    }

    Ok(dq_achieved)
}

/// Repeated Newton iterations toward the target internal values.
///
/// `dq` is consumed as the remaining displacement and recomputed from the
/// target after every iteration. Returns whether the run converged; on
/// exit the geometry is the final iterate or, if that is worse, the best
/// intermediate seen.
fn step_iter(
    intcos: &[Box<dyn Coordinate>],
    geom: &mut Geometry,
    dq: &mut DVector<f64>,
    limits: &IterLimits,
    print_lvl: u8,
) -> bool {
    let mut dx_rms_last = -1.0;

    let q_orig = coordinate::q_values(intcos, geom);
    let q_target = &q_orig + &*dq;

    let mut iter_table = String::from(
        "\n     iter        RMS(dx)        max(dx)        RMS(dq)\n",
    );

    let mut best_geom = geom.coords.clone();
    // Explicitly initialized so a single-iteration run is well defined;
    // the first iteration always records itself as best.
    let mut best_dq_rms = f64::INFINITY;
    let mut dq_rms;
    let mut bt_converged = false;
    let mut bt_iter_cnt = 0usize;

    loop {
        dq_rms = rms(dq);
        let (dx_rms, dx_max) = one_step(intcos, geom, dq);

        let mut done = false;
        if dx_rms < limits.dx_conv && dx_max < limits.dx_conv {
            bt_converged = true;
            done = true;
        } else if (dx_rms - dx_rms_last).abs() < limits.dx_rms_change_conv
            || bt_iter_cnt >= limits.max_iter
            || dx_rms > DX_RMS_BLOWUP
        {
            done = true;
        }
        dx_rms_last = dx_rms;

        // Remaining displacement toward the target.
        let new_q = coordinate::q_values(intcos, geom);
        dq.copy_from(&(&q_target - &new_q));

        if dq_rms < best_dq_rms {
            best_geom.copy_from(&geom.coords);
            best_dq_rms = dq_rms;
        }

        if print_lvl > 1 {
            iter_table += &format!(
                "  {:5} {:14.1e} {:14.1e} {:14.1e}\n",
                bt_iter_cnt + 1,
                dx_rms,
                dx_max,
                dq_rms
            );
        }
        bt_iter_cnt += 1;

        if done {
            break;
        }
    }

    if print_lvl > 1 {
        info!("{}", iter_table);
    }

    if bt_converged {
        info!("successfully converged to displaced geometry");
    } else {
        warn!("unable to completely converge to displaced geometry");
    }

    if dq_rms > best_dq_rms {
        warn!(
            "previous geometry is closer to target in internal coordinates, using that one; \
             best RMS(dq) = {:8.2e}",
            best_dq_rms
        );
        geom.coords.copy_from(&best_geom);
    }

    bt_converged
}

/// One Newton step: `dx = Bᵀ·G⁻¹·dq`, applied to the geometry in place.
///
/// Returns the RMS and maximum absolute Cartesian displacement for the
/// caller's convergence test.
fn one_step(intcos: &[Box<dyn Coordinate>], geom: &mut Geometry, dq: &DVector<f64>) -> (f64, f64) {
    let b = b_matrix(intcos, geom, None);
    let g = &b * b.transpose();
    let g_inv = symm_mat_inv_redundant(&g);
    let dx = b.transpose() * (g_inv * dq);
    geom.coords += &dx;
    (rms(&dx), abs_max(&dx))
}
