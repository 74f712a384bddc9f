//! Optimization step history, trust-radius state, and quasi-Newton
//! Hessian updates.
//!
//! [`History`] is an append-only log of [`Step`]s owned by one
//! optimization run; it also carries the steps-since-exact-Hessian
//! counter and the [`TrustRadius`] shared with the optimizer. There is no
//! global state: construct a `History` per run and drop it when the run
//! ends.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::{HessUpdate, OptType, Params};
use crate::coordinate::{self, Coordinate};
use crate::geometry::Geometry;
use crate::linalg::{abs_max, rms, sign_of};

/// One recorded optimization step.
///
/// The geometry, energy, and forces are snapshotted at `append` time; the
/// remaining fields are attached after the step is taken, via
/// [`History::record_last`].
#[derive(Debug, Clone)]
pub struct Step {
    /// Geometry at which the energy and forces were evaluated.
    pub geom: Geometry,
    /// Energy in Hartree.
    pub energy: f64,
    /// Forces in internal coordinates (au).
    pub forces: DVector<f64>,
    /// Energy change predicted by the optimizer's quadratic model.
    pub projected_de: Option<f64>,
    /// Displacement actually achieved by the back-transformation.
    pub dq: Option<DVector<f64>>,
    /// Unit vector along the step, for line-search bookkeeping.
    pub followed_unit_vector: Option<DVector<f64>>,
    /// Gradient along the followed direction.
    pub one_d_gradient: Option<f64>,
    /// Curvature along the followed direction.
    pub one_d_hessian: Option<f64>,
}

impl Step {
    fn new(geom: &Geometry, energy: f64, forces: &DVector<f64>) -> Self {
        Self {
            geom: geom.clone(),
            energy,
            forces: forces.clone(),
            projected_de: None,
            dq: None,
            followed_unit_vector: None,
            one_d_gradient: None,
            one_d_hessian: None,
        }
    }
}

/// Trust radius shared between the step-quality logic and the optimizer.
///
/// Grown by a factor of 3 and shrunk by a factor of 4, clamped to the
/// configured bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustRadius {
    /// Current radius in au.
    pub value: f64,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl TrustRadius {
    /// New trust-radius state.
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, min, max }
    }

    /// Grow the radius after a well-predicted step.
    pub fn increase(&mut self) {
        if self.value < self.max {
            self.value = (3.0 * self.value).min(self.max);
            info!("trust radius increased to {:.4}", self.value);
        }
    }

    /// Shrink the radius after a poorly-predicted step.
    pub fn decrease(&mut self) {
        if self.value > self.min {
            self.value = (self.value / 4.0).max(self.min);
            info!("trust radius decreased to {:.4}", self.value);
        }
    }
}

/// Append-only log of optimization steps for one run.
#[derive(Debug, Clone)]
pub struct History {
    steps: Vec<Step>,
    /// Steps recorded since the last exact Hessian evaluation; bounds how
    /// far back updates may look.
    pub steps_since_last_hessian: usize,
    /// Consecutive rejected/backward steps taken by the optimizer.
    pub consecutive_backsteps: usize,
    /// Trust-radius state shared with the optimizer.
    pub trust: TrustRadius,
}

impl History {
    /// Empty history for a new optimization run.
    pub fn new(params: &Params) -> Self {
        Self {
            steps: Vec::new(),
            steps_since_last_hessian: 0,
            consecutive_backsteps: 0,
            trust: TrustRadius::new(
                params.intrafrag_trust,
                params.intrafrag_trust_min,
                params.intrafrag_trust_max,
            ),
        }
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no step has been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// A recorded step by index.
    pub fn step(&self, index: usize) -> &Step {
        &self.steps[index]
    }

    /// The most recent step, if any.
    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Record a new step's geometry, energy, and internal forces.
    pub fn append(&mut self, geom: &Geometry, energy: f64, forces: &DVector<f64>) {
        self.steps.push(Step::new(geom, energy, forces));
        self.steps_since_last_hessian += 1;
    }

    /// Attach post-hoc details to the most recent step.
    pub fn record_last(
        &mut self,
        projected_de: f64,
        dq: &DVector<f64>,
        followed_unit_vector: &DVector<f64>,
        one_d_gradient: f64,
        one_d_hessian: f64,
    ) {
        if let Some(step) = self.steps.last_mut() {
            step.projected_de = Some(projected_de);
            step.dq = Some(dq.clone());
            step.followed_unit_vector = Some(followed_unit_vector.clone());
            step.one_d_gradient = Some(one_d_gradient);
            step.one_d_hessian = Some(one_d_hessian);
        }
    }

    /// Note that an exact Hessian was just computed, so updates must not
    /// reach past this point.
    pub fn mark_exact_hessian(&mut self) {
        self.steps_since_last_hessian = 0;
    }

    /// Keep only the most recent step.
    ///
    /// Used after a backstep rejection; the surviving step's projection
    /// is cleared since it no longer has a valid basis.
    pub fn reset_to_most_recent(&mut self) {
        if let Some(last) = self.steps.pop() {
            self.steps.clear();
            self.steps.push(last);
        }
        self.steps_since_last_hessian = 0;
        self.consecutive_backsteps = 0;
        if let Some(step) = self.steps.first_mut() {
            step.projected_de = None;
        }
    }

    /// Judge the quality of the last step and adjust the trust radius.
    ///
    /// Returns `false` when the step should be rejected (energy rose
    /// unexpectedly in a minimization). The first step, or a step without
    /// a recorded projection, is always accepted.
    pub fn current_step_report(&mut self, params: &Params) -> bool {
        let n = self.steps.len();
        if n < 2 {
            return true;
        }
        let energy_change = self.steps[n - 1].energy - self.steps[n - 2].energy;
        let Some(projected_change) = self.steps[n - 2].projected_de else {
            return true;
        };

        info!(
            "current energy: {:.10}; energy change actual {:.10}, projected {:.10}",
            self.steps[n - 1].energy,
            energy_change,
            projected_change
        );

        let energy_ratio = energy_change / projected_change;
        if params.print_lvl >= 1 {
            info!("energy ratio = {:10.5}", energy_ratio);
        }

        if params.opt_type == OptType::Min {
            // Predicted up, actual down: fine as is.
            if projected_change > 0.0 && energy_ratio < 0.0 {
                return true;
            } else if energy_change > 0.0 {
                warn!("energy has increased in a minimization");
                self.trust.decrease();
                return false;
            } else if energy_ratio < 0.25 {
                self.trust.decrease();
            } else if energy_ratio > 0.75 {
                self.trust.increase();
            }
        }

        true
    }

    /// Per-step convergence summary table.
    pub fn summary(&self) -> String {
        let mut out = String::from(
            "  step         total energy            delta E      max force      rms force\
            \x20      max disp       rms disp\n",
        );
        for (i, step) in self.steps.iter().enumerate() {
            let de = if i == 0 {
                step.energy
            } else {
                step.energy - self.steps[i - 1].energy
            };
            // The recorded Dq is used so angle wraps do not show up as
            // huge displacements.
            let (max_disp, rms_disp) = match &step.dq {
                Some(dq) => (abs_max(dq), rms(dq)),
                None => (-99.0, -99.0),
            };
            out += &format!(
                "  {:4} {:20.12} {:18.12} {:14.8} {:14.8} {:14.8} {:14.8}\n",
                i + 1,
                step.energy,
                de,
                abs_max(&step.forces),
                rms(&step.forces),
                max_disp,
                rms_disp
            );
        }
        out
    }

    /// Refresh the Hessian estimate from recent steps.
    ///
    /// Walks backward from the newest step, using at most
    /// `hess_update_use_last` previous steps (and never past the last
    /// exact Hessian). A candidate step is skipped when its displacement
    /// makes the update denominators unreliable or when any coordinate
    /// changed by more than `hess_update_dq_tol` (a likely wrap through a
    /// discontinuity); the sole remaining candidate is always taken.
    /// Updates are applied sequentially in walk-back order.
    pub fn update_hessian(
        &self,
        h: &mut DMatrix<f64>,
        intcos: &mut [Box<dyn Coordinate>],
        params: &Params,
    ) {
        if params.hess_update == HessUpdate::None || self.steps.len() < 2 {
            return;
        }
        info!("performing {:?} Hessian update", params.hess_update);

        let nint = intcos.len();
        let Some(current) = self.steps.last() else {
            return;
        };
        let f = current.forces.clone();
        let q = coordinate::q_values(intcos, &current.geom);

        // Fix the orientation of torsions and out-of-plane angles so the
        // displacements below are meaningful.
        coordinate::update_dihedral_orientations(intcos, &current.geom);

        let num_to_use = params
            .hess_update_use_last
            .min(self.steps.len() - 1)
            .min(self.steps_since_last_hessian);
        info!("using up to {} previous steps for update", num_to_use);

        let mut use_steps: Vec<usize> = Vec::new();
        let mut i_step = self.steps.len() as isize - 2;
        while i_step >= 0 && use_steps.len() < num_to_use {
            let old = &self.steps[i_step as usize];
            let q_old = coordinate::q_values(intcos, &old.geom);
            let dq = &q - &q_old;
            let dg = &old.forces - &f; // gradients, not forces
            let gq = dq.dot(&dg);
            let qq = dq.dot(&dq);
            let max_change = abs_max(&dq);

            if use_steps.is_empty() && i_step == 0 {
                // Only one candidate left; take it no matter what.
                use_steps.push(0);
            } else if gq.abs() < params.hess_update_den_tol
                || qq.abs() < params.hess_update_den_tol
            {
                warn!(
                    "denominators (dq.dg) or (dq.dq) are very small; \
                     skipping Hessian update for step {}",
                    i_step + 1
                );
            } else if max_change > params.hess_update_dq_tol {
                warn!(
                    "change in internal coordinate of {:5.2e} exceeds limit of {:5.2e}; \
                     skipping Hessian update for step {}",
                    max_change,
                    params.hess_update_dq_tol,
                    i_step + 1
                );
            } else {
                use_steps.push(i_step as usize);
            }
            i_step -= 1;
        }

        info!(
            "steps to be used in Hessian update: {:?}",
            use_steps.iter().map(|i| i + 1).collect::<Vec<_>>()
        );

        for &i_step in &use_steps {
            let old = &self.steps[i_step];
            let q_old = coordinate::q_values(intcos, &old.geom);
            let dq = &q - &q_old;
            let dg = &old.forces - &f;
            let gq = dq.dot(&dg);
            let qq = dq.dot(&dq);

            // See J. M. Bofill, J. Comput. Chem. 15, 1 (1994) and
            // Helgaker, JCP 2002 for the formulas.
            let mut h_new = h.clone();
            match params.hess_update {
                HessUpdate::Bfgs => {
                    h_new += &dg * dg.transpose() / gq;
                    let hdq = &*h * &dq;
                    let dq_h_dq = dq.dot(&hdq);
                    h_new -= &hdq * hdq.transpose() / dq_h_dq;
                }
                HessUpdate::Ms => {
                    let z = &dg - &(&*h * &dq);
                    let qz = dq.dot(&z);
                    h_new += &z * z.transpose() / qz;
                }
                HessUpdate::Powell => {
                    let z = &dg - &(&*h * &dq);
                    let qz = dq.dot(&z);
                    h_new -= (qz / (qq * qq)) * (&dq * dq.transpose());
                    h_new += (&z * dq.transpose() + &dq * z.transpose()) / qq;
                }
                HessUpdate::Bofill => {
                    // Bofill = (1 - phi) * MS + phi * Powell
                    let z = &dg - &(&*h * &dq);
                    let qz = dq.dot(&z);
                    let zz = z.dot(&z);
                    let phi = bofill_phi(qz, qq, zz);
                    h_new += (1.0 - phi) * (&z * z.transpose() / qz);
                    h_new -= phi * (qz / (qq * qq)) * (&dq * dq.transpose());
                    h_new += phi * ((&z * dq.transpose() + &dq * z.transpose()) / qq);
                }
                HessUpdate::None => return,
            }

            if params.hess_update_limit {
                // Changes are limited to the larger of
                // hess_update_limit_scale * |previous value| and
                // hess_update_limit_max.
                let scale = params.hess_update_limit_scale;
                let max_limit = params.hess_update_limit_max;
                for i in 0..nint {
                    for j in 0..nint {
                        let change = h_new[(i, j)] - h[(i, j)];
                        let cap = (scale * h[(i, j)]).abs().max(max_limit);
                        if change.abs() < cap {
                            h[(i, j)] += change;
                        } else {
                            h[(i, j)] += cap * sign_of(change);
                        }
                    }
                }
            } else {
                h.copy_from(&h_new);
            }
        }

        if params.print_lvl >= 2 {
            debug!("updated Hessian (au):\n{:.6}", h);
        }
    }
}

/// Bofill mixing weight `phi = 1 - (dq.Z)^2 / ((dq.dq)(Z.Z))`, clamped to
/// `[0, 1]`.
fn bofill_phi(qz: f64, qq: f64, zz: f64) -> f64 {
    (1.0 - qz * qz / (qq * zz)).clamp(0.0, 1.0)
}
