//! Engine configuration.
//!
//! [`Params`] collects every option the engine recognizes, with the
//! defaults used by the reference optimizer. Input-file parsing is the
//! embedding application's concern; the struct derives serde traits so it
//! can ride along in whatever configuration format the caller uses.

use serde::{Deserialize, Serialize};

/// Quasi-Newton Hessian update scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HessUpdate {
    /// Leave the Hessian unchanged.
    None,
    /// Broyden-Fletcher-Goldfarb-Shanno, the minimization workhorse.
    #[default]
    Bfgs,
    /// Murtagh-Sargent symmetric rank-one.
    Ms,
    /// Powell symmetric update; tolerates negative curvature.
    Powell,
    /// Bofill's weighted Murtagh-Sargent/Powell mixture for saddle points.
    Bofill,
}

/// Kind of optimization being driven.
///
/// The mode changes two behaviors: trust-radius step-quality logic applies
/// to minimizations, and a non-convergent constrained back-transformation
/// is fatal only on an IRC walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptType {
    /// Minimization.
    #[default]
    Min,
    /// Transition-state search.
    Ts,
    /// Intrinsic-reaction-coordinate walk.
    Irc,
}

/// All options consumed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Back-transformation convergence threshold on both RMS and max
    /// Cartesian displacement per Newton iteration, in Bohr.
    pub bt_dx_conv: f64,
    /// Back-transformation stagnation threshold: stop when the RMS
    /// Cartesian displacement changes by less than this between iterations.
    pub bt_dx_rms_change_conv: f64,
    /// Maximum back-transformation Newton iterations.
    pub bt_max_iter: usize,
    /// Hessian update scheme.
    pub hess_update: HessUpdate,
    /// Maximum number of previous steps used per Hessian update.
    pub hess_update_use_last: usize,
    /// Skip a historical step when `|dq.dg|` or `|dq.dq|` falls below this.
    pub hess_update_den_tol: f64,
    /// Skip a historical step when any component of `dq` exceeds this
    /// (the coordinate likely wrapped through a discontinuity).
    pub hess_update_dq_tol: f64,
    /// Limit the magnitude of individual Hessian element changes.
    pub hess_update_limit: bool,
    /// With `hess_update_limit`, changes are capped at the larger of
    /// `hess_update_limit_scale * |H_old|` and `hess_update_limit_max`.
    pub hess_update_limit_scale: f64,
    /// Absolute cap partner of `hess_update_limit_scale`.
    pub hess_update_limit_max: f64,
    /// Base force constant for coordinates held at a fixed target value.
    pub fixed_coord_force_constant: f64,
    /// Optimization mode.
    pub opt_type: OptType,
    /// Diagnostic verbosity; gates reporting only, never behavior.
    pub print_lvl: u8,
    /// Initial trust radius, in au.
    pub intrafrag_trust: f64,
    /// Lower bound on the trust radius.
    pub intrafrag_trust_min: f64,
    /// Upper bound on the trust radius.
    pub intrafrag_trust_max: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bt_dx_conv: 1.0e-6,
            bt_dx_rms_change_conv: 1.0e-12,
            bt_max_iter: 25,
            hess_update: HessUpdate::Bfgs,
            hess_update_use_last: 4,
            hess_update_den_tol: 1.0e-7,
            hess_update_dq_tol: 0.5,
            hess_update_limit: true,
            hess_update_limit_scale: 0.5,
            hess_update_limit_max: 1.0,
            fixed_coord_force_constant: 0.25,
            opt_type: OptType::Min,
            print_lvl: 1,
            intrafrag_trust: 0.3,
            intrafrag_trust_min: 0.001,
            intrafrag_trust_max: 1.0,
        }
    }
}
