// Quasi-Newton Hessian updates driven from recorded history.

mod common;

use common::Stretch;
use nalgebra::{DMatrix, DVector};
use redint::coordinate::Coordinate;
use redint::geometry::Geometry;
use redint::{HessUpdate, History, Params};

fn one_stretch() -> Vec<Box<dyn Coordinate>> {
    vec![Box::new(Stretch::new(0, 1))]
}

fn two_stretches() -> Vec<Box<dyn Coordinate>> {
    vec![Box::new(Stretch::new(0, 1)), Box::new(Stretch::new(1, 2))]
}

fn diatomic(r: f64) -> Geometry {
    Geometry::new(vec![0.0, 0.0, 0.0, r, 0.0, 0.0])
}

/// Two-step stretch history: r 2.0 -> 2.1, internal force 0.05 -> 0.03.
fn stretch_history(params: &Params) -> History {
    let mut history = History::new(params);
    history.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.05]));
    history.append(&diatomic(2.1), -1.004, &DVector::from_vec(vec![0.03]));
    history
}

#[test]
fn bfgs_update_value_and_positive_curvature_term() {
    // dq = 0.1, dg = f_old - f = 0.02, so dq.dg > 0 and the curvature
    // term dg(x)dg/(dq.dg) contributes +0.2 to the diagonal.
    let params = Params {
        hess_update: HessUpdate::Bfgs,
        print_lvl: 0,
        ..Params::default()
    };
    let history = stretch_history(&params);
    let mut intcos = one_stretch();

    let mut h = DMatrix::from_element(1, 1, 0.5);
    history.update_hessian(&mut h, &mut intcos, &params);

    // 0.5 + 0.02^2/0.002 - (0.5*0.1)^2/(0.1*0.5*0.1) = 0.5 + 0.2 - 0.5
    assert!((h[(0, 0)] - 0.2).abs() < 1e-12, "H = {}", h[(0, 0)]);
}

#[test]
fn all_schemes_preserve_symmetry() {
    let base = Params {
        print_lvl: 0,
        ..Params::default()
    };

    for scheme in [
        HessUpdate::Bfgs,
        HessUpdate::Ms,
        HessUpdate::Powell,
        HessUpdate::Bofill,
    ] {
        let params = Params {
            hess_update: scheme,
            ..base.clone()
        };
        let mut history = History::new(&params);
        history.append(
            &Geometry::new(vec![0.0, 0.0, 0.0, 1.5, 0.0, 0.0, 3.0, 0.3, 0.0]),
            -2.000,
            &DVector::from_vec(vec![0.05, -0.02]),
        );
        history.append(
            &Geometry::new(vec![0.0, 0.0, 0.0, 1.6, 0.1, 0.0, 3.1, 0.5, 0.0]),
            -2.003,
            &DVector::from_vec(vec![0.02, -0.04]),
        );
        let mut intcos = two_stretches();

        let mut h = DMatrix::from_row_slice(2, 2, &[0.6, 0.1, 0.1, 0.5]);
        history.update_hessian(&mut h, &mut intcos, &params);

        let asym = (&h - h.transpose()).norm();
        assert!(asym < 1e-10, "{:?} broke symmetry by {}", scheme, asym);
        assert!(h.iter().all(|v| v.is_finite()), "{:?} produced non-finite H", scheme);
        // The update must actually have changed something.
        let diff = (&h - DMatrix::from_row_slice(2, 2, &[0.6, 0.1, 0.1, 0.5])).norm();
        assert!(diff > 1e-10, "{:?} left H untouched", scheme);
    }
}

#[test]
fn none_scheme_leaves_hessian_untouched() {
    let params = Params {
        hess_update: HessUpdate::None,
        print_lvl: 0,
        ..Params::default()
    };
    let history = stretch_history(&params);
    let mut intcos = one_stretch();

    let mut h = DMatrix::from_element(1, 1, 0.5);
    history.update_hessian(&mut h, &mut intcos, &params);
    assert_eq!(h[(0, 0)], 0.5);
}

#[test]
fn degenerate_step_is_screened_out() {
    // The most recent old step nearly coincides with the current one;
    // using it would divide by ~1e-18. It must be skipped, leaving a
    // finite, sane Hessian from the remaining steps.
    let params = Params {
        print_lvl: 0,
        ..Params::default()
    };
    let mut history = History::new(&params);
    history.append(&diatomic(1.9), -0.998, &DVector::from_vec(vec![0.07]));
    history.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.05]));
    history.append(&diatomic(2.1 + 1e-9), -1.004, &DVector::from_vec(vec![0.0300001]));
    history.append(&diatomic(2.1), -1.004, &DVector::from_vec(vec![0.03]));
    let mut intcos = one_stretch();

    let mut h = DMatrix::from_element(1, 1, 0.5);
    history.update_hessian(&mut h, &mut intcos, &params);

    assert!(h[(0, 0)].is_finite());
    assert!(h[(0, 0)].abs() < 100.0, "H exploded: {}", h[(0, 0)]);
}

#[test]
fn single_history_step_is_always_used() {
    // dq = 0.6 exceeds hess_update_dq_tol, but with only one historical
    // step there is nothing better; it is used regardless.
    let params = Params {
        print_lvl: 0,
        ..Params::default()
    };
    let mut history = History::new(&params);
    history.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.05]));
    history.append(&diatomic(2.6), -1.010, &DVector::from_vec(vec![0.01]));
    let mut intcos = one_stretch();

    let mut h = DMatrix::from_element(1, 1, 0.5);
    history.update_hessian(&mut h, &mut intcos, &params);
    assert!((h[(0, 0)] - 0.5).abs() > 1e-10, "update was skipped");
}

#[test]
fn wrapped_coordinate_step_is_skipped_when_alternatives_exist() {
    // The middle step jumps by 0.6 (> hess_update_dq_tol) and must be
    // passed over in favor of the older, well-behaved step. The result
    // matches a history containing only that older step.
    let params = Params {
        print_lvl: 0,
        ..Params::default()
    };

    let mut full = History::new(&params);
    full.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.05]));
    full.append(&diatomic(2.7), -1.020, &DVector::from_vec(vec![0.00]));
    full.append(&diatomic(2.1), -1.004, &DVector::from_vec(vec![0.03]));

    let mut reduced = History::new(&params);
    reduced.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.05]));
    reduced.append(&diatomic(2.1), -1.004, &DVector::from_vec(vec![0.03]));

    let mut intcos = one_stretch();
    let mut h_full = DMatrix::from_element(1, 1, 0.5);
    full.update_hessian(&mut h_full, &mut intcos, &params);
    let mut h_reduced = DMatrix::from_element(1, 1, 0.5);
    reduced.update_hessian(&mut h_reduced, &mut intcos, &params);

    assert!((h_full[(0, 0)] - h_reduced[(0, 0)]).abs() < 1e-12);
}

#[test]
fn change_limiting_caps_large_updates() {
    // A large gradient change asks for a +9 jump in the only element;
    // with limiting the change is capped at max(scale*|H|, limit_max).
    let history_params = Params {
        print_lvl: 0,
        ..Params::default()
    };
    let mut history = History::new(&history_params);
    history.append(&diatomic(2.0), -1.000, &DVector::from_vec(vec![0.5]));
    history.append(&diatomic(2.1), -1.050, &DVector::from_vec(vec![-0.5]));
    let mut intcos = one_stretch();

    let limited = Params {
        print_lvl: 0,
        ..Params::default()
    };
    let mut h = DMatrix::from_element(1, 1, 1.0);
    history.update_hessian(&mut h, &mut intcos, &limited);
    // raw update: 1 + 1^2/0.1 - (1*0.1)^2/(0.1*1*0.1) = 10; change +9
    // capped at max(0.5*1, 1.0) = 1.
    assert!((h[(0, 0)] - 2.0).abs() < 1e-12, "H = {}", h[(0, 0)]);

    let unlimited = Params {
        print_lvl: 0,
        hess_update_limit: false,
        ..Params::default()
    };
    let mut h = DMatrix::from_element(1, 1, 1.0);
    history.update_hessian(&mut h, &mut intcos, &unlimited);
    assert!((h[(0, 0)] - 10.0).abs() < 1e-12, "H = {}", h[(0, 0)]);
}
