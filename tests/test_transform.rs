// B-matrix, G-matrix, and internal-force transformation tests, including
// the finite-difference consistency checks.

mod common;

use common::{water_geometry, water_intcos, water_intcos_redundant, Stretch};
use nalgebra::{DMatrix, DVector};
use redint::coordinate::Coordinate;
use redint::geometry::Geometry;
use redint::{btest, transform};

#[test]
fn analytic_b_matrix_matches_finite_differences() {
    let geom = water_geometry();
    let mut intcos = water_intcos();
    assert!(btest::test_b_matrix(&mut intcos, &geom));
}

#[test]
fn analytic_b_matrix_matches_finite_differences_redundant_set() {
    let geom = water_geometry();
    let mut intcos = water_intcos_redundant();
    assert!(btest::test_b_matrix(&mut intcos, &geom));
}

#[test]
fn stretch_second_derivatives_match_finite_differences() {
    let geom = water_geometry();
    let mut intcos: Vec<Box<dyn Coordinate>> = vec![
        Box::new(Stretch::new(0, 1)),
        Box::new(Stretch::new(0, 2)),
        Box::new(Stretch::new(1, 2)),
    ];
    assert!(btest::test_derivative_b_matrix(&mut intcos, &geom));
}

#[test]
fn g_matrix_is_symmetric() {
    let geom = water_geometry();
    let intcos = water_intcos_redundant();
    let g = transform::g_matrix(&intcos, &geom, None);
    let asym = (&g - g.transpose()).norm();
    assert!(asym < 1e-12, "G not symmetric: {}", asym);
}

#[test]
fn mass_weighting_scales_b_rows() {
    let geom = Geometry::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let intcos: Vec<Box<dyn Coordinate>> = vec![Box::new(Stretch::new(0, 1))];
    let masses = [4.0, 9.0];
    let b = transform::b_matrix(&intcos, &geom, Some(&masses));
    // Plain row is (-1, 0, 0, 1, 0, 0); weighted by 1/sqrt(m).
    assert!((b[(0, 0)] + 0.5).abs() < 1e-12);
    assert!((b[(0, 3)] - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn q_forces_along_bond_axis() {
    let geom = Geometry::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let intcos: Vec<Box<dyn Coordinate>> = vec![Box::new(Stretch::new(0, 1))];
    // Energy falls as the bond lengthens, so the internal force is +0.1.
    let gradient = DVector::from_vec(vec![0.1, 0.0, 0.0, -0.1, 0.0, 0.0]);
    let fq = transform::q_forces(&intcos, &geom, &gradient);
    assert_eq!(fq.len(), 1);
    assert!((fq[0] - 0.1).abs() < 1e-12, "fq = {}", fq[0]);
}

#[test]
fn q_forces_empty_inputs_yield_empty_result() {
    let geom = Geometry::new(vec![]);
    let intcos: Vec<Box<dyn Coordinate>> = Vec::new();
    let fq = transform::q_forces(&intcos, &geom, &DVector::zeros(0));
    assert_eq!(fq.len(), 0);
}

#[test]
fn hessian_round_trip_through_cartesians() {
    let geom = Geometry::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let intcos: Vec<Box<dyn Coordinate>> = vec![Box::new(Stretch::new(0, 1))];
    let hq = DMatrix::from_element(1, 1, 0.3);

    let hx = transform::hessian_to_cartesians(&hq, &intcos, &geom, None);
    assert_eq!(hx.nrows(), 6);
    let hq_back = transform::hessian_to_internals(&hx, &intcos, &geom, None).unwrap();
    assert!((hq_back[(0, 0)] - 0.3).abs() < 1e-10);
}
