//! The internal-coordinate capability interface.
//!
//! Concrete coordinate kinds (bond stretch, bend, torsion, out-of-plane)
//! are defined by the molecular-system layer; the engine only requires the
//! [`Coordinate`] trait. Orientation bookkeeping (`update_orientation`)
//! and bend-axis pinning (`fix_bend_axes` / `unfix_bend_axes`) are
//! capability methods with no-op defaults, so variants without those
//! concerns implement nothing extra.
//!
//! Free functions in this module apply an operation across a whole
//! coordinate set, mirroring how the engine consumes coordinates: whole
//! B-matrix rows, whole value vectors, whole orientation refreshes.

use nalgebra::{DMatrix, DVector};

use crate::geometry::Geometry;

/// Capability contract implemented by each internal-coordinate variant.
///
/// A coordinate produces a scalar value from a Cartesian geometry and one
/// row of the Wilson B-matrix. Flags expose constraint state: `frozen`
/// coordinates are excluded from optimizer-driven displacement, while a
/// coordinate with a `fixed_eq_val` is driven toward that target value by
/// an artificial restoring force ([`crate::project::apply_fixed_forces`]).
pub trait Coordinate {
    /// Short human-readable identifier, e.g. `R(1,2)`.
    fn label(&self) -> String;

    /// Value of the coordinate at `geom`, in internal units (Bohr/radian).
    fn q(&self, geom: &Geometry) -> f64;

    /// Value scaled for display (Angstrom/degree).
    fn q_show(&self, geom: &Geometry) -> f64;

    /// Fill this coordinate's B-matrix row, `dq/dx`.
    ///
    /// `row` has length `3 * num_atoms` and arrives zeroed; only the
    /// entries of atoms the coordinate involves need to be written.
    fn dq_dx(&self, geom: &Geometry, row: &mut [f64]);

    /// Fill the second-derivative block `d2q/dx2` (`3N x 3N`).
    ///
    /// Optional capability; the default leaves `block` untouched. Used by
    /// Cartesian/internal Hessian conversion and the numerical consistency
    /// checks in [`crate::btest`].
    fn dq2_dx2(&self, geom: &Geometry, block: &mut DMatrix<f64>) {
        let _ = (geom, block);
    }

    /// Excluded from optimizer-driven displacement when true.
    fn frozen(&self) -> bool {
        false
    }

    /// Target value when the coordinate is held by an artificial
    /// restoring force; `None` for an unrestrained coordinate.
    fn fixed_eq_val(&self) -> Option<f64> {
        None
    }

    /// Unit-conversion factor applied when displaying forces on this
    /// coordinate.
    fn f_show_factor(&self) -> f64 {
        1.0
    }

    /// Refresh the stored reference orientation (torsion-like and
    /// out-of-plane-like variants). No-op default.
    fn update_orientation(&mut self, geom: &Geometry) {
        let _ = geom;
    }

    /// Pin the local axis frame for the duration of a multi-step
    /// displacement (angle-like variants). No-op default.
    fn fix_bend_axes(&mut self, geom: &Geometry) {
        let _ = geom;
    }

    /// Release a pinned axis frame. No-op default.
    fn unfix_bend_axes(&mut self) {}
}

/// A group of internal coordinates belonging to one molecular fragment.
///
/// The engine addresses whole-system force and Hessian rows through the
/// cumulative offset of each fragment's coordinates; see
/// [`crate::project::apply_fixed_forces`].
pub struct Fragment {
    /// The fragment's internal coordinates, in whole-system row order.
    pub intcos: Vec<Box<dyn Coordinate>>,
}

/// Values of every coordinate in the set.
pub fn q_values(intcos: &[Box<dyn Coordinate>], geom: &Geometry) -> DVector<f64> {
    DVector::from_iterator(intcos.len(), intcos.iter().map(|c| c.q(geom)))
}

/// Display-scaled values of every coordinate in the set.
pub fn q_show_values(intcos: &[Box<dyn Coordinate>], geom: &Geometry) -> DVector<f64> {
    DVector::from_iterator(intcos.len(), intcos.iter().map(|c| c.q_show(geom)))
}

/// Forces scaled for display by each coordinate's `f_show_factor`.
pub fn q_show_forces(intcos: &[Box<dyn Coordinate>], forces: &DVector<f64>) -> DVector<f64> {
    let mut out = forces.clone();
    for (i, c) in intcos.iter().enumerate() {
        out[i] *= c.f_show_factor();
    }
    out
}

/// Refresh the reference orientation of orientation-sensitive coordinates.
pub fn update_dihedral_orientations(intcos: &mut [Box<dyn Coordinate>], geom: &Geometry) {
    for intco in intcos.iter_mut() {
        intco.update_orientation(geom);
    }
}

/// Pin the local axis frames of angle-like coordinates.
pub fn fix_bend_axes(intcos: &mut [Box<dyn Coordinate>], geom: &Geometry) {
    for intco in intcos.iter_mut() {
        intco.fix_bend_axes(geom);
    }
}

/// Release the axis frames pinned by [`fix_bend_axes`].
pub fn unfix_bend_axes(intcos: &mut [Box<dyn Coordinate>]) {
    for intco in intcos.iter_mut() {
        intco.unfix_bend_axes();
    }
}
