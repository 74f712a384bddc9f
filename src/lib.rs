#![deny(missing_docs)]

//! redint - Redundant Internal Coordinate Geometry Engine
//!
//! redint converts between Cartesian atomic positions and a (possibly
//! redundant, possibly constrained) set of internal coordinates, realizes
//! optimizer-requested internal-coordinate steps in Cartesian space, and
//! maintains an approximate internal-coordinate Hessian updated from
//! optimization history.
//!
//! # Overview
//!
//! Geometry optimizers work best in internal coordinates (bond lengths,
//! angles, torsions), but quantum chemistry programs produce energies and
//! gradients in Cartesian space. This crate provides the machinery in
//! between:
//!
//! 1. **Transformation**: the Wilson B-matrix `B[i] = dq_i/dx` and the
//!    metric `G = B·Bᵀ`, whose generalized inverse handles the linear
//!    dependencies of redundant coordinate sets.
//! 2. **Back-transformation**: an iterative Newton scheme converting a
//!    requested internal-coordinate displacement into a new Cartesian
//!    geometry, with stagnation detection, step-size reduction retries, and
//!    a correction pass that holds frozen coordinates in place.
//! 3. **Projection**: removal of redundant and constrained directions from
//!    internal forces and the Hessian before each optimizer iteration.
//! 4. **History and Hessian updates**: an append-only step log driving
//!    BFGS, Murtagh-Sargent, Powell, and Bofill quasi-Newton updates and
//!    trust-radius adjustment.
//!
//! # What this crate does not do
//!
//! Energies, gradients, and exact Hessians are consumed as opaque inputs
//! from an external electronic-structure program. The choice of step
//! direction belongs to the calling optimizer. Concrete coordinate kinds
//! (stretch, bend, torsion, out-of-plane) live behind the
//! [`Coordinate`](coordinate::Coordinate) trait and are supplied by the
//! molecular-system layer.
//!
//! # Typical cycle
//!
//! ```text
//! optimizer step dq
//!     -> displace::displace         (new Cartesian geometry, achieved dq)
//!     -> History::append / record   (log the step)
//!     -> History::update_hessian    (refresh curvature estimate)
//!     -> project::project_redundancies_and_constraints
//!     -> next optimizer iteration
//! ```
//!
//! All matrix work uses `nalgebra`; diagnostics go through the `log`
//! facade and the embedding application chooses the sink. The engine is
//! single-threaded by design: exclusive (`&mut`) receivers make the
//! one-writer-per-optimization-run discipline explicit in the API.

pub mod btest;
pub mod config;
pub mod coordinate;
pub mod displace;
pub mod geometry;
pub mod history;
pub mod linalg;
pub mod project;
pub mod transform;

pub use config::{HessUpdate, OptType, Params};
pub use coordinate::{Coordinate, Fragment};
pub use displace::DisplaceError;
pub use geometry::Geometry;
pub use history::{History, Step, TrustRadius};
