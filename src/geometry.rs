//! Cartesian molecular geometry.
//!
//! A [`Geometry`] is an ordered sequence of atomic positions stored as a
//! flat vector `[x1, y1, z1, x2, y2, z2, ...]` for direct use in the
//! linear-algebra transforms of this crate. All positions are in Bohr.
//!
//! The back-transformation ([`crate::displace`]) mutates a geometry in
//! place; every function doing so documents that in/out contract.

use nalgebra::DVector;

/// Ordered atomic Cartesian positions.
///
/// Coordinates are stored flat in a `DVector<f64>` so that the Wilson
/// B-matrix and its derived quantities can act on them without copying.
/// The structure is owned by the enclosing molecular system; the engine
/// borrows it, mutably during back-transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Flattened Cartesian coordinates `[x1, y1, z1, x2, y2, z2, ...]` in Bohr.
    pub coords: DVector<f64>,
    /// Number of atoms.
    pub num_atoms: usize,
}

impl Geometry {
    /// Create a geometry from a flat coordinate list.
    ///
    /// # Panics
    ///
    /// Panics if `coords.len()` is not a multiple of 3.
    pub fn new(coords: Vec<f64>) -> Self {
        assert_eq!(coords.len() % 3, 0, "coordinate list must be 3*num_atoms long");
        let num_atoms = coords.len() / 3;
        Self {
            coords: DVector::from_vec(coords),
            num_atoms,
        }
    }

    /// Number of Cartesian degrees of freedom (`3 * num_atoms`).
    pub fn ncart(&self) -> usize {
        3 * self.num_atoms
    }

    /// True if the geometry holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.num_atoms == 0
    }

    /// Cartesian position of one atom.
    pub fn atom(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Displacement vector from atom `a` to atom `b`.
    pub fn inter_atom(&self, a: usize, b: usize) -> [f64; 3] {
        let pa = self.atom(a);
        let pb = self.atom(b);
        [pb[0] - pa[0], pb[1] - pa[1], pb[2] - pa[2]]
    }

    /// Distance between atoms `a` and `b`.
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let d = self.inter_atom(a, b);
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }
}
