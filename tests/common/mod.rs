// Concrete coordinate kinds used to exercise the engine. Real stretch and
// bend definitions live in the molecular-system layer; these minimal
// versions implement the same capability contract.

use nalgebra::DMatrix;
use redint::coordinate::Coordinate;
use redint::geometry::Geometry;

/// Bond stretch between two atoms.
pub struct Stretch {
    pub a: usize,
    pub b: usize,
    pub frozen: bool,
    pub fixed_eq_val: Option<f64>,
}

impl Stretch {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            frozen: false,
            fixed_eq_val: None,
        }
    }

    pub fn new_frozen(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            frozen: true,
            fixed_eq_val: None,
        }
    }
}

impl Coordinate for Stretch {
    fn label(&self) -> String {
        format!("R({},{})", self.a + 1, self.b + 1)
    }

    fn q(&self, geom: &Geometry) -> f64 {
        geom.distance(self.a, self.b)
    }

    fn q_show(&self, geom: &Geometry) -> f64 {
        self.q(geom)
    }

    fn dq_dx(&self, geom: &Geometry, row: &mut [f64]) {
        let d = geom.inter_atom(self.a, self.b);
        let r = self.q(geom);
        for xyz in 0..3 {
            let u = d[xyz] / r;
            row[3 * self.a + xyz] = -u;
            row[3 * self.b + xyz] = u;
        }
    }

    fn dq2_dx2(&self, geom: &Geometry, block: &mut DMatrix<f64>) {
        let d = geom.inter_atom(self.a, self.b);
        let r = self.q(geom);
        let u = [d[0] / r, d[1] / r, d[2] / r];
        for i in 0..3 {
            for j in 0..3 {
                let delta = if i == j { 1.0 } else { 0.0 };
                let val = (delta - u[i] * u[j]) / r;
                block[(3 * self.a + i, 3 * self.a + j)] += val;
                block[(3 * self.b + i, 3 * self.b + j)] += val;
                block[(3 * self.a + i, 3 * self.b + j)] -= val;
                block[(3 * self.b + i, 3 * self.a + j)] -= val;
            }
        }
    }

    fn frozen(&self) -> bool {
        self.frozen
    }

    fn fixed_eq_val(&self) -> Option<f64> {
        self.fixed_eq_val
    }
}

/// Bond angle with the vertex at atom `b`.
pub struct Bend {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

impl Bend {
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Self { a, b, c }
    }
}

impl Coordinate for Bend {
    fn label(&self) -> String {
        format!("A({},{},{})", self.a + 1, self.b + 1, self.c + 1)
    }

    fn q(&self, geom: &Geometry) -> f64 {
        let u = geom.inter_atom(self.b, self.a);
        let v = geom.inter_atom(self.b, self.c);
        let ru = geom.distance(self.b, self.a);
        let rv = geom.distance(self.b, self.c);
        let dot = (u[0] * v[0] + u[1] * v[1] + u[2] * v[2]) / (ru * rv);
        dot.clamp(-1.0, 1.0).acos()
    }

    fn q_show(&self, geom: &Geometry) -> f64 {
        self.q(geom).to_degrees()
    }

    fn dq_dx(&self, geom: &Geometry, row: &mut [f64]) {
        let u = geom.inter_atom(self.b, self.a);
        let v = geom.inter_atom(self.b, self.c);
        let ru = geom.distance(self.b, self.a);
        let rv = geom.distance(self.b, self.c);
        let uh = [u[0] / ru, u[1] / ru, u[2] / ru];
        let vh = [v[0] / rv, v[1] / rv, v[2] / rv];
        let cos_t = (uh[0] * vh[0] + uh[1] * vh[1] + uh[2] * vh[2]).clamp(-1.0, 1.0);
        let sin_t = (1.0 - cos_t * cos_t).sqrt();

        for i in 0..3 {
            let da = (cos_t * uh[i] - vh[i]) / (ru * sin_t);
            let dc = (cos_t * vh[i] - uh[i]) / (rv * sin_t);
            row[3 * self.a + i] = da;
            row[3 * self.c + i] = dc;
            row[3 * self.b + i] = -(da + dc);
        }
    }
}

/// Bent triatomic (water-like) geometry in Bohr.
pub fn water_geometry() -> Geometry {
    Geometry::new(vec![
        0.0, 0.0, 0.0, // O
        1.81, 0.0, 0.0, // H
        -0.45, 1.75, 0.0, // H
    ])
}

/// Non-redundant internal coordinate set for the triatomic: two stretches
/// and the bend.
pub fn water_intcos() -> Vec<Box<dyn Coordinate>> {
    vec![
        Box::new(Stretch::new(0, 1)),
        Box::new(Stretch::new(0, 2)),
        Box::new(Bend::new(1, 0, 2)),
    ]
}

/// Redundant set: the three interatomic distances plus the bend.
pub fn water_intcos_redundant() -> Vec<Box<dyn Coordinate>> {
    vec![
        Box::new(Stretch::new(0, 1)),
        Box::new(Stretch::new(0, 2)),
        Box::new(Stretch::new(1, 2)),
        Box::new(Bend::new(1, 0, 2)),
    ]
}
