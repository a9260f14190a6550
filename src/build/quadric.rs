//! Error quadrics for edge-collapse simplification
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

/// Symmetric 4x4 error quadric, stored as its upper triangle:
///
/// ```text
/// [a00 a01 a02 a03]
/// [    a11 a12 a13]
/// [        a22 a23]
/// [            a33]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quadric {
    data: [f64; 10],
}

impl Quadric {
    /// Zero quadric
    #[inline]
    pub fn zero() -> Self {
        Quadric { data: [0.0; 10] }
    }

    /// Quadric of the plane `n . p + d = 0` (`n` need not be unit length)
    pub fn from_plane(n: Vec3, d: f32) -> Self {
        let (a, b, c, d) = (n.x as f64, n.y as f64, n.z as f64, d as f64);
        Quadric {
            data: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    /// Plane quadric of the triangle `p0 p1 p2`, seen from corner `p0`.
    ///
    /// The plane normal is the unnormalized two-edge cross product, so the
    /// quadric is area weighted.
    pub fn from_corner(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let n = (p1 - p0).cross(p2 - p0);
        Self::from_plane(n, -n.dot(p0))
    }

    /// Add the constant term (the `w`-`w` diagonal entry)
    #[inline]
    pub fn add_constant(&mut self, value: f64) {
        self.data[9] += value;
    }

    /// Error `v^T Q v` at `p` with `v = [p, 1]`
    #[inline]
    pub fn evaluate(&self, p: Vec3) -> f64 {
        let (x, y, z) = (p.x as f64, p.y as f64, p.z as f64);
        let d = &self.data;
        x * x * d[0]
            + 2.0 * x * y * d[1]
            + 2.0 * x * z * d[2]
            + 2.0 * x * d[3]
            + y * y * d[4]
            + 2.0 * y * z * d[5]
            + 2.0 * y * d[6]
            + z * z * d[7]
            + 2.0 * z * d[8]
            + d[9]
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    #[inline]
    fn add(mut self, rhs: Quadric) -> Quadric {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign for Quadric {
    #[inline]
    fn add_assign(&mut self, rhs: Quadric) {
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
    }
}
