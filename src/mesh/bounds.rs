//! Cluster bounding data
//!
//! Axis-aligned boxes, bounding spheres and normal cones used for pruning
//! at build time and for culling / error projection at run time.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) box
    #[inline]
    pub fn empty() -> Self {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Create from min/max
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Tight box around `points` (empty box for no points)
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::empty();
        for &p in points {
            aabb.expand_point(p);
        }
        aabb
    }

    /// Whether no point has been added
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Grow to include a point
    #[inline]
    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow to include another box
    #[inline]
    pub fn expand_aabb(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Box grown by `margin` on every side
    #[inline]
    pub fn inflated(&self, margin: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// Whether the boxes overlap (touching counts)
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Whether `p` is inside or on the surface
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// Center point
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the diagonal
    #[inline]
    pub fn diagonal(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.size().length()
        }
    }
}

/// Bound on the face normals of a cluster: every normal lies within
/// `acos(cos_half_angle)` of `axis`
///
/// `apex` lies behind the plane of every triangle, so an eye that sees the
/// apex from inside the complementary cone sees only back faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalCone {
    /// Average face normal (unit length, or zero when normals cancel out)
    pub axis: Vec3,
    /// Cosine of the half-angle; -1 means the cone covers every direction
    pub cos_half_angle: f32,
    /// Cone apex for perspective culling
    pub apex: Vec3,
}

impl Default for NormalCone {
    fn default() -> Self {
        NormalCone {
            axis: Vec3::Z,
            cos_half_angle: -1.0,
            apex: Vec3::ZERO,
        }
    }
}

impl NormalCone {
    /// Cone around the average of `normals`, apex at `center`
    pub fn from_normals(normals: &[Vec3], center: Vec3) -> Self {
        let sum: Vec3 = normals.iter().copied().sum();
        let axis = sum.normalize_or_zero();
        if axis == Vec3::ZERO {
            return Self::default();
        }
        let cos_half_angle = normals
            .iter()
            .filter(|n| **n != Vec3::ZERO)
            .map(|n| n.dot(axis))
            .fold(1.0f32, f32::min);
        NormalCone {
            axis,
            cos_half_angle: cos_half_angle.clamp(-1.0, 1.0),
            apex: center,
        }
    }

    /// Cone of a triangle set, with the apex pushed back along the axis
    /// until it is behind every triangle plane
    pub fn from_triangles(positions: &[Vec3], indices: &[u32], center: Vec3) -> Self {
        let faces: Vec<(Vec3, Vec3)> = indices
            .chunks_exact(3)
            .map(|tri| {
                let p0 = positions[tri[0] as usize];
                let p1 = positions[tri[1] as usize];
                let p2 = positions[tri[2] as usize];
                (p0, (p1 - p0).cross(p2 - p0).normalize_or_zero())
            })
            .collect();
        let normals: Vec<Vec3> = faces.iter().map(|&(_, n)| n).collect();
        let mut cone = Self::from_normals(&normals, center);
        if cone.cos_half_angle <= 0.0 {
            return cone;
        }

        // every non-zero normal has dot(axis, n) >= cos_half_angle > 0
        let mut max_t = 0.0f32;
        for &(p0, n) in &faces {
            if n == Vec3::ZERO {
                continue;
            }
            let t = (center - p0).dot(n) / cone.axis.dot(n);
            max_t = max_t.max(t);
        }
        cone.apex = center - cone.axis * max_t;
        cone
    }

    /// Sine of the half-angle
    #[inline]
    pub fn cutoff(&self) -> f32 {
        (1.0 - self.cos_half_angle * self.cos_half_angle).max(0.0).sqrt()
    }

    /// Whether every face is turned away from an eye at `eye`.
    ///
    /// Conservative: returns `false` whenever any normal could face the eye.
    pub fn is_backfacing(&self, eye: Vec3) -> bool {
        if self.cos_half_angle <= 0.0 {
            return false;
        }
        let to_apex = self.apex - eye;
        let dist = to_apex.length();
        if dist <= f32::EPSILON {
            return false;
        }
        to_apex.dot(self.axis) > self.cutoff() * dist
    }
}

/// Bounding data of one cluster
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterBounds {
    /// Axis-aligned bounding box
    pub aabb: Aabb,
    /// Area-weighted triangle centroid
    pub centroid: Vec3,
    /// Radius of the sphere around `centroid` enclosing every vertex
    pub radius: f32,
    /// Normal cone of the face normals
    pub cone: NormalCone,
}

impl ClusterBounds {
    /// Compute bounds of a triangle set
    pub fn from_triangles(positions: &[Vec3], indices: &[u32]) -> Self {
        let mut aabb = Aabb::empty();
        let mut weighted = Vec3::ZERO;
        let mut area_sum = 0.0f32;
        let mut vertex_sum = Vec3::ZERO;

        for tri in indices.chunks_exact(3) {
            let p0 = positions[tri[0] as usize];
            let p1 = positions[tri[1] as usize];
            let p2 = positions[tri[2] as usize];
            aabb.expand_point(p0);
            aabb.expand_point(p1);
            aabb.expand_point(p2);

            let cross = (p1 - p0).cross(p2 - p0);
            let area = cross.length() * 0.5;
            weighted += (p0 + p1 + p2) / 3.0 * area;
            area_sum += area;
            vertex_sum += p0 + p1 + p2;
        }

        let centroid = if area_sum > f32::EPSILON {
            weighted / area_sum
        } else if !indices.is_empty() {
            vertex_sum / indices.len() as f32
        } else {
            Vec3::ZERO
        };

        let radius = indices
            .iter()
            .map(|&i| positions[i as usize].distance(centroid))
            .fold(0.0f32, f32::max);

        ClusterBounds {
            aabb,
            centroid,
            radius,
            cone: NormalCone::from_triangles(positions, indices, centroid),
        }
    }
}
