//! Non-unified indexed triangle stream
//!
//! Positions, normals and UVs live in three independent arrays, each with
//! its own triangle index array. Corner `k` of triangle `t` is
//! `(position_indices[3t+k], normal_indices[3t+k], uv_indices[3t+k])`.
//!
//! Author: Moroya Sakamoto

use crate::mesh::bounds::Aabb;
use crate::mesh::spatial::SpatialHash;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems found by [`MeshStream::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The three index arrays differ in length
    #[error("index arrays differ in length: positions {positions}, normals {normals}, uvs {uvs}")]
    LengthMismatch {
        /// Position index count
        positions: usize,
        /// Normal index count
        normals: usize,
        /// UV index count
        uvs: usize,
    },

    /// Index count is not a multiple of three
    #[error("index count {0} is not a multiple of 3")]
    NotTriangles(usize),

    /// An index points past its attribute array
    #[error("{stream} index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// Which stream
        stream: &'static str,
        /// Offending index value
        index: u32,
        /// Attribute array length
        len: usize,
    },

    /// A triangle references the same position twice
    #[error("triangle {triangle} repeats a vertex")]
    RepeatedVertex {
        /// Triangle index
        triangle: usize,
    },
}

/// One triangle corner: indices into the three attribute arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Corner {
    /// Position index
    pub position: u32,
    /// Normal index
    pub normal: u32,
    /// UV index
    pub uv: u32,
}

/// Triangle mesh with separate position/normal/UV index streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshStream {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Vertex normals
    pub normals: Vec<Vec3>,
    /// Texture coordinates
    pub uvs: Vec<Vec2>,
    /// Position index per corner
    pub position_indices: Vec<u32>,
    /// Normal index per corner
    pub normal_indices: Vec<u32>,
    /// UV index per corner
    pub uv_indices: Vec<u32>,
}

impl MeshStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.position_indices.len() / 3
    }

    /// Number of positions
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether the stream holds no triangles
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position_indices.is_empty()
    }

    /// Corner `k` of triangle `t`
    #[inline]
    pub fn corner(&self, t: usize, k: usize) -> Corner {
        let i = t * 3 + k;
        Corner {
            position: self.position_indices[i],
            normal: self.normal_indices[i],
            uv: self.uv_indices[i],
        }
    }

    /// The three corners of triangle `t`
    #[inline]
    pub fn corners(&self, t: usize) -> [Corner; 3] {
        [self.corner(t, 0), self.corner(t, 1), self.corner(t, 2)]
    }

    /// Position indices of triangle `t`
    #[inline]
    pub fn triangle(&self, t: usize) -> [u32; 3] {
        let i = t * 3;
        [
            self.position_indices[i],
            self.position_indices[i + 1],
            self.position_indices[i + 2],
        ]
    }

    /// Positions of triangle `t`
    #[inline]
    pub fn triangle_positions(&self, t: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangle(t);
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }

    /// Unit face normal of triangle `t` (zero for degenerate faces)
    #[inline]
    pub fn face_normal(&self, t: usize) -> Vec3 {
        let [p0, p1, p2] = self.triangle_positions(t);
        (p1 - p0).cross(p2 - p0).normalize_or_zero()
    }

    /// Append one triangle given its corners
    #[inline]
    pub fn push_triangle(&mut self, corners: [Corner; 3]) {
        for c in corners {
            self.position_indices.push(c.position);
            self.normal_indices.push(c.normal);
            self.uv_indices.push(c.uv);
        }
    }

    /// Bounding box of all positions
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    /// Check the index-array invariants and reject repeated-vertex triangles
    pub fn validate(&self) -> Result<(), StreamError> {
        let (np, nn, nu) = (
            self.position_indices.len(),
            self.normal_indices.len(),
            self.uv_indices.len(),
        );
        if np != nn || np != nu {
            return Err(StreamError::LengthMismatch {
                positions: np,
                normals: nn,
                uvs: nu,
            });
        }
        if np % 3 != 0 {
            return Err(StreamError::NotTriangles(np));
        }
        check_range("position", &self.position_indices, self.positions.len())?;
        check_range("normal", &self.normal_indices, self.normals.len())?;
        check_range("uv", &self.uv_indices, self.uvs.len())?;

        for t in 0..self.triangle_count() {
            if is_degenerate(self.triangle(t)) {
                return Err(StreamError::RepeatedVertex { triangle: t });
            }
        }
        Ok(())
    }

    /// Remove every triangle that repeats a position index.
    ///
    /// Erasing shifts the following triangles down, so the scan resumes at
    /// the deletion point instead of advancing. Returns the number removed.
    pub fn remove_degenerate_triangles(&mut self) -> usize {
        let mut removed = 0;
        let mut t = 0;
        while t < self.triangle_count() {
            if is_degenerate(self.triangle(t)) {
                let start = t * 3;
                self.position_indices.drain(start..start + 3);
                self.normal_indices.drain(start..start + 3);
                self.uv_indices.drain(start..start + 3);
                removed += 1;
                continue;
            }
            t += 1;
        }
        removed
    }

    /// Copy with coincident positions (within `epsilon`) merged into one
    /// entry and triangles that collapsed in the process removed.
    ///
    /// Returns the welded stream and the number of dropped triangles.
    pub fn welded(&self, epsilon: f32, attribute_epsilon: f32) -> (MeshStream, usize) {
        let all: Vec<u32> = (0..self.triangle_count() as u32).collect();
        let mut out = self.extract(&all, epsilon, attribute_epsilon);
        let removed = out.remove_degenerate_triangles();
        out.compact();
        (out, removed)
    }

    /// Drop attributes no triangle references and renumber the indices
    pub fn compact(&mut self) {
        self.positions = compact_stream(&self.positions, &mut self.position_indices);
        self.normals = compact_stream(&self.normals, &mut self.normal_indices);
        self.uvs = compact_stream(&self.uvs, &mut self.uv_indices);
    }

    /// Extract a subset of triangles into a self-contained stream.
    ///
    /// Attribute arrays are rebuilt by tolerance-based deduplication:
    /// positions within `epsilon` share one entry, normals and UVs use
    /// `attribute_epsilon`.
    pub fn extract(&self, triangles: &[u32], epsilon: f32, attribute_epsilon: f32) -> MeshStream {
        let mut out = MeshStream::new();
        let mut pos_weld = Welder::new(epsilon);
        let mut nrm_weld = Welder::new(attribute_epsilon);
        let mut uv_weld = Welder::new(attribute_epsilon);

        for &t in triangles {
            let corners = self.corners(t as usize).map(|c| Corner {
                position: pos_weld.insert(self.positions[c.position as usize], &mut out.positions),
                normal: nrm_weld.insert(self.normals[c.normal as usize], &mut out.normals),
                uv: uv_weld.insert_uv(self.uvs[c.uv as usize], &mut out.uvs),
            });
            out.push_triangle(corners);
        }
        out
    }

    /// Append `other`, welding its attributes onto the existing ones.
    ///
    /// Returns the number of appended triangles that collapsed to fewer than
    /// three distinct positions and were dropped.
    pub fn weld_append(&mut self, other: &MeshStream, epsilon: f32, attribute_epsilon: f32) -> usize {
        let mut pos_weld = Welder::seeded(epsilon, &self.positions);
        let mut nrm_weld = Welder::seeded(attribute_epsilon, &self.normals);
        let uv_points: Vec<Vec3> = self.uvs.iter().map(|uv| uv.extend(0.0)).collect();
        let mut uv_weld = Welder::seeded(attribute_epsilon, &uv_points);

        let mut dropped = 0;
        for t in 0..other.triangle_count() {
            let corners = other.corners(t).map(|c| Corner {
                position: pos_weld.insert(other.positions[c.position as usize], &mut self.positions),
                normal: nrm_weld.insert(other.normals[c.normal as usize], &mut self.normals),
                uv: uv_weld.insert_uv(other.uvs[c.uv as usize], &mut self.uvs),
            });
            if is_degenerate([corners[0].position, corners[1].position, corners[2].position]) {
                dropped += 1;
                continue;
            }
            self.push_triangle(corners);
        }
        dropped
    }

    /// Total surface area
    pub fn surface_area(&self) -> f32 {
        (0..self.triangle_count())
            .map(|t| {
                let [p0, p1, p2] = self.triangle_positions(t);
                (p1 - p0).cross(p2 - p0).length() * 0.5
            })
            .sum()
    }
}

/// Whether a triangle references the same index twice
#[inline]
pub fn is_degenerate(tri: [u32; 3]) -> bool {
    tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2]
}

fn check_range(stream: &'static str, indices: &[u32], len: usize) -> Result<(), StreamError> {
    match indices.iter().find(|&&i| i as usize >= len) {
        Some(&index) => Err(StreamError::IndexOutOfRange { stream, index, len }),
        None => Ok(()),
    }
}

fn compact_stream<T: Copy>(values: &[T], indices: &mut [u32]) -> Vec<T> {
    const UNUSED: u32 = u32::MAX;
    let mut remap = vec![UNUSED; values.len()];
    let mut out = Vec::new();
    for idx in indices.iter_mut() {
        let old = *idx as usize;
        if remap[old] == UNUSED {
            remap[old] = out.len() as u32;
            out.push(values[old]);
        }
        *idx = remap[old];
    }
    out
}

/// Deduplicating inserter over a spatial hash
struct Welder {
    hash: SpatialHash<u32>,
    epsilon: f32,
}

impl Welder {
    fn new(epsilon: f32) -> Self {
        Self {
            hash: SpatialHash::new(epsilon),
            epsilon,
        }
    }

    fn seeded(epsilon: f32, existing: &[Vec3]) -> Self {
        let mut welder = Self::new(epsilon);
        for (i, &p) in existing.iter().enumerate() {
            welder.hash.insert(p, i as u32);
        }
        welder
    }

    fn insert(&mut self, p: Vec3, out: &mut Vec<Vec3>) -> u32 {
        if let Some((_, &idx)) = self.hash.find_within(p, self.epsilon) {
            return idx;
        }
        let idx = out.len() as u32;
        out.push(p);
        self.hash.insert(p, idx);
        idx
    }

    fn insert_uv(&mut self, uv: Vec2, out: &mut Vec<Vec2>) -> u32 {
        let key = uv.extend(0.0);
        if let Some((_, &idx)) = self.hash.find_within(key, self.epsilon) {
            return idx;
        }
        let idx = out.len() as u32;
        out.push(uv);
        self.hash.insert(key, idx);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshStream {
        MeshStream {
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vec3::Z],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            position_indices: vec![0, 1, 2, 0, 2, 3],
            normal_indices: vec![0; 6],
            uv_indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(quad().validate().is_ok());
    }

    #[test]
    fn test_validate_length_mismatch() {
        let mut mesh = quad();
        mesh.uv_indices.pop();
        assert!(matches!(mesh.validate(), Err(StreamError::LengthMismatch { .. })));
    }

    #[test]
    fn test_validate_not_triangles() {
        let mut mesh = quad();
        mesh.position_indices.pop();
        mesh.normal_indices.pop();
        mesh.uv_indices.pop();
        assert_eq!(mesh.validate(), Err(StreamError::NotTriangles(5)));
    }

    #[test]
    fn test_validate_out_of_range() {
        let mut mesh = quad();
        mesh.normal_indices[4] = 3;
        assert!(matches!(
            mesh.validate(),
            Err(StreamError::IndexOutOfRange { stream: "normal", .. })
        ));
    }

    #[test]
    fn test_remove_degenerate_restarts_at_deletion_point() {
        let mut mesh = quad();
        // two consecutive degenerate triangles between the valid ones
        mesh.push_triangle([Corner::default(); 3]);
        mesh.push_triangle([Corner::default(); 3]);
        mesh.push_triangle(mesh.corners(0));
        let removed = mesh.remove_degenerate_triangles();
        assert_eq!(removed, 2);
        assert_eq!(mesh.triangle_count(), 3);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_extract_dedups_positions() {
        let mesh = quad();
        let sub = mesh.extract(&[1], 1e-5, 1e-3);
        assert_eq!(sub.triangle_count(), 1);
        assert_eq!(sub.positions.len(), 3);
        assert_eq!(sub.normals.len(), 1);
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_weld_append_joins_shared_edge() {
        let mesh = quad();
        let mut merged = mesh.extract(&[0], 1e-5, 1e-3);
        let other = mesh.extract(&[1], 1e-5, 1e-3);
        let dropped = merged.weld_append(&other, 1e-5, 1e-3);
        assert_eq!(dropped, 0);
        assert_eq!(merged.positions.len(), 4);
        assert_eq!(merged.triangle_count(), 2);
    }

    #[test]
    fn test_weld_append_drops_collapsed_triangles() {
        let mut base = MeshStream::new();
        let sliver = MeshStream {
            positions: vec![Vec3::ZERO, Vec3::new(1e-7, 0.0, 0.0), Vec3::X],
            normals: vec![Vec3::Z],
            uvs: vec![Vec2::ZERO],
            position_indices: vec![0, 1, 2],
            normal_indices: vec![0; 3],
            uv_indices: vec![0; 3],
        };
        let dropped = base.weld_append(&sliver, 1e-4, 1e-2);
        assert_eq!(dropped, 1);
        assert!(base.is_empty());
    }

    #[test]
    fn test_welded_merges_seam_duplicates() {
        let mut mesh = quad();
        // split the diagonal: second triangle uses copies of vertices 0 and 2
        mesh.positions.push(mesh.positions[0]);
        mesh.positions.push(mesh.positions[2]);
        mesh.position_indices = vec![0, 1, 2, 4, 5, 3];
        let (welded, removed) = mesh.welded(1e-5, 1e-3);
        assert_eq!(removed, 0);
        assert_eq!(welded.positions.len(), 4);
        assert_eq!(welded.triangle(1)[0], welded.triangle(0)[0]);
    }

    #[test]
    fn test_compact_drops_unused() {
        let mut mesh = quad();
        mesh.positions.push(Vec3::splat(9.0));
        mesh.normals.push(Vec3::X);
        mesh.compact();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.normals.len(), 1);
    }

    #[test]
    fn test_surface_area() {
        assert!((quad().surface_area() - 1.0).abs() < 1e-6);
    }
}
