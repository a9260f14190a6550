//! Batch geometry kernels
//!
//! The builder only depends on the input/output contracts below, so an
//! accelerator-backed implementation can replace [`CpuKernels`].
//!
//! Author: Moroya Sakamoto

use super::quadric::Quadric;
use crate::mesh::spatial::index_points;
use glam::Vec3;
use rayon::prelude::*;

/// Closest target of one query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Index into the target array
    pub index: u32,
    /// Euclidean distance to the target
    pub distance: f32,
}

/// One edge-collapse cost evaluation
#[derive(Debug, Clone, Copy)]
pub struct CollapseQuery {
    /// Combined quadric of both endpoints, with the length/feature term
    pub quadric: Quadric,
    /// Candidate merge position
    pub point: Vec3,
}

/// Batch kernels used by grouping, simplification and deviation tracking
pub trait GeometryKernels: Send + Sync {
    /// For every query, whether some target lies within `epsilon`
    fn coincident_mask(&self, queries: &[Vec3], targets: &[Vec3], epsilon: f32) -> Vec<bool>;

    /// For every query, the nearest target (`None` when there are no targets)
    fn nearest_vertices(&self, queries: &[Vec3], targets: &[Vec3]) -> Vec<Option<NearestHit>>;

    /// Quadric error of every query at its merge point
    fn collapse_costs(&self, queries: &[CollapseQuery]) -> Vec<f64>;
}

/// Reference kernels running on the rayon pool
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuKernels;

impl GeometryKernels for CpuKernels {
    fn coincident_mask(&self, queries: &[Vec3], targets: &[Vec3], epsilon: f32) -> Vec<bool> {
        let hash = index_points(targets, epsilon);
        queries
            .par_iter()
            .map(|&q| hash.contains_within(q, epsilon))
            .collect()
    }

    fn nearest_vertices(&self, queries: &[Vec3], targets: &[Vec3]) -> Vec<Option<NearestHit>> {
        queries
            .par_iter()
            .map(|&q| {
                targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (i, t.distance_squared(q)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(i, d2)| NearestHit {
                        index: i as u32,
                        distance: d2.sqrt(),
                    })
            })
            .collect()
    }

    fn collapse_costs(&self, queries: &[CollapseQuery]) -> Vec<f64> {
        queries
            .par_iter()
            .map(|q| q.quadric.evaluate(q.point))
            .collect()
    }
}
