//! Cluster grouping
//!
//! Clusters are joined by an edge weighted with the number of boundary
//! vertices they share; the weighted graph is partitioned into groups of
//! about `clusters_per_group` clusters. Group members are then welded into
//! one mesh for joint simplification.
//!
//! Author: Moroya Sakamoto

use super::kernels::GeometryKernels;
use super::pool::WorkerPool;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::mesh::{boundary_vertices, Aabb, MeshStream};
use crate::partition::{with_relaxed_retry, Graph, PartitionOptions, Partitioner};
use glam::Vec3;
use std::collections::HashMap;
use std::sync::Mutex;

/// Open-edge vertices of one cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterBoundary {
    /// Boundary vertex positions
    pub positions: Vec<Vec3>,
    /// Bounding box of `positions`
    pub aabb: Aabb,
}

impl ClusterBoundary {
    /// Collect the vertices lying on edges used by a single triangle
    pub fn of(cluster: &MeshStream) -> Self {
        let flags = boundary_vertices(&cluster.position_indices, cluster.positions.len());
        let positions: Vec<Vec3> = cluster
            .positions
            .iter()
            .zip(&flags)
            .filter(|&(_, &b)| b)
            .map(|(&p, _)| p)
            .collect();
        let aabb = Aabb::from_points(&positions);
        Self { positions, aabb }
    }
}

/// Forms cluster groups
pub struct ClusterGrouper<'a> {
    config: &'a BuildConfig,
    partitioner: &'a dyn Partitioner,
    kernels: &'a dyn GeometryKernels,
    pool: &'a WorkerPool,
}

impl<'a> ClusterGrouper<'a> {
    /// Grouper with the given backends
    pub fn new(
        config: &'a BuildConfig,
        partitioner: &'a dyn Partitioner,
        kernels: &'a dyn GeometryKernels,
        pool: &'a WorkerPool,
    ) -> Self {
        Self {
            config,
            partitioner,
            kernels,
            pool,
        }
    }

    /// Weighted cluster adjacency: one edge per pair of clusters sharing
    /// boundary vertices, weighted by the number of shared vertices.
    ///
    /// Boxes of boundary vertices prune the pair search; pairs are counted in
    /// parallel into one lock-guarded accumulator.
    pub fn adjacency(&self, clusters: &[MeshStream]) -> Vec<(u32, u32, u32)> {
        let eps = self.config.weld_epsilon;
        let boundaries: Vec<ClusterBoundary> = self.pool.map_indices(clusters.len(), |i| ClusterBoundary::of(&clusters[i]));
        let boxes: Vec<Aabb> = boundaries.iter().map(|b| b.aabb.inflated(eps)).collect();

        let weights: Mutex<HashMap<(u32, u32), u32>> = Mutex::new(HashMap::new());
        self.pool.for_each_index(clusters.len(), |i| {
            if boundaries[i].positions.is_empty() {
                return;
            }
            for j in i + 1..clusters.len() {
                if boundaries[j].positions.is_empty() || !boxes[i].intersects(&boxes[j]) {
                    continue;
                }
                let shared = self
                    .kernels
                    .coincident_mask(&boundaries[i].positions, &boundaries[j].positions, eps)
                    .into_iter()
                    .filter(|&hit| hit)
                    .count() as u32;
                if shared > 0 {
                    let mut map = weights.lock().expect("ClusterGrouper: adjacency lock poisoned");
                    *map.entry((i as u32, j as u32)).or_insert(0) += shared;
                }
            }
        });

        let mut edges: Vec<(u32, u32, u32)> = weights
            .into_inner()
            .expect("ClusterGrouper: adjacency lock poisoned")
            .into_iter()
            .map(|((a, b), w)| (a, b, w))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Partition clusters into groups, returned as lists of cluster indices.
    ///
    /// At most `clusters_per_group` clusters form a single group.
    pub fn group(&self, clusters: &[MeshStream], lod: u32) -> Result<Vec<Vec<u32>>, BuildError> {
        let n = clusters.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if n <= self.config.clusters_per_group {
            return Ok(vec![(0..n as u32).collect()]);
        }

        let edges = self.adjacency(clusters);
        let graph = Graph::from_edges(n, &edges)?;
        let parts = (n / self.config.clusters_per_group).max(1);
        log::debug!(
            "LOD {}: grouping {} clusters ({} adjacency edges) into {} groups",
            lod,
            n,
            edges.len(),
            parts
        );

        let assignment = with_relaxed_retry(&PartitionOptions::default(), "cluster group", |options| {
            self.partitioner.partition_graph(&graph, parts, options)
        })
        .map_err(|e| BuildError::ClusteringFailure {
            lod,
            reason: e.to_string(),
        })?;

        let mut groups = vec![Vec::new(); parts];
        for (c, &g) in assignment.iter().enumerate() {
            groups[g as usize].push(c as u32);
        }
        groups.retain(|g| !g.is_empty());
        Ok(groups)
    }

    /// Weld the member clusters of one group into a single mesh.
    ///
    /// Returns the merged mesh and the number of triangles dropped because
    /// they collapsed to fewer than three distinct vertices.
    pub fn merge_group(&self, clusters: &[MeshStream], members: &[u32]) -> (MeshStream, usize) {
        let eps = self.config.weld_epsilon;
        let attr_eps = self.config.attribute_epsilon();
        let mut merged = MeshStream::new();
        let mut dropped = 0;
        for &c in members {
            dropped += merged.weld_append(&clusters[c as usize], eps, attr_eps);
        }
        (merged, dropped)
    }
}
