//! Triangle clustering
//!
//! Partitions the triangles of a welded mesh into clusters of at most
//! `max_triangles_per_cluster` triangles through the dual graph, then hands
//! the assignment to the balancer for repair.
//!
//! Author: Moroya Sakamoto

use super::balance::TrianglePartition;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::mesh::MeshStream;
use crate::partition::{with_relaxed_retry, PartitionOptions, Partitioner};

/// Partitions a mesh into bounded clusters
pub struct TriangleClusterer<'a> {
    config: &'a BuildConfig,
    partitioner: &'a dyn Partitioner,
}

impl<'a> TriangleClusterer<'a> {
    /// Clusterer using `partitioner` for the initial assignment
    pub fn new(config: &'a BuildConfig, partitioner: &'a dyn Partitioner) -> Self {
        Self { config, partitioner }
    }

    /// Number of parts requested for `triangles` triangles
    #[inline]
    pub fn part_count(&self, triangles: usize) -> usize {
        triangles.div_ceil(self.config.max_triangles_per_cluster).max(1)
    }

    /// Initial dual-graph assignment, retried once with relaxed options.
    ///
    /// A second failure is fatal: no later LOD can be built from a partial
    /// partition.
    pub fn assign(&self, mesh: &MeshStream, lod: u32) -> Result<Vec<u32>, BuildError> {
        let parts = self.part_count(mesh.triangle_count());
        if parts <= 1 {
            return Ok(vec![0; mesh.triangle_count()]);
        }
        let elements: Vec<[u32; 3]> = (0..mesh.triangle_count()).map(|t| mesh.triangle(t)).collect();
        with_relaxed_retry(&PartitionOptions::default(), "triangle", |options| {
            self.partitioner
                .partition_mesh_dual(&elements, mesh.positions.len(), parts, options)
        })
        .map_err(|e| BuildError::ClusteringFailure {
            lod,
            reason: e.to_string(),
        })
    }

    /// Partition a welded mesh into balanced, self-contained clusters
    pub fn cluster(&self, mesh: &MeshStream, lod: u32) -> Result<Vec<MeshStream>, BuildError> {
        let assignment = self.assign(mesh, lod)?;
        let mut partition = TrianglePartition::new(mesh, assignment);
        log::debug!(
            "LOD {}: {} ({}) produced {} initial clusters for {} triangles",
            lod,
            self.partitioner.name(),
            self.part_count(mesh.triangle_count()),
            partition.cluster_count(),
            mesh.triangle_count()
        );
        partition.balance(self.config, lod)?;
        Ok(partition.materialize(self.config.weld_epsilon, self.config.attribute_epsilon()))
    }

    /// Split a simplified group back into bounded clusters by greedy growth
    pub fn split(&self, mesh: &MeshStream, lod: u32) -> Result<Vec<MeshStream>, BuildError> {
        let mut partition = TrianglePartition::single(mesh);
        partition.balance(self.config, lod)?;
        Ok(partition.materialize(self.config.weld_epsilon, self.config.attribute_epsilon()))
    }
}
