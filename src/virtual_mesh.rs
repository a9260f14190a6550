//! Finished cluster hierarchy
//!
//! Output of [`HierarchyAssembler`](crate::build::HierarchyAssembler):
//! clusters and cluster groups across every LOD, with their geometry packed
//! in a [`GeometryArena`].
//!
//! Link directions:
//!
//! - a cluster's **producer** group simplified and re-split into it (absent
//!   at LOD 0);
//! - its **consumer** group takes it as MIP 0 input for the next LOD (absent
//!   at the coarsest LOD);
//! - its **parents** are the consumer group's MIP 1 clusters.
//!
//! Author: Moroya Sakamoto

use crate::bounded::Bounded;
use crate::build::arena::{GeometryArena, GeometryRanges};
use crate::config::{CLUSTER_MAX_TRIANGLES, MAX_CLUSTERS_PER_GROUP};
use crate::error::{BuildError, Site};
use crate::mesh::{ClusterBounds, MeshStream};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Geometric deviation of a cluster from the LOD 0 surface
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Deviation {
    /// Largest vertex-to-nearest-LOD-0-vertex distance
    pub max: f32,
    /// Mean of the same distances
    pub average: f32,
    /// Endpoints of the largest distance: `[this LOD, LOD 0]`
    pub witness: [Vec3; 2],
}

impl Deviation {
    /// Zero deviation witnessed at `point`
    pub fn zero_at(point: Vec3) -> Self {
        Self {
            max: 0.0,
            average: 0.0,
            witness: [point, point],
        }
    }

    /// Raise `max` to `floor`, stretching the witness pair to match.
    ///
    /// A zero-length witness is stretched along +X.
    pub fn clamp_to(&mut self, floor: f32) -> bool {
        if self.max >= floor {
            return false;
        }
        let [a, b] = self.witness;
        let dir = b - a;
        self.witness[1] = if self.max > 0.0 && dir.length_squared() > 0.0 {
            a + dir * (floor / self.max)
        } else {
            a + Vec3::X * floor
        };
        self.max = floor;
        self.average = self.average.max(0.0).min(floor);
        true
    }
}

/// One bounded cluster of the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Global index
    pub id: u32,
    /// LOD level (0 = input resolution)
    pub lod: u32,
    /// Triangle count
    pub triangle_count: u32,
    /// Geometry location in the arenas
    pub ranges: GeometryRanges,
    /// Box, centroid, bounding sphere and normal cone
    pub bounds: ClusterBounds,
    /// Accumulated simplification error (producer group plus its inputs)
    pub simplification_error: f32,
    /// Distance to the LOD 0 surface
    pub deviation: Deviation,
    /// Group whose simplification produced this cluster
    pub producer: Option<u32>,
    /// Group consuming this cluster for the next LOD
    pub consumer: Option<u32>,
    /// Clusters at the next LOD replacing this one
    pub parents: Bounded<u32, MAX_CLUSTERS_PER_GROUP>,
}

impl Cluster {
    /// Producer and consumer group ids, in that order
    pub fn groups(&self) -> Bounded<u32, 2> {
        Bounded::from([self.producer, self.consumer])
    }

    /// Check the packed geometry against the index-array contract and the
    /// recorded triangle count
    pub fn validate(&self, arena: &GeometryArena) -> Result<(), BuildError> {
        let site = Site::Cluster(self.id);
        let violation = |detail: String| BuildError::InvariantViolation {
            lod: self.lod,
            site,
            detail,
        };
        let mesh = arena
            .unpack(&self.ranges)
            .ok_or_else(|| violation("geometry range lies outside the arena".to_string()))?;
        mesh.validate().map_err(|e| BuildError::from_stream(self.lod, site, e))?;
        if mesh.triangle_count() != self.triangle_count as usize {
            return Err(violation(format!(
                "records {} triangles, geometry holds {}",
                self.triangle_count,
                mesh.triangle_count()
            )));
        }
        if mesh.triangle_count() > CLUSTER_MAX_TRIANGLES {
            return Err(violation(format!(
                "{} triangles exceed the cluster capacity {}",
                mesh.triangle_count(),
                CLUSTER_MAX_TRIANGLES
            )));
        }
        Ok(())
    }
}

/// Error summary of one side of a group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupMip {
    /// Member clusters
    pub clusters: Bounded<u32, MAX_CLUSTERS_PER_GROUP>,
    /// Smallest member deviation
    pub min_error: f32,
    /// Largest member deviation
    pub max_error: f32,
    /// Witness pair of the largest deviation
    pub witness: [Vec3; 2],
}

impl GroupMip {
    /// Recompute `min_error`, `max_error` and `witness` from `clusters`
    pub fn summarize(&mut self, clusters: &[Cluster]) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &id in self.clusters.iter() {
            let dev = &clusters[id as usize].deviation;
            min = min.min(dev.max);
            if dev.max > max {
                max = dev.max;
                self.witness = dev.witness;
            }
        }
        if self.clusters.is_empty() {
            min = 0.0;
            max = 0.0;
        }
        self.min_error = min;
        self.max_error = max;
    }
}

/// Clusters simplified together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterGroup {
    /// Global index
    pub id: u32,
    /// LOD of the MIP 0 clusters
    pub lod: u32,
    /// Accumulated collapse cost of the group simplification
    pub error: f32,
    /// `[MIP 0 inputs, MIP 1 outputs]`
    pub mips: [GroupMip; 2],
}

/// Per-LOD summary
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LodStats {
    pub lod: u32,
    pub clusters: usize,
    pub groups: usize,
    pub triangles: usize,
    pub min_error: f32,
    pub max_error: f32,
    pub max_deviation: f32,
}

/// Complete multi-resolution mesh
#[derive(Debug, Clone, Default)]
pub struct VirtualMesh {
    /// Clusters ordered by LOD, then id
    pub clusters: Vec<Cluster>,
    /// Groups ordered by LOD, then id
    pub groups: Vec<ClusterGroup>,
    /// Packed geometry
    pub arena: GeometryArena,
    /// Number of LOD levels
    pub lod_count: u32,
    /// Triangle count of the welded input
    pub input_triangles: usize,
}

impl VirtualMesh {
    /// Geometry of one cluster
    pub fn cluster_mesh(&self, id: u32) -> Option<MeshStream> {
        let cluster = self.clusters.get(id as usize)?;
        self.arena.unpack(&cluster.ranges)
    }

    /// Clusters at `lod`
    pub fn clusters_at(&self, lod: u32) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(move |c| c.lod == lod)
    }

    /// Clusters no group consumes (the coarsest cut)
    pub fn roots(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.consumer.is_none())
    }

    /// Triangle count of one LOD
    pub fn triangles_at(&self, lod: u32) -> usize {
        self.clusters_at(lod).map(|c| c.triangle_count as usize).sum()
    }

    /// Cluster, triangle and error totals per LOD
    pub fn lod_stats(&self) -> Vec<LodStats> {
        (0..self.lod_count)
            .map(|lod| {
                let mut stats = LodStats {
                    lod,
                    min_error: f32::INFINITY,
                    ..Default::default()
                };
                for c in self.clusters_at(lod) {
                    stats.clusters += 1;
                    stats.triangles += c.triangle_count as usize;
                    stats.min_error = stats.min_error.min(c.simplification_error);
                    stats.max_error = stats.max_error.max(c.simplification_error);
                    stats.max_deviation = stats.max_deviation.max(c.deviation.max);
                }
                if stats.clusters == 0 {
                    stats.min_error = 0.0;
                }
                stats.groups = self.groups.iter().filter(|g| g.lod == lod).count();
                stats
            })
            .collect()
    }

    /// Flatten one LOD into a single welded stream
    pub fn to_stream(&self, lod: u32, epsilon: f32) -> MeshStream {
        self.merge_clusters(self.clusters_at(lod).map(|c| c.id), epsilon)
    }

    /// Weld the given clusters into one stream
    pub fn merge_clusters(&self, ids: impl IntoIterator<Item = u32>, epsilon: f32) -> MeshStream {
        let mut out = MeshStream::new();
        for id in ids {
            if let Some(mesh) = self.cluster_mesh(id) {
                out.weld_append(&mesh, epsilon, epsilon * 100.0);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_scales_witness() {
        let mut dev = Deviation {
            max: 0.5,
            average: 0.25,
            witness: [Vec3::ZERO, Vec3::new(0.0, 0.5, 0.0)],
        };
        assert!(dev.clamp_to(2.0));
        assert_eq!(dev.max, 2.0);
        assert!((dev.witness[1] - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-6);
        assert!(!dev.clamp_to(1.0));
    }

    #[test]
    fn test_clamp_zero_witness() {
        let mut dev = Deviation::zero_at(Vec3::ONE);
        dev.clamp_to(0.25);
        assert_eq!(dev.witness[0].distance(dev.witness[1]), 0.25);
    }

    #[test]
    fn test_groups_order() {
        let cluster = Cluster {
            id: 3,
            lod: 1,
            triangle_count: 0,
            ranges: GeometryRanges::default(),
            bounds: ClusterBounds::default(),
            simplification_error: 0.0,
            deviation: Deviation::default(),
            producer: Some(0),
            consumer: Some(2),
            parents: Bounded::new(),
        };
        assert_eq!(cluster.groups().as_slice(), &[0, 2]);
    }

    #[test]
    fn test_group_mip_summary() {
        let mut clusters = Vec::new();
        for (i, max) in [0.5f32, 2.0, 1.0].into_iter().enumerate() {
            clusters.push(Cluster {
                id: i as u32,
                lod: 1,
                triangle_count: 1,
                ranges: GeometryRanges::default(),
                bounds: ClusterBounds::default(),
                simplification_error: 0.0,
                deviation: Deviation {
                    max,
                    average: max,
                    witness: [Vec3::ZERO, Vec3::X * max],
                },
                producer: None,
                consumer: None,
                parents: Bounded::new(),
            });
        }
        let mut mip = GroupMip::default();
        for id in 0..3 {
            mip.clusters.push(id).unwrap();
        }
        mip.summarize(&clusters);
        assert_eq!(mip.min_error, 0.5);
        assert_eq!(mip.max_error, 2.0);
        assert_eq!(mip.witness[1], Vec3::X * 2.0);
    }
}
