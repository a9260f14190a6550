//! Build, selection and streaming configuration
//!
//! All knobs are plain serde structs so a build can be reproduced from a
//! JSON file next to its output.
//!
//! Author: Moroya Sakamoto

use crate::error::BuildError;
use crate::io::IoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum triangles per cluster (the record layout is sized for this)
pub const CLUSTER_MAX_TRIANGLES: usize = 128;

/// Maximum clusters per group MIP and recorded parents per cluster
pub const MAX_CLUSTERS_PER_GROUP: usize = 128;

/// Which partitioner backs clustering and grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionerKind {
    /// Built-in multilevel recursive bisection
    InProcess,
    /// External METIS-compatible executables driven through temp files
    Subprocess {
        /// Program used for weighted graph partitioning (e.g. `gpmetis`)
        graph_program: PathBuf,
        /// Program used for dual-graph mesh partitioning (e.g. `mpmetis`)
        mesh_program: PathBuf,
        /// Directory for exchange files (system temp dir when `None`)
        work_dir: Option<PathBuf>,
        /// Extra arguments passed before the file name
        extra_args: Vec<String>,
    },
}

impl Default for PartitionerKind {
    fn default() -> Self {
        PartitionerKind::InProcess
    }
}

/// Configuration for the offline hierarchy build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Triangle budget per cluster
    pub max_triangles_per_cluster: usize,
    /// Hard ceiling; clusters above it shed triangles to neighbours
    pub split_ceiling: usize,
    /// Clusters at or below this size are merged into a neighbour
    pub merge_floor: usize,
    /// Target number of clusters per group
    pub clusters_per_group: usize,
    /// Edge collapses per simplification pass
    pub collapses_per_pass: usize,
    /// Target triangle ratio of a simplified group
    pub simplify_ratio: f32,
    /// Weight of the normal deviation penalty in collapse costs
    pub feature_weight: f32,
    /// Distance under which two positions are the same vertex
    pub weld_epsilon: f32,
    /// Stop adding LODs once the whole level fits in this many triangles
    pub min_triangles: usize,
    /// Override for the LOD count bound `ceil(log2(tris / 128)) + 1`
    pub max_lod_levels: Option<u32>,
    /// Number of nearest LOD 0 clusters searched for deviation
    pub deviation_neighbors: usize,
    /// Worker threads for the parallel phases
    pub worker_threads: usize,
    /// Partitioner backend
    pub partitioner: PartitionerKind,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            max_triangles_per_cluster: CLUSTER_MAX_TRIANGLES,
            split_ceiling: 384,
            merge_floor: 12,
            clusters_per_group: 4,
            collapses_per_pass: 10,
            simplify_ratio: 0.5,
            feature_weight: 0.5,
            weld_epsilon: 1e-4,
            min_triangles: CLUSTER_MAX_TRIANGLES,
            max_lod_levels: None,
            deviation_neighbors: 3,
            worker_threads: 8,
            partitioner: PartitionerKind::InProcess,
        }
    }
}

impl BuildConfig {
    /// Larger passes and more workers for production assets
    pub fn high_detail() -> Self {
        BuildConfig {
            collapses_per_pass: 10,
            worker_threads: 12,
            deviation_neighbors: 4,
            ..Default::default()
        }
    }

    /// Fast preview build: fewer workers, coarser collapse batches
    pub fn preview() -> Self {
        BuildConfig {
            collapses_per_pass: 32,
            worker_threads: 4,
            deviation_neighbors: 1,
            ..Default::default()
        }
    }

    /// Relaxed tolerance used for normals and UVs during welding
    #[inline]
    pub fn attribute_epsilon(&self) -> f32 {
        self.weld_epsilon * 100.0
    }

    /// Number of LOD levels the build may produce for `triangles` input triangles
    pub fn lod_limit(&self, triangles: usize) -> u32 {
        if let Some(limit) = self.max_lod_levels {
            return limit.max(1);
        }
        let ratio = triangles as f64 / self.max_triangles_per_cluster as f64;
        if ratio <= 1.0 {
            return 1;
        }
        ratio.log2().ceil() as u32 + 1
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<(), BuildError> {
        let fail = |msg: &str| Err(BuildError::Config(msg.to_string()));
        if self.max_triangles_per_cluster == 0 || self.max_triangles_per_cluster > CLUSTER_MAX_TRIANGLES {
            return fail("max_triangles_per_cluster must be in 1..=128");
        }
        if self.split_ceiling < self.max_triangles_per_cluster {
            return fail("split_ceiling must be >= max_triangles_per_cluster");
        }
        if self.merge_floor >= self.max_triangles_per_cluster {
            return fail("merge_floor must be below max_triangles_per_cluster");
        }
        if self.clusters_per_group < 2 {
            return fail("clusters_per_group must be at least 2");
        }
        if self.collapses_per_pass == 0 {
            return fail("collapses_per_pass must be positive");
        }
        if !(self.simplify_ratio > 0.0 && self.simplify_ratio < 1.0) {
            return fail("simplify_ratio must be in (0, 1)");
        }
        if !(self.weld_epsilon > 0.0) || !self.weld_epsilon.is_finite() {
            return fail("weld_epsilon must be positive");
        }
        if self.feature_weight < 0.0 {
            return fail("feature_weight must be non-negative");
        }
        if self.deviation_neighbors == 0 {
            return fail("deviation_neighbors must be positive");
        }
        if self.worker_threads == 0 {
            return fail("worker_threads must be positive");
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| IoError::Serialization(e.to_string()))
    }

    /// Save as pretty-printed JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| IoError::Serialization(e.to_string()))
    }
}

/// Run-time cut selection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum tolerated screen-space error in pixels
    pub pixel_error_threshold: f32,
    /// A child's error is clamped to this fraction of a smaller parent error
    pub child_clamp: f32,
    /// Drop clusters whose normal cone faces away from the camera
    pub cull_backfaces: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            pixel_error_threshold: 1.0,
            child_clamp: 0.8,
            cull_backfaces: false,
        }
    }
}

/// Residency cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Number of resident cluster slots
    pub capacity: usize,
    /// Triangle count every slot is sized for
    pub max_cluster_triangles: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            capacity: 4096,
            max_cluster_triangles: CLUSTER_MAX_TRIANGLES,
        }
    }
}
