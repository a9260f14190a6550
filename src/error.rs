//! Build pipeline errors
//!
//! Every variant raised while building the hierarchy carries the LOD level
//! and the cluster or group index it was raised for, so a failed batch
//! build points at the exact place it stopped.
//!
//! Author: Moroya Sakamoto

use crate::bounded::CapacityError;
use crate::io::IoError;
use crate::mesh::StreamError;
use crate::partition::PartitionError;
use glam::Vec3;
use thiserror::Error;

/// Errors raised by the offline hierarchy builder
#[derive(Error, Debug)]
pub enum BuildError {
    /// The graph partitioner failed twice (original and relaxed options)
    #[error("clustering failed at LOD {lod}: {reason}")]
    ClusteringFailure {
        /// LOD level being partitioned
        lod: u32,
        /// Partitioner diagnostic
        reason: String,
    },

    /// A cluster or group broke a structural contract
    #[error("invariant violated at LOD {lod}, {site}: {detail}")]
    InvariantViolation {
        /// LOD level
        lod: u32,
        /// Cluster or group the violation was found in
        site: Site,
        /// What was wrong
        detail: String,
    },

    /// A triangle repeats a vertex or has a zero-length edge
    #[error("degenerate triangle {triangle} at LOD {lod}, {site}")]
    DegenerateGeometry {
        /// LOD level
        lod: u32,
        /// Owner of the triangle
        site: Site,
        /// Triangle index inside the owner
        triangle: usize,
    },

    /// A vertex expected to be coincident with another was not found
    #[error("no vertex within tolerance of {position} at LOD {lod}, {site}")]
    LookupMiss {
        /// LOD level
        lod: u32,
        /// Cluster or group performing the lookup
        site: Site,
        /// Queried position
        position: Vec3,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Worker pool could not be created
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Partitioner error outside the clustering retry path
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Where in the hierarchy an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// The input mesh as a whole
    Mesh,
    /// A cluster by global index
    Cluster(u32),
    /// A cluster group by global index
    Group(u32),
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Site::Mesh => write!(f, "input mesh"),
            Site::Cluster(i) => write!(f, "cluster {}", i),
            Site::Group(i) => write!(f, "group {}", i),
        }
    }
}

impl BuildError {
    /// Wrap a stream validation failure with its location
    pub fn from_stream(lod: u32, site: Site, err: StreamError) -> Self {
        match err {
            StreamError::RepeatedVertex { triangle } => {
                BuildError::DegenerateGeometry { lod, site, triangle }
            }
            other => BuildError::InvariantViolation {
                lod,
                site,
                detail: other.to_string(),
            },
        }
    }

    /// Wrap an inline-array overflow with its location
    pub fn capacity(lod: u32, site: Site, what: &str, err: CapacityError) -> Self {
        BuildError::InvariantViolation {
            lod,
            site,
            detail: format!("{} exceeds capacity {}", what, err.capacity),
        }
    }

    /// LOD level the error refers to, if any
    pub fn lod(&self) -> Option<u32> {
        match self {
            BuildError::ClusteringFailure { lod, .. }
            | BuildError::InvariantViolation { lod, .. }
            | BuildError::DegenerateGeometry { lod, .. }
            | BuildError::LookupMiss { lod, .. } => Some(*lod),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_site() {
        let err = BuildError::InvariantViolation {
            lod: 2,
            site: Site::Cluster(17),
            detail: "index arrays differ".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("LOD 2"));
        assert!(msg.contains("cluster 17"));
        assert_eq!(err.lod(), Some(2));
    }

    #[test]
    fn test_repeated_vertex_maps_to_degenerate() {
        let err = BuildError::from_stream(0, Site::Mesh, StreamError::RepeatedVertex { triangle: 4 });
        assert!(matches!(err, BuildError::DegenerateGeometry { triangle: 4, .. }));
    }
}
