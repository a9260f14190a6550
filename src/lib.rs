//! # ALICE-Nanite
//!
//! Offline builder and runtime selector for virtualized multi-resolution
//! meshes.
//!
//! A triangle mesh is split into clusters of at most 128 triangles. Clusters
//! are grouped, each group is merged and simplified to half its triangles
//! with its outer border locked, and the result is split back into clusters
//! for the next level. Repeating this produces a DAG of clusters in which any
//! cut is a crack-free surface. At run time a camera picks the coarsest cut
//! whose projected error stays under a pixel threshold, and a bounded cache
//! tracks which clusters are resident.
//!
//! ## Features
//!
//! - **Clustering**: graph-partitioned triangle clusters with size balancing
//! - **Grouping**: adjacency-weighted cluster groups
//! - **Simplification**: quadric edge collapse with locked group borders
//! - **Hierarchy**: monotonic error and deviation bounds per LOD
//! - **Selection**: per-view cut under a screen-space error threshold
//! - **Streaming**: fixed-slot LRU residency cache
//! - **File I/O**: CRC-checked `.vmesh` container and JSON manifest
//!
//! ## Example
//!
//! ```rust
//! use alice_nanite::prelude::*;
//!
//! let input = subdivided_box(Vec3::ONE, [8, 8, 4]);
//! let mesh = HierarchyAssembler::new(BuildConfig::default())
//!     .build(&input)
//!     .unwrap();
//! assert_eq!(mesh.triangles_at(0), 512);
//!
//! let mut selector = RuntimeSelector::new(&mesh, RuntimeConfig::default());
//! let selection = selector.select(&Camera::look_at(Vec3::new(0.0, 0.0, 50.0), Vec3::ZERO));
//! assert!(!selection.is_empty());
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

pub mod bounded;
pub mod build;
pub mod config;
pub mod dag;
pub mod error;
pub mod io;
pub mod mesh;
pub mod partition;
pub mod runtime;
pub mod virtual_mesh;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::bounded::Bounded;
    pub use crate::build::{CpuKernels, GeometryKernels, HierarchyAssembler};
    pub use crate::config::{
        BuildConfig, PartitionerKind, RuntimeConfig, StreamingConfig, CLUSTER_MAX_TRIANGLES,
        MAX_CLUSTERS_PER_GROUP,
    };
    pub use crate::dag::ClusterDag;
    pub use crate::error::{BuildError, Site};
    pub use crate::io::{load_vmesh, save_manifest, save_vmesh, IoError, Manifest};
    pub use crate::mesh::{
        grid, subdivided_box, uv_sphere, Aabb, ClusterBounds, Corner, MeshStream, NormalCone,
    };
    pub use crate::partition::{Partitioner, PartitionOptions};
    pub use crate::runtime::{Camera, Residency, RuntimeSelector, Selection, StreamingCache};
    pub use crate::virtual_mesh::{Cluster, ClusterGroup, Deviation, LodStats, VirtualMesh};
    pub use glam::{Vec2, Vec3};
}

// Re-exports for convenience
pub use build::HierarchyAssembler;
pub use config::BuildConfig;
pub use error::BuildError;
pub use mesh::MeshStream;
pub use virtual_mesh::VirtualMesh;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_basic_workflow() {
        let input = uv_sphere(1.0, 16, 32);
        let mesh = HierarchyAssembler::new(BuildConfig::default())
            .build(&input)
            .unwrap();
        assert!(mesh.lod_count >= 2);
        ClusterDag::from_mesh(&mesh).validate().unwrap();

        let bytes = crate::io::to_bytes(&mesh).unwrap();
        let loaded = crate::io::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.clusters.len(), mesh.clusters.len());

        let mut selector = RuntimeSelector::new(&loaded, RuntimeConfig::default());
        let near = selector.select(&Camera::look_at(Vec3::new(0.4, 0.3, 2.0), Vec3::ZERO));
        let far = selector.select(&Camera::look_at(Vec3::new(0.4, 0.3, 400.0), Vec3::ZERO));
        assert!(far.triangles <= near.triangles);

        let mut cache = StreamingCache::new(StreamingConfig::default());
        let stats = cache.stream_selection(0, &loaded, &near).unwrap();
        assert_eq!(stats.misses as usize, near.len());
    }
}
