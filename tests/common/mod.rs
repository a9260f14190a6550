//! Common test helpers for ALICE-Nanite integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use alice_nanite::prelude::*;

// ============================================================================
// Standard test meshes
// ============================================================================

/// Closed box with 512 triangles: four full LOD 0 clusters
pub fn test_box() -> MeshStream {
    subdivided_box(Vec3::ONE, [8, 8, 4])
}

/// Unit UV sphere, large enough for three or more LODs
pub fn test_sphere() -> MeshStream {
    uv_sphere(1.0, 16, 32)
}

/// Open 24x24 grid (1152 triangles) with a free border
pub fn test_grid() -> MeshStream {
    grid(2.0, 24)
}

/// Build with the default configuration
pub fn build(mesh: &MeshStream) -> VirtualMesh {
    HierarchyAssembler::new(BuildConfig::default())
        .build(mesh)
        .expect("build failed")
}

// ============================================================================
// Cameras
// ============================================================================

/// Cameras on a slightly tilted orbit around the origin at `distance`
pub fn orbit(distance: f32, count: usize) -> Vec<Camera> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU + 0.37;
            let eye = Vec3::new(angle.cos(), 0.31, angle.sin()) * distance;
            Camera::look_at(eye, Vec3::ZERO)
        })
        .collect()
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert two floats are within `tol`
pub fn assert_close(a: f32, b: f32, tol: f32, msg: &str) {
    assert!(
        (a - b).abs() <= tol,
        "{}: {} vs {} (tol {})",
        msg,
        a,
        b,
        tol
    );
}

/// Assert `selection` is a valid cut: every LOD 0 cluster is represented
/// exactly once, either by itself or by one ancestor.
pub fn assert_valid_cut(dag: &ClusterDag, selection: &Selection) {
    for leaf in dag.leaves() {
        let mut covering = selection.clusters.iter().filter(|&&c| c == leaf.id).count();
        covering += dag
            .ancestors(leaf.id)
            .iter()
            .filter(|a| selection.clusters.binary_search(a).is_ok())
            .count();
        assert_eq!(covering, 1, "LOD 0 cluster {} covered {} times", leaf.id, covering);
    }
}
