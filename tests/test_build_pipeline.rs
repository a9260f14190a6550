//! Integration tests: offline hierarchy build
//!
//! Verifies cluster budgets, DAG links, error monotonicity and configuration
//! handling across presets and mesh shapes.
//!
//! Author: Moroya Sakamoto

mod common;

use alice_nanite::prelude::*;
use common::*;

// ============================================================================
// Structure
// ============================================================================

#[test]
fn every_cluster_fits_the_budget() {
    for mesh in [test_box(), test_sphere(), test_grid()] {
        let vm = build(&mesh);
        for c in &vm.clusters {
            assert!(c.triangle_count > 0, "cluster {} is empty", c.id);
            assert!(c.triangle_count as usize <= CLUSTER_MAX_TRIANGLES);
        }
    }
}

#[test]
fn producers_follow_lods() {
    let vm = build(&test_sphere());
    for c in &vm.clusters {
        match c.producer {
            None => assert_eq!(c.lod, 0, "cluster {} has no producer", c.id),
            Some(g) => assert_eq!(vm.groups[g as usize].lod + 1, c.lod),
        }
        if let Some(g) = c.consumer {
            assert_eq!(vm.groups[g as usize].lod, c.lod);
        }
    }
}

#[test]
fn dag_is_valid_for_all_shapes() {
    for mesh in [test_box(), test_sphere(), test_grid()] {
        let vm = build(&mesh);
        let dag = ClusterDag::from_mesh(&vm);
        dag.validate().expect("invalid DAG");
        assert_eq!(dag.leaves().count(), vm.clusters_at(0).count());
        assert_eq!(dag.roots().count(), vm.roots().count());
    }
}

#[test]
fn triangle_counts_shrink_per_lod() {
    let vm = build(&test_sphere());
    for lod in 1..vm.lod_count {
        assert!(
            vm.triangles_at(lod) < vm.triangles_at(lod - 1),
            "LOD {} did not shrink",
            lod
        );
    }
}

#[test]
fn lod_stats_add_up() {
    let vm = build(&test_sphere());
    let stats = vm.lod_stats();
    assert_eq!(stats.len(), vm.lod_count as usize);
    assert_eq!(stats.iter().map(|s| s.clusters).sum::<usize>(), vm.clusters.len());
    assert_eq!(stats.iter().map(|s| s.groups).sum::<usize>(), vm.groups.len());
    assert_eq!(stats[0].max_error, 0.0);
    for pair in stats.windows(2) {
        assert!(pair[1].min_error >= pair[0].max_error);
    }
}

#[test]
fn open_grid_keeps_its_outline() {
    let input = test_grid();
    let vm = build(&input);
    assert!(vm.lod_count >= 2);
    let coarse = vm.to_stream(vm.lod_count - 1, 1e-4);
    let before = input.aabb();
    let after = coarse.aabb();
    assert_close(after.min.y, 0.0, 1e-4, "grid left its plane");
    assert_close(after.max.y, 0.0, 1e-4, "grid left its plane");
    assert!(after.min.x >= before.min.x - 1e-4 && after.max.x <= before.max.x + 1e-4);
    assert!(after.min.z >= before.min.z - 1e-4 && after.max.z <= before.max.z + 1e-4);
}

#[test]
fn mesh_far_from_origin_builds() {
    let offset = Vec3::new(300_000.0, 0.0, 0.0);
    let mut input = test_box();
    for p in &mut input.positions {
        *p += offset;
    }
    let vm = build(&input);
    assert_eq!(vm.input_triangles, 512);
    assert_eq!(vm.triangles_at(0), 512);
    ClusterDag::from_mesh(&vm).validate().expect("invalid DAG");
    for c in &vm.clusters {
        assert!(c.triangle_count as usize <= CLUSTER_MAX_TRIANGLES);
        assert!(c.bounds.aabb.min.x >= offset.x - 1.5, "cluster {} moved", c.id);
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn presets_build_valid_hierarchies() {
    for config in [BuildConfig::high_detail(), BuildConfig::preview()] {
        let vm = HierarchyAssembler::new(config).build(&test_sphere()).unwrap();
        ClusterDag::from_mesh(&vm).validate().unwrap();
    }
}

#[test]
fn lod_override_caps_depth() {
    let config = BuildConfig {
        max_lod_levels: Some(2),
        ..Default::default()
    };
    let vm = HierarchyAssembler::new(config).build(&test_sphere()).unwrap();
    assert_eq!(vm.lod_count, 2);
    assert!(vm.roots().all(|c| c.lod == 1));
}

#[test]
fn single_worker_builds() {
    let config = BuildConfig {
        worker_threads: 1,
        ..Default::default()
    };
    let vm = HierarchyAssembler::new(config).build(&test_box()).unwrap();
    assert_eq!(vm.triangles_at(0), 512);
    ClusterDag::from_mesh(&vm).validate().unwrap();
}

#[test]
fn config_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.json");
    let config = BuildConfig {
        collapses_per_pass: 24,
        max_lod_levels: Some(3),
        ..BuildConfig::preview()
    };
    config.save_json(&path).unwrap();
    assert_eq!(BuildConfig::load_json(&path).unwrap(), config);

    std::fs::write(&path, r#"{ "simplify_ratio": 0.25 }"#).unwrap();
    let partial = BuildConfig::load_json(&path).unwrap();
    assert_eq!(partial.simplify_ratio, 0.25);
    assert_eq!(partial.max_triangles_per_cluster, CLUSTER_MAX_TRIANGLES);
}

#[test]
fn triangles_collapsed_by_welding_are_dropped() {
    let mut mesh = test_box();
    let first = mesh.corners(0);
    let twin = mesh.positions[first[0].position as usize];
    mesh.positions.push(twin);
    let duplicate = Corner {
        position: mesh.positions.len() as u32 - 1,
        ..first[0]
    };
    mesh.push_triangle([first[0], duplicate, first[1]]);
    let vm = build(&mesh);
    assert_eq!(vm.input_triangles, 512);
    assert_eq!(vm.triangles_at(0), 512);
}

#[test]
fn repeated_index_triangle_is_reported() {
    let mut mesh = test_box();
    let first = mesh.corners(0);
    mesh.push_triangle([first[0], first[0], first[1]]);
    let err = HierarchyAssembler::new(BuildConfig::default())
        .build(&mesh)
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::DegenerateGeometry {
            lod: 0,
            site: Site::Mesh,
            triangle: 512
        }
    ));
}
