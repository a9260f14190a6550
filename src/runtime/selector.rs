//! View-dependent cluster selection
//!
//! Every group gets a screen-space error: the pixel length of its MIP 1
//! witness pair. Walking groups from the coarsest LOD down, a group's error
//! is clamped to `child_clamp` times the smallest error of the groups
//! consuming its output whenever it would exceed it, so errors never
//! decrease going up the DAG.
//!
//! A cluster is drawn when its producer's error is within the threshold
//! (LOD 0 clusters have zero error) while its consumer's error is not
//! (clusters nobody consumes count as infinitely coarse). With monotonic
//! errors this picks exactly one cluster along every path from a LOD 0
//! cluster to a root: the result covers the surface and is an antichain.
//!
//! Author: Moroya Sakamoto

use super::camera::Camera;
use crate::config::RuntimeConfig;
use crate::dag::ClusterDag;
use crate::mesh::MeshStream;
use crate::virtual_mesh::VirtualMesh;

/// Clusters chosen for one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Selected cluster ids, ascending
    pub clusters: Vec<u32>,
    /// Total triangles of `clusters`
    pub triangles: usize,
    /// Clusters dropped by normal-cone culling
    pub culled: usize,
    /// Groups whose finer clusters were visited
    pub refined_groups: usize,
    /// Group errors lowered to keep errors monotonic
    pub clamped_groups: usize,
}

impl Selection {
    /// Number of selected clusters
    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Weld the selected clusters into one stream
    pub fn to_stream(&self, mesh: &VirtualMesh, epsilon: f32) -> MeshStream {
        mesh.merge_clusters(self.clusters.iter().copied(), epsilon)
    }
}

/// Per-frame cut selection over a built mesh
pub struct RuntimeSelector<'a> {
    mesh: &'a VirtualMesh,
    dag: ClusterDag,
    config: RuntimeConfig,
    group_errors: Vec<f32>,
    visited: Vec<bool>,
}

impl<'a> RuntimeSelector<'a> {
    /// Selector over `mesh`
    pub fn new(mesh: &'a VirtualMesh, config: RuntimeConfig) -> Self {
        Self {
            dag: ClusterDag::from_mesh(mesh),
            group_errors: vec![0.0; mesh.groups.len()],
            visited: vec![false; mesh.groups.len()],
            mesh,
            config,
        }
    }

    pub fn dag(&self) -> &ClusterDag {
        &self.dag
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Change the pixel error threshold
    pub fn set_threshold(&mut self, pixels: f32) {
        self.config.pixel_error_threshold = pixels;
    }

    /// Screen-space error of a group from the last [`select`](Self::select)
    pub fn group_error(&self, group: u32) -> Option<f32> {
        self.group_errors.get(group as usize).copied()
    }

    /// Project and clamp every group error; returns the number clamped.
    ///
    /// Groups are ordered by LOD, so walking ids backwards visits every
    /// consumer before the groups feeding it.
    fn project_errors(&mut self, camera: &Camera) -> usize {
        let mut clamped = 0;
        for g in (0..self.mesh.groups.len()).rev() {
            let group = &self.mesh.groups[g];
            let mip = &group.mips[1];
            let raw = if mip.max_error > 0.0 {
                camera.pixel_distance(mip.witness[0], mip.witness[1])
            } else {
                0.0
            };
            let bound = self
                .dag
                .group(group.id)
                .map(|node| {
                    node.parent_groups
                        .iter()
                        .map(|&p| self.group_errors[p as usize])
                        .fold(f32::INFINITY, f32::min)
                })
                .unwrap_or(f32::INFINITY);
            self.group_errors[g] = if raw > bound {
                clamped += 1;
                bound * self.config.child_clamp
            } else {
                raw
            };
        }
        clamped
    }

    /// Error of the group that produced `cluster` (zero at LOD 0)
    fn own_error(&self, cluster: u32) -> f32 {
        self.dag
            .cluster(cluster)
            .and_then(|c| c.producer)
            .map_or(0.0, |g| self.group_errors[g as usize])
    }

    /// Choose the clusters to draw from `camera`
    pub fn select(&mut self, camera: &Camera) -> Selection {
        let threshold = self.config.pixel_error_threshold;
        let mut selection = Selection {
            clamped_groups: self.project_errors(camera),
            ..Default::default()
        };
        self.visited.iter_mut().for_each(|v| *v = false);

        let mut stack: Vec<u32> = self.dag.roots().map(|c| c.id).collect();
        while let Some(c) = stack.pop() {
            if self.own_error(c) <= threshold {
                selection.clusters.push(c);
                continue;
            }
            // LOD 0 has nothing finer, even under a negative threshold
            let Some(g) = self.dag.cluster(c).and_then(|n| n.producer) else {
                selection.clusters.push(c);
                continue;
            };
            if std::mem::replace(&mut self.visited[g as usize], true) {
                continue;
            }
            selection.refined_groups += 1;
            if let Some(node) = self.dag.group(g) {
                stack.extend(node.inputs.iter().copied());
            }
        }

        if self.config.cull_backfaces {
            let before = selection.clusters.len();
            let mesh = self.mesh;
            selection.clusters.retain(|&c| {
                !mesh.clusters[c as usize].bounds.cone.is_backfacing(camera.eye)
            });
            selection.culled = before - selection.clusters.len();
        }

        selection.clusters.sort_unstable();
        selection.triangles = selection
            .clusters
            .iter()
            .map(|&c| self.mesh.clusters[c as usize].triangle_count as usize)
            .sum();
        log::debug!(
            "selected {} clusters ({} triangles), refined {} groups, clamped {}",
            selection.clusters.len(),
            selection.triangles,
            selection.refined_groups,
            selection.clamped_groups
        );
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::HierarchyAssembler;
    use crate::config::BuildConfig;
    use crate::mesh::shapes::uv_sphere;
    use glam::Vec3;

    fn sphere() -> VirtualMesh {
        HierarchyAssembler::new(BuildConfig::default())
            .build(&uv_sphere(1.0, 16, 32))
            .unwrap()
    }

    fn check_cut(mesh: &VirtualMesh, selection: &Selection, dag: &ClusterDag) {
        for leaf in dag.leaves() {
            let chain = dag.ancestors(leaf.id);
            let covered = selection.clusters.contains(&leaf.id)
                || chain.iter().any(|a| selection.clusters.contains(a));
            assert!(covered, "LOD 0 cluster {} is not covered", leaf.id);
        }
        for &a in &selection.clusters {
            for &b in &selection.clusters {
                assert!(!dag.is_ancestor(a, b), "{} and {} overlap", a, b);
            }
        }
        assert!(selection.clusters.iter().all(|&c| (c as usize) < mesh.clusters.len()));
    }

    #[test]
    fn test_far_camera_picks_coarse_cut() {
        let mesh = sphere();
        let mut selector = RuntimeSelector::new(&mesh, RuntimeConfig::default());
        let selection = selector.select(&Camera::look_at(Vec3::new(0.0, 0.0, 5000.0), Vec3::ZERO));
        let roots: Vec<u32> = mesh.roots().map(|c| c.id).collect();
        assert_eq!(selection.clusters, roots);
        check_cut(&mesh, &selection, selector.dag());
    }

    #[test]
    fn test_zero_threshold_picks_lod0() {
        let mesh = sphere();
        let mut selector = RuntimeSelector::new(&mesh, RuntimeConfig::default());
        selector.set_threshold(0.0);
        let selection = selector.select(&Camera::look_at(Vec3::new(1.3, 0.7, 2.9), Vec3::ZERO));
        assert_eq!(selection.triangles, mesh.triangles_at(0));
        check_cut(&mesh, &selection, selector.dag());
    }

    #[test]
    fn test_mid_range_cut_is_valid() {
        let mesh = sphere();
        let mut selector = RuntimeSelector::new(&mesh, RuntimeConfig::default());
        for distance in [1.5f32, 3.0, 8.0, 30.0, 120.0] {
            let selection = selector.select(&Camera::look_at(Vec3::new(distance, 0.5, 0.0), Vec3::ZERO));
            check_cut(&mesh, &selection, selector.dag());
        }
    }

    #[test]
    fn test_group_errors_monotonic() {
        let mesh = sphere();
        let mut selector = RuntimeSelector::new(&mesh, RuntimeConfig::default());
        selector.select(&Camera::look_at(Vec3::new(2.0, 1.0, 2.0), Vec3::ZERO));
        for node in selector.dag().groups() {
            let own = selector.group_error(node.id).unwrap();
            for &p in &node.parent_groups {
                assert!(own <= selector.group_error(p).unwrap());
            }
        }
    }

    #[test]
    fn test_backface_culling_drops_clusters() {
        let mesh = sphere();
        let config = RuntimeConfig {
            cull_backfaces: true,
            pixel_error_threshold: 0.0,
            ..Default::default()
        };
        // look at the sphere from behind its narrowest LOD 0 cone
        let narrowest = mesh
            .clusters
            .iter()
            .filter(|c| c.lod == 0)
            .max_by(|a, b| a.bounds.cone.cos_half_angle.total_cmp(&b.bounds.cone.cos_half_angle))
            .unwrap();
        let eye = -narrowest.bounds.cone.axis * 4.0;
        let mut selector = RuntimeSelector::new(&mesh, config);
        let selection = selector.select(&Camera::look_at(eye, Vec3::ZERO));

        assert!(selection.culled > 0);
        assert!(!selection.clusters.contains(&narrowest.id));
        assert!(selection.triangles < mesh.triangles_at(0));

        // every dropped cluster is seen only from behind
        for c in mesh.clusters.iter().filter(|c| c.lod == 0) {
            if selection.clusters.contains(&c.id) {
                continue;
            }
            let stream = mesh.cluster_mesh(c.id).unwrap();
            for t in 0..stream.triangle_count() {
                let [p0, _, _] = stream.triangle_positions(t);
                assert!((p0 - eye).dot(stream.face_normal(t)) >= -1e-4);
            }
        }
    }
}
