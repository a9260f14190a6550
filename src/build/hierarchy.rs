//! Hierarchy assembly
//!
//! Per LOD:
//!
//! 1. validate and pack every cluster into the geometry arenas, compute its
//!    bounds and its deviation from LOD 0, and clamp errors so they never
//!    decrease from one LOD to the next;
//! 2. stop at the LOD bound or once the level fits in `min_triangles`;
//! 3. group the clusters, weld each group, lock vertices shared with other
//!    groups and simplify every group in parallel;
//! 4. re-split each simplified group into clusters for the next LOD and
//!    link both sides of the group.
//!
//! Arenas and link tables are written only by the orchestrating thread,
//! after each parallel phase has joined.
//!
//! Author: Moroya Sakamoto

use super::arena::GeometryArena;
use super::clusterer::TriangleClusterer;
use super::grouper::ClusterGrouper;
use super::kernels::{CpuKernels, GeometryKernels};
use super::pool::WorkerPool;
use super::simplify::{GroupSimplifier, SimplifyResult};
use crate::bounded::Bounded;
use crate::config::BuildConfig;
use crate::error::{BuildError, Site};
use crate::mesh::{Aabb, ClusterBounds, MeshStream};
use crate::partition::{self, Partitioner};
use crate::virtual_mesh::{Cluster, ClusterGroup, Deviation, VirtualMesh};
use glam::Vec3;

/// Clusters of one LOD waiting to be packed
struct Level {
    meshes: Vec<MeshStream>,
    /// Group that produced each cluster
    producers: Vec<Option<u32>>,
    /// Simplification error carried over from the producer
    inherited: Vec<f32>,
}

/// LOD 0 surface used for deviation queries
struct Reference {
    centroids: Vec<Vec3>,
    positions: Vec<Vec<Vec3>>,
}

impl Reference {
    /// Indices of the `k` LOD 0 clusters whose centroids are closest to `p`
    fn nearest(&self, p: Vec3, k: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.centroids.len()).collect();
        order.sort_by(|&a, &b| {
            self.centroids[a]
                .distance_squared(p)
                .total_cmp(&self.centroids[b].distance_squared(p))
                .then(a.cmp(&b))
        });
        order.truncate(k);
        order
    }
}

/// Builds a [`VirtualMesh`] from a triangle mesh
pub struct HierarchyAssembler {
    config: BuildConfig,
    partitioner: Box<dyn Partitioner>,
    kernels: Box<dyn GeometryKernels>,
}

impl HierarchyAssembler {
    /// Assembler with the configured partitioner and CPU kernels
    pub fn new(config: BuildConfig) -> Self {
        let partitioner = partition::from_kind(&config.partitioner);
        Self {
            config,
            partitioner,
            kernels: Box::new(CpuKernels),
        }
    }

    /// Replace the partitioner backend
    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// Replace the batch geometry kernels
    pub fn with_kernels(mut self, kernels: Box<dyn GeometryKernels>) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run the full pipeline.
    ///
    /// Any error aborts the build and names the LOD and cluster or group it
    /// was raised for.
    pub fn build(&self, input: &MeshStream) -> Result<VirtualMesh, BuildError> {
        let config = &self.config;
        config.validate()?;
        input
            .validate()
            .map_err(|e| BuildError::from_stream(0, Site::Mesh, e))?;

        let (mesh, dropped) = input.welded(config.weld_epsilon, config.attribute_epsilon());
        if dropped > 0 {
            log::warn!("dropped {} input triangle(s) that collapsed during welding", dropped);
        }
        if mesh.is_empty() {
            return Err(BuildError::InvariantViolation {
                lod: 0,
                site: Site::Mesh,
                detail: "no non-degenerate triangles".to_string(),
            });
        }

        let pool = WorkerPool::new(config.worker_threads)?;
        let lod_limit = config.lod_limit(mesh.triangle_count());
        let clusterer = TriangleClusterer::new(config, self.partitioner.as_ref());
        let grouper = ClusterGrouper::new(config, self.partitioner.as_ref(), self.kernels.as_ref(), &pool);
        let simplifier = GroupSimplifier::new(config, self.kernels.as_ref());

        log::info!(
            "building hierarchy for {} triangles: up to {} LOD(s), {} partitioner, {} workers",
            mesh.triangle_count(),
            lod_limit,
            self.partitioner.name(),
            pool.threads()
        );

        let mut out = VirtualMesh {
            arena: GeometryArena::new(),
            input_triangles: mesh.triangle_count(),
            ..Default::default()
        };
        let first = clusterer.cluster(&mesh, 0)?;
        let mut level = Level {
            producers: vec![None; first.len()],
            inherited: vec![0.0; first.len()],
            meshes: first,
        };
        let mut reference = None;
        let mut lod = 0u32;

        loop {
            let base = out.clusters.len() as u32;
            self.pack_level(&mut out, &level, lod, &pool, &mut reference)?;
            let ids: Vec<u32> = (base..out.clusters.len() as u32).collect();
            let triangles: usize = level.meshes.iter().map(MeshStream::triangle_count).sum();
            log::info!("LOD {}: {} clusters, {} triangles", lod, ids.len(), triangles);

            if lod + 1 >= lod_limit || triangles <= config.min_triangles {
                break;
            }
            let next = self.reduce_level(&mut out, &level, &ids, lod, &pool, &clusterer, &grouper, &simplifier)?;
            if next.meshes.is_empty() {
                break;
            }
            level = next;
            lod += 1;
        }

        out.lod_count = lod + 1;
        log::info!(
            "hierarchy complete: {} LOD(s), {} clusters, {} groups, {} arena bytes",
            out.lod_count,
            out.clusters.len(),
            out.groups.len(),
            out.arena.total_bytes()
        );
        Ok(out)
    }

    /// Validate, measure and pack one LOD
    fn pack_level(
        &self,
        out: &mut VirtualMesh,
        level: &Level,
        lod: u32,
        pool: &WorkerPool,
        reference: &mut Option<Reference>,
    ) -> Result<(), BuildError> {
        let base = out.clusters.len() as u32;
        let budget = self.config.max_triangles_per_cluster;
        for (i, mesh) in level.meshes.iter().enumerate() {
            let site = Site::Cluster(base + i as u32);
            mesh.validate().map_err(|e| BuildError::from_stream(lod, site, e))?;
            if mesh.triangle_count() > budget {
                return Err(BuildError::InvariantViolation {
                    lod,
                    site,
                    detail: format!("{} triangles, budget {}", mesh.triangle_count(), budget),
                });
            }
        }

        let bounds: Vec<ClusterBounds> = pool.map_indices(level.meshes.len(), |i| {
            ClusterBounds::from_triangles(&level.meshes[i].positions, &level.meshes[i].position_indices)
        });
        let deviations = match reference.as_ref() {
            None => bounds.iter().map(|b| Deviation::zero_at(b.centroid)).collect(),
            Some(r) => self.deviations(pool, level, &bounds, r, lod, base)?,
        };

        let (prev_error, prev_deviation) = if lod == 0 {
            (0.0, 0.0)
        } else {
            out.clusters
                .iter()
                .filter(|c| c.lod + 1 == lod)
                .fold((0.0f32, 0.0f32), |(e, d), c| {
                    (e.max(c.simplification_error), d.max(c.deviation.max))
                })
        };

        let mut clamped = 0;
        for (i, mesh) in level.meshes.iter().enumerate() {
            let mut deviation = deviations[i];
            let mut error = level.inherited[i];
            if error < prev_error {
                error = prev_error;
                clamped += 1;
            }
            if deviation.clamp_to(prev_deviation) {
                clamped += 1;
            }
            let ranges = out.arena.pack(mesh);
            out.clusters.push(Cluster {
                id: base + i as u32,
                lod,
                triangle_count: mesh.triangle_count() as u32,
                ranges,
                bounds: bounds[i],
                simplification_error: error,
                deviation,
                producer: level.producers[i],
                consumer: None,
                parents: Bounded::new(),
            });
        }
        if clamped > 0 {
            log::debug!("LOD {}: raised {} error value(s) to the previous LOD's maximum", lod, clamped);
        }
        for cluster in &out.clusters[base as usize..] {
            cluster.validate(&out.arena)?;
        }

        let mut producers: Vec<u32> = level.producers.iter().flatten().copied().collect();
        producers.sort_unstable();
        producers.dedup();
        for g in producers {
            let mut mip = std::mem::take(&mut out.groups[g as usize].mips[1]);
            mip.summarize(&out.clusters);
            out.groups[g as usize].mips[1] = mip;
        }

        if reference.is_none() {
            *reference = Some(Reference {
                centroids: bounds.iter().map(|b| b.centroid).collect(),
                positions: level.meshes.iter().map(|m| m.positions.clone()).collect(),
            });
        }
        Ok(())
    }

    /// Distance of every cluster to the nearest LOD 0 clusters' vertices
    fn deviations(
        &self,
        pool: &WorkerPool,
        level: &Level,
        bounds: &[ClusterBounds],
        reference: &Reference,
        lod: u32,
        base: u32,
    ) -> Result<Vec<Deviation>, BuildError> {
        let k = self.config.deviation_neighbors;
        let kernels = self.kernels.as_ref();
        pool.try_map_indices(level.meshes.len(), |i| {
            let mesh = &level.meshes[i];
            let targets: Vec<Vec3> = reference
                .nearest(bounds[i].centroid, k)
                .into_iter()
                .flat_map(|r| reference.positions[r].iter().copied())
                .collect();
            let hits = kernels.nearest_vertices(&mesh.positions, &targets);

            let mut deviation = Deviation::zero_at(bounds[i].centroid);
            let mut sum = 0.0f64;
            for (&p, hit) in mesh.positions.iter().zip(hits) {
                let hit = hit.ok_or(BuildError::LookupMiss {
                    lod,
                    site: Site::Cluster(base + i as u32),
                    position: p,
                })?;
                sum += hit.distance as f64;
                if hit.distance > deviation.max {
                    deviation.max = hit.distance;
                    deviation.witness = [p, targets[hit.index as usize]];
                }
            }
            if !mesh.positions.is_empty() {
                deviation.average = (sum / mesh.positions.len() as f64) as f32;
            }
            Ok(deviation)
        })
    }

    /// Group, simplify and re-split one LOD into the next
    #[allow(clippy::too_many_arguments)]
    fn reduce_level(
        &self,
        out: &mut VirtualMesh,
        level: &Level,
        ids: &[u32],
        lod: u32,
        pool: &WorkerPool,
        clusterer: &TriangleClusterer<'_>,
        grouper: &ClusterGrouper<'_>,
        simplifier: &GroupSimplifier<'_>,
    ) -> Result<Level, BuildError> {
        let members = grouper.group(&level.meshes, lod)?;
        let merged: Vec<(MeshStream, usize)> =
            pool.map_indices(members.len(), |g| grouper.merge_group(&level.meshes, &members[g]));
        let dropped: usize = merged.iter().map(|(_, d)| d).sum();
        if dropped > 0 {
            log::debug!("LOD {}: {} triangle(s) collapsed while welding groups", lod, dropped);
        }

        let masks = self.boundary_masks(pool, &merged);
        let results: Vec<SimplifyResult> =
            pool.map_indices(members.len(), |g| simplifier.simplify(&merged[g].0, &masks[g]));

        let group_base = out.groups.len() as u32;
        for (g, result) in results.iter().enumerate() {
            self.check_seams(&merged[g].0, &masks[g], result, lod, Site::Group(group_base + g as u32))?;
        }
        let pieces: Vec<Vec<MeshStream>> =
            pool.try_map_indices(members.len(), |g| clusterer.split(&results[g].mesh, lod + 1))?;

        let mut next = Level {
            meshes: Vec::new(),
            producers: Vec::new(),
            inherited: Vec::new(),
        };
        let mut next_id = out.clusters.len() as u32;
        for (g, (member, split)) in members.iter().zip(pieces).enumerate() {
            let gid = group_base + g as u32;
            let site = Site::Group(gid);
            let mut group = ClusterGroup {
                id: gid,
                lod,
                error: results[g].error,
                ..Default::default()
            };

            let mut child_error = 0.0f32;
            for &local in member {
                let id = ids[local as usize];
                group.mips[0]
                    .clusters
                    .push(id)
                    .map_err(|e| BuildError::capacity(lod, site, "MIP 0 cluster list", e))?;
                let cluster = &mut out.clusters[id as usize];
                cluster.consumer = Some(gid);
                child_error = child_error.max(cluster.simplification_error);
            }
            group.mips[0].summarize(&out.clusters);

            let outputs: Vec<u32> = (next_id..next_id + split.len() as u32).collect();
            next_id += split.len() as u32;
            for &p in &outputs {
                group.mips[1]
                    .clusters
                    .push(p)
                    .map_err(|e| BuildError::capacity(lod, site, "MIP 1 cluster list", e))?;
            }
            for &local in member {
                let id = ids[local as usize];
                for &p in &outputs {
                    out.clusters[id as usize]
                        .parents
                        .push(p)
                        .map_err(|e| BuildError::capacity(lod, Site::Cluster(id), "parent list", e))?;
                }
            }

            log::debug!(
                "LOD {}: group {} merged {} cluster(s), {} -> {} triangles (target {}), error {:.4e}, {} output cluster(s)",
                lod,
                gid,
                member.len(),
                results[g].input_triangles,
                results[g].mesh.triangle_count(),
                results[g].target,
                results[g].error,
                outputs.len()
            );

            let inherited = group.error + child_error;
            for mesh in split {
                next.meshes.push(mesh);
                next.producers.push(Some(gid));
                next.inherited.push(inherited);
            }
            out.groups.push(group);
        }
        Ok(next)
    }

    /// Per group, which merged vertices coincide with another group's
    fn boundary_masks(&self, pool: &WorkerPool, merged: &[(MeshStream, usize)]) -> Vec<Vec<bool>> {
        let eps = self.config.weld_epsilon;
        let kernels = self.kernels.as_ref();
        let boxes: Vec<Aabb> = merged.iter().map(|(m, _)| m.aabb().inflated(eps)).collect();
        pool.map_indices(merged.len(), |g| {
            let others: Vec<Vec3> = (0..merged.len())
                .filter(|&h| h != g && boxes[h].intersects(&boxes[g]))
                .flat_map(|h| merged[h].0.positions.iter().copied())
                .collect();
            if others.is_empty() {
                return vec![false; merged[g].0.positions.len()];
            }
            kernels.coincident_mask(&merged[g].0.positions, &others, eps)
        })
    }

    /// Locked vertices must survive simplification unmoved
    fn check_seams(
        &self,
        before: &MeshStream,
        mask: &[bool],
        result: &SimplifyResult,
        lod: u32,
        site: Site,
    ) -> Result<(), BuildError> {
        if result.boundary_after > result.boundary_before {
            return Err(BuildError::InvariantViolation {
                lod,
                site,
                detail: format!(
                    "boundary vertices grew from {} to {}",
                    result.boundary_before, result.boundary_after
                ),
            });
        }
        let mut referenced = vec![false; before.positions.len()];
        for &i in &before.position_indices {
            referenced[i as usize] = true;
        }
        let locked: Vec<Vec3> = before
            .positions
            .iter()
            .enumerate()
            .filter(|&(i, _)| referenced[i] && mask.get(i).copied().unwrap_or(false))
            .map(|(_, &p)| p)
            .collect();
        if locked.is_empty() {
            return Ok(());
        }
        let kept = self
            .kernels
            .coincident_mask(&locked, &result.mesh.positions, self.config.weld_epsilon);
        match kept.iter().position(|&k| !k) {
            Some(i) => Err(BuildError::LookupMiss {
                lod,
                site,
                position: locked[i],
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for HierarchyAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyAssembler")
            .field("config", &self.config)
            .field("partitioner", &self.partitioner.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ClusterDag;
    use crate::mesh::shapes::{subdivided_box, uv_sphere};
    use crate::partition::{Graph, PartitionError, PartitionOptions};

    fn build(mesh: &MeshStream) -> VirtualMesh {
        HierarchyAssembler::new(BuildConfig::default()).build(mesh).unwrap()
    }

    #[test]
    fn test_box_scenario() {
        let vm = build(&subdivided_box(Vec3::ONE, [8, 8, 4]));
        assert_eq!(vm.input_triangles, 512);
        assert_eq!(vm.clusters_at(0).count(), 4);
        assert!(vm.clusters_at(0).all(|c| c.triangle_count == 128));
        assert_eq!(vm.groups.iter().filter(|g| g.lod == 0).count(), 1);

        assert!(vm.lod_count >= 2);
        assert!(vm.triangles_at(1) <= 256);
        assert!(vm.clusters_at(1).all(|c| c.simplification_error > 0.0));

        let dag = ClusterDag::from_mesh(&vm);
        assert!(dag.validate().is_ok());
        assert_eq!(dag.group_links().len(), 1);
    }

    #[test]
    fn test_errors_never_decrease() {
        let vm = build(&uv_sphere(1.0, 16, 32));
        assert!(vm.lod_count >= 3);
        for lod in 1..vm.lod_count {
            let prev_error = vm.clusters_at(lod - 1).map(|c| c.simplification_error).fold(0.0, f32::max);
            let prev_dev = vm.clusters_at(lod - 1).map(|c| c.deviation.max).fold(0.0, f32::max);
            for c in vm.clusters_at(lod) {
                assert!(c.simplification_error >= prev_error);
                assert!(c.deviation.max >= prev_dev);
                let witness = c.deviation.witness[0].distance(c.deviation.witness[1]);
                assert!((witness - c.deviation.max).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_links_are_consistent() {
        let vm = build(&uv_sphere(1.0, 16, 32));
        for c in &vm.clusters {
            assert!(c.validate(&vm.arena).is_ok());
            if let Some(g) = c.consumer {
                let group = &vm.groups[g as usize];
                assert!(group.mips[0].clusters.contains(&c.id));
                assert_eq!(c.parents.as_slice(), group.mips[1].clusters.as_slice());
            } else {
                assert_eq!(c.lod + 1, vm.lod_count);
            }
        }
        for g in &vm.groups {
            assert!(g.mips[1].max_error >= g.mips[0].max_error);
        }
    }

    #[test]
    fn test_lod0_matches_input() {
        let mesh = uv_sphere(1.0, 8, 16);
        let vm = build(&mesh);
        let flat = vm.to_stream(0, 1e-4);
        assert_eq!(flat.triangle_count(), mesh.triangle_count());
        assert!((flat.surface_area() - mesh.surface_area()).abs() < 1e-3);
    }

    #[test]
    fn test_small_mesh_single_lod() {
        let vm = build(&subdivided_box(Vec3::ONE, [2, 2, 2]));
        assert_eq!(vm.lod_count, 1);
        assert_eq!(vm.clusters.len(), 1);
        assert!(vm.groups.is_empty());
        assert!(vm.roots().count() == 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BuildConfig {
            simplify_ratio: 1.5,
            ..Default::default()
        };
        let err = HierarchyAssembler::new(config).build(&subdivided_box(Vec3::ONE, [2, 2, 2]));
        assert!(matches!(err, Err(BuildError::Config(_))));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = HierarchyAssembler::new(BuildConfig::default()).build(&MeshStream::new());
        assert!(matches!(err, Err(BuildError::InvariantViolation { site: Site::Mesh, .. })));
    }

    struct Broken;

    impl Partitioner for Broken {
        fn partition_graph(
            &self,
            _graph: &Graph,
            _parts: usize,
            _options: &PartitionOptions,
        ) -> Result<Vec<u32>, PartitionError> {
            Err(PartitionError::Process("exit status 1".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_partitioner_failure_names_lod() {
        let err = HierarchyAssembler::new(BuildConfig::default())
            .with_partitioner(Box::new(Broken))
            .build(&subdivided_box(Vec3::ONE, [8, 8, 4]))
            .unwrap_err();
        assert_eq!(err.lod(), Some(0));
        assert!(matches!(err, BuildError::ClusteringFailure { .. }));
    }
}
