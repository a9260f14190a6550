//! Quadric-error group simplification
//!
//! Edge-collapse decimation of one welded cluster group:
//!
//! - Vertices flagged as boundary (shared with another group) never move.
//!   An edge with two boundary endpoints is never collapsed; an edge with one
//!   boundary endpoint collapses onto that endpoint, every other edge onto its
//!   midpoint.
//! - Each vertex carries a lazily computed plane quadric (sum over incident
//!   faces of the corner's two-edge plane) and a feature penalty (mean
//!   deviation between corner normals and face normals).
//! - Edge cost is the combined quadric at the merge point with the constant
//!   term raised by `len^2 * (1 + feature_weight * (fa + fb))`.
//! - Each pass sorts all valid edges by cost and performs up to
//!   `collapses_per_pass` collapses on disjoint neighbourhoods. Passes repeat
//!   until the triangle target is met or nothing can collapse.
//!
//! Author: Moroya Sakamoto

use super::kernels::{CollapseQuery, GeometryKernels};
use super::quadric::Quadric;
use crate::config::BuildConfig;
use crate::mesh::{Corner, EdgeKey, MeshStream};
use glam::{Vec2, Vec3};
use std::collections::{HashMap, HashSet};

/// Output of [`GroupSimplifier::simplify`]
#[derive(Debug, Clone)]
pub struct SimplifyResult {
    /// Simplified, compacted group mesh
    pub mesh: MeshStream,
    /// Sum of the costs of every performed collapse
    pub error: f32,
    /// Referenced boundary vertices before simplification
    pub boundary_before: usize,
    /// Referenced boundary vertices after simplification
    pub boundary_after: usize,
    /// Input triangle count
    pub input_triangles: usize,
    /// Triangle target `ceil(input * simplify_ratio)`
    pub target: usize,
    /// Number of collapses performed
    pub collapses: usize,
}

impl SimplifyResult {
    /// Whether the target was missed because no edge could collapse
    #[inline]
    pub fn shortfall(&self) -> bool {
        self.mesh.triangle_count() > self.target
    }
}

/// QEM decimator for cluster groups
pub struct GroupSimplifier<'a> {
    config: &'a BuildConfig,
    kernels: &'a dyn GeometryKernels,
}

impl<'a> GroupSimplifier<'a> {
    /// Simplifier evaluating costs through `kernels`
    pub fn new(config: &'a BuildConfig, kernels: &'a dyn GeometryKernels) -> Self {
        Self { config, kernels }
    }

    /// Triangle target for `triangles` input triangles
    #[inline]
    pub fn target_for(&self, triangles: usize) -> usize {
        ((triangles as f64) * self.config.simplify_ratio as f64).ceil() as usize
    }

    /// Simplify `mesh` (welded) with `boundary[v]` locking position `v`
    pub fn simplify(&self, mesh: &MeshStream, boundary: &[bool]) -> SimplifyResult {
        let input_triangles = mesh.triangle_count();
        let target = self.target_for(input_triangles);
        let mut state = Decimator::new(mesh, boundary);
        let boundary_before = state.referenced_boundary();

        let mut error = 0.0f64;
        let mut collapses = 0usize;
        while state.live > target {
            let edges = state.valid_edges();
            if edges.is_empty() {
                break;
            }
            let queries: Vec<CollapseQuery> = edges
                .iter()
                .map(|e| state.collapse_query(*e, self.config.feature_weight))
                .collect();
            let costs = self.kernels.collapse_costs(&queries);

            let mut order: Vec<usize> = (0..edges.len()).collect();
            order.sort_by(|&i, &j| costs[i].total_cmp(&costs[j]).then(edges[i].cmp(&edges[j])));

            let mut locked: HashSet<u32> = HashSet::new();
            let mut done = 0;
            for i in order {
                if done == self.config.collapses_per_pass || state.live <= target {
                    break;
                }
                let EdgeKey(a, b) = edges[i];
                if locked.contains(&a) || locked.contains(&b) {
                    continue;
                }
                let point = queries[i].point;
                if !state.can_collapse(a, b, point) {
                    continue;
                }
                let (n, ring) = state.collapse(a, b, point);
                locked.insert(a);
                locked.insert(b);
                locked.insert(n);
                locked.extend(ring);
                error += costs[i].max(0.0);
                done += 1;
            }
            collapses += done;
            if done == 0 {
                break;
            }
        }

        let boundary_after = state.referenced_boundary();
        let mesh = state.into_mesh();
        if mesh.triangle_count() > target {
            log::warn!(
                "group simplification stopped at {} triangles, target {} (from {})",
                mesh.triangle_count(),
                target,
                input_triangles
            );
        }
        SimplifyResult {
            mesh,
            error: error as f32,
            boundary_before,
            boundary_after,
            input_triangles,
            target,
            collapses,
        }
    }
}

/// Mutable decimation state
struct Decimator {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    tris: Vec<[Corner; 3]>,
    alive: Vec<bool>,
    live: usize,
    incident: Vec<Vec<u32>>,
    boundary: Vec<bool>,
    cache: Vec<Option<(Quadric, f32)>>,
}

impl Decimator {
    fn new(mesh: &MeshStream, boundary: &[bool]) -> Self {
        let tris: Vec<[Corner; 3]> = (0..mesh.triangle_count()).map(|t| mesh.corners(t)).collect();
        let mut incident = vec![Vec::new(); mesh.positions.len()];
        for (t, tri) in tris.iter().enumerate() {
            for c in tri {
                incident[c.position as usize].push(t as u32);
            }
        }
        let mut flags = vec![false; mesh.positions.len()];
        for (f, &b) in flags.iter_mut().zip(boundary) {
            *f = b;
        }
        Self {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            uvs: mesh.uvs.clone(),
            live: tris.len(),
            alive: vec![true; tris.len()],
            tris,
            cache: vec![None; mesh.positions.len()],
            incident,
            boundary: flags,
        }
    }

    fn position_of(&self, tri: &[Corner; 3]) -> [u32; 3] {
        [tri[0].position, tri[1].position, tri[2].position]
    }

    fn referenced_boundary(&self) -> usize {
        let mut seen = HashSet::new();
        for (t, tri) in self.tris.iter().enumerate() {
            if !self.alive[t] {
                continue;
            }
            for c in tri {
                if self.boundary[c.position as usize] {
                    seen.insert(c.position);
                }
            }
        }
        seen.len()
    }

    /// Edges of live triangles with at least one interior endpoint
    fn valid_edges(&self) -> Vec<EdgeKey> {
        let mut edges = Vec::with_capacity(self.live * 3 / 2);
        for (t, tri) in self.tris.iter().enumerate() {
            if !self.alive[t] {
                continue;
            }
            let [a, b, c] = self.position_of(tri);
            for e in [EdgeKey::new(a, b), EdgeKey::new(b, c), EdgeKey::new(c, a)] {
                if !(self.boundary[e.0 as usize] && self.boundary[e.1 as usize]) {
                    edges.push(e);
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Cached plane quadric and feature penalty of vertex `v`
    fn vertex_quadric(&mut self, v: u32) -> (Quadric, f32) {
        if let Some(cached) = self.cache[v as usize] {
            return cached;
        }
        let mut q = Quadric::zero();
        let mut penalty = 0.0f32;
        let mut corners = 0u32;
        for &t in &self.incident[v as usize] {
            let tri = &self.tris[t as usize];
            let Some(k) = tri.iter().position(|c| c.position == v) else {
                continue;
            };
            let p0 = self.positions[v as usize];
            let p1 = self.positions[tri[(k + 1) % 3].position as usize];
            let p2 = self.positions[tri[(k + 2) % 3].position as usize];
            q += Quadric::from_corner(p0, p1, p2);

            let face = (p1 - p0).cross(p2 - p0).normalize_or_zero();
            let corner_normal = self.normals[tri[k].normal as usize].normalize_or_zero();
            penalty += (1.0 - corner_normal.dot(face)) * 0.5;
            corners += 1;
        }
        let result = (q, if corners > 0 { penalty / corners as f32 } else { 0.0 });
        self.cache[v as usize] = Some(result);
        result
    }

    fn merge_point(&self, a: u32, b: u32) -> Vec3 {
        match (self.boundary[a as usize], self.boundary[b as usize]) {
            (true, false) => self.positions[a as usize],
            (false, true) => self.positions[b as usize],
            _ => (self.positions[a as usize] + self.positions[b as usize]) * 0.5,
        }
    }

    fn collapse_query(&mut self, e: EdgeKey, feature_weight: f32) -> CollapseQuery {
        let (qa, fa) = self.vertex_quadric(e.0);
        let (qb, fb) = self.vertex_quadric(e.1);
        let len2 = self.positions[e.0 as usize].distance_squared(self.positions[e.1 as usize]) as f64;
        let mut quadric = qa + qb;
        quadric.add_constant(len2 * (1.0 + feature_weight as f64 * (fa + fb) as f64));
        CollapseQuery {
            quadric,
            point: self.merge_point(e.0, e.1),
        }
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        let mut out = HashSet::new();
        for &t in &self.incident[v as usize] {
            for c in &self.tris[t as usize] {
                if c.position != v {
                    out.insert(c.position);
                }
            }
        }
        out
    }

    /// Link condition plus a normal-flip test on every surviving face
    fn can_collapse(&self, a: u32, b: u32, point: Vec3) -> bool {
        let shared = self.incident[a as usize]
            .iter()
            .filter(|&&t| self.position_of(&self.tris[t as usize]).contains(&b))
            .count();
        if shared == 0 {
            return false;
        }
        let common = self.neighbors(a).intersection(&self.neighbors(b)).count();
        if common != shared {
            return false;
        }

        for &v in &[a, b] {
            for &t in &self.incident[v as usize] {
                let [x, y, z] = self.position_of(&self.tris[t as usize]);
                if [x, y, z].contains(&a) && [x, y, z].contains(&b) {
                    continue;
                }
                let old = [x, y, z].map(|i| self.positions[i as usize]);
                let new = [x, y, z].map(|i| if i == a || i == b { point } else { self.positions[i as usize] });
                let n_old = (old[1] - old[0]).cross(old[2] - old[0]).normalize_or_zero();
                if n_old == Vec3::ZERO {
                    continue;
                }
                let n_new = (new[1] - new[0]).cross(new[2] - new[0]).normalize_or_zero();
                if n_new.dot(n_old) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    /// Contract edge `a-b` into a new vertex at `point`.
    ///
    /// Returns the new vertex and its one-ring.
    fn collapse(&mut self, a: u32, b: u32, point: Vec3) -> (u32, Vec<u32>) {
        let n = self.positions.len() as u32;
        self.positions.push(point);
        self.boundary.push(self.boundary[a as usize] || self.boundary[b as usize]);
        self.cache.push(None);
        self.incident.push(Vec::new());

        let (normal_map, uv_map) = self.attribute_maps(a, b);

        let mut touched: Vec<u32> = self.incident[a as usize]
            .iter()
            .chain(&self.incident[b as usize])
            .copied()
            .collect();
        touched.sort_unstable();
        touched.dedup();

        for t in touched {
            let positions = self.position_of(&self.tris[t as usize]);
            if positions.contains(&a) && positions.contains(&b) {
                self.alive[t as usize] = false;
                self.live -= 1;
                for &p in &positions {
                    if p != a && p != b {
                        self.incident[p as usize].retain(|&x| x != t);
                    }
                }
                continue;
            }
            for c in self.tris[t as usize].iter_mut() {
                if c.position == a || c.position == b {
                    c.position = n;
                    if let Some(&m) = normal_map.get(&c.normal) {
                        c.normal = m;
                    }
                    if let Some(&m) = uv_map.get(&c.uv) {
                        c.uv = m;
                    }
                }
            }
            self.incident[n as usize].push(t);
        }
        self.incident[a as usize].clear();
        self.incident[b as usize].clear();

        let ring: Vec<u32> = self.neighbors(n).into_iter().collect();
        for &v in &ring {
            self.cache[v as usize] = None;
        }
        (n, ring)
    }

    /// Normal and UV remaps for the corners at `a` and `b`, taken from the
    /// triangles sharing the edge. The locked endpoint's attributes win;
    /// otherwise both sides map to a new averaged attribute.
    fn attribute_maps(&mut self, a: u32, b: u32) -> (HashMap<u32, u32>, HashMap<u32, u32>) {
        let mut normal_map = HashMap::new();
        let mut uv_map = HashMap::new();
        let keep = match (self.boundary[a as usize], self.boundary[b as usize]) {
            (true, false) => Some(a),
            (false, true) => Some(b),
            _ => None,
        };
        let shared: Vec<u32> = self.incident[a as usize]
            .iter()
            .copied()
            .filter(|&t| self.position_of(&self.tris[t as usize]).contains(&b))
            .collect();

        for t in shared {
            let tri = self.tris[t as usize];
            let (Some(ca), Some(cb)) = (
                tri.iter().find(|c| c.position == a).copied(),
                tri.iter().find(|c| c.position == b).copied(),
            ) else {
                continue;
            };
            match keep {
                Some(k) => {
                    let (kept, gone) = if k == a { (ca, cb) } else { (cb, ca) };
                    if kept.normal != gone.normal {
                        normal_map.entry(gone.normal).or_insert(kept.normal);
                    }
                    if kept.uv != gone.uv {
                        uv_map.entry(gone.uv).or_insert(kept.uv);
                    }
                }
                None => {
                    if ca.normal != cb.normal && !normal_map.contains_key(&ca.normal) {
                        let avg = (self.normals[ca.normal as usize] + self.normals[cb.normal as usize]).normalize_or_zero();
                        let m = self.normals.len() as u32;
                        self.normals.push(avg);
                        normal_map.insert(ca.normal, m);
                        normal_map.entry(cb.normal).or_insert(m);
                    }
                    if ca.uv != cb.uv && !uv_map.contains_key(&ca.uv) {
                        let avg = (self.uvs[ca.uv as usize] + self.uvs[cb.uv as usize]) * 0.5;
                        let m = self.uvs.len() as u32;
                        self.uvs.push(avg);
                        uv_map.insert(ca.uv, m);
                        uv_map.entry(cb.uv).or_insert(m);
                    }
                }
            }
        }
        (normal_map, uv_map)
    }

    fn into_mesh(self) -> MeshStream {
        let mut mesh = MeshStream {
            positions: self.positions,
            normals: self.normals,
            uvs: self.uvs,
            ..Default::default()
        };
        for (t, tri) in self.tris.iter().enumerate() {
            if self.alive[t] {
                mesh.push_triangle(*tri);
            }
        }
        mesh.compact();
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::kernels::CpuKernels;
    use crate::mesh::shapes::{grid, subdivided_box};
    use crate::mesh::topology::boundary_vertices;

    fn simplifier(config: &BuildConfig) -> GroupSimplifier<'_> {
        GroupSimplifier::new(config, &CpuKernels)
    }

    #[test]
    fn test_box_halves_with_positive_error() {
        let config = BuildConfig::default();
        let (mesh, _) = subdivided_box(Vec3::ONE, [8, 8, 4]).welded(1e-4, 1e-2);
        let boundary = vec![false; mesh.positions.len()];
        let result = simplifier(&config).simplify(&mesh, &boundary);
        assert_eq!(result.target, 256);
        assert!(result.mesh.triangle_count() <= 256, "got {}", result.mesh.triangle_count());
        assert!(result.error > 0.0);
        assert!(!result.shortfall());
        assert!(result.mesh.validate().is_ok());
    }

    #[test]
    fn test_box_stays_closed() {
        let config = BuildConfig::default();
        let (mesh, _) = subdivided_box(Vec3::ONE, [4, 4, 4]).welded(1e-4, 1e-2);
        let result = simplifier(&config).simplify(&mesh, &vec![false; mesh.positions.len()]);
        let open = boundary_vertices(&result.mesh.position_indices, result.mesh.positions.len());
        assert!(open.iter().all(|&b| !b), "collapses must keep the surface closed");
    }

    #[test]
    fn test_boundary_vertices_never_move() {
        let config = BuildConfig::default();
        let mesh = grid(2.0, 8);
        // lock the rim
        let boundary = boundary_vertices(&mesh.position_indices, mesh.positions.len());
        let rim: Vec<Vec3> = mesh
            .positions
            .iter()
            .zip(&boundary)
            .filter(|&(_, &b)| b)
            .map(|(&p, _)| p)
            .collect();
        let result = simplifier(&config).simplify(&mesh, &boundary);
        assert!(result.boundary_after <= result.boundary_before);
        assert_eq!(result.boundary_after, rim.len());
        for p in rim {
            assert!(
                result.mesh.positions.iter().any(|&q| q == p),
                "rim vertex {:?} moved",
                p
            );
        }
        assert!(result.mesh.triangle_count() < mesh.triangle_count());
    }

    #[test]
    fn test_fully_locked_mesh_reports_shortfall() {
        let config = BuildConfig::default();
        let mesh = grid(1.0, 1);
        let result = simplifier(&config).simplify(&mesh, &vec![true; mesh.positions.len()]);
        assert_eq!(result.mesh.triangle_count(), 2);
        assert_eq!(result.target, 1);
        assert!(result.shortfall());
        assert_eq!(result.error, 0.0);
    }

    #[test]
    fn test_passes_limit_collapses() {
        let config = BuildConfig {
            collapses_per_pass: 1,
            ..Default::default()
        };
        let mesh = grid(1.0, 4);
        let boundary = boundary_vertices(&mesh.position_indices, mesh.positions.len());
        let result = simplifier(&config).simplify(&mesh, &boundary);
        assert!(result.collapses >= 1);
        assert!(result.mesh.validate().is_ok());
    }
}
