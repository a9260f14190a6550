//! Cluster balancing
//!
//! A [`TrianglePartition`] assigns every triangle of a welded mesh to a
//! cluster id. The balancer repairs and bounds that assignment:
//!
//! 1. split clusters made of several disconnected pieces,
//! 2. shed triangles of clusters above the hard ceiling to neighbours,
//! 3. re-split clusters above the budget by greedy breadth-first growth,
//! 4. merge clusters at or below the floor into a neighbour with room.
//!
//! Every step only relabels triangles, so the union of all clusters is
//! always the input triangle set.
//!
//! Author: Moroya Sakamoto

use crate::config::BuildConfig;
use crate::error::{BuildError, Site};
use crate::mesh::{connected_components, triangle_adjacency, MeshStream};
use std::collections::VecDeque;

/// Triangle-to-cluster assignment over a welded mesh
#[derive(Debug, Clone)]
pub struct TrianglePartition<'a> {
    mesh: &'a MeshStream,
    adjacency: Vec<Vec<u32>>,
    assignment: Vec<u32>,
    cluster_count: usize,
}

/// Outcome counters of one [`TrianglePartition::balance`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceReport {
    /// Clusters created by splitting disconnected clusters
    pub components_split: usize,
    /// Triangles moved out of clusters above the ceiling
    pub triangles_moved: usize,
    /// Clusters created by the greedy re-split
    pub oversized_split: usize,
    /// Small clusters merged into a neighbour
    pub merged: usize,
    /// Small clusters left undersized for lack of a destination
    pub undersized: usize,
}

impl<'a> TrianglePartition<'a> {
    /// Wrap an assignment (one id per triangle of `mesh`)
    pub fn new(mesh: &'a MeshStream, assignment: Vec<u32>) -> Self {
        debug_assert_eq!(assignment.len(), mesh.triangle_count());
        let adjacency = triangle_adjacency(&mesh.position_indices);
        let cluster_count = assignment.iter().map(|&c| c as usize + 1).max().unwrap_or(0);
        let mut partition = Self {
            mesh,
            adjacency,
            assignment,
            cluster_count,
        };
        partition.renumber();
        partition
    }

    /// Every triangle in one cluster
    pub fn single(mesh: &'a MeshStream) -> Self {
        Self::new(mesh, vec![0; mesh.triangle_count()])
    }

    /// Number of clusters
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Cluster id of every triangle
    #[inline]
    pub fn assignment(&self) -> &[u32] {
        &self.assignment
    }

    /// Triangle lists per cluster, ascending
    pub fn clusters(&self) -> Vec<Vec<u32>> {
        let mut clusters = vec![Vec::new(); self.cluster_count];
        for (t, &c) in self.assignment.iter().enumerate() {
            clusters[c as usize].push(t as u32);
        }
        clusters
    }

    fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.cluster_count];
        for &c in &self.assignment {
            sizes[c as usize] += 1;
        }
        sizes
    }

    /// Compact ids to `0..n` in order of first appearance, dropping empty ids
    fn renumber(&mut self) {
        const UNSET: u32 = u32::MAX;
        let mut remap = vec![UNSET; self.cluster_count];
        let mut next = 0u32;
        for c in &mut self.assignment {
            if remap[*c as usize] == UNSET {
                remap[*c as usize] = next;
                next += 1;
            }
            *c = remap[*c as usize];
        }
        self.cluster_count = next as usize;
    }

    /// Give every disconnected piece of a cluster its own id.
    ///
    /// Returns the number of clusters added.
    pub fn split_components(&mut self) -> usize {
        let before = self.cluster_count;
        for tris in self.clusters() {
            let pieces = self.components_of(&tris);
            for piece in pieces.iter().skip(1) {
                let id = self.cluster_count as u32;
                for &t in piece {
                    self.assignment[t as usize] = id;
                }
                self.cluster_count += 1;
            }
        }
        self.cluster_count - before
    }

    /// Connected pieces of a triangle set (adjacency restricted to the set)
    fn components_of(&self, tris: &[u32]) -> Vec<Vec<u32>> {
        let mut local = std::collections::HashMap::with_capacity(tris.len());
        for (i, &t) in tris.iter().enumerate() {
            local.insert(t, i as u32);
        }
        let restricted: Vec<Vec<u32>> = tris
            .iter()
            .map(|&t| {
                self.adjacency[t as usize]
                    .iter()
                    .filter_map(|n| local.get(n).copied())
                    .collect()
            })
            .collect();
        connected_components(&restricted)
            .into_iter()
            .map(|c| c.into_iter().map(|i| tris[i as usize]).collect())
            .collect()
    }

    /// Move triangles out of clusters above `ceiling`, one at a time, into an
    /// edge-adjacent cluster holding fewer than `budget` triangles.
    ///
    /// Returns the number of moved triangles.
    pub fn move_excess(&mut self, ceiling: usize, budget: usize) -> usize {
        let mut sizes = self.sizes();
        let mut moved = 0;
        for c in 0..self.cluster_count {
            if sizes[c] <= ceiling {
                continue;
            }
            // each sweep moves at least one triangle or stops
            loop {
                let mut progress = false;
                for t in 0..self.assignment.len() {
                    if sizes[c] <= ceiling {
                        break;
                    }
                    if self.assignment[t] as usize != c {
                        continue;
                    }
                    let dest = self.adjacency[t]
                        .iter()
                        .map(|&n| self.assignment[n as usize] as usize)
                        .filter(|&d| d != c && sizes[d] < budget)
                        .min_by_key(|&d| (sizes[d], d));
                    if let Some(d) = dest {
                        self.assignment[t] = d as u32;
                        sizes[c] -= 1;
                        sizes[d] += 1;
                        moved += 1;
                        progress = true;
                    }
                }
                if !progress || sizes[c] <= ceiling {
                    break;
                }
            }
        }
        moved
    }

    /// Re-split every cluster above `budget` into `ceil(total / budget)`
    /// pieces grown breadth-first, each capped at
    /// `ceil(total / ceil(total / budget))` triangles.
    ///
    /// Returns the number of clusters added.
    pub fn split_oversized(&mut self, budget: usize) -> usize {
        let before = self.cluster_count;
        for tris in self.clusters() {
            let total = tris.len();
            if total <= budget {
                continue;
            }
            let pieces = total.div_ceil(budget);
            let cap = total.div_ceil(pieces);
            let grown = self.grow_pieces(&tris, cap);
            for piece in grown.iter().skip(1) {
                let id = self.cluster_count as u32;
                for &t in piece {
                    self.assignment[t as usize] = id;
                }
                self.cluster_count += 1;
            }
        }
        self.cluster_count - before
    }

    /// Cover `tris` with pieces of at most `cap` triangles by breadth-first
    /// growth from the lowest unvisited triangle
    fn grow_pieces(&self, tris: &[u32], cap: usize) -> Vec<Vec<u32>> {
        let owner = self.assignment[tris[0] as usize];
        let mut visited: std::collections::HashSet<u32> = std::collections::HashSet::with_capacity(tris.len());
        let mut pieces = Vec::new();
        let mut queue = VecDeque::new();
        for &seed in tris {
            if visited.contains(&seed) {
                continue;
            }
            let mut piece = Vec::with_capacity(cap);
            visited.insert(seed);
            queue.clear();
            queue.push_back(seed);
            while let Some(t) = queue.pop_front() {
                if piece.len() == cap {
                    // no room: hand back to the next piece
                    visited.remove(&t);
                    continue;
                }
                piece.push(t);
                for &n in &self.adjacency[t as usize] {
                    if self.assignment[n as usize] == owner && !visited.contains(&n) {
                        visited.insert(n);
                        queue.push_back(n);
                    }
                }
            }
            pieces.push(piece);
        }
        pieces
    }

    /// Merge clusters of at most `floor` triangles into the neighbour that
    /// shares the most edges with them and still has room under `budget`.
    ///
    /// Every merge removes one cluster, so sweeps stop after at most
    /// `cluster_count` merges. Returns `(merged, left_undersized)`.
    pub fn merge_small(&mut self, floor: usize, budget: usize) -> (usize, usize) {
        let mut merged = 0;
        loop {
            let mut sizes = self.sizes();
            let clusters = self.clusters();
            let mut changed = false;
            // clusters that grew this sweep wait for the next one
            let mut absorbed = vec![false; clusters.len()];
            for (c, tris) in clusters.iter().enumerate() {
                if tris.is_empty() || absorbed[c] || sizes[c] == 0 || sizes[c] > floor {
                    continue;
                }
                let mut shared: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
                for &t in tris {
                    for &n in &self.adjacency[t as usize] {
                        let d = self.assignment[n as usize] as usize;
                        if d != c {
                            *shared.entry(d).or_insert(0) += 1;
                        }
                    }
                }
                let dest = shared
                    .iter()
                    .filter(|(&d, _)| sizes[d] > 0 && sizes[d] + sizes[c] <= budget)
                    .max_by_key(|(&d, &count)| (count, std::cmp::Reverse(d)))
                    .map(|(&d, _)| d);
                if let Some(d) = dest {
                    for &t in tris {
                        self.assignment[t as usize] = d as u32;
                    }
                    sizes[d] += sizes[c];
                    sizes[c] = 0;
                    absorbed[d] = true;
                    merged += 1;
                    changed = true;
                }
            }
            self.renumber();
            if !changed {
                break;
            }
        }
        let undersized = self.sizes().iter().filter(|&&s| s <= floor).count();
        (merged, undersized)
    }

    /// Run the full repair/bound sequence and check the budget.
    pub fn balance(&mut self, config: &BuildConfig, lod: u32) -> Result<BalanceReport, BuildError> {
        let budget = config.max_triangles_per_cluster;
        let mut report = BalanceReport {
            components_split: self.split_components(),
            ..Default::default()
        };
        report.triangles_moved = self.move_excess(config.split_ceiling, budget);
        if report.triangles_moved > 0 {
            report.components_split += self.split_components();
        }
        report.oversized_split = self.split_oversized(budget);
        let (merged, undersized) = self.merge_small(config.merge_floor, budget);
        report.merged = merged;
        report.undersized = undersized;
        self.renumber();

        if undersized > 0 && self.cluster_count > 1 {
            log::warn!(
                "LOD {}: {} cluster(s) at or below {} triangles have no neighbour with room",
                lod,
                undersized,
                config.merge_floor
            );
        }
        for (c, size) in self.sizes().into_iter().enumerate() {
            if size > budget {
                return Err(BuildError::InvariantViolation {
                    lod,
                    site: Site::Cluster(c as u32),
                    detail: format!("{} triangles after rebalancing, budget {}", size, budget),
                });
            }
        }
        log::debug!("LOD {}: balanced into {} clusters ({:?})", lod, self.cluster_count, report);
        Ok(report)
    }

    /// Extract every cluster as a self-contained stream.
    ///
    /// Triangles repeating a vertex after extraction are removed and empty
    /// clusters are dropped.
    pub fn materialize(&self, epsilon: f32, attribute_epsilon: f32) -> Vec<MeshStream> {
        self.clusters()
            .iter()
            .filter_map(|tris| {
                let mut cluster = self.mesh.extract(tris, epsilon, attribute_epsilon);
                let removed = cluster.remove_degenerate_triangles();
                if removed > 0 {
                    log::debug!("dropped {} degenerate triangle(s) during extraction", removed);
                    cluster.compact();
                }
                (!cluster.is_empty()).then_some(cluster)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::shapes::grid;

    fn config() -> BuildConfig {
        BuildConfig::default()
    }

    #[test]
    fn test_split_components() {
        let mesh = grid(1.0, 4); // 32 triangles, rows of 8
        // rows 0 and 3 share an id but are not connected
        let assignment: Vec<u32> = (0..32).map(|t| if t / 8 == 0 || t / 8 == 3 { 0 } else { 1 }).collect();
        let mut part = TrianglePartition::new(&mesh, assignment);
        assert_eq!(part.split_components(), 1);
        assert_eq!(part.cluster_count(), 3);
    }

    #[test]
    fn test_split_oversized_caps_pieces() {
        let mesh = grid(1.0, 12); // 288 triangles
        let mut part = TrianglePartition::single(&mesh);
        part.split_oversized(128);
        let clusters = part.clusters();
        assert!(clusters.iter().all(|c| c.len() <= 96), "cap is ceil(288/3)");
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), 288);
    }

    #[test]
    fn test_move_excess_respects_budget() {
        let mesh = grid(1.0, 8); // 128 triangles
        // cluster 0 holds 120, cluster 1 holds 8
        let assignment: Vec<u32> = (0..128).map(|t| if t < 120 { 0 } else { 1 }).collect();
        let mut part = TrianglePartition::new(&mesh, assignment);
        let moved = part.move_excess(100, 64);
        let sizes = part.sizes();
        assert_eq!(moved, 20);
        assert_eq!(sizes, vec![100, 28]);
    }

    #[test]
    fn test_merge_small_into_neighbour() {
        let mesh = grid(1.0, 4);
        let assignment: Vec<u32> = (0..32).map(|t| if t < 4 { 1 } else { 0 }).collect();
        let mut part = TrianglePartition::new(&mesh, assignment);
        let (merged, undersized) = part.merge_small(12, 128);
        assert_eq!((merged, undersized), (1, 0));
        assert_eq!(part.cluster_count(), 1);
    }

    #[test]
    fn test_merge_small_without_room_is_left() {
        let mesh = grid(1.0, 4);
        let assignment: Vec<u32> = (0..32).map(|t| if t < 4 { 1 } else { 0 }).collect();
        let mut part = TrianglePartition::new(&mesh, assignment);
        let (merged, undersized) = part.merge_small(12, 30);
        assert_eq!(merged, 0);
        assert_eq!(undersized, 1);
        assert_eq!(part.cluster_count(), 2);
    }

    #[test]
    fn test_balance_full_grid() {
        let mesh = grid(1.0, 16); // 512 triangles
        let mut part = TrianglePartition::single(&mesh);
        part.balance(&config(), 0).unwrap();
        let clusters = part.clusters();
        assert!(clusters.iter().all(|c| c.len() <= 128));
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), 512);

        let streams = part.materialize(1e-4, 1e-2);
        assert_eq!(streams.iter().map(MeshStream::triangle_count).sum::<usize>(), 512);
        assert!(streams.iter().all(|s| s.validate().is_ok()));
    }
}
