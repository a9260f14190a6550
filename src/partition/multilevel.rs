//! In-process multilevel recursive bisection
//!
//! Each bisection coarsens the graph by heavy-edge matching until it is
//! small, splits the coarsest graph by greedy region growing from a
//! pseudo-peripheral vertex, then projects the split back level by level,
//! restoring balance and applying positive-gain boundary moves and swaps at
//! every level. k-way partitions come from recursive bisection with the
//! part count split as evenly as possible. Fully deterministic.
//!
//! Author: Moroya Sakamoto

use super::{Graph, PartitionError, PartitionOptions, Partitioner};
use std::collections::BTreeMap;

/// Recursive-bisection partitioner
#[derive(Debug, Clone, Copy)]
pub struct MultilevelPartitioner {
    /// Stop coarsening at or below this many vertices
    pub coarsen_to: usize,
    /// Refinement passes per level
    pub refine_passes: usize,
}

impl Default for MultilevelPartitioner {
    fn default() -> Self {
        Self {
            coarsen_to: 64,
            refine_passes: 8,
        }
    }
}

impl Partitioner for MultilevelPartitioner {
    fn partition_graph(
        &self,
        graph: &Graph,
        parts: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<u32>, PartitionError> {
        graph.validate()?;
        if parts == 0 {
            return Err(PartitionError::InvalidGraph("zero parts requested".to_string()));
        }
        let n = graph.vertex_count();
        let parts = parts.min(n.max(1));
        let mut assignment = vec![0u32; n];
        if parts > 1 {
            let all: Vec<u32> = (0..n as u32).collect();
            self.recurse(graph, &all, parts, 0, options, &mut assignment);
        }
        Ok(assignment)
    }

    fn name(&self) -> &'static str {
        "multilevel"
    }
}

impl MultilevelPartitioner {
    fn recurse(
        &self,
        graph: &Graph,
        vertices: &[u32],
        parts: usize,
        first_part: u32,
        options: &PartitionOptions,
        out: &mut [u32],
    ) {
        if vertices.is_empty() {
            return;
        }
        if parts <= 1 || vertices.len() == 1 {
            for &v in vertices {
                out[v as usize] = first_part;
            }
            return;
        }
        let sub = graph.subgraph(vertices);
        let left_parts = parts / 2;
        let total = sub.total_vertex_weight();
        let target = (total * left_parts as u64 + parts as u64 / 2) / parts as u64;
        let tolerance = target * options.imbalance as u64 / 1000;

        let side = self.bisect(&sub, target, tolerance, options.contiguous);
        let (mut left, mut right) = (Vec::new(), Vec::new());
        for (i, &v) in vertices.iter().enumerate() {
            if side[i] {
                right.push(v);
            } else {
                left.push(v);
            }
        }
        self.recurse(graph, &left, left_parts, first_part, options, out);
        self.recurse(
            graph,
            &right,
            parts - left_parts,
            first_part + left_parts as u32,
            options,
            out,
        );
    }

    /// Split into left (`false`) of weight `target` and right (`true`)
    fn bisect(&self, graph: &Graph, target: u64, tolerance: u64, contiguous: bool) -> Vec<bool> {
        let n = graph.vertex_count();
        let mut side = if n <= self.coarsen_to {
            grow_region(graph, target)
        } else {
            let (coarse, cmap) = coarsen(graph, self.coarsen_to);
            if coarse.vertex_count() * 10 > n * 9 {
                // matching stalled; split this level directly
                grow_region(graph, target)
            } else {
                let coarse_side = self.bisect(&coarse, target, tolerance, false);
                cmap.iter().map(|&c| coarse_side[c as usize]).collect()
            }
        };
        balance(graph, &mut side, target, tolerance);
        refine(graph, &mut side, target, tolerance, self.refine_passes);
        if contiguous {
            make_contiguous(graph, &mut side, target, tolerance);
        }
        side
    }
}

/// Heavy-edge matching and contraction.
///
/// Returns the coarse graph and the fine-to-coarse vertex map.
fn coarsen(graph: &Graph, coarsen_to: usize) -> (Graph, Vec<u32>) {
    const UNMATCHED: u32 = u32::MAX;
    let n = graph.vertex_count();
    let max_weight = ((graph.total_vertex_weight() * 3) / (2 * coarsen_to.max(1) as u64)).max(1);

    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by_key(|&v| (graph.degree(v as usize), v));

    let mut mate = vec![UNMATCHED; n];
    for &v in &order {
        let v = v as usize;
        if mate[v] != UNMATCHED {
            continue;
        }
        let mut best: Option<(u32, u32)> = None;
        for (u, w) in graph.neighbors(v) {
            if mate[u as usize] != UNMATCHED {
                continue;
            }
            if (graph.vwgt[v] + graph.vwgt[u as usize]) as u64 > max_weight {
                continue;
            }
            if best.map_or(true, |(_, bw)| w > bw) {
                best = Some((u, w));
            }
        }
        match best {
            Some((u, _)) => {
                mate[v] = u;
                mate[u as usize] = v as u32;
            }
            None => mate[v] = v as u32,
        }
    }

    let mut cmap = vec![UNMATCHED; n];
    let mut coarse_n = 0u32;
    for v in 0..n {
        if cmap[v] == UNMATCHED {
            cmap[v] = coarse_n;
            cmap[mate[v] as usize] = coarse_n;
            coarse_n += 1;
        }
    }

    let mut lists: Vec<BTreeMap<u32, u32>> = vec![BTreeMap::new(); coarse_n as usize];
    let mut vwgt = vec![0u32; coarse_n as usize];
    for v in 0..n {
        let cv = cmap[v];
        vwgt[cv as usize] += graph.vwgt[v];
        for (u, w) in graph.neighbors(v) {
            let cu = cmap[u as usize];
            if cu != cv {
                *lists[cv as usize].entry(cu).or_insert(0) += w;
            }
        }
    }

    let mut coarse = Graph::default();
    coarse.xadj.push(0);
    for list in &lists {
        for (&u, &w) in list {
            coarse.adjncy.push(u);
            coarse.adjwgt.push(w);
        }
        coarse.xadj.push(coarse.adjncy.len() as u32);
    }
    coarse.vwgt = vwgt;
    (coarse, cmap)
}

/// Vertex at the far end of two breadth-first sweeps
fn pseudo_peripheral(graph: &Graph, start: usize, in_play: &[bool]) -> usize {
    let mut far = start;
    for _ in 0..2 {
        let mut dist = vec![usize::MAX; graph.vertex_count()];
        let mut queue = std::collections::VecDeque::new();
        dist[far] = 0;
        queue.push_back(far);
        let mut last = far;
        while let Some(v) = queue.pop_front() {
            last = v;
            for (u, _) in graph.neighbors(v) {
                let u = u as usize;
                if in_play[u] && dist[u] == usize::MAX {
                    dist[u] = dist[v] + 1;
                    queue.push_back(u);
                }
            }
        }
        far = last;
    }
    far
}

/// Greedy graph growing: the left region starts at a pseudo-peripheral
/// vertex and absorbs the frontier vertex most strongly connected to it
/// until it reaches `target` weight.
fn grow_region(graph: &Graph, target: u64) -> Vec<bool> {
    let n = graph.vertex_count();
    let mut side = vec![true; n];
    let mut unreached = vec![true; n];
    // connection weight from each vertex to the region
    let mut pull = vec![0u64; n];
    let mut frontier: Vec<usize> = Vec::new();
    let mut weight = 0u64;

    while weight < target {
        let next = if let Some((pos, _)) = frontier
            .iter()
            .enumerate()
            .filter(|&(_, &v)| weight + graph.vwgt[v] as u64 <= target)
            .max_by_key(|&(_, &v)| (pull[v], std::cmp::Reverse(v)))
        {
            frontier.swap_remove(pos)
        } else {
            // frontier exhausted or nothing fits: seed a new piece
            let Some(seed) = (0..n).find(|&v| unreached[v] && weight + graph.vwgt[v] as u64 <= target) else {
                break;
            };
            let seed = pseudo_peripheral(graph, seed, &unreached);
            if !unreached[seed] || weight + graph.vwgt[seed] as u64 > target {
                match (0..n).find(|&v| unreached[v] && weight + graph.vwgt[v] as u64 <= target) {
                    Some(v) => v,
                    None => break,
                }
            } else {
                seed
            }
        };
        if !unreached[next] {
            continue;
        }
        unreached[next] = false;
        side[next] = false;
        weight += graph.vwgt[next] as u64;
        frontier.retain(|&v| v != next);
        for (u, w) in graph.neighbors(next) {
            let u = u as usize;
            if unreached[u] {
                if pull[u] == 0 {
                    frontier.push(u);
                }
                pull[u] += w as u64;
            }
        }
    }
    side
}

/// Gain of moving `v` to the other side: external minus internal weight
fn gain(graph: &Graph, side: &[bool], v: usize) -> i64 {
    let mut g = 0i64;
    for (u, w) in graph.neighbors(v) {
        if side[u as usize] == side[v] {
            g -= w as i64;
        } else {
            g += w as i64;
        }
    }
    g
}

fn left_weight(graph: &Graph, side: &[bool]) -> u64 {
    side.iter()
        .zip(&graph.vwgt)
        .filter(|(s, _)| !**s)
        .map(|(_, &w)| w as u64)
        .sum()
}

/// Move vertices off the heavy side until the left weight is within
/// `tolerance` of `target`. Every move shrinks the imbalance or ends the loop.
fn balance(graph: &Graph, side: &mut [bool], target: u64, tolerance: u64) {
    let mut left = left_weight(graph, side) as i64;
    let target = target as i64;
    let tolerance = tolerance as i64;
    loop {
        let diff = left - target;
        if diff.abs() <= tolerance {
            break;
        }
        // heavy side: left when diff > 0
        let from_right = diff < 0;
        let limit = diff.abs() + tolerance;
        let best = (0..graph.vertex_count())
            .filter(|&v| side[v] == from_right && (graph.vwgt[v] as i64) <= limit)
            .max_by_key(|&v| (gain(graph, side, v), std::cmp::Reverse(v)));
        let Some(v) = best else { break };
        side[v] = !side[v];
        let w = graph.vwgt[v] as i64;
        left += if from_right { w } else { -w };
    }
}

/// Components of the subgraph induced by the vertices on `which` side
fn side_components(graph: &Graph, side: &[bool], which: bool) -> Vec<Vec<usize>> {
    let n = graph.vertex_count();
    let mut seen = vec![false; n];
    let mut components = Vec::new();
    for seed in 0..n {
        if side[seed] != which || seen[seed] {
            continue;
        }
        seen[seed] = true;
        let mut stack = vec![seed];
        let mut component = Vec::new();
        while let Some(v) = stack.pop() {
            component.push(v);
            for (u, _) in graph.neighbors(v) {
                let u = u as usize;
                if side[u] == which && !seen[u] {
                    seen[u] = true;
                    stack.push(u);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Whether the side of `v` stays connected without `v`
fn stays_connected(graph: &Graph, side: &[bool], v: usize) -> bool {
    let which = side[v];
    let remaining = side.iter().filter(|&&s| s == which).count() - 1;
    let Some(start) = graph
        .neighbors(v)
        .map(|(u, _)| u as usize)
        .find(|&u| side[u] == which)
    else {
        return false;
    };
    let mut seen = vec![false; graph.vertex_count()];
    seen[v] = true;
    seen[start] = true;
    let mut stack = vec![start];
    let mut reached = 0;
    while let Some(x) = stack.pop() {
        reached += 1;
        for (u, _) in graph.neighbors(x) {
            let u = u as usize;
            if side[u] == which && !seen[u] {
                seen[u] = true;
                stack.push(u);
            }
        }
    }
    reached == remaining
}

/// Hand stray pieces of each side to the other side, then restore balance
/// with boundary moves that keep the donor side connected. Skipped for
/// disconnected graphs, where connected parts may not exist.
fn make_contiguous(graph: &Graph, side: &mut [bool], target: u64, tolerance: u64) {
    let n = graph.vertex_count();
    let everything = vec![false; n];
    if side_components(graph, &everything, false).len() > 1 {
        return;
    }
    for which in [false, true] {
        let components = side_components(graph, side, which);
        if components.len() <= 1 {
            continue;
        }
        let weight = |c: &Vec<usize>| c.iter().map(|&v| graph.vwgt[v] as u64).sum::<u64>();
        let keep = (0..components.len())
            .max_by_key(|&i| (weight(&components[i]), std::cmp::Reverse(i)))
            .unwrap_or(0);
        for (i, component) in components.iter().enumerate() {
            if i != keep {
                for &v in component {
                    side[v] = !which;
                }
            }
        }
    }

    let mut left = left_weight(graph, side) as i64;
    let (target, tolerance) = (target as i64, tolerance as i64);
    loop {
        let diff = left - target;
        if diff.abs() <= tolerance {
            break;
        }
        let from_right = diff < 0;
        let limit = diff.abs() + tolerance;
        let mut candidates: Vec<usize> = (0..n)
            .filter(|&v| {
                side[v] == from_right
                    && (graph.vwgt[v] as i64) <= limit
                    && graph.neighbors(v).any(|(u, _)| side[u as usize] != from_right)
            })
            .collect();
        candidates.sort_by_key(|&v| (std::cmp::Reverse(gain(graph, side, v)), v));
        let Some(v) = candidates.into_iter().find(|&v| stays_connected(graph, side, v)) else {
            break;
        };
        side[v] = !side[v];
        let w = graph.vwgt[v] as i64;
        left += if from_right { w } else { -w };
    }
}

/// Positive-gain boundary refinement that keeps the balance window.
fn refine(graph: &Graph, side: &mut [bool], target: u64, tolerance: u64, passes: usize) {
    let n = graph.vertex_count();
    let target = target as i64;
    let tolerance = tolerance as i64;
    let mut left = left_weight(graph, side) as i64;
    let mut gains: Vec<i64> = (0..n).map(|v| gain(graph, side, v)).collect();

    let apply = |side: &mut [bool], gains: &mut [i64], v: usize| {
        side[v] = !side[v];
        gains[v] = -gains[v];
        for (u, w) in graph.neighbors(v) {
            let u = u as usize;
            // v now on the same side as u: u loses external weight
            if side[u] == side[v] {
                gains[u] -= 2 * w as i64;
            } else {
                gains[u] += 2 * w as i64;
            }
        }
    };

    for _ in 0..passes {
        let mut improved = false;
        let mut locked = vec![false; n];

        let mut candidates: Vec<usize> = (0..n).filter(|&v| gains[v] > 0).collect();
        candidates.sort_by_key(|&v| (std::cmp::Reverse(gains[v]), v));
        for v in candidates {
            if locked[v] || gains[v] <= 0 {
                continue;
            }
            let w = graph.vwgt[v] as i64;
            let new_left = if side[v] { left + w } else { left - w };
            if (new_left - target).abs() > tolerance.max((left - target).abs()) {
                continue;
            }
            apply(side, &mut gains, v);
            left = new_left;
            locked[v] = true;
            improved = true;
        }

        // equal-weight swaps keep the balance exactly
        let mut lefts: Vec<usize> = (0..n).filter(|&v| !side[v] && !locked[v]).collect();
        let mut rights: Vec<usize> = (0..n).filter(|&v| side[v] && !locked[v]).collect();
        lefts.sort_by_key(|&v| (std::cmp::Reverse(gains[v]), v));
        rights.sort_by_key(|&v| (std::cmp::Reverse(gains[v]), v));
        let (mut i, mut j) = (0, 0);
        while i < lefts.len() && j < rights.len() {
            let (a, b) = (lefts[i], rights[j]);
            if locked[a] {
                i += 1;
                continue;
            }
            if locked[b] {
                j += 1;
                continue;
            }
            if gains[a] + gains[b] <= 0 {
                break;
            }
            if graph.vwgt[a] != graph.vwgt[b] {
                if gains[a] >= gains[b] {
                    j += 1;
                } else {
                    i += 1;
                }
                continue;
            }
            let shared = graph.edge_weight(a, b as u32).unwrap_or(0) as i64;
            if gains[a] + gains[b] - 2 * shared > 0 {
                apply(side, &mut gains, a);
                apply(side, &mut gains, b);
                locked[a] = true;
                locked[b] = true;
                improved = true;
            }
            i += 1;
            j += 1;
        }

        if !improved {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_graph(w: u32, h: u32) -> Graph {
        let mut edges = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = y * w + x;
                if x + 1 < w {
                    edges.push((v, v + 1, 1));
                }
                if y + 1 < h {
                    edges.push((v, v + w, 1));
                }
            }
        }
        Graph::from_edges((w * h) as usize, &edges).unwrap()
    }

    fn part_sizes(assignment: &[u32], parts: usize) -> Vec<usize> {
        let mut sizes = vec![0; parts];
        for &p in assignment {
            sizes[p as usize] += 1;
        }
        sizes
    }

    #[test]
    fn test_exact_balance_on_grid() {
        let g = grid_graph(32, 16);
        let p = MultilevelPartitioner::default();
        let assignment = p.partition_graph(&g, 4, &PartitionOptions::default()).unwrap();
        assert_eq!(part_sizes(&assignment, 4), vec![128; 4]);
    }

    #[test]
    fn test_cut_is_reasonable() {
        let g = grid_graph(16, 16);
        let p = MultilevelPartitioner::default();
        let assignment = p.partition_graph(&g, 2, &PartitionOptions::default()).unwrap();
        assert_eq!(part_sizes(&assignment, 2), vec![128, 128]);
        // a straight cut costs 16
        assert!(g.edge_cut(&assignment) <= 48, "cut {}", g.edge_cut(&assignment));
    }

    #[test]
    fn test_uneven_parts() {
        let g = grid_graph(10, 10);
        let p = MultilevelPartitioner::default();
        let assignment = p.partition_graph(&g, 3, &PartitionOptions::default()).unwrap();
        let sizes = part_sizes(&assignment, 3);
        assert_eq!(sizes.iter().sum::<usize>(), 100);
        assert!(sizes.iter().all(|&s| (33..=34).contains(&s)), "{:?}", sizes);
    }

    #[test]
    fn test_deterministic() {
        let g = grid_graph(20, 12);
        let p = MultilevelPartitioner::default();
        let a = p.partition_graph(&g, 5, &PartitionOptions::default()).unwrap();
        let b = p.partition_graph(&g, 5, &PartitionOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_disconnected_graph() {
        // two separate 4x4 grids
        let a = grid_graph(4, 4);
        let mut edges = Vec::new();
        for v in 0..16usize {
            for (u, w) in a.neighbors(v) {
                if (u as usize) > v {
                    edges.push((v as u32, u, w));
                    edges.push((v as u32 + 16, u + 16, w));
                }
            }
        }
        let g = Graph::from_edges(32, &edges).unwrap();
        let assignment = MultilevelPartitioner::default()
            .partition_graph(&g, 2, &PartitionOptions::default())
            .unwrap();
        assert_eq!(part_sizes(&assignment, 2), vec![16, 16]);
        assert_eq!(g.edge_cut(&assignment), 0);
    }

    #[test]
    fn test_more_parts_than_vertices() {
        let g = grid_graph(2, 1);
        let assignment = MultilevelPartitioner::default()
            .partition_graph(&g, 8, &PartitionOptions::default())
            .unwrap();
        assert_eq!(assignment.len(), 2);
        assert_ne!(assignment[0], assignment[1]);
    }

    #[test]
    fn test_weighted_edges_kept_together() {
        // 0=1 heavy, 2=3 heavy, light edges between
        let g = Graph::from_edges(4, &[(0, 1, 10), (1, 2, 1), (2, 3, 10), (3, 0, 1)]).unwrap();
        let assignment = MultilevelPartitioner::default()
            .partition_graph(&g, 2, &PartitionOptions::default())
            .unwrap();
        assert_eq!(assignment[0], assignment[1]);
        assert_eq!(assignment[2], assignment[3]);
        assert_ne!(assignment[0], assignment[2]);
    }

    #[test]
    fn test_contiguous_parts_on_grid() {
        let g = grid_graph(24, 24);
        let assignment = MultilevelPartitioner::default()
            .partition_graph(&g, 4, &PartitionOptions::default())
            .unwrap();
        for part in 0..4u32 {
            let side: Vec<bool> = assignment.iter().map(|&p| p != part).collect();
            assert_eq!(side_components(&g, &side, false).len(), 1, "part {} is split", part);
        }
    }

    #[test]
    fn test_zero_parts_rejected() {
        let g = grid_graph(2, 2);
        assert!(MultilevelPartitioner::default()
            .partition_graph(&g, 0, &PartitionOptions::default())
            .is_err());
    }
}
