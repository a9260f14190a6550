//! Triangle connectivity helpers
//!
//! All functions work on a flat position-index array (three indices per
//! triangle) whose vertices are already welded, so shared corners have equal
//! indices.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;

/// Order-independent edge key
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Debug)]
pub struct EdgeKey(pub u32, pub u32);

impl EdgeKey {
    /// Key for the edge between `a` and `b`
    #[inline]
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            EdgeKey(a, b)
        } else {
            EdgeKey(b, a)
        }
    }

    /// Whether `v` is an endpoint
    #[inline]
    pub fn touches(&self, v: u32) -> bool {
        self.0 == v || self.1 == v
    }
}

/// The three edges of triangle `t`
#[inline]
pub fn triangle_edges(indices: &[u32], t: usize) -> [EdgeKey; 3] {
    let (a, b, c) = (indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]);
    [EdgeKey::new(a, b), EdgeKey::new(b, c), EdgeKey::new(c, a)]
}

/// Map from each edge to the triangles using it
pub fn edge_triangles(indices: &[u32]) -> HashMap<EdgeKey, Vec<u32>> {
    let mut map: HashMap<EdgeKey, Vec<u32>> = HashMap::with_capacity(indices.len());
    for t in 0..indices.len() / 3 {
        for e in triangle_edges(indices, t) {
            map.entry(e).or_default().push(t as u32);
        }
    }
    map
}

/// Edge-adjacency list: triangles sharing two vertex indices are neighbours
pub fn triangle_adjacency(indices: &[u32]) -> Vec<Vec<u32>> {
    let tri_count = indices.len() / 3;
    let mut adjacency = vec![Vec::new(); tri_count];
    for tris in edge_triangles(indices).values() {
        for (i, &a) in tris.iter().enumerate() {
            for &b in &tris[i + 1..] {
                if a != b {
                    adjacency[a as usize].push(b);
                    adjacency[b as usize].push(a);
                }
            }
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }
    adjacency
}

/// Connected components of an adjacency list via depth-first traversal.
///
/// Components are returned in order of their smallest member; members are
/// sorted ascending.
pub fn connected_components(adjacency: &[Vec<u32>]) -> Vec<Vec<u32>> {
    let mut visited = vec![false; adjacency.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for seed in 0..adjacency.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        stack.push(seed as u32);
        let mut component = Vec::new();
        while let Some(n) = stack.pop() {
            component.push(n);
            for &m in &adjacency[n as usize] {
                if !visited[m as usize] {
                    visited[m as usize] = true;
                    stack.push(m);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

/// Per-vertex flag: the vertex lies on an edge used by exactly one triangle
pub fn boundary_vertices(indices: &[u32], vertex_count: usize) -> Vec<bool> {
    let mut boundary = vec![false; vertex_count];
    for (edge, tris) in edge_triangles(indices) {
        if tris.len() == 1 {
            boundary[edge.0 as usize] = true;
            boundary[edge.1 as usize] = true;
        }
    }
    boundary
}

/// Triangles incident to each vertex
pub fn vertex_triangles(indices: &[u32], vertex_count: usize) -> Vec<Vec<u32>> {
    let mut incident = vec![Vec::new(); vertex_count];
    for (i, &v) in indices.iter().enumerate() {
        let t = (i / 3) as u32;
        let list = &mut incident[v as usize];
        if list.last() != Some(&t) {
            list.push(t);
        }
    }
    incident
}
