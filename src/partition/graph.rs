//! Weighted undirected graph in compressed sparse row form
//!
//! Author: Moroya Sakamoto

use super::PartitionError;
use std::collections::BTreeMap;

/// Undirected graph with vertex and edge weights (CSR layout, METIS style)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Graph {
    /// Offsets into `adjncy` per vertex (`len = n + 1`)
    pub xadj: Vec<u32>,
    /// Neighbour lists, every edge stored in both directions
    pub adjncy: Vec<u32>,
    /// Edge weights parallel to `adjncy`
    pub adjwgt: Vec<u32>,
    /// Vertex weights
    pub vwgt: Vec<u32>,
}

impl Graph {
    /// Build from a weighted edge list. Parallel edges are summed, self
    /// loops dropped, every vertex gets unit weight.
    pub fn from_edges(vertex_count: usize, edges: &[(u32, u32, u32)]) -> Result<Self, PartitionError> {
        let mut lists: Vec<BTreeMap<u32, u32>> = vec![BTreeMap::new(); vertex_count];
        for &(a, b, w) in edges {
            if a as usize >= vertex_count || b as usize >= vertex_count {
                return Err(PartitionError::InvalidGraph(format!(
                    "edge ({}, {}) out of range for {} vertices",
                    a, b, vertex_count
                )));
            }
            if a == b || w == 0 {
                continue;
            }
            *lists[a as usize].entry(b).or_insert(0) += w;
            *lists[b as usize].entry(a).or_insert(0) += w;
        }
        Ok(Self::from_sorted_lists(&lists, vec![1; vertex_count]))
    }

    fn from_sorted_lists(lists: &[BTreeMap<u32, u32>], vwgt: Vec<u32>) -> Self {
        let mut xadj = Vec::with_capacity(lists.len() + 1);
        let mut adjncy = Vec::new();
        let mut adjwgt = Vec::new();
        xadj.push(0);
        for list in lists {
            for (&n, &w) in list {
                adjncy.push(n);
                adjwgt.push(w);
            }
            xadj.push(adjncy.len() as u32);
        }
        Graph {
            xadj,
            adjncy,
            adjwgt,
            vwgt,
        }
    }

    /// Dual graph of a triangle list: elements sharing at least `ncommon`
    /// nodes are joined by a unit-weight edge.
    pub fn dual(elements: &[[u32; 3]], node_count: usize, ncommon: usize) -> Result<Self, PartitionError> {
        let mut incident: Vec<Vec<u32>> = vec![Vec::new(); node_count];
        for (e, tri) in elements.iter().enumerate() {
            for &n in tri {
                let list = incident.get_mut(n as usize).ok_or_else(|| {
                    PartitionError::InvalidGraph(format!("element {} node {} out of range", e, n))
                })?;
                if list.last() != Some(&(e as u32)) {
                    list.push(e as u32);
                }
            }
        }

        let mut lists: Vec<BTreeMap<u32, u32>> = vec![BTreeMap::new(); elements.len()];
        let mut shared: BTreeMap<u32, usize> = BTreeMap::new();
        for (e, tri) in elements.iter().enumerate() {
            shared.clear();
            for &n in tri {
                for &other in &incident[n as usize] {
                    if other as usize != e {
                        *shared.entry(other).or_insert(0) += 1;
                    }
                }
            }
            for (&other, &count) in &shared {
                if count >= ncommon {
                    lists[e].insert(other, 1);
                }
            }
        }
        Ok(Self::from_sorted_lists(&lists, vec![1; elements.len()]))
    }

    /// Number of vertices
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vwgt.len()
    }

    /// Number of undirected edges
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.adjncy.len() / 2
    }

    /// Neighbours of `v` with edge weights
    #[inline]
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (start, end) = (self.xadj[v] as usize, self.xadj[v + 1] as usize);
        self.adjncy[start..end]
            .iter()
            .copied()
            .zip(self.adjwgt[start..end].iter().copied())
    }

    /// Degree of `v`
    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        (self.xadj[v + 1] - self.xadj[v]) as usize
    }

    /// Sum of vertex weights
    #[inline]
    pub fn total_vertex_weight(&self) -> u64 {
        self.vwgt.iter().map(|&w| w as u64).sum()
    }

    /// Whether any edge weight differs from one
    pub fn has_edge_weights(&self) -> bool {
        self.adjwgt.iter().any(|&w| w != 1)
    }

    /// Whether any vertex weight differs from one
    pub fn has_vertex_weights(&self) -> bool {
        self.vwgt.iter().any(|&w| w != 1)
    }

    /// Check CSR shape, symmetry, positive weights and absence of self loops
    pub fn validate(&self) -> Result<(), PartitionError> {
        let n = self.vwgt.len();
        let bad = |msg: String| Err(PartitionError::InvalidGraph(msg));
        if self.xadj.len() != n + 1 {
            return bad(format!("xadj has {} entries for {} vertices", self.xadj.len(), n));
        }
        if self.adjncy.len() != self.adjwgt.len() || self.xadj[n] as usize != self.adjncy.len() {
            return bad("adjacency arrays disagree in length".to_string());
        }
        if let Some(v) = self.vwgt.iter().position(|&w| w == 0) {
            return bad(format!("vertex {} has zero weight", v));
        }
        for v in 0..n {
            if self.xadj[v] > self.xadj[v + 1] {
                return bad(format!("xadj decreases at vertex {}", v));
            }
            for (u, w) in self.neighbors(v) {
                if u as usize >= n {
                    return bad(format!("vertex {} links to missing vertex {}", v, u));
                }
                if u as usize == v {
                    return bad(format!("self loop on vertex {}", v));
                }
                if w == 0 {
                    return bad(format!("zero-weight edge ({}, {})", v, u));
                }
                if self.edge_weight(u as usize, v as u32) != Some(w) {
                    return bad(format!("edge ({}, {}) is not symmetric", v, u));
                }
            }
        }
        Ok(())
    }

    /// Weight of the edge `a -> b`, if present
    pub fn edge_weight(&self, a: usize, b: u32) -> Option<u32> {
        self.neighbors(a).find(|&(n, _)| n == b).map(|(_, w)| w)
    }

    /// Induced subgraph on `vertices` (local index = position in the slice)
    pub fn subgraph(&self, vertices: &[u32]) -> Graph {
        const ABSENT: u32 = u32::MAX;
        let mut local = vec![ABSENT; self.vertex_count()];
        for (i, &v) in vertices.iter().enumerate() {
            local[v as usize] = i as u32;
        }
        let mut xadj = Vec::with_capacity(vertices.len() + 1);
        let mut adjncy = Vec::new();
        let mut adjwgt = Vec::new();
        let mut vwgt = Vec::with_capacity(vertices.len());
        xadj.push(0);
        for &v in vertices {
            for (u, w) in self.neighbors(v as usize) {
                let l = local[u as usize];
                if l != ABSENT {
                    adjncy.push(l);
                    adjwgt.push(w);
                }
            }
            xadj.push(adjncy.len() as u32);
            vwgt.push(self.vwgt[v as usize]);
        }
        Graph {
            xadj,
            adjncy,
            adjwgt,
            vwgt,
        }
    }

    /// Total weight of edges whose endpoints lie in different parts
    pub fn edge_cut(&self, assignment: &[u32]) -> u64 {
        let mut cut = 0u64;
        for v in 0..self.vertex_count() {
            for (u, w) in self.neighbors(v) {
                if (u as usize) > v && assignment[v] != assignment[u as usize] {
                    cut += w as u64;
                }
            }
        }
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: u32) -> Graph {
        let edges: Vec<_> = (0..n - 1).map(|i| (i, i + 1, 1)).collect();
        Graph::from_edges(n as usize, &edges).unwrap()
    }

    #[test]
    fn test_from_edges_merges_parallel() {
        let g = Graph::from_edges(3, &[(0, 1, 2), (1, 0, 3), (1, 2, 1), (2, 2, 5)]).unwrap();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.edge_weight(0, 1), Some(5));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_edge() {
        assert!(Graph::from_edges(2, &[(0, 2, 1)]).is_err());
    }

    #[test]
    fn test_dual_requires_shared_edge() {
        // 0-1-2 and 1-2-3 share an edge; 2-4-5 only touches at node 2
        let elements = [[0, 1, 2], [1, 3, 2], [2, 4, 5]];
        let g = Graph::dual(&elements, 6, 2).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edge_weight(0, 1), Some(1));
        let g1 = Graph::dual(&elements, 6, 1).unwrap();
        assert_eq!(g1.edge_count(), 3);
    }

    #[test]
    fn test_subgraph() {
        let g = path(5);
        let sub = g.subgraph(&[1, 2, 4]);
        assert_eq!(sub.vertex_count(), 3);
        assert_eq!(sub.edge_count(), 1);
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_edge_cut() {
        let g = path(4);
        assert_eq!(g.edge_cut(&[0, 0, 1, 1]), 1);
        assert_eq!(g.edge_cut(&[0, 1, 0, 1]), 3);
    }

    #[test]
    fn test_validate_rejects_asymmetric() {
        let g = Graph {
            xadj: vec![0, 1, 1],
            adjncy: vec![1],
            adjwgt: vec![1],
            vwgt: vec![1, 1],
        };
        assert!(g.validate().is_err());
    }
}
