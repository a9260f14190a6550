//! Cluster / group DAG
//!
//! Read-only link structure derived from a finished [`VirtualMesh`]:
//! cluster nodes point at their producer and consumer groups, group nodes
//! at their MIP 0 inputs, MIP 1 outputs and neighbouring groups one LOD up
//! and down.
//!
//! Author: Moroya Sakamoto

use crate::error::{BuildError, Site};
use crate::virtual_mesh::VirtualMesh;

/// Cluster vertex of the DAG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: u32,
    pub lod: u32,
    /// Group that produced the cluster
    pub producer: Option<u32>,
    /// Group that consumes the cluster
    pub consumer: Option<u32>,
}

/// Group vertex of the DAG
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupNode {
    pub id: u32,
    pub lod: u32,
    /// MIP 0 clusters (finer)
    pub inputs: Vec<u32>,
    /// MIP 1 clusters (coarser)
    pub outputs: Vec<u32>,
    /// Groups consuming any of `outputs`
    pub parent_groups: Vec<u32>,
    /// Groups producing any of `inputs`
    pub child_groups: Vec<u32>,
}

/// Cross-LOD link structure
#[derive(Debug, Clone, Default)]
pub struct ClusterDag {
    clusters: Vec<ClusterNode>,
    groups: Vec<GroupNode>,
}

impl ClusterDag {
    /// Derive the DAG from a built mesh
    pub fn from_mesh(mesh: &VirtualMesh) -> Self {
        let clusters: Vec<ClusterNode> = mesh
            .clusters
            .iter()
            .map(|c| ClusterNode {
                id: c.id,
                lod: c.lod,
                producer: c.producer,
                consumer: c.consumer,
            })
            .collect();

        let mut groups: Vec<GroupNode> = mesh
            .groups
            .iter()
            .map(|g| GroupNode {
                id: g.id,
                lod: g.lod,
                inputs: g.mips[0].clusters.to_vec(),
                outputs: g.mips[1].clusters.to_vec(),
                ..Default::default()
            })
            .collect();

        for g in 0..groups.len() {
            let mut parents: Vec<u32> = groups[g]
                .outputs
                .iter()
                .filter_map(|&c| clusters.get(c as usize).and_then(|n| n.consumer))
                .collect();
            parents.sort_unstable();
            parents.dedup();
            let mut children: Vec<u32> = groups[g]
                .inputs
                .iter()
                .filter_map(|&c| clusters.get(c as usize).and_then(|n| n.producer))
                .collect();
            children.sort_unstable();
            children.dedup();
            groups[g].parent_groups = parents;
            groups[g].child_groups = children;
        }

        Self { clusters, groups }
    }

    pub fn cluster(&self, id: u32) -> Option<&ClusterNode> {
        self.clusters.get(id as usize)
    }

    pub fn group(&self, id: u32) -> Option<&GroupNode> {
        self.groups.get(id as usize)
    }

    pub fn clusters(&self) -> &[ClusterNode] {
        &self.clusters
    }

    pub fn groups(&self) -> &[GroupNode] {
        &self.groups
    }

    /// Clusters no group consumes
    pub fn roots(&self) -> impl Iterator<Item = &ClusterNode> {
        self.clusters.iter().filter(|c| c.consumer.is_none())
    }

    /// Clusters at LOD 0
    pub fn leaves(&self) -> impl Iterator<Item = &ClusterNode> {
        self.clusters.iter().filter(|c| c.producer.is_none())
    }

    /// Every `(child group, parent group)` link
    pub fn group_links(&self) -> Vec<(u32, u32)> {
        self.groups
            .iter()
            .flat_map(|g| g.parent_groups.iter().map(move |&p| (g.id, p)))
            .collect()
    }

    /// Coarser clusters reachable from `id` through consumer groups
    pub fn ancestors(&self, id: u32) -> Vec<u32> {
        let mut seen = vec![false; self.clusters.len()];
        let mut stack = vec![id];
        let mut out = Vec::new();
        while let Some(c) = stack.pop() {
            let Some(g) = self.cluster(c).and_then(|n| n.consumer) else {
                continue;
            };
            let Some(group) = self.group(g) else {
                continue;
            };
            for &p in &group.outputs {
                if !seen[p as usize] {
                    seen[p as usize] = true;
                    out.push(p);
                    stack.push(p);
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Whether `ancestor` is reachable upward from `descendant`
    pub fn is_ancestor(&self, ancestor: u32, descendant: u32) -> bool {
        self.ancestors(descendant).binary_search(&ancestor).is_ok()
    }

    /// Check link symmetry and LOD ordering
    pub fn validate(&self) -> Result<(), BuildError> {
        let violation = |lod: u32, site: Site, detail: String| BuildError::InvariantViolation { lod, site, detail };
        for g in &self.groups {
            let site = Site::Group(g.id);
            for &c in &g.inputs {
                let node = self
                    .cluster(c)
                    .ok_or_else(|| violation(g.lod, site, format!("unknown input cluster {}", c)))?;
                if node.consumer != Some(g.id) || node.lod != g.lod {
                    return Err(violation(g.lod, site, format!("input cluster {} does not point back", c)));
                }
            }
            for &c in &g.outputs {
                let node = self
                    .cluster(c)
                    .ok_or_else(|| violation(g.lod, site, format!("unknown output cluster {}", c)))?;
                if node.producer != Some(g.id) || node.lod != g.lod + 1 {
                    return Err(violation(g.lod, site, format!("output cluster {} does not point back", c)));
                }
            }
        }
        for c in &self.clusters {
            for g in [c.producer, c.consumer].into_iter().flatten() {
                if self.group(g).is_none() {
                    return Err(violation(c.lod, Site::Cluster(c.id), format!("unknown group {}", g)));
                }
            }
        }
        Ok(())
    }
}
