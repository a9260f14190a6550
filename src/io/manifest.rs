//! JSON manifest of a built mesh
//!
//! Author: Moroya Sakamoto

use super::IoError;
use crate::virtual_mesh::{LodStats, VirtualMesh};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Per-cluster line of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: u32,
    pub lod: u32,
    pub triangles: u32,
    pub center: [f32; 3],
    pub radius: f32,
    pub simplification_error: f32,
    pub deviation: f32,
    pub producer: Option<u32>,
    pub consumer: Option<u32>,
    pub parents: Vec<u32>,
}

/// Per-group line of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: u32,
    pub lod: u32,
    pub error: f32,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
    /// `[min, max]` error of MIP 1
    pub output_error: [f32; 2],
}

/// Human-readable description of a [`VirtualMesh`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generator: String,
    pub lod_count: u32,
    pub input_triangles: usize,
    pub arena_bytes: usize,
    pub lods: Vec<LodStats>,
    pub clusters: Vec<ClusterSummary>,
    pub groups: Vec<GroupSummary>,
}

impl Manifest {
    /// Summarize `mesh`
    pub fn from_mesh(mesh: &VirtualMesh) -> Self {
        Self {
            generator: format!("alice-nanite {}", crate::VERSION),
            lod_count: mesh.lod_count,
            input_triangles: mesh.input_triangles,
            arena_bytes: mesh.arena.total_bytes(),
            lods: mesh.lod_stats(),
            clusters: mesh
                .clusters
                .iter()
                .map(|c| ClusterSummary {
                    id: c.id,
                    lod: c.lod,
                    triangles: c.triangle_count,
                    center: c.bounds.centroid.to_array(),
                    radius: c.bounds.radius,
                    simplification_error: c.simplification_error,
                    deviation: c.deviation.max,
                    producer: c.producer,
                    consumer: c.consumer,
                    parents: c.parents.to_vec(),
                })
                .collect(),
            groups: mesh
                .groups
                .iter()
                .map(|g| GroupSummary {
                    id: g.id,
                    lod: g.lod,
                    error: g.error,
                    inputs: g.mips[0].clusters.to_vec(),
                    outputs: g.mips[1].clusters.to_vec(),
                    output_error: [g.mips[1].min_error, g.mips[1].max_error],
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String, IoError> {
        serde_json::to_string_pretty(self).map_err(|e| IoError::Serialization(e.to_string()))
    }
}

/// Write the manifest of `mesh` to `path`
pub fn save_manifest(mesh: &VirtualMesh, path: impl AsRef<Path>) -> Result<(), IoError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &Manifest::from_mesh(mesh))
        .map_err(|e| IoError::Serialization(e.to_string()))
}

/// Read a manifest back
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest, IoError> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| IoError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::HierarchyAssembler;
    use crate::config::BuildConfig;
    use crate::mesh::shapes::subdivided_box;
    use glam::Vec3;

    #[test]
    fn test_manifest_mirrors_mesh() {
        let mesh = HierarchyAssembler::new(BuildConfig::default())
            .build(&subdivided_box(Vec3::ONE, [8, 8, 4]))
            .unwrap();
        let manifest = Manifest::from_mesh(&mesh);
        assert_eq!(manifest.clusters.len(), mesh.clusters.len());
        assert_eq!(manifest.lods.len(), mesh.lod_count as usize);
        assert_eq!(manifest.lods[0].triangles, 512);
        assert!(manifest.groups.iter().all(|g| !g.inputs.is_empty()));

        let json = manifest.to_json_string().unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
