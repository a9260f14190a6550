//! Fixed-size cluster and group records
//!
//! `#[repr(C)]` plain-old-data structs written back to back. Inline lists
//! carry an explicit count; a count above the array size is rejected on
//! read, never truncated.
//!
//! Author: Moroya Sakamoto

use super::IoError;
use crate::bounded::Bounded;
use crate::build::arena::{ArenaRange, GeometryRanges};
use crate::config::MAX_CLUSTERS_PER_GROUP;
use crate::mesh::{Aabb, ClusterBounds, NormalCone};
use crate::virtual_mesh::{Cluster, ClusterGroup, Deviation, GroupMip};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Marks an absent group id
pub const NO_GROUP: u32 = u32::MAX;

/// Serialized [`Cluster`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClusterRecord {
    /// Offset/length pairs of the six geometry streams
    pub ranges: [u64; 12],
    pub id: u32,
    pub lod: u32,
    pub triangle_count: u32,
    /// Number of valid entries in `groups`
    pub group_count: u32,
    /// `[producer, consumer]`, [`NO_GROUP`] when absent
    pub groups: [u32; 2],
    pub parent_count: u32,
    pub parents: [u32; MAX_CLUSTERS_PER_GROUP],
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
    pub centroid: [f32; 3],
    pub radius: f32,
    pub cone_axis: [f32; 3],
    pub cone_cos: f32,
    pub cone_apex: [f32; 3],
    /// Zero
    pub reserved: u32,
    pub simplification_error: f32,
    pub deviation_max: f32,
    pub deviation_average: f32,
    /// Deviation witness pair, flattened
    pub witness: [f32; 6],
}

/// Serialized [`GroupMip`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MipRecord {
    pub cluster_count: u32,
    pub clusters: [u32; MAX_CLUSTERS_PER_GROUP],
    pub min_error: f32,
    pub max_error: f32,
    pub witness: [f32; 6],
}

/// Serialized [`ClusterGroup`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GroupRecord {
    pub id: u32,
    pub lod: u32,
    pub error: f32,
    pub mip_count: u32,
    pub mips: [MipRecord; 2],
}

fn flatten(pair: [Vec3; 2]) -> [f32; 6] {
    let [a, b] = pair;
    [a.x, a.y, a.z, b.x, b.y, b.z]
}

fn unflatten(v: [f32; 6]) -> [Vec3; 2] {
    [Vec3::new(v[0], v[1], v[2]), Vec3::new(v[3], v[4], v[5])]
}

fn overflow(what: &'static str, capacity: usize) -> IoError {
    IoError::CapacityExceeded { what, capacity }
}

fn optional(id: u32) -> Option<u32> {
    (id != NO_GROUP).then_some(id)
}

impl From<&Cluster> for ClusterRecord {
    fn from(c: &Cluster) -> Self {
        let mut ranges = [0u64; 12];
        for (i, r) in c.ranges.to_array().iter().enumerate() {
            ranges[2 * i] = r.offset;
            ranges[2 * i + 1] = r.len;
        }
        let (parents, parent_count) = c.parents.to_padded();
        ClusterRecord {
            ranges,
            id: c.id,
            lod: c.lod,
            triangle_count: c.triangle_count,
            group_count: c.groups().len() as u32,
            groups: [c.producer.unwrap_or(NO_GROUP), c.consumer.unwrap_or(NO_GROUP)],
            parent_count,
            parents,
            aabb_min: c.bounds.aabb.min.to_array(),
            aabb_max: c.bounds.aabb.max.to_array(),
            centroid: c.bounds.centroid.to_array(),
            radius: c.bounds.radius,
            cone_axis: c.bounds.cone.axis.to_array(),
            cone_cos: c.bounds.cone.cos_half_angle,
            cone_apex: c.bounds.cone.apex.to_array(),
            reserved: 0,
            simplification_error: c.simplification_error,
            deviation_max: c.deviation.max,
            deviation_average: c.deviation.average,
            witness: flatten(c.deviation.witness),
        }
    }
}

impl TryFrom<&ClusterRecord> for Cluster {
    type Error = IoError;

    fn try_from(r: &ClusterRecord) -> Result<Self, IoError> {
        let ranges = GeometryRanges::from_array(std::array::from_fn(|i| ArenaRange {
            offset: r.ranges[2 * i],
            len: r.ranges[2 * i + 1],
        }));
        let parents = Bounded::from_padded(&r.parents, r.parent_count)
            .map_err(|e| overflow("cluster parent list", e.capacity))?;
        let producer = optional(r.groups[0]);
        let consumer = optional(r.groups[1]);
        let present = producer.is_some() as u32 + consumer.is_some() as u32;
        if r.group_count != present {
            return Err(IoError::InvalidFormat(format!(
                "cluster {} records {} groups but names {}",
                r.id, r.group_count, present
            )));
        }
        Ok(Cluster {
            id: r.id,
            lod: r.lod,
            triangle_count: r.triangle_count,
            ranges,
            bounds: ClusterBounds {
                aabb: Aabb::new(Vec3::from_array(r.aabb_min), Vec3::from_array(r.aabb_max)),
                centroid: Vec3::from_array(r.centroid),
                radius: r.radius,
                cone: NormalCone {
                    axis: Vec3::from_array(r.cone_axis),
                    cos_half_angle: r.cone_cos,
                    apex: Vec3::from_array(r.cone_apex),
                },
            },
            simplification_error: r.simplification_error,
            deviation: Deviation {
                max: r.deviation_max,
                average: r.deviation_average,
                witness: unflatten(r.witness),
            },
            producer,
            consumer,
            parents,
        })
    }
}

impl From<&GroupMip> for MipRecord {
    fn from(m: &GroupMip) -> Self {
        let (clusters, cluster_count) = m.clusters.to_padded();
        MipRecord {
            cluster_count,
            clusters,
            min_error: m.min_error,
            max_error: m.max_error,
            witness: flatten(m.witness),
        }
    }
}

impl TryFrom<&MipRecord> for GroupMip {
    type Error = IoError;

    fn try_from(r: &MipRecord) -> Result<Self, IoError> {
        Ok(GroupMip {
            clusters: Bounded::from_padded(&r.clusters, r.cluster_count)
                .map_err(|e| overflow("group MIP cluster list", e.capacity))?,
            min_error: r.min_error,
            max_error: r.max_error,
            witness: unflatten(r.witness),
        })
    }
}

impl From<&ClusterGroup> for GroupRecord {
    fn from(g: &ClusterGroup) -> Self {
        GroupRecord {
            id: g.id,
            lod: g.lod,
            error: g.error,
            mip_count: 2,
            mips: [MipRecord::from(&g.mips[0]), MipRecord::from(&g.mips[1])],
        }
    }
}

impl TryFrom<&GroupRecord> for ClusterGroup {
    type Error = IoError;

    fn try_from(r: &GroupRecord) -> Result<Self, IoError> {
        if r.mip_count != 2 {
            return Err(overflow("group MIP count", 2));
        }
        Ok(ClusterGroup {
            id: r.id,
            lod: r.lod,
            error: r.error,
            mips: [GroupMip::try_from(&r.mips[0])?, GroupMip::try_from(&r.mips[1])?],
        })
    }
}

/// Decode `count` records of `T` from the front of `bytes`
pub fn read_records<T: Pod>(bytes: &[u8], count: usize) -> Result<Vec<T>, IoError> {
    let size = std::mem::size_of::<T>();
    let needed = size
        .checked_mul(count)
        .ok_or_else(|| IoError::InvalidFormat("record count overflows".to_string()))?;
    if bytes.len() < needed {
        return Err(IoError::InvalidFormat(format!(
            "need {} bytes for {} records, have {}",
            needed,
            count,
            bytes.len()
        )));
    }
    Ok(bytes[..needed]
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        let mut parents = Bounded::new();
        parents.push(9).unwrap();
        parents.push(10).unwrap();
        Cluster {
            id: 4,
            lod: 1,
            triangle_count: 96,
            ranges: GeometryRanges {
                positions: ArenaRange { offset: 24, len: 120 },
                ..Default::default()
            },
            bounds: ClusterBounds {
                aabb: Aabb::new(Vec3::splat(-1.0), Vec3::ONE),
                centroid: Vec3::new(0.1, 0.2, 0.3),
                radius: 1.5,
                cone: NormalCone {
                    axis: Vec3::Y,
                    cos_half_angle: 0.5,
                    apex: Vec3::new(0.0, -0.4, 0.0),
                },
            },
            simplification_error: 0.25,
            deviation: Deviation {
                max: 0.01,
                average: 0.004,
                witness: [Vec3::ZERO, Vec3::new(0.01, 0.0, 0.0)],
            },
            producer: Some(0),
            consumer: None,
            parents,
        }
    }

    #[test]
    fn test_record_sizes_are_fixed() {
        assert_eq!(std::mem::size_of::<ClusterRecord>(), 744);
        assert_eq!(std::mem::size_of::<MipRecord>(), 548);
        assert_eq!(std::mem::size_of::<GroupRecord>(), 1112);
    }

    #[test]
    fn test_cluster_record_fields() {
        let c = cluster();
        let record = ClusterRecord::from(&c);
        assert_eq!(record.groups, [0, NO_GROUP]);
        assert_eq!(record.group_count, 1);
        assert_eq!(record.parent_count, 2);
        assert_eq!(&record.parents[..3], &[9, 10, 0]);
        assert_eq!(Cluster::try_from(&record).unwrap(), c);
    }

    #[test]
    fn test_bad_parent_count_rejected() {
        let mut record = ClusterRecord::from(&cluster());
        record.parent_count = 200;
        assert!(matches!(
            Cluster::try_from(&record),
            Err(IoError::CapacityExceeded { capacity: 128, .. })
        ));
    }

    #[test]
    fn test_group_record_rejects_bad_mip_count() {
        let mut group = ClusterGroup::default();
        group.mips[0].clusters.push(3).unwrap();
        let mut record = GroupRecord::from(&group);
        assert_eq!(ClusterGroup::try_from(&record).unwrap(), group);
        record.mip_count = 3;
        assert!(ClusterGroup::try_from(&record).is_err());
    }

    #[test]
    fn test_read_records_checks_length() {
        let records = vec![GroupRecord::zeroed(); 2];
        let bytes = bytemuck::cast_slice::<GroupRecord, u8>(&records);
        assert_eq!(read_records::<GroupRecord>(bytes, 2).unwrap().len(), 2);
        assert!(read_records::<GroupRecord>(&bytes[1..], 2).is_err());
    }
}
