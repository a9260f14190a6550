//! Cluster residency cache
//!
//! A fixed table of GPU buffer slots, each sized for the largest cluster.
//! Requests scan the table for the `(mesh, cluster)` pair; a miss takes a
//! free slot or evicts the slot with the oldest access stamp. A slot keeps
//! its buffer addresses for its whole life, so a hit always returns the same
//! address.
//!
//! Author: Moroya Sakamoto

use super::selector::Selection;
use crate::config::StreamingConfig;
use crate::virtual_mesh::VirtualMesh;
use thiserror::Error;

/// Bytes per streamed vertex: position, normal, UV
pub const VERTEX_STRIDE: u64 = 12 + 12 + 8;

/// Bytes per streamed index
pub const INDEX_STRIDE: u64 = 4;

/// Residency errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    /// The cluster does not fit the fixed slot size
    #[error("cluster {cluster} has {triangles} triangles, slots hold {max}")]
    ClusterTooLarge {
        /// Cluster id
        cluster: u32,
        /// Its triangle count
        triangles: u32,
        /// Slot size in triangles
        max: usize,
    },

    /// The cache was created without slots
    #[error("streaming cache has no slots")]
    ZeroCapacity,

    /// The selection names a cluster the mesh does not have
    #[error("unknown cluster {0}")]
    UnknownCluster(u32),
}

/// One resident cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub mesh_id: u32,
    pub cluster_id: u32,
    /// Access stamp of the last request
    pub last_access: u64,
    /// Vertex buffer byte offset
    pub vertex_offset: u64,
    /// Index buffer byte offset
    pub index_offset: u64,
    /// Vertex bytes in use
    pub vertex_bytes: u64,
    /// Index bytes in use
    pub index_bytes: u64,
}

/// Outcome of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Already resident
    Hit { slot: usize },
    /// Loaded into a free slot
    Loaded { slot: usize },
    /// Loaded over the least recently used slot
    Replaced {
        slot: usize,
        /// `(mesh, cluster)` that was evicted
        evicted: (u32, u32),
    },
}

impl Residency {
    /// Slot index the cluster now occupies
    #[inline]
    pub fn slot(&self) -> usize {
        match *self {
            Residency::Hit { slot } | Residency::Loaded { slot } | Residency::Replaced { slot, .. } => slot,
        }
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        matches!(self, Residency::Hit { .. })
    }
}

/// Request counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamingStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl StreamingStats {
    /// Hits over requests (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

/// Bounded residency table with least-recently-used replacement
#[derive(Debug, Clone)]
pub struct StreamingCache {
    config: StreamingConfig,
    slots: Vec<Slot>,
    access_counter: u64,
    stats: StreamingStats,
}

impl StreamingCache {
    /// Empty cache with `config.capacity` slots
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.capacity),
            config,
            access_counter: 0,
            stats: StreamingStats::default(),
        }
    }

    /// Vertex bytes reserved per slot
    #[inline]
    pub fn slot_vertex_bytes(&self) -> u64 {
        self.config.max_cluster_triangles as u64 * 3 * VERTEX_STRIDE
    }

    /// Index bytes reserved per slot
    #[inline]
    pub fn slot_index_bytes(&self) -> u64 {
        self.config.max_cluster_triangles as u64 * 3 * INDEX_STRIDE
    }

    /// Total bytes reserved by a full table
    pub fn reserved_bytes(&self) -> u64 {
        self.config.capacity as u64 * (self.slot_vertex_bytes() + self.slot_index_bytes())
    }

    /// Make `(mesh_id, cluster_id)` resident.
    ///
    /// `vertices` and `triangles` size the used part of the slot.
    pub fn request(
        &mut self,
        mesh_id: u32,
        cluster_id: u32,
        vertices: u32,
        triangles: u32,
    ) -> Result<Residency, StreamingError> {
        if self.config.capacity == 0 {
            return Err(StreamingError::ZeroCapacity);
        }
        if triangles as usize > self.config.max_cluster_triangles
            || vertices as usize > self.config.max_cluster_triangles * 3
        {
            return Err(StreamingError::ClusterTooLarge {
                cluster: cluster_id,
                triangles,
                max: self.config.max_cluster_triangles,
            });
        }

        self.access_counter += 1;
        self.stats.requests += 1;
        let stamp = self.access_counter;

        if let Some(slot) = self
            .slots
            .iter()
            .position(|s| s.mesh_id == mesh_id && s.cluster_id == cluster_id)
        {
            self.slots[slot].last_access = stamp;
            self.stats.hits += 1;
            return Ok(Residency::Hit { slot });
        }
        self.stats.misses += 1;

        let fill = |slot: usize, cache: &Self| Slot {
            mesh_id,
            cluster_id,
            last_access: stamp,
            vertex_offset: slot as u64 * cache.slot_vertex_bytes(),
            index_offset: slot as u64 * cache.slot_index_bytes(),
            vertex_bytes: vertices as u64 * VERTEX_STRIDE,
            index_bytes: triangles as u64 * 3 * INDEX_STRIDE,
        };

        if self.slots.len() < self.config.capacity {
            let slot = self.slots.len();
            let entry = fill(slot, self);
            self.slots.push(entry);
            return Ok(Residency::Loaded { slot });
        }

        let Some(victim) = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_access)
            .map(|(i, _)| i)
        else {
            return Err(StreamingError::ZeroCapacity);
        };
        let evicted = (self.slots[victim].mesh_id, self.slots[victim].cluster_id);
        let entry = fill(victim, self);
        self.slots[victim] = entry;
        self.stats.evictions += 1;
        log::trace!("evicted mesh {} cluster {} from slot {}", evicted.0, evicted.1, victim);
        Ok(Residency::Replaced { slot: victim, evicted })
    }

    /// Request every cluster of a selection, in order
    pub fn stream_selection(
        &mut self,
        mesh_id: u32,
        mesh: &VirtualMesh,
        selection: &Selection,
    ) -> Result<StreamingStats, StreamingError> {
        let before = self.stats;
        for &c in &selection.clusters {
            let cluster = mesh
                .clusters
                .get(c as usize)
                .ok_or(StreamingError::UnknownCluster(c))?;
            let vertices = (cluster.ranges.positions.len / 12) as u32;
            self.request(mesh_id, c, vertices, cluster.triangle_count)?;
        }
        Ok(StreamingStats {
            requests: self.stats.requests - before.requests,
            hits: self.stats.hits - before.hits,
            misses: self.stats.misses - before.misses,
            evictions: self.stats.evictions - before.evictions,
        })
    }

    /// Resident slot of a pair, if any
    pub fn lookup(&self, mesh_id: u32, cluster_id: u32) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|s| s.mesh_id == mesh_id && s.cluster_id == cluster_id)
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Occupied slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn stats(&self) -> StreamingStats {
        self.stats
    }

    /// Drop every resident cluster and reset the counters
    pub fn clear(&mut self) {
        self.slots.clear();
        self.access_counter = 0;
        self.stats = StreamingStats::default();
    }
}
