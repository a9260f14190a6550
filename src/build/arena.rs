//! Growable geometry arenas
//!
//! Six byte arenas (positions, normals, UVs and the three index streams)
//! receive every packed cluster. Clusters refer to their data through
//! [`ArenaRange`] offsets, never pointers, so growth never invalidates a
//! view.
//!
//! Author: Moroya Sakamoto

use crate::mesh::MeshStream;
use bytemuck::Pod;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Byte range inside one arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArenaRange {
    /// Byte offset from the arena start
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
}

impl ArenaRange {
    /// End offset (exclusive)
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Append-only byte buffer that doubles its capacity on overflow
#[derive(Debug, Clone, Default)]
pub struct ByteArena {
    data: Vec<u8>,
    grows: u32,
}

impl ByteArena {
    /// Arena with `capacity` bytes reserved
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            grows: 0,
        }
    }

    /// Wrap existing bytes (used when loading a container)
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, grows: 0 }
    }

    /// Append raw bytes at the current end
    pub fn append(&mut self, bytes: &[u8]) -> ArenaRange {
        let needed = self.data.len() + bytes.len();
        if needed > self.data.capacity() {
            let mut cap = self.data.capacity().max(256);
            while cap < needed {
                cap *= 2;
            }
            self.data.reserve_exact(cap - self.data.len());
            self.grows += 1;
        }
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        ArenaRange {
            offset,
            len: bytes.len() as u64,
        }
    }

    /// Append a slice of plain-old-data values
    #[inline]
    pub fn append_pod<T: Pod>(&mut self, values: &[T]) -> ArenaRange {
        self.append(bytemuck::cast_slice(values))
    }

    /// Bytes of `range`, `None` when it lies outside the arena
    pub fn slice(&self, range: ArenaRange) -> Option<&[u8]> {
        let start = usize::try_from(range.offset).ok()?;
        let end = usize::try_from(range.end()).ok()?;
        self.data.get(start..end)
    }

    /// Decode `range` as `T` values; the arena gives no alignment guarantee
    pub fn read_pod<T: Pod>(&self, range: ArenaRange) -> Option<Vec<T>> {
        let bytes = self.slice(range)?;
        let size = std::mem::size_of::<T>();
        if size == 0 || bytes.len() % size != 0 {
            return None;
        }
        Some(bytes.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
    }

    /// Used bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was appended
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reserved bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Number of capacity doublings so far
    #[inline]
    pub fn grow_count(&self) -> u32 {
        self.grows
    }

    /// All used bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Ranges of one cluster in the six arenas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeometryRanges {
    pub positions: ArenaRange,
    pub normals: ArenaRange,
    pub uvs: ArenaRange,
    pub position_indices: ArenaRange,
    pub normal_indices: ArenaRange,
    pub uv_indices: ArenaRange,
}

impl GeometryRanges {
    /// Ranges in stream order
    pub fn to_array(&self) -> [ArenaRange; 6] {
        [
            self.positions,
            self.normals,
            self.uvs,
            self.position_indices,
            self.normal_indices,
            self.uv_indices,
        ]
    }

    /// Inverse of [`to_array`](Self::to_array)
    pub fn from_array(ranges: [ArenaRange; 6]) -> Self {
        let [positions, normals, uvs, position_indices, normal_indices, uv_indices] = ranges;
        Self {
            positions,
            normals,
            uvs,
            position_indices,
            normal_indices,
            uv_indices,
        }
    }
}

/// The six shared geometry streams
#[derive(Debug, Clone, Default)]
pub struct GeometryArena {
    streams: [ByteArena; 6],
}

impl GeometryArena {
    /// Number of streams
    pub const STREAMS: usize = 6;

    /// Empty arenas with a small initial reservation
    pub fn new() -> Self {
        Self {
            streams: std::array::from_fn(|_| ByteArena::with_capacity(4096)),
        }
    }

    /// Rebuild from the six stream buffers of a saved container
    pub fn from_streams(streams: [Vec<u8>; 6]) -> Self {
        Self {
            streams: streams.map(ByteArena::from_bytes),
        }
    }

    /// Stream buffers in order
    pub fn streams(&self) -> [&[u8]; 6] {
        std::array::from_fn(|i| self.streams[i].as_bytes())
    }

    /// Total used bytes
    pub fn total_bytes(&self) -> usize {
        self.streams.iter().map(ByteArena::len).sum()
    }

    /// Total capacity doublings across streams
    pub fn grow_count(&self) -> u32 {
        self.streams.iter().map(ByteArena::grow_count).sum()
    }

    /// Append one cluster's streams
    pub fn pack(&mut self, mesh: &MeshStream) -> GeometryRanges {
        let [p, n, u, pi, ni, ui] = &mut self.streams;
        GeometryRanges {
            positions: p.append_pod::<Vec3>(&mesh.positions),
            normals: n.append_pod::<Vec3>(&mesh.normals),
            uvs: u.append_pod::<Vec2>(&mesh.uvs),
            position_indices: pi.append_pod(&mesh.position_indices),
            normal_indices: ni.append_pod(&mesh.normal_indices),
            uv_indices: ui.append_pod(&mesh.uv_indices),
        }
    }

    /// Read one cluster back; `None` when a range is out of bounds
    pub fn unpack(&self, ranges: &GeometryRanges) -> Option<MeshStream> {
        let [p, n, u, pi, ni, ui] = &self.streams;
        Some(MeshStream {
            positions: p.read_pod::<Vec3>(ranges.positions)?,
            normals: n.read_pod::<Vec3>(ranges.normals)?,
            uvs: u.read_pod::<Vec2>(ranges.uvs)?,
            position_indices: pi.read_pod(ranges.position_indices)?,
            normal_indices: ni.read_pod(ranges.normal_indices)?,
            uv_indices: ui.read_pod(ranges.uv_indices)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::shapes::{grid, uv_sphere};

    #[test]
    fn test_offsets_advance() {
        let mut arena = ByteArena::with_capacity(0);
        let a = arena.append(&[1, 2, 3]);
        let b = arena.append(&[4, 5]);
        assert_eq!(a, ArenaRange { offset: 0, len: 3 });
        assert_eq!(b, ArenaRange { offset: 3, len: 2 });
        assert_eq!(arena.slice(b), Some(&[4u8, 5][..]));
    }

    #[test]
    fn test_capacity_doubles() {
        let mut arena = ByteArena::with_capacity(256);
        arena.append(&[0u8; 200]);
        assert_eq!(arena.grow_count(), 0);
        arena.append(&[0u8; 100]);
        assert_eq!(arena.grow_count(), 1);
        assert!(arena.capacity() >= 512);
    }

    #[test]
    fn test_out_of_range_slice() {
        let arena = ByteArena::from_bytes(vec![0; 8]);
        assert!(arena.slice(ArenaRange { offset: 4, len: 8 }).is_none());
        assert!(arena.read_pod::<u32>(ArenaRange { offset: 0, len: 6 }).is_none());
    }

    #[test]
    fn test_pack_unpack_after_growth() {
        let mut arena = GeometryArena::new();
        let first = grid(1.0, 2);
        let r0 = arena.pack(&first);
        // force several reallocations
        let big = uv_sphere(1.0, 32, 64);
        let r1 = arena.pack(&big);
        assert!(arena.grow_count() > 0);
        assert_eq!(arena.unpack(&r0).as_ref(), Some(&first));
        assert_eq!(arena.unpack(&r1).as_ref(), Some(&big));
    }

    #[test]
    fn test_streams_round_trip() {
        let mut arena = GeometryArena::new();
        let mesh = grid(2.0, 3);
        let ranges = arena.pack(&mesh);
        let copy = GeometryArena::from_streams(arena.streams().map(<[u8]>::to_vec));
        assert_eq!(copy.unpack(&ranges), Some(mesh));
        assert_eq!(GeometryRanges::from_array(ranges.to_array()), ranges);
    }
}
