//! `.vmesh` binary container
//!
//! Header (32 bytes):
//!   - Magic: "ALICEVM\0" (8 bytes)
//!   - Version: u32
//!   - Cluster count: u32
//!   - Group count: u32
//!   - LOD count: u32
//!   - Input triangle count: u32
//!   - CRC32 of the body: u32
//!
//! Body:
//!   - Cluster records
//!   - Group records
//!   - Block table of the six geometry streams
//!
//! Author: Moroya Sakamoto

use super::payload::{read_blocks, write_blocks};
use super::records::{read_records, ClusterRecord, GroupRecord};
use super::IoError;
use crate::build::arena::GeometryArena;
use crate::dag::ClusterDag;
use crate::virtual_mesh::{Cluster, ClusterGroup, VirtualMesh};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Magic bytes for the container
pub const VMESH_MAGIC: [u8; 8] = *b"ALICEVM\0";

/// Current format version
pub const VMESH_VERSION: u32 = 2;

/// Header size in bytes
pub const VMESH_HEADER_SIZE: usize = 32;

/// Container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmeshHeader {
    pub version: u32,
    pub cluster_count: u32,
    pub group_count: u32,
    pub lod_count: u32,
    pub input_triangles: u32,
    pub crc32: u32,
}

fn count(value: usize, what: &'static str) -> Result<u32, IoError> {
    u32::try_from(value).map_err(|_| IoError::CapacityExceeded {
        what,
        capacity: u32::MAX as usize,
    })
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

impl VmeshHeader {
    /// Header for `mesh` with a body CRC
    pub fn new(mesh: &VirtualMesh, crc32: u32) -> Result<Self, IoError> {
        Ok(Self {
            version: VMESH_VERSION,
            cluster_count: count(mesh.clusters.len(), "cluster count")?,
            group_count: count(mesh.groups.len(), "group count")?,
            lod_count: mesh.lod_count,
            input_triangles: count(mesh.input_triangles, "input triangle count")?,
            crc32,
        })
    }

    /// Serialize header to bytes
    #[inline]
    pub fn to_bytes(&self) -> [u8; VMESH_HEADER_SIZE] {
        let mut bytes = [0u8; VMESH_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&VMESH_MAGIC);
        for (i, v) in [
            self.version,
            self.cluster_count,
            self.group_count,
            self.lod_count,
            self.input_triangles,
            self.crc32,
        ]
        .into_iter()
        .enumerate()
        {
            bytes[8 + 4 * i..12 + 4 * i].copy_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; VMESH_HEADER_SIZE]) -> Result<Self, IoError> {
        if bytes[0..8] != VMESH_MAGIC {
            return Err(IoError::InvalidFormat(format!(
                "Invalid magic bytes: {:?}",
                &bytes[0..8]
            )));
        }
        let version = le_u32(bytes, 8);
        if version != VMESH_VERSION {
            return Err(IoError::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            cluster_count: le_u32(bytes, 12),
            group_count: le_u32(bytes, 16),
            lod_count: le_u32(bytes, 20),
            input_triangles: le_u32(bytes, 24),
            crc32: le_u32(bytes, 28),
        })
    }
}

/// Writer wrapper that calculates CRC32 on the fly
struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> CrcWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<W: Write> Write for CrcWriter<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Stream `mesh` into `writer`, patching the header CRC at the end
pub fn write_vmesh<W: Write + Seek>(mesh: &VirtualMesh, writer: &mut W) -> Result<(), IoError> {
    let start = writer.stream_position()?;
    let placeholder = VmeshHeader::new(mesh, 0)?;
    writer.write_all(&placeholder.to_bytes())?;

    let mut body = CrcWriter::new(&mut *writer);
    let clusters: Vec<ClusterRecord> = mesh.clusters.iter().map(ClusterRecord::from).collect();
    body.write_all(bytemuck::cast_slice(&clusters))?;
    let groups: Vec<GroupRecord> = mesh.groups.iter().map(GroupRecord::from).collect();
    body.write_all(bytemuck::cast_slice(&groups))?;
    write_blocks(&mut body, &mesh.arena.streams())?;
    let crc = body.finalize();

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(start))?;
    writer.write_all(&VmeshHeader::new(mesh, crc)?.to_bytes())?;
    writer.seek(SeekFrom::Start(end))?;
    writer.flush()?;

    log::debug!(
        "wrote vmesh: {} clusters, {} groups, {} bytes",
        mesh.clusters.len(),
        mesh.groups.len(),
        end - start
    );
    Ok(())
}

/// Save a virtual mesh to a `.vmesh` file
pub fn save_vmesh(mesh: &VirtualMesh, path: impl AsRef<Path>) -> Result<(), IoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_vmesh(mesh, &mut writer)
}

/// Serialize a virtual mesh into memory
pub fn to_bytes(mesh: &VirtualMesh) -> Result<Vec<u8>, IoError> {
    let mut cursor = Cursor::new(Vec::new());
    write_vmesh(mesh, &mut cursor)?;
    Ok(cursor.into_inner())
}

fn split_header(bytes: &[u8]) -> Result<(VmeshHeader, &[u8]), IoError> {
    if bytes.len() < VMESH_HEADER_SIZE {
        return Err(IoError::InvalidFormat(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let (head, body) = bytes.split_at(VMESH_HEADER_SIZE);
    let mut raw = [0u8; VMESH_HEADER_SIZE];
    raw.copy_from_slice(head);
    Ok((VmeshHeader::from_bytes(&raw)?, body))
}

/// Decode a container, checking the CRC before anything else
pub fn from_bytes(bytes: &[u8]) -> Result<VirtualMesh, IoError> {
    let (header, body) = split_header(bytes)?;
    let actual = crc32fast::hash(body);
    if actual != header.crc32 {
        return Err(IoError::CrcMismatch {
            expected: header.crc32,
            actual,
        });
    }

    let cluster_records: Vec<ClusterRecord> = read_records(body, header.cluster_count as usize)?;
    let mut rest = &body[cluster_records.len() * std::mem::size_of::<ClusterRecord>()..];
    let group_records: Vec<GroupRecord> = read_records(rest, header.group_count as usize)?;
    rest = &rest[group_records.len() * std::mem::size_of::<GroupRecord>()..];

    let blocks = read_blocks(rest)?;
    let streams: [Vec<u8>; GeometryArena::STREAMS] = blocks
        .iter()
        .map(|b| b.to_vec())
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|v: Vec<Vec<u8>>| {
            IoError::InvalidFormat(format!(
                "expected {} geometry streams, found {}",
                GeometryArena::STREAMS,
                v.len()
            ))
        })?;

    let clusters = cluster_records
        .iter()
        .map(Cluster::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let groups = group_records
        .iter()
        .map(ClusterGroup::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let mesh = VirtualMesh {
        clusters,
        groups,
        arena: GeometryArena::from_streams(streams),
        lod_count: header.lod_count,
        input_triangles: header.input_triangles as usize,
    };
    check_loaded(&mesh)?;
    Ok(mesh)
}

fn check_loaded(mesh: &VirtualMesh) -> Result<(), IoError> {
    let invalid = |e: crate::error::BuildError| IoError::InvalidFormat(e.to_string());
    for (i, c) in mesh.clusters.iter().enumerate() {
        if c.id as usize != i {
            return Err(IoError::InvalidFormat(format!("cluster {} stored at index {}", c.id, i)));
        }
        if c.lod >= mesh.lod_count {
            return Err(IoError::InvalidFormat(format!(
                "cluster {} at LOD {} of {}",
                c.id, c.lod, mesh.lod_count
            )));
        }
        c.validate(&mesh.arena).map_err(invalid)?;
    }
    for (i, g) in mesh.groups.iter().enumerate() {
        if g.id as usize != i {
            return Err(IoError::InvalidFormat(format!("group {} stored at index {}", g.id, i)));
        }
    }
    ClusterDag::from_mesh(mesh).validate().map_err(invalid)
}

/// Load a virtual mesh from a `.vmesh` file
pub fn load_vmesh(path: impl AsRef<Path>) -> Result<VirtualMesh, IoError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    from_bytes(&bytes)
}

/// Read only the header of a `.vmesh` file
pub fn read_header(path: impl AsRef<Path>) -> Result<VmeshHeader, IoError> {
    let mut file = File::open(path)?;
    let mut raw = [0u8; VMESH_HEADER_SIZE];
    file.read_exact(&mut raw)?;
    VmeshHeader::from_bytes(&raw)
}
