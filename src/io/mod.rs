//! Persistence for built virtual meshes
//!
//! - `.vmesh`: binary container with a CRC32-checked body of fixed-size
//!   cluster and group records followed by the six geometry streams.
//! - `.json`: human-readable manifest with per-LOD statistics. Written for
//!   inspection only; it does not carry geometry.
//!
//! # Layout
//! - **Streaming Write**: body CRC computed on the fly, header patched after.
//! - **CRC-First Read**: integrity is checked before any record is decoded.
//!
//! Author: Moroya Sakamoto

mod container;
mod manifest;
mod payload;
pub mod records;

pub use container::{
    from_bytes, load_vmesh, read_header, save_vmesh, to_bytes, write_vmesh, VmeshHeader,
    VMESH_HEADER_SIZE, VMESH_MAGIC, VMESH_VERSION,
};
pub use manifest::{load_manifest, save_manifest, ClusterSummary, GroupSummary, Manifest};
pub use payload::{read_blocks, write_blocks};
pub use records::{ClusterRecord, GroupRecord, MipRecord, NO_GROUP};

use std::path::Path;
use thiserror::Error;

/// File I/O errors
#[derive(Error, Debug)]
pub enum IoError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// CRC checksum mismatch
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// CRC stored in the header
        expected: u32,
        /// CRC of the body as read
        actual: u32,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unsupported file version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// A count does not fit its fixed-size field
    #[error("{what} exceeds capacity {capacity}")]
    CapacityExceeded {
        /// Which list or counter overflowed
        what: &'static str,
        /// Largest representable value
        capacity: usize,
    },
}

/// One-line description of a `.vmesh` file from its header alone
pub fn get_info(path: impl AsRef<Path>) -> Result<String, IoError> {
    let header = read_header(path)?;
    Ok(format!(
        "vmesh v{}: {} clusters, {} groups, {} LODs, {} input triangles, crc {:#010x}",
        header.version,
        header.cluster_count,
        header.group_count,
        header.lod_count,
        header.input_triangles,
        header.crc32
    ))
}
