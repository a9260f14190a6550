//! Length-prefixed block table
//!
//! `u32` block count, one `u64` byte size per block, then the blocks back
//! to back. All integers little-endian.
//!
//! Author: Moroya Sakamoto

use super::IoError;
use std::io::Write;

/// Write `blocks` as a table of contents followed by their bytes
pub fn write_blocks<W: Write>(writer: &mut W, blocks: &[&[u8]]) -> Result<(), IoError> {
    let count = u32::try_from(blocks.len()).map_err(|_| IoError::CapacityExceeded {
        what: "payload block count",
        capacity: u32::MAX as usize,
    })?;
    writer.write_all(&count.to_le_bytes())?;
    for block in blocks {
        writer.write_all(&(block.len() as u64).to_le_bytes())?;
    }
    for block in blocks {
        writer.write_all(block)?;
    }
    Ok(())
}

/// Split a block table back into its blocks.
///
/// The table must account for every byte of `bytes`.
pub fn read_blocks(bytes: &[u8]) -> Result<Vec<&[u8]>, IoError> {
    let truncated = || IoError::InvalidFormat("truncated payload table".to_string());

    let count_bytes: [u8; 4] = bytes.get(..4).ok_or_else(truncated)?.try_into().map_err(|_| truncated())?;
    let count = u32::from_le_bytes(count_bytes) as usize;
    let table_end = count
        .checked_mul(8)
        .and_then(|n| n.checked_add(4))
        .ok_or_else(truncated)?;
    let table = bytes.get(4..table_end).ok_or_else(truncated)?;

    let mut blocks = Vec::with_capacity(count);
    let mut cursor = table_end;
    for size in table.chunks_exact(8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(size);
        let len = usize::try_from(u64::from_le_bytes(raw)).map_err(|_| truncated())?;
        let end = cursor.checked_add(len).ok_or_else(truncated)?;
        let block = bytes.get(cursor..end).ok_or_else(|| {
            IoError::InvalidFormat(format!(
                "payload block {} needs {} bytes, {} remain",
                blocks.len(),
                len,
                bytes.len().saturating_sub(cursor)
            ))
        })?;
        blocks.push(block);
        cursor = end;
    }
    if cursor != bytes.len() {
        return Err(IoError::InvalidFormat(format!(
            "{} trailing bytes after payload",
            bytes.len() - cursor
        )));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        let mut out = Vec::new();
        write_blocks(&mut out, &[&b"abc"[..], &b""[..], &b"de"[..]]).unwrap();
        assert_eq!(&out[..4], &3u32.to_le_bytes());
        assert_eq!(&out[4..12], &3u64.to_le_bytes());
        assert_eq!(out.len(), 4 + 3 * 8 + 5);
        let blocks = read_blocks(&out).unwrap();
        assert_eq!(blocks, vec![&b"abc"[..], &b""[..], &b"de"[..]]);
    }

    #[test]
    fn test_truncated_block_rejected() {
        let mut out = Vec::new();
        write_blocks(&mut out, &[&b"abcdef"[..]]).unwrap();
        out.pop();
        assert!(matches!(read_blocks(&out), Err(IoError::InvalidFormat(_))));
        assert!(read_blocks(&out[..3]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut out = Vec::new();
        write_blocks(&mut out, &[&b"x"[..]]).unwrap();
        out.push(0);
        assert!(read_blocks(&out).is_err());
    }
}
