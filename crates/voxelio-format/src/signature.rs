//! HDF5 format signature detection.

use crate::error::FormatError;

/// The 8-byte HDF5 format signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Locate the superblock.
///
/// A user block may precede it, so the signature can sit at offset 0 or at
/// any power of two from 512 upward.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    let mut offset = 0usize;
    while offset + HDF5_SIGNATURE.len() <= data.len() {
        if data[offset..offset + HDF5_SIGNATURE.len()] == HDF5_SIGNATURE {
            return Ok(offset);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Err(FormatError::SignatureNotFound)
}
