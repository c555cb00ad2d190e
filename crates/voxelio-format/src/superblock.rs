//! HDF5 superblock parsing for versions 0 through 3.

use crate::checksum;
use crate::cursor::ByteCursor;
use crate::error::FormatError;
use crate::signature::HDF5_SIGNATURE;

/// Cached B-tree and local heap addresses from a v0/v1 root symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSymbolTable {
    pub btree_address: u64,
    pub local_heap_address: u64,
}

/// Parsed HDF5 superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0-3).
    pub version: u8,
    /// Size of file addresses in bytes (2, 4, or 8).
    pub offset_size: u8,
    /// Size of lengths in bytes (2, 4, or 8).
    pub length_size: u8,
    /// Base address all other addresses are relative to.
    pub base_address: u64,
    /// End-of-file address, or `None` if undefined.
    pub eof_address: Option<u64>,
    /// Root group object header address.
    pub root_group_address: u64,
    /// Group leaf node K (v0/v1 only).
    pub group_leaf_node_k: Option<u16>,
    /// Group internal node K (v0/v1 only).
    pub group_internal_node_k: Option<u16>,
    /// Indexed storage internal node K (v1 only).
    pub indexed_storage_internal_node_k: Option<u16>,
    /// File consistency flags.
    pub consistency_flags: u32,
    /// Root group symbol table cached in the v0/v1 root entry.
    pub root_symbol_table: Option<RootSymbolTable>,
    /// Superblock extension address (v2/v3 only).
    pub superblock_extension_address: Option<u64>,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

fn defined(addr: Option<u64>, what: &str) -> Result<u64, FormatError> {
    addr.ok_or_else(|| FormatError::MalformedStructure(format!("undefined {what} address")))
}

impl Superblock {
    /// Parse a superblock from `data` whose first byte is the signature.
    ///
    /// With `verify_checksum`, the trailing checksum of a v2/v3 superblock
    /// is checked.
    pub fn parse(data: &[u8], verify_checksum: bool) -> Result<Superblock, FormatError> {
        let mut c = ByteCursor::new(data);
        if !c.check_signature(&HDF5_SIGNATURE) {
            return Err(FormatError::SignatureNotFound);
        }

        let version = c.read_u8()?;
        log::debug!("HDF5 superblock version {version}");
        match version {
            0 | 1 => Self::parse_v0v1(&mut c, version),
            2 | 3 => Self::parse_v2v3(&mut c, version, verify_checksum),
            v => Err(FormatError::UnsupportedVersion(v)),
        }
    }

    fn parse_v0v1(c: &mut ByteCursor<'_>, version: u8) -> Result<Superblock, FormatError> {
        // free-space version, root group entry version, reserved, shared header version
        c.skip(4)?;
        let offset_size = c.read_u8()?;
        let length_size = c.read_u8()?;
        validate_sizes(offset_size, length_size)?;
        c.skip(1)?;

        let group_leaf_node_k = c.read_u16()?;
        let group_internal_node_k = c.read_u16()?;
        let consistency_flags = c.read_u32()?;

        let indexed_storage_internal_node_k = if version == 1 {
            let k = c.read_u16()?;
            c.skip(2)?;
            Some(k)
        } else {
            None
        };

        let base_address = c.read_offset(offset_size)?.unwrap_or(0);
        let _free_space = c.read_offset(offset_size)?;
        let eof_address = c.read_offset(offset_size)?;
        let _driver_info = c.read_offset(offset_size)?;

        // Root group symbol table entry.
        let _link_name_offset = c.read_offset(offset_size)?;
        let root_group_address = defined(c.read_offset(offset_size)?, "root group")?;
        let cache_type = c.read_u32()?;
        c.skip(4)?;
        let mut scratch = c.sub_cursor(16)?;
        let root_symbol_table = if cache_type == 1 {
            let btree_address = scratch.read_offset(offset_size)?;
            let local_heap_address = scratch.read_offset(offset_size)?;
            match (btree_address, local_heap_address) {
                (Some(btree_address), Some(local_heap_address)) => Some(RootSymbolTable {
                    btree_address,
                    local_heap_address,
                }),
                _ => None,
            }
        } else {
            None
        };

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            group_leaf_node_k: Some(group_leaf_node_k),
            group_internal_node_k: Some(group_internal_node_k),
            indexed_storage_internal_node_k,
            consistency_flags,
            root_symbol_table,
            superblock_extension_address: None,
        })
    }

    fn parse_v2v3(
        c: &mut ByteCursor<'_>,
        version: u8,
        verify_checksum: bool,
    ) -> Result<Superblock, FormatError> {
        let offset_size = c.read_u8()?;
        let length_size = c.read_u8()?;
        validate_sizes(offset_size, length_size)?;
        let consistency_flags = c.read_u8()? as u32;

        let base_address = c.read_offset(offset_size)?.unwrap_or(0);
        let superblock_extension_address = c.read_offset(offset_size)?;
        let eof_address = c.read_offset(offset_size)?;
        let root_group_address = defined(c.read_offset(offset_size)?, "root group")?;

        let covered = c.tell();
        let stored = c.read_u32()?;
        if verify_checksum {
            checksum::verify(&c.data()[..covered], stored)?;
        }

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_group_address,
            group_leaf_node_k: None,
            group_internal_node_k: None,
            indexed_storage_internal_node_k: None,
            consistency_flags,
            root_symbol_table: None,
            superblock_extension_address,
        })
    }
}
