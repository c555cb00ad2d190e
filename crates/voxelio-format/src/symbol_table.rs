//! HDF5 Symbol Table message (0x0011) and symbol table nodes (`SNOD`).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

/// A v1 group's index: a B-tree of symbol nodes plus the heap of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableMessage {
    pub btree_address: u64,
    pub local_heap_address: u64,
}

impl SymbolTableMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<SymbolTableMessage, FormatError> {
        let mut c = ByteCursor::new(data);
        let btree_address = c.read_offset(offset_size)?;
        let local_heap_address = c.read_offset(offset_size)?;
        match (btree_address, local_heap_address) {
            (Some(btree_address), Some(local_heap_address)) => Ok(SymbolTableMessage {
                btree_address,
                local_heap_address,
            }),
            _ => Err(FormatError::MalformedStructure(
                "symbol table with undefined address".into(),
            )),
        }
    }
}

/// One entry of a symbol table node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Offset of the name in the group's local heap.
    pub link_name_offset: u64,
    pub object_header_address: u64,
    pub cache_type: u32,
}

/// A parsed `SNOD` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableNode {
    pub entries: Vec<SymbolTableEntry>,
}

impl SymbolTableNode {
    pub fn parse(data: &[u8], address: u64, offset_size: u8) -> Result<SymbolTableNode, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"SNOD", "SNOD")?;
        let version = c.read_u8()?;
        if version != 1 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "symbol table node",
                version,
            });
        }
        c.skip(1)?;
        let count = c.read_u16()? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let link_name_offset = c.read_offset(offset_size)?.unwrap_or(0);
            let object_header_address = c.read_offset(offset_size)?.ok_or_else(|| {
                FormatError::MalformedStructure("symbol with undefined object header".into())
            })?;
            let cache_type = c.read_u32()?;
            c.skip(4 + 16)?;
            entries.push(SymbolTableEntry {
                link_name_offset,
                object_header_address,
                cache_type,
            });
        }
        Ok(SymbolTableNode { entries })
    }
}
