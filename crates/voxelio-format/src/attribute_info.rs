//! HDF5 Attribute Info message parsing (message type 0x0015).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

/// Where an object keeps attributes that did not fit in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfoMessage {
    pub max_creation_index: Option<u16>,
    /// Fractal heap holding dense attributes.
    pub fractal_heap_address: Option<u64>,
    /// v2 B-tree (record type 8) indexing attributes by name.
    pub btree_name_index_address: Option<u64>,
    pub btree_creation_order_address: Option<u64>,
}

impl AttributeInfoMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<AttributeInfoMessage, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "attribute info",
                version,
            });
        }
        let flags = c.read_u8()?;
        let max_creation_index = if flags & 0x01 != 0 {
            Some(c.read_u16()?)
        } else {
            None
        };
        let fractal_heap_address = c.read_offset(offset_size)?;
        let btree_name_index_address = c.read_offset(offset_size)?;
        let btree_creation_order_address = if flags & 0x02 != 0 {
            c.read_offset(offset_size)?
        } else {
            None
        };
        Ok(AttributeInfoMessage {
            max_creation_index,
            fractal_heap_address,
            btree_name_index_address,
            btree_creation_order_address,
        })
    }
}
