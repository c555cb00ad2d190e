//! HDF5 Link Info message parsing (message type 0x0002).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

/// Where a v2 group keeps its links when they are not stored inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfoMessage {
    pub max_creation_order: Option<u64>,
    /// Fractal heap holding dense links. `None` means compact storage.
    pub fractal_heap_address: Option<u64>,
    /// v2 B-tree indexing links by name.
    pub btree_name_index_address: Option<u64>,
    pub btree_creation_order_address: Option<u64>,
}

impl LinkInfoMessage {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkInfoMessage, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "link info",
                version,
            });
        }
        let flags = c.read_u8()?;
        let max_creation_order = if flags & 0x01 != 0 {
            Some(c.read_u64()?)
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
        Ok(LinkInfoMessage {
            max_creation_order,
            fractal_heap_address,
            btree_name_index_address,
            btree_creation_order_address,
        })
    }

    /// True when links live in a fractal heap rather than in link messages.
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_storage() {
        let mut data = vec![0, 0];
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let info = LinkInfoMessage::parse(&data, 8).unwrap();
        assert!(!info.is_dense());
        assert_eq!(info.btree_name_index_address, None);
    }

    #[test]
    fn dense_with_creation_order() {
        let mut data = vec![0, 0x03];
        data.extend_from_slice(&12u64.to_le_bytes());
        data.extend_from_slice(&0x100u32.to_le_bytes());
        data.extend_from_slice(&0x200u32.to_le_bytes());
        data.extend_from_slice(&0x300u32.to_le_bytes());
        let info = LinkInfoMessage::parse(&data, 4).unwrap();
        assert_eq!(info.max_creation_order, Some(12));
        assert_eq!(info.fractal_heap_address, Some(0x100));
        assert_eq!(info.btree_name_index_address, Some(0x200));
        assert_eq!(info.btree_creation_order_address, Some(0x300));
    }
}
