//! HDF5 local heap: name storage for v1 symbol-table groups.

use crate::cursor::{check_address, ByteCursor};
use crate::error::FormatError;

/// Parsed local heap header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeap {
    pub data_segment_size: u64,
    pub free_list_head_offset: Option<u64>,
    pub data_segment_address: u64,
}

impl LocalHeap {
    /// Parse the `HEAP` header at `address`.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<LocalHeap, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"HEAP", "HEAP")?;
        let version = c.read_u8()?;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "local heap",
                version,
            });
        }
        c.skip(3)?;
        let data_segment_size = c.read_length(length_size)?;
        let free_list = c.read_length(length_size)?;
        // All-ones in a length-sized field marks an empty free list.
        let free_list_head_offset = if free_list == u64::MAX >> (64 - 8 * length_size as u32) {
            None
        } else {
            Some(free_list)
        };
        let data_segment_address = c.read_offset(offset_size)?.ok_or_else(|| {
            FormatError::MalformedStructure("local heap without a data segment".into())
        })?;
        Ok(LocalHeap {
            data_segment_size,
            free_list_head_offset,
            data_segment_address,
        })
    }

    /// The NUL-terminated string at `offset` inside the data segment.
    pub fn read_string(&self, data: &[u8], offset: u64) -> Result<String, FormatError> {
        let start = self.data_segment_address.checked_add(offset).ok_or(
            FormatError::AddressOutOfRange {
                address: u64::MAX,
                limit: data.len() as u64,
            },
        )?;
        let start = check_address(start, data.len())?;
        let seg_end = (self.data_segment_address.saturating_add(self.data_segment_size))
            .min(data.len() as u64) as usize;
        if start >= seg_end {
            return Err(FormatError::MalformedStructure(format!(
                "name offset {offset} outside local heap of {} bytes",
                self.data_segment_size
            )));
        }
        let mut c = ByteCursor::new(&data[..seg_end]);
        c.seek(start)?;
        c.read_cstring()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(strings: &[&str]) -> (Vec<u8>, Vec<u64>) {
        let mut segment = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(segment.len() as u64);
            segment.extend_from_slice(s.as_bytes());
            segment.push(0);
            segment.resize((segment.len() + 7) & !7, 0);
        }
        let mut buf = b"HEAP".to_vec();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&(segment.len() as u64).to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&32u64.to_le_bytes());
        buf.extend_from_slice(&segment);
        (buf, offsets)
    }

    #[test]
    fn reads_names() {
        let (data, offsets) = build(&["", "image", "xspace"]);
        let heap = LocalHeap::parse(&data, 0, 8, 8).unwrap();
        assert_eq!(heap.data_segment_address, 32);
        assert_eq!(heap.free_list_head_offset, None);
        assert_eq!(heap.read_string(&data, offsets[0]).unwrap(), "");
        assert_eq!(heap.read_string(&data, offsets[1]).unwrap(), "image");
        assert_eq!(heap.read_string(&data, offsets[2]).unwrap(), "xspace");
    }

    #[test]
    fn offset_outside_segment() {
        let (data, _) = build(&["a"]);
        let heap = LocalHeap::parse(&data, 0, 8, 8).unwrap();
        assert!(heap.read_string(&data, 64).is_err());
    }

    #[test]
    fn wrong_signature() {
        let (mut data, _) = build(&["a"]);
        data[0] = b'X';
        assert!(matches!(
            LocalHeap::parse(&data, 0, 8, 8),
            Err(FormatError::InvalidSignature { .. })
        ));
    }
}
