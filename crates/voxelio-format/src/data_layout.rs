//! HDF5 Data Layout message parsing (message type 0x0008).
//!
//! Versions 1 and 2 share one field order; version 3 reorders the fields
//! per layout class.

use crate::cursor::ByteCursor;
use crate::error::FormatError;

const CLASS_COMPACT: u8 = 0;
const CLASS_CONTIGUOUS: u8 = 1;
const CLASS_CHUNKED: u8 = 2;

/// Where a dataset's raw bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Raw data stored inside the message.
    Compact { data: Vec<u8> },
    /// One contiguous run of bytes. Versions 1/2 leave the size implied by
    /// the dataspace.
    Contiguous {
        address: Option<u64>,
        size: Option<u64>,
    },
    /// Chunks indexed by a v1 B-tree.
    Chunked {
        btree_address: Option<u64>,
        /// Chunk shape, without the trailing element-size entry.
        chunk_dims: Vec<u32>,
        element_size: u32,
    },
}

fn split_chunk_dims(mut dims: Vec<u32>) -> Result<(Vec<u32>, u32), FormatError> {
    match dims.pop() {
        Some(element_size) if !dims.is_empty() => Ok((dims, element_size)),
        _ => Err(FormatError::MalformedStructure(
            "chunked layout with no dimensions".into(),
        )),
    }
}

impl DataLayout {
    /// Parse a data layout message payload.
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        let layout = match version {
            1 | 2 => Self::parse_v1v2(&mut c, offset_size)?,
            3 => Self::parse_v3(&mut c, offset_size, length_size)?,
            v => {
                return Err(FormatError::InvalidStructureVersion {
                    structure: "data layout",
                    version: v,
                })
            }
        };
        log::trace!("layout message v{version}: {layout:?}");
        Ok(layout)
    }

    fn parse_v1v2(c: &mut ByteCursor<'_>, offset_size: u8) -> Result<DataLayout, FormatError> {
        let ndims = c.read_u8()? as usize;
        let class = c.read_u8()?;
        c.skip(5)?;
        let address = if class != CLASS_COMPACT {
            c.read_offset(offset_size)?
        } else {
            None
        };
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dims.push(c.read_u32()?);
        }
        match class {
            CLASS_COMPACT => {
                let size = c.read_u32()? as usize;
                Ok(DataLayout::Compact {
                    data: c.read_bytes(size)?.to_vec(),
                })
            }
            CLASS_CONTIGUOUS => Ok(DataLayout::Contiguous {
                address,
                size: None,
            }),
            CLASS_CHUNKED => {
                let (chunk_dims, element_size) = split_chunk_dims(dims)?;
                Ok(DataLayout::Chunked {
                    btree_address: address,
                    chunk_dims,
                    element_size,
                })
            }
            other => Err(FormatError::InvalidLayoutClass(other)),
        }
    }

    fn parse_v3(
        c: &mut ByteCursor<'_>,
        offset_size: u8,
        length_size: u8,
    ) -> Result<DataLayout, FormatError> {
        match c.read_u8()? {
            CLASS_COMPACT => {
                let size = c.read_u16()? as usize;
                Ok(DataLayout::Compact {
                    data: c.read_bytes(size)?.to_vec(),
                })
            }
            CLASS_CONTIGUOUS => {
                let address = c.read_offset(offset_size)?;
                let size = c.read_length(length_size)?;
                Ok(DataLayout::Contiguous {
                    address,
                    size: Some(size),
                })
            }
            CLASS_CHUNKED => {
                let ndims = c.read_u8()? as usize;
                let btree_address = c.read_offset(offset_size)?;
                let mut dims = Vec::with_capacity(ndims);
                for _ in 0..ndims {
                    dims.push(c.read_u32()?);
                }
                let (chunk_dims, element_size) = split_chunk_dims(dims)?;
                Ok(DataLayout::Chunked {
                    btree_address,
                    chunk_dims,
                    element_size,
                })
            }
            other => Err(FormatError::InvalidLayoutClass(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_compact() {
        let data = [3, 0, 4, 0, 0xA, 0xB, 0xC, 0xD];
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Compact {
                data: vec![0xA, 0xB, 0xC, 0xD]
            }
        );
    }

    #[test]
    fn v3_contiguous() {
        let mut data = vec![3, 1];
        data.extend_from_slice(&0x800u64.to_le_bytes());
        data.extend_from_slice(&108u64.to_le_bytes());
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Contiguous {
                address: Some(0x800),
                size: Some(108)
            }
        );
    }

    #[test]
    fn v3_contiguous_undefined_address() {
        let mut data = vec![3, 1];
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            DataLayout::parse(&data, 4, 4).unwrap(),
            DataLayout::Contiguous {
                address: None,
                size: Some(0)
            }
        );
    }

    #[test]
    fn v3_chunked() {
        let mut data = vec![3, 2, 4];
        data.extend_from_slice(&0x400u64.to_le_bytes());
        for d in [1u32, 10, 10, 2] {
            data.extend_from_slice(&d.to_le_bytes());
        }
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Chunked {
                btree_address: Some(0x400),
                chunk_dims: vec![1, 10, 10],
                element_size: 2
            }
        );
    }

    #[test]
    fn v1_chunked_field_order() {
        let mut data = vec![1, 3, 2, 0, 0, 0, 0, 0];
        data.extend_from_slice(&0x300u64.to_le_bytes());
        for d in [6u32, 5, 2] {
            data.extend_from_slice(&d.to_le_bytes());
        }
        // last dimension is the element size; nothing follows it
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Chunked {
                btree_address: Some(0x300),
                chunk_dims: vec![6, 5],
                element_size: 2
            }
        );
    }

    #[test]
    fn v1_chunked_without_dimensions_is_malformed() {
        let mut data = vec![1, 1, 2, 0, 0, 0, 0, 0];
        data.extend_from_slice(&0x300u64.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            DataLayout::parse(&data, 8, 8),
            Err(FormatError::MalformedStructure(_))
        ));
    }

    #[test]
    fn v2_contiguous_size_implied() {
        let mut data = vec![2, 3, 1, 0, 0, 0, 0, 0];
        data.extend_from_slice(&0x200u64.to_le_bytes());
        for d in [3u32, 3, 3] {
            data.extend_from_slice(&d.to_le_bytes());
        }
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Contiguous {
                address: Some(0x200),
                size: None
            }
        );
    }

    #[test]
    fn v1_compact() {
        let mut data = vec![1, 1, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[7, 9]);
        assert_eq!(
            DataLayout::parse(&data, 8, 8).unwrap(),
            DataLayout::Compact { data: vec![7, 9] }
        );
    }

    #[test]
    fn invalid_class_and_version() {
        assert_eq!(
            DataLayout::parse(&[3, 7], 8, 8),
            Err(FormatError::InvalidLayoutClass(7))
        );
        assert!(matches!(
            DataLayout::parse(&[5, 0], 8, 8),
            Err(FormatError::InvalidStructureVersion { .. })
        ));
    }
}
