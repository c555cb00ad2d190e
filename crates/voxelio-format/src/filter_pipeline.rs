//! HDF5 Filter Pipeline message parsing (message type 0x000B).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

pub const FILTER_DEFLATE: u16 = 1;
/// Byte shuffle; client data holds the element size.
pub const FILTER_SHUFFLE: u16 = 2;

/// Description of a single filter in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    pub filter_id: u16,
    /// Optional filter name.
    pub name: Option<String>,
    /// Filter flags (bit 0 = optional).
    pub flags: u16,
    pub client_data: Vec<u32>,
}

/// An ordered filter pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPipeline {
    pub version: u8,
    pub filters: Vec<FilterDescription>,
}

impl FilterPipeline {
    /// Parse a filter pipeline message payload.
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        let count = c.read_u8()? as usize;
        if version == 1 {
            c.skip(6)?;
        } else if version != 2 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "filter pipeline",
                version,
            });
        }

        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let filter_id = c.read_u16()?;
            // v2 omits the name length for library-defined filters.
            let name_length = if version == 1 || filter_id >= 256 {
                c.read_u16()? as usize
            } else {
                0
            };
            let flags = c.read_u16()?;
            let num_client_data = c.read_u16()? as usize;

            let name = if name_length > 0 {
                let padded = if version == 1 {
                    (name_length + 7) & !7
                } else {
                    name_length
                };
                Some(c.read_string(padded)?)
            } else {
                None
            };

            let mut client_data = Vec::with_capacity(num_client_data);
            for _ in 0..num_client_data {
                client_data.push(c.read_u32()?);
            }
            if version == 1 && num_client_data % 2 == 1 {
                c.skip(4)?;
            }

            filters.push(FilterDescription {
                filter_id,
                name,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline { version, filters })
    }

    /// Fail with `UnsupportedFilter` on the first filter other than deflate
    /// or shuffle.
    pub fn require_supported(&self) -> Result<(), FormatError> {
        let known = |id: u16| id == FILTER_DEFLATE || id == FILTER_SHUFFLE;
        match self.filters.iter().find(|f| !known(f.filter_id)) {
            Some(f) => Err(FormatError::UnsupportedFilter(f.filter_id)),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
