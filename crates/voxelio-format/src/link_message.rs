//! HDF5 Link message parsing (message type 0x0006).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

const FLAG_CREATION_ORDER: u8 = 0x04;
const FLAG_LINK_TYPE: u8 = 0x08;
const FLAG_CHARSET: u8 = 0x10;

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address.
    Hard(u64),
    /// Path inside the same file.
    Soft(String),
    /// Link into another file; never followed.
    External,
}

/// A parsed link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub name: String,
    pub target: LinkTarget,
    pub creation_order: Option<u64>,
}

impl LinkMessage {
    /// Parse a link message payload. Dense groups store the same encoding
    /// as fractal heap objects.
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkMessage, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        if version != 1 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "link",
                version,
            });
        }
        let flags = c.read_u8()?;
        let link_type = if flags & FLAG_LINK_TYPE != 0 {
            c.read_u8()?
        } else {
            0
        };
        let creation_order = if flags & FLAG_CREATION_ORDER != 0 {
            Some(c.read_u64()?)
        } else {
            None
        };
        if flags & FLAG_CHARSET != 0 {
            let _charset = c.read_u8()?;
        }
        let name_len = c.read_var_uint(1 << (flags & 0x03))? as usize;
        let name = String::from_utf8_lossy(c.read_bytes(name_len)?).into_owned();

        let target = match link_type {
            0 => {
                let addr = c.read_offset(offset_size)?.ok_or_else(|| {
                    FormatError::MalformedStructure(format!("hard link {name:?} has no address"))
                })?;
                LinkTarget::Hard(addr)
            }
            1 => {
                let len = c.read_u16()? as usize;
                LinkTarget::Soft(String::from_utf8_lossy(c.read_bytes(len)?).into_owned())
            }
            _ => LinkTarget::External,
        };

        Ok(LinkMessage {
            name,
            target,
            creation_order,
        })
    }
}
