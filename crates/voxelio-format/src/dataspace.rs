//! HDF5 Dataspace message parsing (message type 0x0001).

use crate::cursor::ByteCursor;
use crate::error::FormatError;

/// Dataspace type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    Scalar,
    Simple,
    Null,
}

/// Parsed dataspace: the shape of a dataset or attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    pub space_type: DataspaceType,
    /// Current dimension sizes, slowest-varying first.
    pub dims: Vec<u64>,
    pub max_dims: Option<Vec<u64>>,
}

impl Dataspace {
    /// Parse a dataspace message payload.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        let rank = c.read_u8()? as usize;
        let flags = c.read_u8()?;

        let space_type = match version {
            1 => {
                c.skip(5)?;
                if rank == 0 {
                    DataspaceType::Scalar
                } else {
                    DataspaceType::Simple
                }
            }
            2 => match c.read_u8()? {
                0 => DataspaceType::Scalar,
                1 => DataspaceType::Simple,
                2 => DataspaceType::Null,
                t => return Err(FormatError::InvalidDataspaceType(t)),
            },
            v => {
                return Err(FormatError::InvalidStructureVersion {
                    structure: "dataspace",
                    version: v,
                })
            }
        };

        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(c.read_length(length_size)?);
        }
        let max_dims = if flags & 0x01 != 0 {
            let mut m = Vec::with_capacity(rank);
            for _ in 0..rank {
                m.push(c.read_length(length_size)?);
            }
            Some(m)
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dims,
            max_dims,
        })
    }

    /// Total element count: 1 for a scalar, 0 for a null space.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Null => 0,
            DataspaceType::Scalar => 1,
            DataspaceType::Simple => self.dims.iter().product(),
        }
    }
}
