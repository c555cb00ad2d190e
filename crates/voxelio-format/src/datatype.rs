//! HDF5 Datatype message parsing (message type 0x0003).
//!
//! Only the classes a volume file needs are read: fixed-point integers of
//! 1, 2 or 4 bytes, IEEE binary32/binary64 floats and fixed-length strings.

use crate::cursor::ByteCursor;
use crate::error::FormatError;
use crate::typed_array::ElementType;

const CLASS_FIXED_POINT: u8 = 0;
const CLASS_FLOATING_POINT: u8 = 1;
const CLASS_STRING: u8 = 3;

/// A parsed datatype reduced to what element decoding needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datatype {
    pub element_type: ElementType,
    /// Size of one element in bytes (string length for strings).
    pub size: u32,
    pub big_endian: bool,
}

impl Datatype {
    /// Parse a datatype message. Returns the datatype and the number of
    /// bytes consumed, which attribute messages need when they are not
    /// padded.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        let mut c = ByteCursor::new(data);
        let class_and_version = c.read_u8()?;
        let class = class_and_version & 0x0F;
        let version = class_and_version >> 4;
        if !(1..=3).contains(&version) {
            return Err(FormatError::InvalidStructureVersion {
                structure: "datatype",
                version,
            });
        }
        let bits0 = c.read_u8()?;
        let _bits1 = c.read_u8()?;
        let _bits2 = c.read_u8()?;
        let size = c.read_u32()?;

        let dt = match class {
            CLASS_FIXED_POINT => {
                let _bit_offset = c.read_u16()?;
                let _precision = c.read_u16()?;
                let signed = bits0 & 0x08 != 0;
                let element_type = match (size, signed) {
                    (1, true) => ElementType::Int8,
                    (1, false) => ElementType::Uint8,
                    (2, true) => ElementType::Int16,
                    (2, false) => ElementType::Uint16,
                    (4, true) => ElementType::Int32,
                    (4, false) => ElementType::Uint32,
                    (other, _) => return Err(FormatError::UnsupportedIntegerSize(other)),
                };
                Datatype {
                    element_type,
                    size,
                    big_endian: bits0 & 0x01 != 0,
                }
            }
            CLASS_FLOATING_POINT => {
                let _bit_offset = c.read_u16()?;
                let _precision = c.read_u16()?;
                let exponent_location = c.read_u8()?;
                let _exponent_size = c.read_u8()?;
                let _mantissa_location = c.read_u8()?;
                let mantissa_size = c.read_u8()?;
                let _exponent_bias = c.read_u32()?;
                // Bit 6 set with bit 0 is VAX order, which we do not read.
                let vax = bits0 & 0x41 == 0x41;
                let element_type = match (size, exponent_location, mantissa_size, vax) {
                    (4, 23, 23, false) => ElementType::Float32,
                    (8, 52, 52, false) => ElementType::Float64,
                    _ => {
                        return Err(FormatError::UnsupportedFloatLayout {
                            size,
                            exponent_location,
                            mantissa_size,
                        })
                    }
                };
                Datatype {
                    element_type,
                    size,
                    big_endian: bits0 & 0x01 != 0,
                }
            }
            CLASS_STRING => Datatype {
                element_type: ElementType::String,
                size,
                big_endian: false,
            },
            other => return Err(FormatError::UnsupportedDatatype(other)),
        };
        Ok((dt, c.tell()))
    }
}
