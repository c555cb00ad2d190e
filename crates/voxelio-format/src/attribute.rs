//! HDF5 Attribute message parsing (message type 0x000C).

use crate::cursor::ByteCursor;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::typed_array::{ElementType, TypedArray};

/// Decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A single numeric element.
    Scalar(f64),
    /// More than one numeric element.
    Array(TypedArray),
    /// A fixed-length string, or several joined with commas.
    Text(String),
}

impl AttrValue {
    /// The value as one number: a scalar, or an array of length one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Scalar(v) => Some(*v),
            AttrValue::Array(a) if a.len() == 1 => a.get_f64(0),
            _ => None,
        }
    }

    /// Every numeric element, widened to `f64`.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            AttrValue::Scalar(v) => Some(vec![*v]),
            AttrValue::Array(a) => Some(a.to_f64_vec()),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A parsed attribute message.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMessage {
    pub name: String,
    pub value: AttrValue,
}

/// Round up to the next multiple of 8.
fn pad8(x: usize) -> usize {
    (x + 7) & !7
}

impl AttributeMessage {
    /// Parse an attribute message payload.
    pub fn parse(data: &[u8], length_size: u8) -> Result<AttributeMessage, FormatError> {
        let mut c = ByteCursor::new(data);
        let version = c.read_u8()?;
        if !(1..=3).contains(&version) {
            return Err(FormatError::InvalidStructureVersion {
                structure: "attribute",
                version,
            });
        }
        c.skip(1)?;
        let name_size = c.read_u16()? as usize;
        let datatype_size = c.read_u16()? as usize;
        let dataspace_size = c.read_u16()? as usize;
        if version == 3 {
            let _encoding = c.read_u8()?;
        }

        // Version 1 pads each field to 8 bytes; later versions do not.
        let field = |n: usize| if version == 1 { pad8(n) } else { n };

        let name_bytes = c.read_bytes(field(name_size))?;
        let name = extract_name(&name_bytes[..name_size.min(name_bytes.len())]);
        let dt_bytes = c.read_bytes(field(datatype_size))?;
        let (datatype, _) = Datatype::parse(dt_bytes)?;
        let ds_bytes = c.read_bytes(field(dataspace_size))?;
        let dataspace = Dataspace::parse(ds_bytes, length_size)?;

        let count = dataspace.num_elements() as usize;
        let width = datatype.size as usize;
        let raw = c.read_bytes(count.checked_mul(width).ok_or_else(|| {
            FormatError::MalformedStructure(format!("attribute {name} is too large"))
        })?)?;

        let value = decode_value(&datatype, count, raw)?;
        log::trace!("attribute {name:?} = {value:?}");
        Ok(AttributeMessage { name, value })
    }
}

fn decode_value(datatype: &Datatype, count: usize, raw: &[u8]) -> Result<AttrValue, FormatError> {
    if datatype.element_type == ElementType::String {
        let width = datatype.size as usize;
        if width == 0 {
            return Ok(AttrValue::Text(String::new()));
        }
        let parts: Vec<String> = raw.chunks(width).map(extract_name).collect();
        return Ok(AttrValue::Text(parts.join(",")));
    }
    let array = TypedArray::from_bytes(datatype.element_type, raw, datatype.big_endian)?;
    if count == 1 {
        if let Some(v) = array.get_f64(0) {
            return Ok(AttrValue::Scalar(v));
        }
    }
    Ok(AttrValue::Array(array))
}

/// Text up to the first NUL, with trailing space padding removed.
fn extract_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches(' ')
        .to_string()
}
