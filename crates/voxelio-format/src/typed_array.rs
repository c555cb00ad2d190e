//! Typed element buffers shared by the HDF5 reader and the voxel model.

use byteorder::{ByteOrder, NativeEndian};

use crate::error::FormatError;

/// The nine primitive element codes a dataset or attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    String,
}

impl ElementType {
    /// Size of one element in bytes. Strings are sized by their datatype.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
            ElementType::String => 0,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float() && self != ElementType::String
    }

    /// Full representable range, used when a volume carries no valid range.
    pub fn natural_range(self) -> (f64, f64) {
        match self {
            ElementType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            ElementType::Uint8 => (0.0, u8::MAX as f64),
            ElementType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            ElementType::Uint16 => (0.0, u16::MAX as f64),
            ElementType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            ElementType::Uint32 => (0.0, u32::MAX as f64),
            ElementType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            ElementType::Float64 | ElementType::String => (f64::MIN, f64::MAX),
        }
    }
}

/// A contiguous buffer of one numeric element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            TypedArray::I8($v) => $body,
            TypedArray::U8($v) => $body,
            TypedArray::I16($v) => $body,
            TypedArray::U16($v) => $body,
            TypedArray::I32($v) => $body,
            TypedArray::U32($v) => $body,
            TypedArray::F32($v) => $body,
            TypedArray::F64($v) => $body,
        }
    };
}

impl TypedArray {
    /// `len` zeroed elements.
    pub fn zeros(element_type: ElementType, len: usize) -> Result<TypedArray, FormatError> {
        Ok(match element_type {
            ElementType::Int8 => TypedArray::I8(vec![0; len]),
            ElementType::Uint8 => TypedArray::U8(vec![0; len]),
            ElementType::Int16 => TypedArray::I16(vec![0; len]),
            ElementType::Uint16 => TypedArray::U16(vec![0; len]),
            ElementType::Int32 => TypedArray::I32(vec![0; len]),
            ElementType::Uint32 => TypedArray::U32(vec![0; len]),
            ElementType::Float32 => TypedArray::F32(vec![0.0; len]),
            ElementType::Float64 => TypedArray::F64(vec![0.0; len]),
            ElementType::String => return Err(FormatError::UnsupportedDatatype(3)),
        })
    }

    /// Decode native-order bytes. Trailing bytes that do not form a whole
    /// element are ignored.
    pub fn from_ne_bytes(element_type: ElementType, bytes: &[u8]) -> Result<TypedArray, FormatError> {
        let width = element_type.size();
        if width == 0 {
            return Err(FormatError::UnsupportedDatatype(3));
        }
        let n = bytes.len() / width;
        let src = &bytes[..n * width];
        let mut out = TypedArray::zeros(element_type, n)?;
        match &mut out {
            TypedArray::I8(v) => {
                for (d, &s) in v.iter_mut().zip(src) {
                    *d = s as i8;
                }
            }
            TypedArray::U8(v) => v.copy_from_slice(src),
            TypedArray::I16(v) => NativeEndian::read_i16_into(src, v),
            TypedArray::U16(v) => NativeEndian::read_u16_into(src, v),
            TypedArray::I32(v) => NativeEndian::read_i32_into(src, v),
            TypedArray::U32(v) => NativeEndian::read_u32_into(src, v),
            TypedArray::F32(v) => NativeEndian::read_f32_into(src, v),
            TypedArray::F64(v) => NativeEndian::read_f64_into(src, v),
        }
        Ok(out)
    }

    /// Decode bytes stored in the given byte order.
    pub fn from_bytes(
        element_type: ElementType,
        bytes: &[u8],
        big_endian: bool,
    ) -> Result<TypedArray, FormatError> {
        let width = element_type.size();
        let native_big = cfg!(target_endian = "big");
        if big_endian == native_big || width <= 1 {
            return Self::from_ne_bytes(element_type, bytes);
        }
        let mut swapped = bytes.to_vec();
        swap_in_place(&mut swapped, width);
        Self::from_ne_bytes(element_type, &swapped)
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TypedArray::I8(_) => ElementType::Int8,
            TypedArray::U8(_) => ElementType::Uint8,
            TypedArray::I16(_) => ElementType::Int16,
            TypedArray::U16(_) => ElementType::Uint16,
            TypedArray::I32(_) => ElementType::Int32,
            TypedArray::U32(_) => ElementType::Uint32,
            TypedArray::F32(_) => ElementType::Float32,
            TypedArray::F64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        each_variant!(self, v => v.get(i).map(|&x| x as f64))
    }

    /// Store `val` at `i`, rounding and saturating for integer buffers.
    /// Returns false when `i` is out of range.
    pub fn set_f64(&mut self, i: usize, val: f64) -> bool {
        let is_int = self.element_type().is_integer();
        let val = if is_int { val.round() } else { val };
        each_variant!(self, v => match v.get_mut(i) {
            Some(slot) => {
                // `as` from f64 saturates at the integer bounds and maps NaN to 0.
                *slot = val as _;
                true
            }
            None => false,
        })
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_variant!(self, v => v.iter().map(|&x| x as f64).collect())
    }

    /// Copy `src` into `self[start..start + src.len()]`. Both buffers must
    /// share an element type.
    pub fn copy_from(&mut self, start: usize, src: &TypedArray) -> Result<(), FormatError> {
        let end = start.checked_add(src.len()).filter(|&e| e <= self.len());
        let Some(end) = end else {
            return Err(FormatError::MalformedStructure(format!(
                "copy of {} elements at {start} overruns a buffer of {}",
                src.len(),
                self.len()
            )));
        };
        match (self, src) {
            (TypedArray::I8(d), TypedArray::I8(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::U8(d), TypedArray::U8(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::I16(d), TypedArray::I16(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::U16(d), TypedArray::U16(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::I32(d), TypedArray::I32(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::U32(d), TypedArray::U32(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::F32(d), TypedArray::F32(s)) => d[start..end].copy_from_slice(s),
            (TypedArray::F64(d), TypedArray::F64(s)) => d[start..end].copy_from_slice(s),
            _ => {
                return Err(FormatError::MalformedStructure(
                    "copy between buffers of different element types".into(),
                ))
            }
        }
        Ok(())
    }
}

/// Reverse the bytes of every `width`-byte element.
pub fn swap_in_place(bytes: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    for elem in bytes.chunks_exact_mut(width) {
        elem.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_native_f32() {
        let mut bytes = Vec::new();
        for v in [1.5f32, -2.0, 3.25] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        let arr = TypedArray::from_ne_bytes(ElementType::Float32, &bytes).unwrap();
        assert_eq!(arr, TypedArray::F32(vec![1.5, -2.0, 3.25]));
    }

    #[test]
    fn decode_big_endian_i16() {
        let bytes = [0x01, 0x00, 0xFF, 0xFE];
        let arr = TypedArray::from_bytes(ElementType::Int16, &bytes, true).unwrap();
        assert_eq!(arr, TypedArray::I16(vec![256, -2]));
    }

    #[test]
    fn decode_little_endian_u32() {
        let bytes = [0x78, 0x56, 0x34, 0x12];
        let arr = TypedArray::from_bytes(ElementType::Uint32, &bytes, false).unwrap();
        assert_eq!(arr, TypedArray::U32(vec![0x1234_5678]));
    }

    #[test]
    fn int8_reinterprets_bytes() {
        let arr = TypedArray::from_ne_bytes(ElementType::Int8, &[0xFF, 0x7F]).unwrap();
        assert_eq!(arr, TypedArray::I8(vec![-1, 127]));
    }

    #[test]
    fn set_f64_rounds_and_saturates() {
        let mut arr = TypedArray::zeros(ElementType::Uint8, 3).unwrap();
        assert!(arr.set_f64(0, 2.6));
        assert!(arr.set_f64(1, 300.0));
        assert!(arr.set_f64(2, -4.0));
        assert!(!arr.set_f64(3, 1.0));
        assert_eq!(arr, TypedArray::U8(vec![3, 255, 0]));
    }

    #[test]
    fn set_f64_keeps_float_fraction() {
        let mut arr = TypedArray::zeros(ElementType::Float64, 1).unwrap();
        arr.set_f64(0, 0.125);
        assert_eq!(arr.get_f64(0), Some(0.125));
    }

    #[test]
    fn copy_from_checks_bounds_and_type() {
        let mut dst = TypedArray::zeros(ElementType::Int32, 4).unwrap();
        dst.copy_from(1, &TypedArray::I32(vec![7, 8])).unwrap();
        assert_eq!(dst, TypedArray::I32(vec![0, 7, 8, 0]));
        assert!(dst.copy_from(3, &TypedArray::I32(vec![1, 2])).is_err());
        assert!(dst.copy_from(0, &TypedArray::U8(vec![1])).is_err());
    }

    #[test]
    fn string_has_no_numeric_buffer() {
        assert!(TypedArray::zeros(ElementType::String, 1).is_err());
    }
}
