//! NIfTI-1 single-file header (`.nii`).
//!
//! The header is a fixed 348-byte record. Its byte order is not stored
//! anywhere; it is whichever order makes `sizeof_hdr` read as 348.

use crate::cursor::{ByteCursor, Endian};
use crate::error::FormatError;
use crate::typed_array::{ElementType, TypedArray};

/// Size of the header record.
pub const HEADER_SIZE: usize = 348;
/// Magic of a single-file image, at byte 344.
pub const MAGIC_SINGLE: &[u8; 4] = b"n+1\0";
const MAGIC_OFFSET: usize = 344;
/// First byte a single-file image may store voxels at: the header plus the
/// 4-byte extension flag.
pub const MIN_VOX_OFFSET: usize = HEADER_SIZE + 4;

/// Voxel datatypes this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiDatatype {
    Uint8,
    Int16,
    Int32,
    Float32,
    Float64,
    Int8,
    Uint16,
    Uint32,
    /// Three interleaved uint8 channels.
    Rgb24,
}

impl NiftiDatatype {
    pub fn from_code(code: i16) -> Result<NiftiDatatype, FormatError> {
        Ok(match code {
            2 => NiftiDatatype::Uint8,
            4 => NiftiDatatype::Int16,
            8 => NiftiDatatype::Int32,
            16 => NiftiDatatype::Float32,
            64 => NiftiDatatype::Float64,
            128 => NiftiDatatype::Rgb24,
            256 => NiftiDatatype::Int8,
            512 => NiftiDatatype::Uint16,
            768 => NiftiDatatype::Uint32,
            other => return Err(FormatError::UnsupportedNiftiDatatype(other)),
        })
    }

    pub fn code(self) -> i16 {
        match self {
            NiftiDatatype::Uint8 => 2,
            NiftiDatatype::Int16 => 4,
            NiftiDatatype::Int32 => 8,
            NiftiDatatype::Float32 => 16,
            NiftiDatatype::Float64 => 64,
            NiftiDatatype::Rgb24 => 128,
            NiftiDatatype::Int8 => 256,
            NiftiDatatype::Uint16 => 512,
            NiftiDatatype::Uint32 => 768,
        }
    }

    /// Element type of one component.
    pub fn element_type(self) -> ElementType {
        match self {
            NiftiDatatype::Uint8 | NiftiDatatype::Rgb24 => ElementType::Uint8,
            NiftiDatatype::Int16 => ElementType::Int16,
            NiftiDatatype::Int32 => ElementType::Int32,
            NiftiDatatype::Float32 => ElementType::Float32,
            NiftiDatatype::Float64 => ElementType::Float64,
            NiftiDatatype::Int8 => ElementType::Int8,
            NiftiDatatype::Uint16 => ElementType::Uint16,
            NiftiDatatype::Uint32 => ElementType::Uint32,
        }
    }

    /// Components stored per voxel.
    pub fn components(self) -> usize {
        if self == NiftiDatatype::Rgb24 {
            3
        } else {
            1
        }
    }

    pub fn bytes_per_voxel(self) -> usize {
        self.element_type().size() * self.components()
    }
}

/// The fields of a NIfTI-1 header this crate uses.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// The header and voxels are stored in the non-native byte order.
    pub must_swap: bool,
    pub endian: Endian,
    /// `dim[0]` is the number of dimensions in use.
    pub dim: [i16; 8],
    pub intent_code: i16,
    pub datatype: NiftiDatatype,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub xyzt_units: u8,
    pub descrip: String,
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern_b: f32,
    pub quatern_c: f32,
    pub quatern_d: f32,
    pub qoffset: [f32; 3],
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
}

fn read_f32s<const N: usize>(c: &mut ByteCursor<'_>) -> Result<[f32; N], FormatError> {
    let mut out = [0f32; N];
    for v in &mut out {
        *v = c.read_f32()?;
    }
    Ok(out)
}

impl NiftiHeader {
    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<NiftiHeader, FormatError> {
        if data.len() < HEADER_SIZE {
            return Err(FormatError::NotNifti1);
        }
        let endian = match &data[..4] {
            [0x5c, 0x01, 0x00, 0x00] => Endian::Little,
            [0x00, 0x00, 0x01, 0x5c] => Endian::Big,
            _ => return Err(FormatError::NotNifti1),
        };
        if &data[MAGIC_OFFSET..MAGIC_OFFSET + 4] != MAGIC_SINGLE {
            return Err(FormatError::NotNifti1);
        }

        let mut c = ByteCursor::with_endian(data, endian);
        c.seek(40)?;
        let mut dim = [0i16; 8];
        for d in &mut dim {
            *d = c.read_i16()?;
        }
        if !(3..=4).contains(&dim[0]) {
            return Err(FormatError::UnsupportedDimensionality(dim[0]));
        }
        c.skip(12)?; // intent_p1..p3
        let intent_code = c.read_i16()?;
        let datatype = NiftiDatatype::from_code(c.read_i16()?)?;
        let bitpix = c.read_i16()?;
        c.skip(2)?; // slice_start
        let pixdim = read_f32s::<8>(&mut c)?;
        let vox_offset = c.read_f32()?;
        let scl_slope = c.read_f32()?;
        let scl_inter = c.read_f32()?;
        c.skip(3)?; // slice_end, slice_code
        let xyzt_units = c.read_u8()?;
        c.skip(24)?; // cal_max .. glmin
        let descrip = c.read_string(80)?;
        c.skip(24)?; // aux_file
        let qform_code = c.read_i16()?;
        let sform_code = c.read_i16()?;
        let [quatern_b, quatern_c, quatern_d] = read_f32s::<3>(&mut c)?;
        let qoffset = read_f32s::<3>(&mut c)?;
        let srow_x = read_f32s::<4>(&mut c)?;
        let srow_y = read_f32s::<4>(&mut c)?;
        let srow_z = read_f32s::<4>(&mut c)?;

        if vox_offset.is_nan() || vox_offset < MIN_VOX_OFFSET as f32 {
            return Err(FormatError::MalformedStructure(format!(
                "vox_offset {vox_offset} overlaps the header or extension flag"
            )));
        }
        if bitpix as usize != datatype.bytes_per_voxel() * 8 {
            log::debug!(
                "bitpix {bitpix} disagrees with datatype {}; using the datatype",
                datatype.code()
            );
        }

        Ok(NiftiHeader {
            must_swap: endian != Endian::native(),
            endian,
            dim,
            intent_code,
            datatype,
            bitpix,
            pixdim,
            vox_offset,
            scl_slope,
            scl_inter,
            xyzt_units,
            descrip,
            qform_code,
            sform_code,
            quatern_b,
            quatern_c,
            quatern_d,
            qoffset,
            srow_x,
            srow_y,
            srow_z,
        })
    }

    /// Number of dimensions in use (3 or 4).
    pub fn ndim(&self) -> usize {
        self.dim[0] as usize
    }

    /// Length of axis `i` (0 = x), at least 1.
    pub fn axis_len(&self, i: usize) -> usize {
        if i < self.ndim() {
            self.dim[i + 1].max(1) as usize
        } else {
            1
        }
    }

    /// Voxel count over every axis in use.
    pub fn voxel_count(&self) -> usize {
        (0..self.ndim()).map(|i| self.axis_len(i)).product()
    }

    /// Decode the voxel region, swapping bytes as needed. RGB volumes come
    /// back as interleaved components.
    pub fn read_voxels(&self, data: &[u8]) -> Result<TypedArray, FormatError> {
        let element_type = self.datatype.element_type();
        let count = self.voxel_count() * self.datatype.components();
        let mut c = ByteCursor::with_endian(data, self.endian);
        c.seek(self.vox_offset as usize)?;
        let bytes = c.read_array_bytes(count, element_type.size())?;
        TypedArray::from_ne_bytes(element_type, &bytes)
    }
}
