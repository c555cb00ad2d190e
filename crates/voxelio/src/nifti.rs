//! NIfTI-1 single-file volumes.
//!
//! The voxel-to-world affine comes from the sform rows, the qform
//! quaternion, or the bare pixdim voxel sizes, in that order of
//! preference. It is then split into MINC axis geometry so NIfTI and MINC2
//! volumes share one container model.

use log::debug;
use voxelio_format::nifti_header::{NiftiDatatype, NiftiHeader};
use voxelio_format::TypedArray;

use crate::container::{rgb_to_rgba, VoxelContainer};
use crate::dimension::{Dimension, TIME, XSPACE, YSPACE, ZSPACE};
use crate::error::Error;
use crate::options::VolumeOptions;
use crate::transform::{self, Matrix4};

/// Which header fields produced the affine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSource {
    Sform,
    Qform,
    Pixdim,
}

/// The header's voxel-to-world affine and where it came from.
pub fn header_transform(h: &NiftiHeader) -> (Matrix4, TransformSource) {
    let f = |v: f32| v as f64;
    if h.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(f);
        let m = [row(h.srow_x), row(h.srow_y), row(h.srow_z), [0.0, 0.0, 0.0, 1.0]];
        return (m, TransformSource::Sform);
    }
    if h.qform_code > 0 {
        let m = transform::quaternion_to_matrix(
            [f(h.quatern_b), f(h.quatern_c), f(h.quatern_d)],
            h.qoffset.map(f),
            [f(h.pixdim[0]), f(h.pixdim[1]), f(h.pixdim[2]), f(h.pixdim[3])],
        );
        return (m, TransformSource::Qform);
    }
    let size = |i: usize| if h.pixdim[i] != 0.0 { f(h.pixdim[i]) } else { 1.0 };
    let mut m = transform::IDENTITY;
    for i in 0..3 {
        m[i][i] = size(i + 1);
    }
    (m, TransformSource::Pixdim)
}

/// Decode a whole `.nii` file.
pub fn decode(bytes: &[u8], options: &VolumeOptions) -> Result<VoxelContainer, Error> {
    let header = NiftiHeader::parse(bytes)?;
    debug!(
        "NIfTI-1 {:?} dim {:?}, {} endian",
        header.datatype,
        &header.dim[..=header.ndim()],
        if header.must_swap { "swapped" } else { "native" }
    );

    let (affine, source) = header_transform(&header);
    debug!("voxel-to-world transform from {source:?}");
    let geometry = transform::transform_to_minc(&affine)
        .ok_or_else(|| Error::InvalidHeader(format!("{source:?} transform is singular")))?;

    let mut dims = Vec::with_capacity(4);
    let frames = header.axis_len(3);
    if header.ndim() == 4 && frames > 1 {
        let step = match header.pixdim[4] {
            s if s != 0.0 => s as f64,
            _ => 1.0,
        };
        dims.push(Dimension::new(TIME, frames).with_step(step));
    }
    for (axis, name) in [(2, ZSPACE), (1, YSPACE), (0, XSPACE)] {
        dims.push(Dimension::new(name, header.axis_len(axis)).with_geometry(geometry[axis]));
    }

    let mut data = header.read_voxels(bytes)?;
    let mut ncpp = 1;
    if header.datatype == NiftiDatatype::Rgb24 {
        if let TypedArray::U8(rgb) = &data {
            data = TypedArray::U8(rgb_to_rgba(rgb));
        }
        ncpp = 4;
    } else if options.apply_scaling {
        data = rescale(data, header.scl_slope, header.scl_inter);
    }

    let mut container = VoxelContainer::new(dims, ncpp)?;
    container.set_data(data)?;
    Ok(container)
}

/// `v * slope + inter`, skipped when slope is 0 (or not finite) or the pair
/// is the identity. Integer voxels are promoted to float32 first.
pub fn rescale(data: TypedArray, slope: f32, inter: f32) -> TypedArray {
    if slope == 0.0 || !slope.is_finite() || (slope == 1.0 && inter == 0.0) {
        return data;
    }
    let inter = if inter.is_finite() { inter } else { 0.0 };
    debug!("applying scl_slope {slope} scl_inter {inter}");
    match data {
        TypedArray::F64(mut v) => {
            for x in &mut v {
                *x = *x * slope as f64 + inter as f64;
            }
            TypedArray::F64(v)
        }
        TypedArray::F32(mut v) => {
            for x in &mut v {
                *x = *x * slope + inter;
            }
            TypedArray::F32(v)
        }
        other => TypedArray::F32(
            other
                .to_f64_vec()
                .into_iter()
                .map(|x| (x * slope as f64 + inter as f64) as f32)
                .collect(),
        ),
    }
}
