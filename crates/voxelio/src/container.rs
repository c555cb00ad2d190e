//! The decoded volume: one typed buffer plus strided axis metadata.

use std::cell::OnceCell;

use voxelio_format::{ElementType, TypedArray};

use crate::dimension::{Dimension, Dimensions, TIME, XSPACE, YSPACE, ZSPACE};
use crate::error::Error;
use crate::transform::{self, AxisGeometry, Matrix4};

/// Cached voxel/world matrices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    pub v2w: Matrix4,
    pub w2v: Matrix4,
}

/// Position and extent of the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAxis {
    /// Stride in voxels.
    pub offset: usize,
    pub length: usize,
}

/// A volume's voxels and axes.
///
/// The buffer holds `voxel_count() * ncpp()` elements. Component `c` of the
/// voxel at axis coordinates `i` sits at `ncpp * Σ i[d] * offset[d] + c`.
/// Voxels are set once; after that only their values may change.
#[derive(Debug, Clone)]
pub struct VoxelContainer {
    dimensions: Dimensions,
    ncpp: usize,
    data: Option<TypedArray>,
    transforms: OnceCell<Transforms>,
}

impl VoxelContainer {
    /// An empty container over `dims`, slowest varying first.
    pub fn new(dims: Vec<Dimension>, ncpp: usize) -> Result<VoxelContainer, Error> {
        if ncpp == 0 {
            return Err(Error::InvalidHeader("zero components per voxel".into()));
        }
        if let Some(d) = dims.iter().find(|d| d.length == 0) {
            return Err(Error::InvalidHeader(format!("axis {} has no voxels", d.name)));
        }
        Ok(VoxelContainer {
            dimensions: Dimensions::new(dims),
            ncpp,
            data: None,
            transforms: OnceCell::new(),
        })
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    /// Axis names, slowest varying first.
    pub fn order(&self) -> Vec<&str> {
        self.dimensions.order()
    }

    /// Components per voxel.
    pub fn ncpp(&self) -> usize {
        self.ncpp
    }

    pub fn time(&self) -> Option<TimeAxis> {
        self.dimensions.get(TIME).map(|d| TimeAxis {
            offset: d.offset,
            length: d.length,
        })
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.voxel_count()
    }

    /// Elements the buffer must hold.
    pub fn expected_len(&self) -> usize {
        self.voxel_count().saturating_mul(self.ncpp)
    }

    /// Store the voxels. Fails if voxels were already set or `data` has the
    /// wrong length.
    pub fn set_data(&mut self, data: TypedArray) -> Result<(), Error> {
        if self.data.is_some() {
            return Err(Error::AlreadyPopulated);
        }
        if data.len() != self.expected_len() {
            return Err(Error::ShapeMismatch {
                expected: self.expected_len(),
                actual: data.len(),
            });
        }
        log::trace!(
            "container populated: {} {:?} elements, order {:?}",
            data.len(),
            data.element_type(),
            self.order()
        );
        self.data = Some(data);
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&TypedArray> {
        self.data.as_ref()
    }

    /// In-place access to voxel values.
    pub fn data_mut(&mut self) -> Option<&mut TypedArray> {
        self.data.as_mut()
    }

    pub fn into_data(self) -> Option<TypedArray> {
        self.data
    }

    pub fn element_type(&self) -> Option<ElementType> {
        self.data.as_ref().map(TypedArray::element_type)
    }

    /// Buffer index of the first component of voxel `(x, y, z)` at time `t`.
    /// Missing axes accept only coordinate 0.
    pub fn index(&self, x: usize, y: usize, z: usize, t: usize) -> Option<usize> {
        let mut voxel = 0usize;
        for (name, coord) in [(XSPACE, x), (YSPACE, y), (ZSPACE, z), (TIME, t)] {
            match self.dimensions.get(name) {
                Some(d) if coord < d.length => voxel += coord * d.offset,
                None if coord == 0 => {}
                _ => return None,
            }
        }
        Some(voxel * self.ncpp)
    }

    /// First component of voxel `(x, y, z)` at time `t`, widened.
    pub fn value(&self, x: usize, y: usize, z: usize, t: usize) -> Option<f64> {
        let i = self.index(x, y, z, t)?;
        self.data.as_ref()?.get_f64(i)
    }

    pub fn set_step(&mut self, name: &str, step: f64) -> Result<(), Error> {
        self.axis_mut(name)?.step = step;
        Ok(())
    }

    pub fn set_start(&mut self, name: &str, start: f64) -> Result<(), Error> {
        self.axis_mut(name)?.start = start;
        Ok(())
    }

    pub fn set_direction_cosines(&mut self, name: &str, cosines: [f64; 3]) -> Result<(), Error> {
        self.axis_mut(name)?.direction_cosines = transform::normalize(cosines);
        Ok(())
    }

    /// Mutable axis; drops the cached transforms.
    fn axis_mut(&mut self, name: &str) -> Result<&mut Dimension, Error> {
        self.transforms = OnceCell::new();
        self.dimensions
            .get_mut(name)
            .ok_or_else(|| Error::InvalidHeader(format!("no axis named {name}")))
    }

    /// Geometry of the x, y and z axes; a missing axis is a unit step along
    /// its canonical direction.
    pub fn spatial_geometry(&self) -> [AxisGeometry; 3] {
        [XSPACE, YSPACE, ZSPACE].map(|name| match self.dimensions.get(name) {
            Some(d) => d.geometry(),
            None => Dimension::new(name, 1).geometry(),
        })
    }

    /// Voxel-to-world and world-to-voxel matrices, computed on first use.
    pub fn transforms(&self) -> Result<&Transforms, Error> {
        if let Some(t) = self.transforms.get() {
            return Ok(t);
        }
        let v2w = transform::voxel_to_world_matrix(&self.spatial_geometry());
        let w2v = transform::invert_affine(&v2w)
            .ok_or_else(|| Error::InvalidHeader("axes do not span 3D space".into()))?;
        Ok(self.transforms.get_or_init(|| Transforms { v2w, w2v }))
    }

    /// `(x, y, z)` voxel coordinates to world coordinates.
    pub fn voxel_to_world(&self, voxel: [f64; 3]) -> Result<[f64; 3], Error> {
        Ok(transform::apply(&self.transforms()?.v2w, voxel))
    }

    pub fn world_to_voxel(&self, world: [f64; 3]) -> Result<[f64; 3], Error> {
        Ok(transform::apply(&self.transforms()?.w2v, world))
    }
}

/// Interleaved RGB to RGBA with opaque alpha.
pub(crate) fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        out.extend_from_slice(px);
        out.push(255);
    }
    out
}
