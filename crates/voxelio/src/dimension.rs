//! Volume axes.
//!
//! Dimensions live in one arena in storage order, slowest varying first.
//! Spatial axes name their two in-plane neighbours (`width_space`,
//! `height_space`) by arena index, so slice geometry can be looked up
//! without axes owning each other.

use crate::transform::{normalize, AxisGeometry};

pub const XSPACE: &str = "xspace";
pub const YSPACE: &str = "yspace";
pub const ZSPACE: &str = "zspace";
pub const TIME: &str = "time";
pub const VECTOR_DIMENSION: &str = "vector_dimension";

/// Unit vector along a spatial axis; zero for anything else.
pub fn default_cosines(name: &str) -> [f64; 3] {
    match name {
        XSPACE => [1.0, 0.0, 0.0],
        YSPACE => [0.0, 1.0, 0.0],
        ZSPACE => [0.0, 0.0, 1.0],
        _ => [0.0, 0.0, 0.0],
    }
}

pub fn is_spatial(name: &str) -> bool {
    matches!(name, XSPACE | YSPACE | ZSPACE)
}

/// One axis of a volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    /// Number of voxels along the axis.
    pub length: usize,
    /// Signed world distance between neighbouring voxels.
    pub step: f64,
    /// World position of voxel 0, measured along the axis.
    pub start: f64,
    pub direction_cosines: [f64; 3],
    /// Stride in voxels of one step along this axis.
    pub offset: usize,
    /// Length of the `width_space` axis, or 1.
    pub width: usize,
    /// Length of the `height_space` axis, or 1.
    pub height: usize,
    pub width_space: Option<usize>,
    pub height_space: Option<usize>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, length: usize) -> Dimension {
        let name = name.into();
        let direction_cosines = default_cosines(&name);
        Dimension {
            name,
            length,
            step: 1.0,
            start: 0.0,
            direction_cosines,
            offset: 0,
            width: 1,
            height: 1,
            width_space: None,
            height_space: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    /// Cosines are stored normalised.
    pub fn with_direction_cosines(mut self, cosines: [f64; 3]) -> Self {
        self.direction_cosines = normalize(cosines);
        self
    }

    pub fn with_geometry(self, geometry: AxisGeometry) -> Self {
        self.with_step(geometry.step)
            .with_start(geometry.start)
            .with_direction_cosines(geometry.direction_cosines)
    }

    pub fn geometry(&self) -> AxisGeometry {
        AxisGeometry {
            step: self.step,
            start: self.start,
            direction_cosines: self.direction_cosines,
        }
    }

    pub fn is_spatial(&self) -> bool {
        is_spatial(&self.name)
    }
}

/// The axes of a volume, slowest varying first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dimensions {
    dims: Vec<Dimension>,
}

impl Dimensions {
    /// Take ownership of `dims` and derive strides and neighbour links.
    pub fn new(dims: Vec<Dimension>) -> Dimensions {
        let mut out = Dimensions { dims };
        out.link();
        out
    }

    fn link(&mut self) {
        let mut stride = 1usize;
        for dim in self.dims.iter_mut().rev() {
            dim.offset = stride;
            stride = stride.saturating_mul(dim.length);
        }

        let x = self.index_of(XSPACE);
        let y = self.index_of(YSPACE);
        let z = self.index_of(ZSPACE);
        let lengths: Vec<usize> = self.dims.iter().map(|d| d.length).collect();
        let len_of = |i: Option<usize>| i.map_or(1, |i| lengths[i]);
        for dim in &mut self.dims {
            let (w, h) = match dim.name.as_str() {
                XSPACE => (y, z),
                YSPACE => (x, z),
                ZSPACE => (x, y),
                _ => (None, None),
            };
            dim.width_space = w;
            dim.height_space = h;
            dim.width = len_of(w);
            dim.height = len_of(h);
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Dimension> {
        self.dims.iter_mut().find(|d| d.name == name)
    }

    pub fn at(&self, index: usize) -> Option<&Dimension> {
        self.dims.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dimension> {
        self.dims.iter()
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Axis names, slowest varying first.
    pub fn order(&self) -> Vec<&str> {
        self.dims.iter().map(|d| d.name.as_str()).collect()
    }

    /// Product of every axis length.
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().map(|d| d.length).product()
    }
}
