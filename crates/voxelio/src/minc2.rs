//! MINC2 volumes: an HDF5 file with an `image` dataset, optional
//! per-slice `image-min`/`image-max` datasets, and one dimension variable
//! per axis carrying `step`, `start` and `direction_cosines` attributes.

use log::{debug, trace};
use voxelio_format::attribute::AttrValue;
use voxelio_format::{read_tree, ElementType, Hdf5Link, TypedArray};

use crate::container::{rgb_to_rgba, VoxelContainer};
use crate::dimension::{Dimension, TIME, VECTOR_DIMENSION, XSPACE, YSPACE, ZSPACE};
use crate::error::Error;
use crate::options::VolumeOptions;

/// Axis names recognised when the image has no `dimorder`, slowest first.
const CANONICAL_ORDER: [&str; 5] = [TIME, ZSPACE, YSPACE, XSPACE, VECTOR_DIMENSION];

/// Decode a whole MINC2 file.
pub fn decode(bytes: &[u8], options: &VolumeOptions) -> Result<VoxelContainer, Error> {
    let tree = read_tree(bytes, &options.hdf5)?;
    let image = tree
        .find_dataset("image")
        .ok_or_else(|| Error::MissingDataset("image".into()))?;
    let element_type = image
        .element_type()
        .filter(|t| *t != ElementType::String)
        .ok_or_else(|| Error::InvalidHeader("image dataset is not numeric".into()))?;
    let mut data = image
        .array
        .clone()
        .ok_or_else(|| Error::MissingDataset("image data".into()))?;

    let mut order = axis_order(&tree, image)?;
    let mut lengths: Vec<usize> = image.dims.iter().map(|&d| d as usize).collect();
    if order.len() != lengths.len() {
        return Err(Error::ShapeMismatch {
            expected: lengths.len(),
            actual: order.len(),
        });
    }
    debug!("MINC2 image {element_type:?} {lengths:?}, order {order:?}");

    // A redundant leading axis of one voxel.
    if order.len() == 4 && lengths[0] == 1 {
        debug!("dropping unit axis {}", order[0]);
        order.remove(0);
        lengths.remove(0);
    }

    let mut ncpp = 1;
    if is_rgb(element_type, &order, &lengths) {
        debug!("uint8 vector_dimension of 3: RGB volume");
        order.pop();
        lengths.pop();
        if let TypedArray::U8(rgb) = &data {
            data = TypedArray::U8(rgb_to_rgba(rgb));
        }
        ncpp = 4;
    } else if options.apply_scaling {
        let valid_range = valid_range(image, element_type);
        let image_min = slice_values(&tree, "image-min");
        let image_max = slice_values(&tree, "image-max");
        scale_voxels(&mut data, image_min.as_deref(), image_max.as_deref(), valid_range)?;
    }

    let dims = order
        .iter()
        .zip(&lengths)
        .map(|(name, &length)| dimension(&tree, name, length))
        .collect();
    let mut container = VoxelContainer::new(dims, ncpp)?;
    container.set_data(data)?;
    Ok(container)
}

/// Axis names of the image, slowest varying first: the `dimorder`
/// attribute, or else whichever known dimension variables the file holds.
/// A file with neither gets the trailing spatial axes for its rank.
pub fn axis_order(tree: &Hdf5Link, image: &Hdf5Link) -> Result<Vec<String>, Error> {
    if let Some(attr) = image.attributes.get("dimorder") {
        let text = attr
            .as_str()
            .ok_or_else(|| Error::InvalidHeader("dimorder is not text".into()))?;
        return Ok(text
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }
    let found: Vec<String> = CANONICAL_ORDER
        .iter()
        .filter(|name| tree.find_link(name).is_some())
        .map(|name| name.to_string())
        .collect();
    trace!("no dimorder; dimension variables found: {found:?}");
    let rank = image.dims.len();
    if found.is_empty() && (1..=4).contains(&rank) {
        return Ok(CANONICAL_ORDER[4 - rank..4].iter().map(|s| s.to_string()).collect());
    }
    Ok(found)
}

/// One axis from its dimension variable; absent attributes take defaults.
fn dimension(tree: &Hdf5Link, name: &str, length: usize) -> Dimension {
    let mut dim = Dimension::new(name, length);
    let Some(var) = tree.find_link(name) else {
        debug!("no dimension variable for {name}; using defaults");
        return dim;
    };
    let number = |key: &str| var.attributes.get(key).and_then(AttrValue::as_f64);
    if let Some(step) = number("step") {
        dim = dim.with_step(step);
    }
    if let Some(start) = number("start") {
        dim = dim.with_start(start);
    }
    let cosines = var
        .attributes
        .get("direction_cosines")
        .and_then(AttrValue::to_f64_vec);
    if let Some(&[a, b, c]) = cosines.as_deref() {
        dim = dim.with_direction_cosines([a, b, c]);
    }
    dim
}

/// The image's `valid_range` attribute, ordered; the element type's full
/// range when absent. Floats report `None` without the attribute.
pub fn valid_range(image: &Hdf5Link, element_type: ElementType) -> Option<(f64, f64)> {
    let stored = image
        .attributes
        .get("valid_range")
        .and_then(AttrValue::to_f64_vec)
        .filter(|v| v.len() == 2)
        .map(|v| (v[0].min(v[1]), v[0].max(v[1])));
    match stored {
        Some(range) => Some(range),
        None if element_type.is_integer() => Some(element_type.natural_range()),
        None => None,
    }
}

fn slice_values(tree: &Hdf5Link, name: &str) -> Option<Vec<f64>> {
    let values = tree.find_dataset(name)?.array.as_ref()?.to_f64_vec();
    (!values.is_empty()).then_some(values)
}

/// Map stored voxels to real values, in place.
///
/// Integer volumes are remapped per slice from `valid_range` onto
/// `[image_min, image_max]` and then scaled by `valid_max / image_max`
/// back into the stored type. Float volumes already hold real values;
/// voxels outside `valid_range` become 0. Without both slice arrays the
/// valid range stands in for them.
pub fn scale_voxels(
    data: &mut TypedArray,
    image_min: Option<&[f64]>,
    image_max: Option<&[f64]>,
    valid_range: Option<(f64, f64)>,
) -> Result<(), Error> {
    let n = data.len();
    let mut stats = Stats::default();

    if data.element_type().is_float() {
        if let Some((vmin, vmax)) = valid_range {
            for i in 0..n {
                let v = data.get_f64(i).unwrap_or(0.0);
                if v < vmin || v > vmax {
                    data.set_f64(i, 0.0);
                }
            }
        }
        stats.observe(data);
        debug!("float voxels min {} max {} sum {}", stats.min, stats.max, stats.sum);
        return Ok(());
    }

    let Some((vmin, vmax)) = valid_range else {
        return Ok(());
    };
    let fallback = ([vmin], [vmax]);
    let (mins, maxs) = match (image_min, image_max) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => {
            trace!("no image-min/image-max; using valid range {vmin}..{vmax}");
            (&fallback.0[..], &fallback.1[..])
        }
    };
    let slices = mins.len().max(maxs.len());
    if mins.len() != maxs.len() && mins.len() != 1 && maxs.len() != 1 {
        return Err(Error::ShapeMismatch {
            expected: mins.len(),
            actual: maxs.len(),
        });
    }
    if n % slices != 0 {
        return Err(Error::ShapeMismatch {
            expected: n - n % slices,
            actual: n,
        });
    }
    let per_slice = n / slices;
    let vrange = vmax - vmin;
    // One-element arrays apply to every slice.
    let pick = |v: &[f64], s: usize| if v.len() == 1 { v[0] } else { v[s] };

    for s in 0..slices {
        let (imin, imax) = (pick(mins, s), pick(maxs, s));
        for i in s * per_slice..(s + 1) * per_slice {
            let v = data.get_f64(i).unwrap_or(0.0);
            let mut real = if vrange != 0.0 {
                (v - vmin) / vrange * (imax - imin) + imin
            } else {
                v
            };
            if imax != 0.0 {
                real = real / imax * vmax;
            }
            data.set_f64(i, real);
        }
    }
    stats.observe(data);
    debug!(
        "{slices} slices rescaled: min {} max {} sum {}",
        stats.min, stats.max, stats.sum
    );
    Ok(())
}

#[derive(Debug)]
struct Stats {
    min: f64,
    max: f64,
    sum: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl Stats {
    fn observe(&mut self, data: &TypedArray) {
        for v in data.to_f64_vec() {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.sum += v;
        }
    }
}

/// Uint8 with a trailing `vector_dimension` of three components.
pub fn is_rgb<S: AsRef<str>>(element_type: ElementType, order: &[S], lengths: &[usize]) -> bool {
    element_type == ElementType::Uint8
        && order.last().map(AsRef::as_ref) == Some(VECTOR_DIMENSION)
        && lengths.last() == Some(&3)
}
