//! Volume decoding configuration.

use voxelio_format::DecodeOptions;

/// Options for [`decode_volume_with`](crate::decode_volume_with) and the
/// volume decoders.
///
/// ```
/// use voxelio::VolumeOptions;
///
/// let opts = VolumeOptions::new().apply_scaling(false);
/// assert!(!opts.apply_scaling);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeOptions {
    /// How strictly the HDF5 layer decodes MINC2 files.
    pub hdf5: DecodeOptions,
    /// Map stored voxels to real values: MINC2 per-slice rescaling and the
    /// NIfTI `scl_slope`/`scl_inter` pair.
    pub apply_scaling: bool,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            hdf5: DecodeOptions::default(),
            apply_scaling: true,
        }
    }
}

impl VolumeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hdf5(mut self, options: DecodeOptions) -> Self {
        self.hdf5 = options;
        self
    }

    pub fn apply_scaling(mut self, on: bool) -> Self {
        self.apply_scaling = on;
        self
    }
}
