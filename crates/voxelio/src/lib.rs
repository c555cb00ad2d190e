//! Decode MINC2 and NIfTI-1 volumes into typed voxel containers.
//!
//! ```no_run
//! let hit = voxelio::decode_file("brain.mnc")?;
//! let volume = hit.value;
//! println!("{} via {}: {:?}", volume.voxel_count(), hit.decoder, volume.order());
//! let world = volume.voxel_to_world([0.0, 0.0, 0.0])?;
//! # let _ = world;
//! # Ok::<(), voxelio::Error>(())
//! ```
//!
//! Decoders are tried in order (MINC2, then NIfTI-1) and the first one to
//! accept the bytes wins. Binary parsing lives in the `voxelio-format`
//! crate; this crate maps it onto [`VoxelContainer`].

pub mod container;
pub mod dimension;
pub mod dispatch;
pub mod error;
pub mod minc2;
pub mod nifti;
pub mod options;
pub mod transform;

use std::path::Path;

pub use container::VoxelContainer;
pub use dimension::Dimension;
pub use dispatch::{Decoded, Decoder, DecoderList, Minc2Decoder, NiftiDecoder};
pub use error::Error;
pub use options::VolumeOptions;

/// Decode a volume with default options. `None` when no decoder accepts
/// the bytes.
pub fn decode_volume(bytes: &[u8]) -> Option<Decoded<VoxelContainer>> {
    decode_volume_with(bytes, &VolumeOptions::default())
}

pub fn decode_volume_with(
    bytes: &[u8],
    options: &VolumeOptions,
) -> Option<Decoded<VoxelContainer>> {
    dispatch::volume_decoders(options).decode(bytes)
}

/// Read a whole file and decode it as a volume.
pub fn decode_file(path: impl AsRef<Path>) -> Result<Decoded<VoxelContainer>, Error> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());
    decode_volume(&bytes).ok_or(Error::NoMatch)
}
