//! Error types for volume decoding.

use std::fmt;

use voxelio_format::error::{ErrorKind, FormatError};

/// Errors raised while turning a file into a [`VoxelContainer`](crate::VoxelContainer).
#[derive(Debug)]
pub enum Error {
    /// I/O error from the filesystem.
    Io(std::io::Error),
    /// Low-level HDF5 or NIfTI structure error.
    Format(FormatError),
    /// `set_data` was called on a container that already holds voxels.
    AlreadyPopulated,
    /// A dataset the volume needs is not in the file.
    MissingDataset(String),
    /// Header values that cannot describe a volume.
    InvalidHeader(String),
    /// A buffer or axis list of the wrong size.
    ShapeMismatch {
        expected: usize,
        actual: usize,
    },
    /// No decoder in a dispatch list accepted the input.
    NoMatch,
}

impl Error {
    /// Classify for dispatch logging. Errors that are not structural count
    /// as malformed input.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(e) => e.kind(),
            Error::NoMatch => ErrorKind::FormatMismatch,
            Error::MissingDataset(_) => ErrorKind::FormatMismatch,
            Error::Io(_)
            | Error::AlreadyPopulated
            | Error::InvalidHeader(_)
            | Error::ShapeMismatch { .. } => ErrorKind::MalformedStructure,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Format(e) => write!(f, "format error: {e}"),
            Error::AlreadyPopulated => write!(f, "voxel data has already been set"),
            Error::MissingDataset(name) => write!(f, "missing dataset: {name}"),
            Error::InvalidHeader(msg) => write!(f, "invalid volume header: {msg}"),
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, got {actual}")
            }
            Error::NoMatch => write!(f, "no compatible format found"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_keep_their_kind() {
        let e = Error::from(FormatError::UnsupportedFilter(32000));
        assert_eq!(e.kind(), ErrorKind::UnsupportedFeature);
        assert!(e.to_string().contains("32000"));
    }

    #[test]
    fn io_error_has_source() {
        let e = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(std::error::Error::source(&e).is_some());
    }
}
