//! Error types for binary structure decoding.

use core::fmt;

/// Broad classification of a [`FormatError`].
///
/// Decoder dispatch uses this to tell "not this format" apart from "this
/// format, but a feature we do not read".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic or signature: the buffer is some other format.
    FormatMismatch,
    /// Right format, unimplemented feature (datatype class, filter, ...).
    UnsupportedFeature,
    /// A read or an address fell outside the buffer.
    OutOfBounds,
    /// Inconsistent counts, orders, or checksums inside a valid-looking file.
    MalformedStructure,
}

/// Errors that can occur when decoding HDF5 or NIfTI-1 binary structures.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// An address points at or beyond the end-of-file address.
    AddressOutOfRange {
        /// The offending address.
        address: u64,
        /// The end-of-file address or buffer length.
        limit: u64,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// A structure signature did not match.
    InvalidSignature {
        /// The expected ASCII signature.
        expected: &'static str,
        /// File position that was checked.
        position: usize,
    },
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// A message or structure carries a version we do not read.
    InvalidStructureVersion {
        /// Name of the structure.
        structure: &'static str,
        /// Version found in the file.
        version: u8,
    },
    /// Unknown message type that is marked as must-understand.
    UnsupportedMessage(u16),
    /// Datatype class other than fixed-point, floating-point, or string.
    UnsupportedDatatype(u8),
    /// Fixed-point datatype with a byte width we do not read.
    UnsupportedIntegerSize(u32),
    /// Floating-point datatype that is not IEEE binary32 or binary64.
    UnsupportedFloatLayout {
        /// Size in bytes.
        size: u32,
        /// Exponent bit location.
        exponent_location: u8,
        /// Mantissa bit size.
        mantissa_size: u8,
    },
    /// Filter other than deflate or shuffle in a filter pipeline.
    UnsupportedFilter(u16),
    /// Invalid layout class.
    InvalidLayoutClass(u8),
    /// Invalid dataspace type.
    InvalidDataspaceType(u8),
    /// Unexpected B-tree node type.
    InvalidBTreeNodeType(u8),
    /// Unexpected heap ID kind.
    InvalidHeapIdType(u8),
    /// Decompression of a chunk failed.
    DecompressionError(String),
    /// Structure inconsistent with itself.
    MalformedStructure(String),
    /// Metadata checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// The buffer is not a single-file NIfTI-1 image.
    NotNifti1,
    /// NIfTI-1 `dim[0]` outside 3..=4.
    UnsupportedDimensionality(i16),
    /// NIfTI-1 datatype code we do not read.
    UnsupportedNiftiDatatype(i16),
}

impl FormatError {
    /// Classify this error for dispatch and logging.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::SignatureNotFound
            | FormatError::InvalidSignature { .. }
            | FormatError::NotNifti1 => ErrorKind::FormatMismatch,
            FormatError::UnsupportedVersion(_)
            | FormatError::InvalidObjectHeaderVersion(_)
            | FormatError::InvalidStructureVersion { .. }
            | FormatError::UnsupportedMessage(_)
            | FormatError::UnsupportedDatatype(_)
            | FormatError::UnsupportedIntegerSize(_)
            | FormatError::UnsupportedFloatLayout { .. }
            | FormatError::UnsupportedFilter(_)
            | FormatError::UnsupportedDimensionality(_)
            | FormatError::UnsupportedNiftiDatatype(_) => ErrorKind::UnsupportedFeature,
            FormatError::UnexpectedEof { .. } | FormatError::AddressOutOfRange { .. } => {
                ErrorKind::OutOfBounds
            }
            FormatError::InvalidOffsetSize(_)
            | FormatError::InvalidLengthSize(_)
            | FormatError::InvalidLayoutClass(_)
            | FormatError::InvalidDataspaceType(_)
            | FormatError::InvalidBTreeNodeType(_)
            | FormatError::InvalidHeapIdType(_)
            | FormatError::DecompressionError(_)
            | FormatError::MalformedStructure(_)
            | FormatError::ChecksumMismatch { .. } => ErrorKind::MalformedStructure,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::AddressOutOfRange { address, limit } => {
                write!(f, "address {address:#x} is beyond end of file ({limit:#x})")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidSignature { expected, position } => {
                write!(f, "expected signature {expected:?} at {position:#x}")
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::InvalidStructureVersion { structure, version } => {
                write!(f, "unsupported {structure} version: {version}")
            }
            FormatError::UnsupportedMessage(id) => {
                write!(
                    f,
                    "unsupported message type {id:#06x} marked as must-understand"
                )
            }
            FormatError::UnsupportedDatatype(class) => {
                write!(f, "unsupported datatype class: {class}")
            }
            FormatError::UnsupportedIntegerSize(size) => {
                write!(f, "unsupported fixed-point size: {size} bytes")
            }
            FormatError::UnsupportedFloatLayout {
                size,
                exponent_location,
                mantissa_size,
            } => {
                write!(
                    f,
                    "unsupported floating-point layout: {size} bytes, exponent at bit {exponent_location}, {mantissa_size}-bit mantissa"
                )
            }
            FormatError::UnsupportedFilter(id) => write!(f, "unsupported filter id: {id}"),
            FormatError::InvalidLayoutClass(c) => write!(f, "invalid layout class: {c}"),
            FormatError::InvalidDataspaceType(t) => write!(f, "invalid dataspace type: {t}"),
            FormatError::InvalidBTreeNodeType(t) => write!(f, "invalid B-tree node type: {t}"),
            FormatError::InvalidHeapIdType(t) => write!(f, "invalid fractal heap ID type: {t}"),
            FormatError::DecompressionError(msg) => write!(f, "decompression failed: {msg}"),
            FormatError::MalformedStructure(msg) => write!(f, "malformed structure: {msg}"),
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::NotNifti1 => write!(f, "not a single-file NIfTI-1 image"),
            FormatError::UnsupportedDimensionality(n) => {
                write!(f, "unsupported NIfTI dimensionality: {n} (must be 3 or 4)")
            }
            FormatError::UnsupportedNiftiDatatype(code) => {
                write!(f, "unsupported NIfTI datatype code: {code}")
            }
        }
    }
}

impl std::error::Error for FormatError {}
