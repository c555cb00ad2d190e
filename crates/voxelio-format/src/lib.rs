//! Pure-Rust decoding of the binary structures behind MINC2 and NIfTI-1
//! volumes.
//!
//! The HDF5 side reads the subset MINC2 files use: superblocks v0-v3, v1
//! and v2 object headers, symbol-table and link-message groups, fractal
//! heaps, v1/v2 B-trees, and compact, contiguous, or chunked (deflate and
//! shuffle filters) datasets of fixed-point, IEEE float, or string type. [`reader`] turns a
//! whole file into an [`link::Hdf5Link`] tree.
//!
//! [`nifti_header`] parses the fixed NIfTI-1 header and its voxel region.

pub mod attribute;
pub mod attribute_info;
pub mod btree_v1;
pub mod btree_v2;
pub mod checksum;
pub mod chunked_read;
pub mod cursor;
pub mod data_layout;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod filter_pipeline;
pub mod filters;
pub mod fractal_heap;
pub mod link;
pub mod link_info;
pub mod link_message;
pub mod local_heap;
pub mod message_type;
pub mod nifti_header;
pub mod object_header;
pub mod options;
pub mod reader;
pub mod signature;
pub mod superblock;
pub mod symbol_table;
pub mod typed_array;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use error::{ErrorKind, FormatError};
pub use link::Hdf5Link;
pub use options::DecodeOptions;
pub use reader::read_tree;
pub use typed_array::{ElementType, TypedArray};
