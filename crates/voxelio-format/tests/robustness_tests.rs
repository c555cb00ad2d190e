//! Parsers must return errors, never panic, on malformed input.

use voxelio_format::btree_v2::BTreeV2Header;
use voxelio_format::dataspace::Dataspace;
use voxelio_format::datatype::Datatype;
use voxelio_format::error::{ErrorKind, FormatError};
use voxelio_format::fractal_heap::FractalHeapHeader;
use voxelio_format::local_heap::LocalHeap;
use voxelio_format::nifti_header::NiftiHeader;
use voxelio_format::object_header::ObjectHeader;
use voxelio_format::signature::{self, HDF5_SIGNATURE};
use voxelio_format::superblock::Superblock;
use voxelio_format::{read_tree, DecodeOptions};

// ---- Truncated / empty inputs ----

#[test]
fn empty_file_no_signature() {
    assert_eq!(signature::find_signature(&[]), Err(FormatError::SignatureNotFound));
}

#[test]
fn short_file_no_signature() {
    assert!(signature::find_signature(&[0x89, 0x48, 0x44]).is_err());
}

#[test]
fn truncated_superblock() {
    let mut data = HDF5_SIGNATURE.to_vec();
    data.push(2);
    let err = Superblock::parse(&data, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn unknown_superblock_version() {
    let mut data = HDF5_SIGNATURE.to_vec();
    data.extend_from_slice(&[9; 40]);
    assert_eq!(Superblock::parse(&data, false), Err(FormatError::UnsupportedVersion(9)));
}

#[test]
fn truncated_object_header_v2() {
    assert!(ObjectHeader::parse(b"OHDR\x02\x00", 0, 8, 8, false).is_err());
}

#[test]
fn object_header_past_end() {
    let err = ObjectHeader::parse(&[0u8; 16], 4096, 8, 8, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[test]
fn truncated_datatype() {
    assert!(Datatype::parse(&[0x10]).is_err());
}

#[test]
fn truncated_dataspace() {
    assert!(Dataspace::parse(&[0x01], 8).is_err());
}

#[test]
fn truncated_fractal_heap() {
    assert!(FractalHeapHeader::parse(b"FRHP\x00", 0, 8, 8).is_err());
}

#[test]
fn truncated_btree_v2() {
    assert!(BTreeV2Header::parse(b"BTHD\x00", 0, 8, 8).is_err());
}

// ---- Invalid signatures and versions ----

#[test]
fn bad_local_heap_signature() {
    let data = b"HEAX\x00\x00\x00\x00".repeat(4);
    assert!(matches!(
        LocalHeap::parse(&data, 0, 8, 8),
        Err(FormatError::InvalidSignature { .. })
    ));
}

#[test]
fn bad_object_header_version() {
    let data = [7u8; 32];
    assert_eq!(
        ObjectHeader::parse(&data, 0, 8, 8, false),
        Err(FormatError::InvalidObjectHeaderVersion(7))
    );
}

#[test]
fn unsupported_datatype_class() {
    // class 6 (compound), version 1
    let data = [0x16, 0, 0, 0, 8, 0, 0, 0];
    assert_eq!(Datatype::parse(&data), Err(FormatError::UnsupportedDatatype(6)));
}

#[test]
fn eight_byte_integers_are_unsupported() {
    let mut data = vec![0x10, 0x08, 0, 0];
    data.extend_from_slice(&8u32.to_le_bytes());
    data.extend_from_slice(&[0, 0, 64, 0]);
    let err = Datatype::parse(&data).unwrap_err();
    assert_eq!(err, FormatError::UnsupportedIntegerSize(8));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

// ---- Whole files ----

#[test]
fn random_bytes_after_signature() {
    let mut data = HDF5_SIGNATURE.to_vec();
    data.extend((0..512u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8));
    assert!(read_tree(&data, &DecodeOptions::default()).is_err());
}

#[test]
fn every_prefix_of_a_superblock_fails_cleanly() {
    let mut data = HDF5_SIGNATURE.to_vec();
    data.extend_from_slice(&[2, 8, 8, 0]);
    for v in [0u64, u64::MAX, 48, 48] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data.extend_from_slice(&[0; 4]);
    for len in 0..data.len() {
        assert!(read_tree(&data[..len], &DecodeOptions::default()).is_err());
    }
}

// ---- NIfTI ----

#[test]
fn nifti_too_short() {
    assert_eq!(NiftiHeader::parse(&[0u8; 100]), Err(FormatError::NotNifti1));
}

#[test]
fn nifti_wrong_sizeof_hdr() {
    let mut data = vec![0u8; 352];
    data[..4].copy_from_slice(&540i32.to_le_bytes());
    data[344..348].copy_from_slice(b"n+1\0");
    assert_eq!(NiftiHeader::parse(&data), Err(FormatError::NotNifti1));
}

#[test]
fn nifti_pair_magic_is_rejected() {
    let mut data = vec![0u8; 352];
    data[..4].copy_from_slice(&348i32.to_le_bytes());
    data[344..348].copy_from_slice(b"ni1\0");
    assert_eq!(NiftiHeader::parse(&data), Err(FormatError::NotNifti1));
}
