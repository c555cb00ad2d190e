//! Whole-file decoding of synthetic MINC2-shaped HDF5 files.

use voxelio_format::attribute::AttrValue;
use voxelio_format::fixture::{FileBuilder, FormatVersion};
use voxelio_format::{read_tree, DecodeOptions, ElementType, ErrorKind, TypedArray};

fn minc(version: FormatVersion, dense: bool) -> Vec<u8> {
    let mut file = FileBuilder::new(version);
    for (axis, step) in [("zspace", 3.0), ("yspace", 2.0), ("xspace", 1.0)] {
        let dims = file.group("minc-2.0/dimensions");
        if dense {
            dims.dense_storage();
        }
        dims.create_dataset(axis)
            .with_values(TypedArray::I32(vec![0]))
            .with_shape(&[])
            .set_attr("step", AttrValue::Scalar(step))
            .set_attr("start", AttrValue::Scalar(-step * 10.0));
    }
    let image = file.group("minc-2.0/image/0");
    image
        .create_dataset("image")
        .with_values(TypedArray::U16((0..24).collect()))
        .with_shape(&[2, 3, 4])
        .set_attr("dimorder", AttrValue::Text("zspace,yspace,xspace".into()))
        .set_attr("valid_range", AttrValue::Array(TypedArray::F64(vec![0.0, 23.0])));
    image
        .create_dataset("image-min")
        .with_values(TypedArray::F64(vec![0.0, 1.0]))
        .with_shape(&[2]);
    image
        .create_dataset("image-max")
        .with_values(TypedArray::F64(vec![10.0, 20.0]))
        .with_shape(&[2]);
    file.build()
}

#[test]
fn minc_layout_in_every_group_encoding() {
    for (version, dense) in [
        (FormatVersion::V0, false),
        (FormatVersion::V2, false),
        (FormatVersion::V2, true),
    ] {
        let root = read_tree(&minc(version, dense), &DecodeOptions::default()).unwrap();
        let image = root.find_dataset("image").unwrap();
        assert_eq!(image.element_type(), Some(ElementType::Uint16));
        assert_eq!(image.dims, [2, 3, 4]);
        assert_eq!(image.array.as_ref().map(|a| a.len()), Some(24));

        let x = root.find_dataset("xspace").unwrap();
        assert_eq!(x.attributes["step"].as_f64(), Some(1.0));
        assert_eq!(x.attributes["start"].as_f64(), Some(-10.0));

        let max = root.find_dataset("image-max").unwrap();
        assert_eq!(max.array, Some(TypedArray::F64(vec![10.0, 20.0])));
    }
}

#[test]
fn leading_bytes_before_signature_are_skipped() {
    let file = minc(FormatVersion::V2, false);
    let mut shifted = vec![0u8; 512];
    shifted.extend_from_slice(&file);
    let root = read_tree(&shifted, &DecodeOptions::default()).unwrap();
    assert!(root.find_dataset("image").is_some());
}

#[test]
fn strict_options_accept_well_formed_files() {
    let options = DecodeOptions::new().verify_checksums(true).strict_btree_v2(true);
    let root = read_tree(&minc(FormatVersion::V2, true), &options).unwrap();
    assert_eq!(root.walk().len(), 11);
}

#[test]
fn shallow_depth_limit_rejects_nesting() {
    let err = read_tree(&minc(FormatVersion::V0, false), &DecodeOptions::new().max_depth(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedStructure);
}

#[test]
fn truncated_file_fails() {
    let file = minc(FormatVersion::V0, false);
    let err = read_tree(&file[..file.len() / 2], &DecodeOptions::default()).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::OutOfBounds | ErrorKind::FormatMismatch | ErrorKind::MalformedStructure
    ));
}
