//! End-to-end volume decoding: synthetic MINC2 files from the fixture
//! builder, hand-built NIfTI-1 headers, and the file-path entry point.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use voxelio::dimension::{TIME, VECTOR_DIMENSION, XSPACE, YSPACE, ZSPACE};
use voxelio::{decode_file, decode_volume, decode_volume_with, Error, VolumeOptions};
use voxelio_format::attribute::AttrValue;
use voxelio_format::fixture::{FileBuilder, FormatVersion};
use voxelio_format::{DecodeOptions, TypedArray};

fn range(lo: f64, hi: f64) -> AttrValue {
    AttrValue::Array(TypedArray::F64(vec![lo, hi]))
}

/// NIfTI-1 header (little endian, voxels at 352) followed by `voxels`.
fn nifti(dims: &[i16], datatype: i16, bitpix: i16, pixdim: [f32; 4], voxels: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(352 + voxels.len());
    buf.write_i32::<LittleEndian>(348).unwrap();
    buf.resize(40, 0);
    buf.write_i16::<LittleEndian>(dims.len() as i16).unwrap();
    for i in 0..7 {
        buf.write_i16::<LittleEndian>(dims.get(i).copied().unwrap_or(0)).unwrap();
    }
    buf.resize(70, 0);
    buf.write_i16::<LittleEndian>(datatype).unwrap();
    buf.write_i16::<LittleEndian>(bitpix).unwrap();
    buf.resize(76, 0);
    for p in pixdim {
        buf.write_f32::<LittleEndian>(p).unwrap();
    }
    buf.resize(108, 0);
    buf.write_f32::<LittleEndian>(352.0).unwrap();
    buf.resize(344, 0);
    buf.extend_from_slice(b"n+1\0");
    buf.resize(352, 0);
    buf.extend_from_slice(voxels);
    buf
}

fn scenario_b() -> Vec<u8> {
    let voxels: Vec<u8> = (0..64).flat_map(|i| (i as f32 * 0.5).to_le_bytes()).collect();
    nifti(&[4, 4, 4], 16, 32, [1.0, 2.0, 2.0, 2.0], &voxels)
}

// ---------------------------------------------------------------------------
// MINC2
// ---------------------------------------------------------------------------

#[test]
fn float_minc_passes_values_through() {
    let raw: Vec<f32> = (0..27).map(|i| i as f32 / 26.0).collect();
    let mut file = FileBuilder::new(FormatVersion::V0);
    let image = file.group("minc-2.0/image/0");
    image
        .create_dataset("image")
        .with_values(TypedArray::F32(raw.clone()))
        .with_shape(&[3, 3, 3])
        .set_attr("valid_range", range(0.0, 1.0));
    image
        .create_dataset("image-min")
        .with_values(TypedArray::F64(vec![0.0]));
    image
        .create_dataset("image-max")
        .with_values(TypedArray::F64(vec![1.0]));

    let hit = decode_volume(&file.build()).unwrap();
    assert_eq!(hit.decoder, "minc2");
    let volume = hit.value;
    assert_eq!(volume.order(), [ZSPACE, YSPACE, XSPACE]);
    assert_eq!(volume.voxel_count(), 27);
    assert_eq!(volume.data(), Some(&TypedArray::F32(raw)));
}

/// z/y/x dimension variables plus a uint16 image with two z slices.
fn integer_minc(version: FormatVersion, dense: bool) -> Vec<u8> {
    let mut file = FileBuilder::new(version);
    for (axis, step) in [(ZSPACE, 3.0), (YSPACE, 2.0), (XSPACE, -1.0)] {
        let dims = file.group("minc-2.0/dimensions");
        if dense {
            dims.dense_storage();
        }
        let var = dims
            .create_dataset(axis)
            .with_values(TypedArray::I32(vec![0]))
            .with_shape(&[])
            .set_attr("step", AttrValue::Scalar(step))
            .set_attr("start", AttrValue::Scalar(step * 10.0));
        if axis == XSPACE {
            var.set_attr(
                "direction_cosines",
                AttrValue::Array(TypedArray::F64(vec![3.0, 4.0, 0.0])),
            );
        }
    }
    let image = file.group("minc-2.0/image/0");
    if dense {
        image.dense_storage();
    }
    image
        .create_dataset("image")
        .with_values(TypedArray::U16((0..24).collect()))
        .with_shape(&[2, 3, 4])
        .set_attr("dimorder", AttrValue::Text("zspace,yspace,xspace".into()))
        .set_attr("valid_range", range(0.0, 23.0));
    image
        .create_dataset("image-min")
        .with_values(TypedArray::F64(vec![0.0, 1.0]));
    image
        .create_dataset("image-max")
        .with_values(TypedArray::F64(vec![10.0, 20.0]));
    file.build()
}

fn expected_rescale() -> Vec<u16> {
    (0..24u16)
        .map(|v| {
            let (imin, imax) = if v < 12 { (0.0, 10.0) } else { (1.0, 20.0) };
            let real = v as f64 / 23.0 * (imax - imin) + imin;
            (real / imax * 23.0).round() as u16
        })
        .collect()
}

#[test]
fn integer_minc_in_every_group_encoding() {
    for (version, dense) in [
        (FormatVersion::V0, false),
        (FormatVersion::V2, false),
        (FormatVersion::V2, true),
    ] {
        let volume = decode_volume(&integer_minc(version, dense)).unwrap().value;
        assert_eq!(volume.order(), [ZSPACE, YSPACE, XSPACE]);
        assert_eq!(volume.data(), Some(&TypedArray::U16(expected_rescale())));

        let z = volume.dimension(ZSPACE).unwrap();
        assert_eq!((z.length, z.step, z.start, z.offset), (2, 3.0, 30.0, 12));
        let x = volume.dimension(XSPACE).unwrap();
        assert_eq!((x.step, x.direction_cosines), (-1.0, [0.6, 0.8, 0.0]));
        assert_eq!((x.width, x.height), (3, 2));
    }
}

#[test]
fn first_slice_rescale_is_identity() {
    let volume = decode_volume(&integer_minc(FormatVersion::V0, false)).unwrap().value;
    for v in 0..12 {
        assert_eq!(volume.data().and_then(|d| d.get_f64(v)), Some(v as f64));
    }
}

#[test]
fn scaling_can_be_disabled() {
    let options = VolumeOptions::new().apply_scaling(false);
    let volume = decode_volume_with(&integer_minc(FormatVersion::V2, false), &options)
        .unwrap()
        .value;
    assert_eq!(volume.data(), Some(&TypedArray::U16((0..24).collect())));
}

#[test]
fn minc_world_transform_round_trips() {
    let volume = decode_volume(&integer_minc(FormatVersion::V2, true)).unwrap().value;
    let voxel = [2.0, 1.0, 1.0];
    let back = volume
        .world_to_voxel(volume.voxel_to_world(voxel).unwrap())
        .unwrap();
    for (a, b) in back.iter().zip(voxel) {
        assert!((a - b).abs() < 1e-9, "{back:?}");
    }
}

#[test]
fn checksummed_minc_decodes_strictly() {
    let options = VolumeOptions::new().hdf5(DecodeOptions::new().verify_checksums(true));
    let hit = decode_volume_with(&integer_minc(FormatVersion::V2, true), &options).unwrap();
    assert_eq!(hit.decoder, "minc2");
}

#[test]
fn rgb_minc_becomes_rgba_without_rescaling() {
    let mut file = FileBuilder::new(FormatVersion::V2);
    let image = file.group("minc-2.0/image/0");
    image
        .create_dataset("image")
        .with_values(TypedArray::U8((1..=12).collect()))
        .with_shape(&[2, 2, 3])
        .set_attr(
            "dimorder",
            AttrValue::Text(format!("{YSPACE},{XSPACE},{VECTOR_DIMENSION}")),
        );
    // would remap every channel if RGB were scaled
    image
        .create_dataset("image-min")
        .with_values(TypedArray::F64(vec![0.5]));
    image
        .create_dataset("image-max")
        .with_values(TypedArray::F64(vec![1.0]));
    let volume = decode_volume(&file.build()).unwrap().value;
    assert_eq!(volume.ncpp(), 4);
    assert_eq!(volume.order(), [YSPACE, XSPACE]);
    assert_eq!(
        volume.data(),
        Some(&TypedArray::U8(vec![
            1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255
        ]))
    );
    assert_eq!(volume.index(1, 1, 0, 0), Some(12));
}

#[test]
fn unit_leading_axis_is_dropped() {
    let mut file = FileBuilder::new(FormatVersion::V0);
    file.group("minc-2.0/image/0")
        .create_dataset("image")
        .with_values(TypedArray::F64((0..8).map(f64::from).collect()))
        .with_shape(&[1, 2, 2, 2])
        .set_attr(
            "dimorder",
            AttrValue::Text(format!("{TIME},{ZSPACE},{YSPACE},{XSPACE}")),
        );
    let volume = decode_volume(&file.build()).unwrap().value;
    assert_eq!(volume.order(), [ZSPACE, YSPACE, XSPACE]);
    assert!(volume.time().is_none());
}

#[test]
fn dimorder_must_match_rank() {
    let mut file = FileBuilder::new(FormatVersion::V0);
    file.group("minc-2.0/image/0")
        .create_dataset("image")
        .with_values(TypedArray::I8(vec![0; 8]))
        .with_shape(&[2, 4])
        .set_attr("dimorder", AttrValue::Text("zspace,yspace,xspace".into()));
    let err = voxelio::minc2::decode(&file.build(), &VolumeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected: 2, actual: 3 }));
}

#[test]
fn hdf5_without_image_is_not_a_volume() {
    let mut file = FileBuilder::new(FormatVersion::V2);
    file.root()
        .create_dataset("other")
        .with_values(TypedArray::U8(vec![1, 2]));
    let bytes = file.build();
    let err = voxelio::minc2::decode(&bytes, &VolumeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingDataset(_)));
    assert!(decode_volume(&bytes).is_none());
}

#[cfg(feature = "deflate")]
#[test]
fn deflated_chunks_decode() {
    let raw: Vec<i16> = (0..24).map(|v| v * 100 - 1000).collect();
    let mut file = FileBuilder::new(FormatVersion::V0);
    file.group("minc-2.0/image/0")
        .create_dataset("image")
        .with_values(TypedArray::I16(raw.clone()))
        .with_shape(&[4, 2, 3])
        .with_chunks(&[1, 2, 3])
        .with_deflate();
    let options = VolumeOptions::new().apply_scaling(false);
    let volume = decode_volume_with(&file.build(), &options).unwrap().value;
    assert_eq!(volume.data(), Some(&TypedArray::I16(raw)));
    assert_eq!(volume.value(2, 1, 3, 0), Some(2300.0 - 1000.0));
}

// ---------------------------------------------------------------------------
// NIfTI-1
// ---------------------------------------------------------------------------

#[test]
fn pixdim_only_nifti_has_identity_axes() {
    let hit = decode_volume(&scenario_b()).unwrap();
    assert_eq!((hit.decoder, hit.index), ("nifti1", 1));
    let volume = hit.value;
    for (name, cosines) in [
        (XSPACE, [1.0, 0.0, 0.0]),
        (YSPACE, [0.0, 1.0, 0.0]),
        (ZSPACE, [0.0, 0.0, 1.0]),
    ] {
        let d = volume.dimension(name).unwrap();
        assert_eq!((d.length, d.step), (4, 2.0));
        assert_eq!(d.direction_cosines, cosines);
    }
    assert_eq!(volume.value(3, 3, 3, 0), Some(31.5));
    assert_eq!(volume.voxel_to_world([1.0, 2.0, 3.0]).unwrap(), [2.0, 4.0, 6.0]);
}

#[test]
fn four_dimensional_nifti() {
    let voxels: Vec<u8> = (0..16u16).flat_map(|v| v.to_le_bytes()).collect();
    let volume = decode_volume(&nifti(&[2, 2, 1, 4], 512, 16, [1.0; 4], &voxels))
        .unwrap()
        .value;
    assert_eq!(volume.order(), [TIME, ZSPACE, YSPACE, XSPACE]);
    let time = volume.time().unwrap();
    assert_eq!((time.offset, time.length), (4, 4));
    assert_eq!(volume.value(1, 1, 0, 3), Some(15.0));
}

// ---------------------------------------------------------------------------
// Dispatch and files
// ---------------------------------------------------------------------------

#[test]
fn garbage_is_no_match() {
    assert!(decode_volume(&[]).is_none());
    assert!(decode_volume(&[0xAB; 4096]).is_none());
    let mut fake_hdf5 = b"\x89HDF\r\n\x1a\n".to_vec();
    fake_hdf5.extend_from_slice(&[0xFF; 200]);
    assert!(decode_volume(&fake_hdf5).is_none());
}

#[test]
fn decode_from_path() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&scenario_b()).unwrap();
    tmp.flush().unwrap();
    let hit = decode_file(tmp.path()).unwrap();
    assert_eq!(hit.decoder, "nifti1");
    assert_eq!(hit.value.voxel_count(), 64);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.mnc");
    std::fs::write(&path, integer_minc(FormatVersion::V0, false)).unwrap();
    assert_eq!(decode_file(&path).unwrap().decoder, "minc2");
}

#[test]
fn path_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(decode_file(dir.path().join("missing.nii")), Err(Error::Io(_))));

    let path = dir.path().join("noise.bin");
    std::fs::write(&path, [7u8; 1000]).unwrap();
    assert!(matches!(decode_file(&path), Err(Error::NoMatch)));
}
