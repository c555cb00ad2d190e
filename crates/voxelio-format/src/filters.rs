//! Chunk decompression through a filter pipeline.

use crate::error::FormatError;
use crate::filter_pipeline::{FilterPipeline, FILTER_DEFLATE, FILTER_SHUFFLE};

/// Undo a filter pipeline on one chunk.
///
/// Filters are undone in reverse order. Bit `i` of `filter_mask` set means
/// filter `i` was skipped when the chunk was written.
pub fn decompress_chunk(
    compressed: &[u8],
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = compressed.to_vec();
    for (i, filter) in pipeline.filters.iter().enumerate().rev() {
        if i < 32 && filter_mask & (1 << i) != 0 {
            continue;
        }
        data = match filter.filter_id {
            FILTER_DEFLATE => deflate_decompress(&data)?,
            FILTER_SHUFFLE => {
                let width = filter.client_data.first().map_or(element_size, |&w| w as usize);
                unshuffle(&data, width)?
            }
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

/// Interleave byte planes back into elements: the shuffled chunk stores
/// byte 0 of every element, then byte 1, and so on.
fn unshuffle(data: &[u8], width: usize) -> Result<Vec<u8>, FormatError> {
    if width <= 1 {
        return Ok(data.to_vec());
    }
    if data.len() % width != 0 {
        return Err(FormatError::MalformedStructure(format!(
            "shuffled chunk of {} bytes is not a multiple of {width}",
            data.len()
        )));
    }
    let count = data.len() / width;
    let mut out = vec![0u8; data.len()];
    for (plane, bytes) in data.chunks_exact(count).enumerate() {
        for (i, &b) in bytes.iter().enumerate() {
            out[i * width + plane] = b;
        }
    }
    Ok(out)
}

#[cfg(feature = "deflate")]
fn deflate_decompress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| FormatError::DecompressionError(e.to_string()))?;
    Ok(result)
}

#[cfg(not(feature = "deflate"))]
fn deflate_decompress(_data: &[u8]) -> Result<Vec<u8>, FormatError> {
    Err(FormatError::UnsupportedFilter(FILTER_DEFLATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_pipeline::FilterDescription;

    fn pipeline(ids: &[u16]) -> FilterPipeline {
        FilterPipeline {
            version: 2,
            filters: ids
                .iter()
                .map(|&filter_id| FilterDescription {
                    filter_id,
                    name: None,
                    flags: 0,
                    client_data: vec![],
                })
                .collect(),
        }
    }

    #[cfg(feature = "deflate")]
    fn zlib(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    #[cfg(feature = "deflate")]
    fn deflate_round_trip() {
        let raw: Vec<u8> = (0..200u8).collect();
        let out = decompress_chunk(&zlib(&raw), &pipeline(&[FILTER_DEFLATE]), 0, 1).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn masked_filter_is_skipped() {
        let raw = vec![1u8, 2, 3];
        let out = decompress_chunk(&raw, &pipeline(&[FILTER_DEFLATE]), 0b1, 1).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    #[cfg(feature = "deflate")]
    fn corrupt_stream_is_decompression_error() {
        let err = decompress_chunk(&[0x78, 0x9c, 0xFF, 0xFF], &pipeline(&[FILTER_DEFLATE]), 0, 1)
            .unwrap_err();
        assert!(matches!(err, FormatError::DecompressionError(_)));
    }

    #[test]
    fn unshuffle_restores_element_order() {
        // three u32 values 0x04030201, 0x14131211, 0x24232221 as byte planes
        let planes = [1u8, 0x11, 0x21, 2, 0x12, 0x22, 3, 0x13, 0x23, 4, 0x14, 0x24];
        let out = decompress_chunk(&planes, &pipeline(&[FILTER_SHUFFLE]), 0, 4).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 0x11, 0x12, 0x13, 0x14, 0x21, 0x22, 0x23, 0x24]);
    }

    #[test]
    fn shuffle_width_comes_from_client_data() {
        let mut p = pipeline(&[FILTER_SHUFFLE]);
        p.filters[0].client_data = vec![2];
        let out = decompress_chunk(&[1, 3, 2, 4], &p, 0, 8).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn ragged_shuffled_chunk_is_malformed() {
        let err = decompress_chunk(&[0; 7], &pipeline(&[FILTER_SHUFFLE]), 0, 4).unwrap_err();
        assert!(matches!(err, FormatError::MalformedStructure(_)));
    }

    #[test]
    #[cfg(feature = "deflate")]
    fn shuffle_is_undone_after_deflate() {
        let planes = [1u8, 3, 5, 2, 4, 6];
        let out = decompress_chunk(
            &zlib(&planes),
            &pipeline(&[FILTER_SHUFFLE, FILTER_DEFLATE]),
            0,
            2,
        )
        .unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn unknown_filter() {
        assert_eq!(
            decompress_chunk(&[0], &pipeline(&[3]), 0, 1),
            Err(FormatError::UnsupportedFilter(3))
        );
    }
}
