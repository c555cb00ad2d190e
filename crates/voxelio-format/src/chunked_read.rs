//! Chunked dataset reading: v1 B-tree traversal and sequential assembly.
//!
//! Chunks are written into the output in B-tree leaf order. Each chunk must
//! start exactly where the previous one stopped; the writers of the volumes
//! this crate reads emit chunks that way, but HDF5 itself does not promise
//! it. A chunk that would land anywhere else fails the read.

use log::trace;

use crate::btree_v1::{self, ChunkRecord};
use crate::cursor::{check_address, ByteCursor};
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::filters::decompress_chunk;

/// Parameters of one chunked read.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedSource<'p> {
    pub btree_address: u64,
    /// Dataset shape, slowest dimension first.
    pub dims: &'p [u64],
    /// Chunk shape, without the trailing element-size entry.
    pub chunk_dims: &'p [u32],
    pub element_size: usize,
    pub pipeline: Option<&'p FilterPipeline>,
    pub offset_size: u8,
    pub length_size: u8,
    pub max_depth: usize,
}

/// Output buffer filled one chunk after another.
#[derive(Debug)]
pub struct SequentialFill {
    output: Vec<u8>,
    dims: Vec<u64>,
    element_size: usize,
    /// Elements written so far.
    n_filled: usize,
}

impl SequentialFill {
    /// Prepare an output of `product(dims)` elements. Fails unless chunks of
    /// `chunk_dims` lay out as contiguous runs of that output.
    pub fn new(dims: &[u64], chunk_dims: &[u32], element_size: usize) -> Result<SequentialFill, FormatError> {
        if dims.len() != chunk_dims.len() {
            return Err(FormatError::MalformedStructure(format!(
                "chunk rank {} does not match dataset rank {}",
                chunk_dims.len(),
                dims.len()
            )));
        }
        // Every dimension faster than the slowest non-unit chunk dimension
        // must be covered whole, or chunk bytes are not output-contiguous.
        let first_wide = chunk_dims.iter().position(|&d| d > 1).unwrap_or(dims.len());
        for j in first_wide + 1..dims.len() {
            if chunk_dims[j] as u64 != dims[j] {
                return Err(FormatError::MalformedStructure(format!(
                    "chunk shape {chunk_dims:?} cannot fill {dims:?} sequentially"
                )));
            }
        }
        let total = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
            .and_then(|n| n.checked_mul(element_size))
            .ok_or_else(|| FormatError::MalformedStructure(format!("dataset {dims:?} too large")))?;
        Ok(SequentialFill {
            output: vec![0u8; total],
            dims: dims.to_vec(),
            element_size,
            n_filled: 0,
        })
    }

    /// Row-major element index of a chunk origin.
    fn linear_index(&self, offsets: &[u64]) -> usize {
        let mut index = 0usize;
        for (&o, &d) in offsets.iter().zip(&self.dims) {
            index = index * d as usize + o as usize;
        }
        index
    }

    /// Append one decoded chunk whose origin is `offsets`.
    pub fn push(&mut self, offsets: &[u64], bytes: &[u8]) -> Result<(), FormatError> {
        let start = self.linear_index(offsets);
        if start != self.n_filled {
            return Err(FormatError::MalformedStructure(format!(
                "chunk at {offsets:?} starts at element {start}, expected {}",
                self.n_filled
            )));
        }
        let at = start * self.element_size;
        let take = bytes.len().min(self.output.len() - at);
        self.output[at..at + take].copy_from_slice(&bytes[..take]);
        self.n_filled += take / self.element_size;
        trace!("chunk at {offsets:?}: {take} bytes, {} elements filled", self.n_filled);
        Ok(())
    }

    pub fn n_filled(&self) -> usize {
        self.n_filled
    }

    /// The assembled bytes. Fails if any element was never written.
    pub fn finish(self) -> Result<Vec<u8>, FormatError> {
        let total = self.output.len() / self.element_size.max(1);
        if self.n_filled != total {
            return Err(FormatError::MalformedStructure(format!(
                "chunks filled {} of {total} elements",
                self.n_filled
            )));
        }
        Ok(self.output)
    }
}

fn chunk_bytes<'a>(data: &'a [u8], record: &ChunkRecord) -> Result<&'a [u8], FormatError> {
    let start = check_address(record.address, data.len())?;
    let mut c = ByteCursor::at(data, start);
    c.read_bytes(record.key.size as usize)
}

/// Read and assemble a chunked dataset into row-major bytes.
pub fn read_chunked(data: &[u8], src: &ChunkedSource<'_>) -> Result<Vec<u8>, FormatError> {
    let rank = src.dims.len();
    let records = btree_v1::collect_chunks(
        data,
        src.btree_address,
        src.offset_size,
        src.length_size,
        rank,
        src.max_depth,
    )?;
    let mut fill = SequentialFill::new(src.dims, src.chunk_dims, src.element_size)?;
    for record in &records {
        let raw = chunk_bytes(data, record)?;
        let offsets = &record.key.offsets[..rank.min(record.key.offsets.len())];
        match src.pipeline {
            Some(pipeline) if !pipeline.is_empty() => {
                let inflated =
                    decompress_chunk(raw, pipeline, record.key.filter_mask, src.element_size)?;
                fill.push(offsets, &inflated)?;
            }
            _ => fill.push(offsets, raw)?,
        }
    }
    fill.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_in_traversal_order() {
        // four chunks of one z-slice each over a 4x2x3 volume
        let mut fill = SequentialFill::new(&[4, 2, 3], &[1, 2, 3], 2).unwrap();
        let mut expected = Vec::new();
        for z in 0..4u64 {
            let payload: Vec<u8> = (0..12).map(|i| (z as u8) * 16 + i).collect();
            fill.push(&[z, 0, 0], &payload).unwrap();
            expected.extend_from_slice(&payload);
        }
        assert_eq!(fill.n_filled(), 24);
        assert_eq!(fill.finish().unwrap(), expected);
    }

    #[test]
    fn out_of_order_chunk_is_rejected() {
        let mut fill = SequentialFill::new(&[2, 4], &[1, 4], 1).unwrap();
        assert!(matches!(
            fill.push(&[1, 0], &[0; 4]),
            Err(FormatError::MalformedStructure(_))
        ));
    }

    #[test]
    fn edge_chunk_is_clipped() {
        let mut fill = SequentialFill::new(&[3, 2], &[2, 2], 1).unwrap();
        fill.push(&[0, 0], &[1, 2, 3, 4]).unwrap();
        fill.push(&[2, 0], &[5, 6, 7, 8]).unwrap();
        assert_eq!(fill.finish().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn non_contiguous_chunk_shape_is_rejected() {
        assert!(SequentialFill::new(&[2, 3], &[2, 4], 1).is_err());
        assert!(SequentialFill::new(&[4, 4], &[2, 2], 4).is_err());
        assert!(SequentialFill::new(&[4, 4, 4], &[1, 1, 4], 4).is_ok());
    }

    #[test]
    fn missing_chunks_fail_finish() {
        let mut fill = SequentialFill::new(&[2, 2], &[1, 2], 1).unwrap();
        fill.push(&[0, 0], &[1, 2]).unwrap();
        assert!(fill.finish().is_err());
    }

    fn chunk_tree(chunks: &[(u64, &[u8])], base: u64) -> (Vec<u8>, u64) {
        // leaf TREE node (rank 1) followed by the chunk payloads
        let mut node = b"TREE".to_vec();
        node.extend_from_slice(&[1, 0]);
        node.extend_from_slice(&(chunks.len() as u16).to_le_bytes());
        node.extend_from_slice(&u64::MAX.to_le_bytes());
        node.extend_from_slice(&u64::MAX.to_le_bytes());
        let node_len = node.len() + (chunks.len() + 1) * 24 + chunks.len() * 8;
        let mut payload_at = base + node_len as u64;
        let mut payloads = Vec::new();
        for &(offset, bytes) in chunks {
            node.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            node.extend_from_slice(&0u32.to_le_bytes());
            node.extend_from_slice(&offset.to_le_bytes());
            node.extend_from_slice(&0u64.to_le_bytes());
            node.extend_from_slice(&payload_at.to_le_bytes());
            payload_at += bytes.len() as u64;
            payloads.extend_from_slice(bytes);
        }
        node.extend_from_slice(&[0; 24]);
        let mut data = vec![0u8; base as usize];
        data.extend_from_slice(&node);
        data.extend_from_slice(&payloads);
        (data, base)
    }

    #[test]
    fn read_raw_chunks_from_tree() {
        let (data, root) = chunk_tree(&[(0, &[1, 2, 3]), (3, &[4, 5, 6])], 16);
        let src = ChunkedSource {
            btree_address: root,
            dims: &[6],
            chunk_dims: &[3],
            element_size: 1,
            pipeline: None,
            offset_size: 8,
            length_size: 8,
            max_depth: 8,
        };
        assert_eq!(read_chunked(&data, &src).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn read_deflated_chunks_from_tree() {
        use crate::filter_pipeline::{FilterDescription, FILTER_DEFLATE};
        use flate2::{write::ZlibEncoder, Compression};
        use std::io::Write;

        let deflate = |bytes: &[u8]| {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(bytes).unwrap();
            enc.finish().unwrap()
        };
        let a = deflate(&[9; 4]);
        let b = deflate(&[7; 4]);
        let (data, root) = chunk_tree(&[(0, &a), (4, &b)], 0);
        let pipeline = FilterPipeline {
            version: 2,
            filters: vec![FilterDescription {
                filter_id: FILTER_DEFLATE,
                name: None,
                flags: 0,
                client_data: vec![4],
            }],
        };
        let src = ChunkedSource {
            btree_address: root,
            dims: &[8],
            chunk_dims: &[4],
            element_size: 1,
            pipeline: Some(&pipeline),
            offset_size: 8,
            length_size: 8,
            max_depth: 8,
        };
        assert_eq!(read_chunked(&data, &src).unwrap(), vec![9, 9, 9, 9, 7, 7, 7, 7]);
    }
}
