//! HDF5 fractal heap: dense link and attribute storage for v2 objects.
//!
//! The heap is a doubling table. Row 0 and row 1 hold blocks of the
//! starting size, each later row doubles it. Rows up to the largest direct
//! block size point at direct blocks (`FHDB`); rows beyond point at nested
//! indirect blocks (`FHIB`).

use crate::btree_v2::{self, BTreeV2Header, BTreeV2Record};
use crate::cursor::{check_address, ByteCursor};
use crate::error::FormatError;

const HEAP_ID_MANAGED: u8 = 0;
const HEAP_ID_HUGE: u8 = 1;
const HEAP_ID_TINY: u8 = 2;

/// Heap flag: direct blocks carry a checksum.
const FLAG_DIRECT_BLOCK_CHECKSUM: u8 = 0x02;

/// Parsed `FRHP` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FractalHeapHeader {
    pub heap_id_length: u16,
    pub io_filter_encoded_length: u16,
    pub flags: u8,
    pub max_managed_object_size: u32,
    /// v2 B-tree indexing huge objects.
    pub huge_btree_address: Option<u64>,
    pub table_width: u16,
    pub starting_block_size: u64,
    pub max_direct_block_size: u64,
    /// Width in bits of heap offsets.
    pub max_heap_size: u16,
    pub starting_root_rows: u16,
    pub root_block_address: Option<u64>,
    /// 0 means the root is a direct block.
    pub current_root_rows: u16,
    pub offset_size: u8,
    pub length_size: u8,
}

/// A direct block found while walking the doubling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectBlock {
    /// File address of the block, header included.
    pub address: u64,
    /// Heap offset of the first byte of the block.
    pub block_offset: u64,
    pub size: u64,
}

/// A decoded heap ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapId {
    Managed { offset: u64, length: u64 },
    /// Address and length stored directly in the ID.
    HugeDirect { address: u64, length: u64 },
    /// Key into the huge-object B-tree.
    HugeIndirect { id: u64 },
    Tiny(Vec<u8>),
}

/// Bytes needed to encode values up to `max`.
fn encoded_size(max: u64) -> usize {
    let bits = 64 - max.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn log2(v: u64) -> u32 {
    63u32.saturating_sub(v.leading_zeros())
}

impl FractalHeapHeader {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<FractalHeapHeader, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"FRHP", "FRHP")?;
        let version = c.read_u8()?;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "fractal heap",
                version,
            });
        }
        let heap_id_length = c.read_u16()?;
        let io_filter_encoded_length = c.read_u16()?;
        let flags = c.read_u8()?;
        let max_managed_object_size = c.read_u32()?;
        let _next_huge_id = c.read_length(length_size)?;
        let huge_btree_address = c.read_offset(offset_size)?;
        let _free_space = c.read_length(length_size)?;
        let _free_space_manager = c.read_offset(offset_size)?;
        // managed space, allocated space, iterator offset, managed count,
        // huge size, huge count, tiny size, tiny count
        for _ in 0..8 {
            c.read_length(length_size)?;
        }
        let table_width = c.read_u16()?;
        let starting_block_size = c.read_length(length_size)?;
        let max_direct_block_size = c.read_length(length_size)?;
        let max_heap_size = c.read_u16()?;
        let starting_root_rows = c.read_u16()?;
        let root_block_address = c.read_offset(offset_size)?;
        let current_root_rows = c.read_u16()?;

        if table_width == 0 || starting_block_size == 0 || max_direct_block_size < starting_block_size {
            return Err(FormatError::MalformedStructure(format!(
                "fractal heap table {table_width} x {starting_block_size}..{max_direct_block_size}"
            )));
        }
        if max_heap_size == 0 || max_heap_size > 64 || current_root_rows > 64 {
            return Err(FormatError::MalformedStructure(format!(
                "fractal heap of {max_heap_size} bits with {current_root_rows} rows"
            )));
        }

        Ok(FractalHeapHeader {
            heap_id_length,
            io_filter_encoded_length,
            flags,
            max_managed_object_size,
            huge_btree_address,
            table_width,
            starting_block_size,
            max_direct_block_size,
            max_heap_size,
            starting_root_rows,
            root_block_address,
            current_root_rows,
            offset_size,
            length_size,
        })
    }

    /// Size of every block in doubling-table row `row`.
    pub fn block_size(&self, row: u32) -> Result<u64, FormatError> {
        if row <= 1 {
            return Ok(self.starting_block_size);
        }
        1u64.checked_shl(row - 1)
            .and_then(|m| m.checked_mul(self.starting_block_size))
            .ok_or_else(|| FormatError::MalformedStructure(format!("heap row {row} overflows")))
    }

    /// Rows of the table that address direct blocks.
    fn max_direct_rows(&self) -> u32 {
        log2(self.max_direct_block_size) - log2(self.starting_block_size) + 2
    }

    fn block_offset_width(&self) -> usize {
        (self.max_heap_size as usize).div_ceil(8)
    }

    /// Visit every direct block depth first, in heap-offset order.
    pub fn enumerate_direct_blocks(
        &self,
        data: &[u8],
        visit: &mut dyn FnMut(&DirectBlock) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        let Some(root) = self.root_block_address else {
            return Ok(());
        };
        if self.current_root_rows == 0 {
            return visit(&DirectBlock {
                address: root,
                block_offset: 0,
                size: self.starting_block_size,
            });
        }
        self.walk_indirect(data, root, self.current_root_rows as u32, 0, visit)
    }

    fn walk_indirect(
        &self,
        data: &[u8],
        address: u64,
        nrows: u32,
        block_offset: u64,
        visit: &mut dyn FnMut(&DirectBlock) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"FHIB", "FHIB")?;
        let _version = c.read_u8()?;
        let _heap_header = c.read_offset(self.offset_size)?;
        c.skip(self.block_offset_width())?;

        let width = self.table_width as u32;
        let direct_rows = nrows.min(self.max_direct_rows());
        let indirect_rows = nrows.saturating_sub(self.max_direct_rows());
        let filtered = self.io_filter_encoded_length > 0;

        let mut offset = block_offset;
        for row in 0..direct_rows {
            let size = self.block_size(row)?;
            for _ in 0..width {
                let child = c.read_offset(self.offset_size)?;
                if filtered {
                    let _filtered_size = c.read_length(self.length_size)?;
                    let _filter_mask = c.read_u32()?;
                }
                if let Some(address) = child {
                    visit(&DirectBlock {
                        address,
                        block_offset: offset,
                        size,
                    })?;
                }
                offset += size;
            }
        }

        let start_log = log2(self.starting_block_size) + log2(width as u64);
        for i in 0..indirect_rows {
            let row = direct_rows + i;
            let size = self.block_size(row)?;
            // A child indirect block spans exactly one entry of this row.
            let child_rows = (log2(size) + 1).checked_sub(start_log).ok_or_else(|| {
                FormatError::MalformedStructure(format!(
                    "fractal heap row {row} of {size}-byte blocks is narrower than the table"
                ))
            })?;
            for _ in 0..width {
                if let Some(child) = c.read_offset(self.offset_size)? {
                    if child_rows >= nrows {
                        return Err(FormatError::MalformedStructure(
                            "fractal heap indirect block does not shrink".into(),
                        ));
                    }
                    self.walk_indirect(data, child, child_rows, offset, visit)?;
                }
                offset += size;
            }
        }
        Ok(())
    }

    /// Resolve a heap offset to a file address by scanning the direct blocks.
    pub fn offset_to_address(&self, data: &[u8], heap_offset: u64) -> Result<u64, FormatError> {
        let mut found = None;
        self.enumerate_direct_blocks(data, &mut |block| {
            if found.is_none()
                && heap_offset >= block.block_offset
                && heap_offset < block.block_offset + block.size
            {
                found = Some(block.address + (heap_offset - block.block_offset));
            }
            Ok(())
        })?;
        found.ok_or_else(|| {
            FormatError::MalformedStructure(format!(
                "heap offset {heap_offset} is not inside any direct block"
            ))
        })
    }

    /// Decode a raw heap ID. The kind lives in bits 4-5 of the first byte.
    pub fn decode_id(&self, id: &[u8]) -> Result<HeapId, FormatError> {
        let mut c = ByteCursor::new(id);
        let first = c.read_u8()?;
        let version = first >> 6;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "heap ID",
                version,
            });
        }
        match (first >> 4) & 0x03 {
            HEAP_ID_MANAGED => {
                let offset = c.read_var_uint(self.block_offset_width())?;
                let len_width = encoded_size(self.max_direct_block_size)
                    .min(encoded_size(self.max_managed_object_size as u64))
                    .min(c.remaining().max(1));
                let length = c.read_var_uint(len_width)?;
                Ok(HeapId::Managed { offset, length })
            }
            HEAP_ID_HUGE => {
                let direct = self.offset_size as usize + self.length_size as usize;
                if self.io_filter_encoded_length == 0 && c.remaining() >= direct {
                    let address = c.read_offset(self.offset_size)?.ok_or_else(|| {
                        FormatError::MalformedStructure("huge object with undefined address".into())
                    })?;
                    let length = c.read_length(self.length_size)?;
                    Ok(HeapId::HugeDirect { address, length })
                } else {
                    let width = c.remaining().min(8);
                    Ok(HeapId::HugeIndirect {
                        id: c.read_var_uint(width)?,
                    })
                }
            }
            HEAP_ID_TINY => {
                // IDs longer than 18 bytes use a 12-bit length.
                let length = if self.heap_id_length > 18 {
                    (((first & 0x0F) as usize) << 8 | c.read_u8()? as usize) + 1
                } else {
                    (first & 0x0F) as usize + 1
                };
                Ok(HeapId::Tiny(c.read_bytes(length)?.to_vec()))
            }
            other => Err(FormatError::InvalidHeapIdType(other)),
        }
    }

    /// Fetch the object a heap ID names.
    pub fn read_object(&self, data: &[u8], id: &[u8], strict_btree_v2: bool) -> Result<Vec<u8>, FormatError> {
        match self.decode_id(id)? {
            HeapId::Managed { offset, length } => {
                let start = self.offset_to_address(data, offset)?;
                slice_at(data, start, length)
            }
            HeapId::HugeDirect { address, length } => slice_at(data, address, length),
            HeapId::HugeIndirect { id } => {
                let btree = self.huge_btree_address.ok_or_else(|| {
                    FormatError::MalformedStructure("huge object without a B-tree".into())
                })?;
                let header = BTreeV2Header::parse(data, btree, self.offset_size, self.length_size)?;
                let records = btree_v2::collect_records(
                    data,
                    &header,
                    self.offset_size,
                    self.length_size,
                    strict_btree_v2,
                )?;
                let (address, length) = records
                    .iter()
                    .find_map(|r| match *r {
                        BTreeV2Record::HugeObject {
                            address,
                            length,
                            id: rid,
                        } if rid == id => Some((address, length)),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        FormatError::MalformedStructure(format!("huge object {id} not indexed"))
                    })?;
                slice_at(data, address, length)
            }
            HeapId::Tiny(bytes) => Ok(bytes),
        }
    }

    /// Whether direct blocks end their header with a checksum.
    pub fn direct_blocks_checksummed(&self) -> bool {
        self.flags & FLAG_DIRECT_BLOCK_CHECKSUM != 0
    }
}

fn slice_at(data: &[u8], address: u64, length: u64) -> Result<Vec<u8>, FormatError> {
    let start = check_address(address, data.len())?;
    let mut c = ByteCursor::at(data, start);
    Ok(c.read_bytes(length as usize)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: u64 = 64;

    fn header_bytes(width: u16, start: u64, max_direct: u64, root: u64, rows: u16) -> Vec<u8> {
        let mut buf = b"FRHP".to_vec();
        buf.push(0);
        buf.extend_from_slice(&7u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(&(max_direct as u32).to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        for _ in 0..8 {
            buf.extend_from_slice(&0u64.to_le_bytes());
        }
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&start.to_le_bytes());
        buf.extend_from_slice(&max_direct.to_le_bytes());
        buf.extend_from_slice(&32u16.to_le_bytes());
        buf.extend_from_slice(&rows.to_le_bytes());
        buf.extend_from_slice(&root.to_le_bytes());
        buf.extend_from_slice(&rows.to_le_bytes());
        buf.extend_from_slice(&[0; 4]);
        buf
    }

    fn indirect_bytes(children: &[u64]) -> Vec<u8> {
        let mut buf = b"FHIB".to_vec();
        buf.push(0);
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        for &c in children {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        buf.extend_from_slice(&[0; 4]);
        buf
    }

    /// Root indirect block with three direct blocks of sizes S, S, 2S.
    fn three_block_heap() -> (Vec<u8>, FractalHeapHeader, [u64; 3]) {
        let iblock_at = 0x100u64;
        let blocks = [0x200u64, 0x300, 0x400];
        let mut data = header_bytes(1, S, 2 * S, iblock_at, 3);
        data.resize(iblock_at as usize, 0);
        data.extend_from_slice(&indirect_bytes(&blocks));
        data.resize(0x400 + 2 * S as usize, 0);
        for (i, &b) in blocks.iter().enumerate() {
            data[b as usize..b as usize + 4].copy_from_slice(b"FHDB");
            data[b as usize + 20] = i as u8 + 1;
        }
        let h = FractalHeapHeader::parse(&data, 0, 8, 8).unwrap();
        (data, h, blocks)
    }

    #[test]
    fn parse_header_fields() {
        let (_, h, _) = three_block_heap();
        assert_eq!(h.table_width, 1);
        assert_eq!(h.starting_block_size, S);
        assert_eq!(h.max_direct_block_size, 2 * S);
        assert_eq!(h.current_root_rows, 3);
        assert_eq!(h.root_block_address, Some(0x100));
        assert_eq!(h.max_direct_rows(), 3);
    }

    #[test]
    fn doubling_table_block_sizes() {
        let (_, h, _) = three_block_heap();
        assert_eq!(h.block_size(0).unwrap(), S);
        assert_eq!(h.block_size(1).unwrap(), S);
        assert_eq!(h.block_size(2).unwrap(), 2 * S);
        assert_eq!(h.block_size(3).unwrap(), 4 * S);
    }

    #[test]
    fn enumerate_direct_blocks_in_order() {
        let (data, h, blocks) = three_block_heap();
        let mut seen = Vec::new();
        h.enumerate_direct_blocks(&data, &mut |b| {
            seen.push(*b);
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                DirectBlock { address: blocks[0], block_offset: 0, size: S },
                DirectBlock { address: blocks[1], block_offset: S, size: S },
                DirectBlock { address: blocks[2], block_offset: 2 * S, size: 2 * S },
            ]
        );
    }

    #[test]
    fn offsets_resolve_at_block_boundaries() {
        let (data, h, [a, b, c]) = three_block_heap();
        let cases = [
            (0, a),
            (S - 1, a + S - 1),
            (S, b),
            (2 * S - 1, b + S - 1),
            (2 * S, c),
            (4 * S - 1, c + 2 * S - 1),
        ];
        for (offset, expected) in cases {
            assert_eq!(h.offset_to_address(&data, offset).unwrap(), expected, "offset {offset}");
        }
        assert!(h.offset_to_address(&data, 4 * S).is_err());
    }

    #[test]
    fn root_direct_block() {
        let mut data = header_bytes(4, 512, 4096, 0x100, 0);
        data.resize(0x100 + 512, 0);
        data[0x100 + 30..0x100 + 33].copy_from_slice(b"abc");
        let h = FractalHeapHeader::parse(&data, 0, 8, 8).unwrap();
        // managed ID: offset 30 (4 bytes for 32-bit heap), length 3
        let id = [0x00, 30, 0, 0, 0, 3, 0];
        assert_eq!(
            h.decode_id(&id).unwrap(),
            HeapId::Managed { offset: 30, length: 3 }
        );
        assert_eq!(h.read_object(&data, &id, false).unwrap(), b"abc");
    }

    #[test]
    fn tiny_id_carries_its_bytes() {
        let (data, h, _) = three_block_heap();
        let id = [0x20 | 2, b'x', b'y', b'z', 0, 0, 0];
        assert_eq!(h.read_object(&data, &id, false).unwrap(), b"xyz");
    }

    #[test]
    fn huge_direct_id() {
        let (data, mut h, _) = three_block_heap();
        h.heap_id_length = 17;
        let mut id = vec![0x10];
        id.extend_from_slice(&0x200u64.to_le_bytes());
        id.extend_from_slice(&4u64.to_le_bytes());
        assert_eq!(
            h.decode_id(&id).unwrap(),
            HeapId::HugeDirect { address: 0x200, length: 4 }
        );
        assert_eq!(h.read_object(&data, &id, false).unwrap(), b"FHDB");
    }

    #[test]
    fn heap_id_kind_comes_from_bits_four_and_five() {
        let (_, h, _) = three_block_heap();
        // Bits 6-7 carry the version; a non-zero version is rejected
        // rather than misread as a kind.
        assert!(matches!(
            h.decode_id(&[0x40, 0, 0, 0, 0, 0, 0]),
            Err(FormatError::InvalidStructureVersion { .. })
        ));
        assert_eq!(
            h.decode_id(&[0x30, 0, 0, 0, 0, 0, 0]),
            Err(FormatError::InvalidHeapIdType(3))
        );
    }

    #[test]
    fn table_wider_than_indirect_rows_is_malformed() {
        // width 16 with 1-byte blocks: a row-2 child would need negative rows
        let root_at = 0x100u64;
        let mut data = header_bytes(16, 1, 1, root_at, 3);
        data.resize(root_at as usize, 0);
        data.extend_from_slice(&indirect_bytes(&[u64::MAX; 48]));
        let h = FractalHeapHeader::parse(&data, 0, 8, 8).unwrap();
        let err = h.enumerate_direct_blocks(&data, &mut |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedStructure);
    }

    #[test]
    fn nested_indirect_block() {
        // width 1, start S, max direct S: one direct row pair (rows 0, 1),
        // then row 2 holds an indirect block of 2 rows.
        let root_at = 0x100u64;
        let child_at = 0x180u64;
        let d0 = 0x200u64;
        let d1 = 0x280u64;
        let c0 = 0x300u64;
        let c1 = 0x380u64;
        let mut data = header_bytes(1, S, S, root_at, 3);
        data.resize(root_at as usize, 0);
        data.extend_from_slice(&indirect_bytes(&[d0, d1, child_at]));
        data.resize(child_at as usize, 0);
        data.extend_from_slice(&indirect_bytes(&[c0, c1]));
        data.resize(0x400, 0);
        let h = FractalHeapHeader::parse(&data, 0, 8, 8).unwrap();
        assert_eq!(h.max_direct_rows(), 2);

        let mut seen = Vec::new();
        h.enumerate_direct_blocks(&data, &mut |b| {
            seen.push((b.address, b.block_offset));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(d0, 0), (d1, S), (c0, 2 * S), (c1, 3 * S)]);
        assert_eq!(h.offset_to_address(&data, 3 * S + 5).unwrap(), c1 + 5);
    }
}
