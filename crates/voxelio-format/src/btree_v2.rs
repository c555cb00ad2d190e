//! HDF5 B-tree v2: record types 1 (huge objects), 5 (link names) and
//! 8 (attribute names).
//!
//! Internal nodes store, per child, a record count whose byte width
//! depends on the maximum record count of the subtree below it. That width
//! is exact when the children are leaves. For deeper trees it is
//! approximated from the leaf capacity; `strict` rejects such trees
//! instead.

use crate::cursor::ByteCursor;
use crate::error::FormatError;

pub const RECORD_HUGE_OBJECT: u8 = 1;
pub const RECORD_LINK_NAME: u8 = 5;
pub const RECORD_ATTRIBUTE_NAME: u8 = 8;

const MAX_DEPTH: u16 = 16;

/// Parsed `BTHD` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV2Header {
    pub record_type: u8,
    pub node_size: u32,
    pub record_size: u16,
    pub depth: u16,
    pub root_address: Option<u64>,
    pub root_records: u16,
    pub total_records: u64,
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeV2Record {
    HugeObject { address: u64, length: u64, id: u64 },
    LinkName { hash: u32, heap_id: Vec<u8> },
    AttributeName {
        heap_id: Vec<u8>,
        message_flags: u8,
        creation_order: u32,
        hash: u32,
    },
    Other(Vec<u8>),
}

impl BTreeV2Record {
    /// The fractal heap ID for name-index records.
    pub fn heap_id(&self) -> Option<&[u8]> {
        match self {
            BTreeV2Record::LinkName { heap_id, .. }
            | BTreeV2Record::AttributeName { heap_id, .. } => Some(heap_id),
            _ => None,
        }
    }
}

impl BTreeV2Header {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<BTreeV2Header, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"BTHD", "BTHD")?;
        let version = c.read_u8()?;
        if version != 0 {
            return Err(FormatError::InvalidStructureVersion {
                structure: "v2 B-tree header",
                version,
            });
        }
        let record_type = c.read_u8()?;
        let node_size = c.read_u32()?;
        let record_size = c.read_u16()?;
        let depth = c.read_u16()?;
        let _split = c.read_u8()?;
        let _merge = c.read_u8()?;
        let root_address = c.read_offset(offset_size)?;
        let root_records = c.read_u16()?;
        let total_records = c.read_length(length_size)?;
        if record_size == 0 {
            return Err(FormatError::MalformedStructure(
                "v2 B-tree with zero record size".into(),
            ));
        }
        Ok(BTreeV2Header {
            record_type,
            node_size,
            record_size,
            depth,
            root_address,
            root_records,
            total_records,
        })
    }

    /// Records a leaf node can hold.
    fn max_leaf_records(&self) -> u64 {
        // signature, version, type and checksum surround the records
        (self.node_size.saturating_sub(10) / self.record_size as u32) as u64
    }
}

/// Bytes needed to store values up to `max`.
fn bytes_for(max: u64) -> usize {
    let bits = 64 - max.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Collect every record of the tree in key order.
pub fn collect_records(
    data: &[u8],
    header: &BTreeV2Header,
    offset_size: u8,
    length_size: u8,
    strict: bool,
) -> Result<Vec<BTreeV2Record>, FormatError> {
    let Some(root) = header.root_address else {
        return Ok(Vec::new());
    };
    if header.depth > MAX_DEPTH {
        return Err(FormatError::MalformedStructure(format!(
            "v2 B-tree depth {} exceeds {MAX_DEPTH}",
            header.depth
        )));
    }
    if header.depth > 1 {
        if strict {
            return Err(FormatError::MalformedStructure(format!(
                "v2 B-tree of depth {} needs exact record-count widths",
                header.depth
            )));
        }
        log::warn!(
            "v2 B-tree depth {} > 1: child record-count widths are approximated",
            header.depth
        );
    }
    let mut out = Vec::with_capacity(header.total_records.min(1 << 16) as usize);
    let ctx = NodeContext {
        data,
        header,
        offset_size,
        length_size,
    };
    ctx.visit(root, header.root_records as usize, header.depth, &mut out)?;
    Ok(out)
}

struct NodeContext<'a> {
    data: &'a [u8],
    header: &'a BTreeV2Header,
    offset_size: u8,
    length_size: u8,
}

impl NodeContext<'_> {
    fn visit(
        &self,
        address: u64,
        nrec: usize,
        depth: u16,
        out: &mut Vec<BTreeV2Record>,
    ) -> Result<(), FormatError> {
        let mut c = ByteCursor::new(self.data);
        c.seek_address(address)?;
        let sig: &'static [u8] = if depth == 0 { b"BTLF" } else { b"BTIN" };
        c.expect_signature(sig, if depth == 0 { "BTLF" } else { "BTIN" })?;
        let _version = c.read_u8()?;
        let node_type = c.read_u8()?;
        if node_type != self.header.record_type {
            return Err(FormatError::InvalidBTreeNodeType(node_type));
        }

        let mut records = Vec::with_capacity(nrec);
        for _ in 0..nrec {
            let mut rc = c.sub_cursor(self.header.record_size as usize)?;
            records.push(self.decode_record(&mut rc)?);
        }
        if depth == 0 {
            out.extend(records);
            return Ok(());
        }

        let max_leaf = self.header.max_leaf_records();
        let nrec_width = bytes_for(max_leaf);
        // Exact when the children are leaves.
        let total_width = if depth > 1 {
            bytes_for(max_leaf.saturating_mul(max_leaf + 1).saturating_mul(depth as u64))
        } else {
            0
        };

        let mut children = Vec::with_capacity(nrec + 1);
        for _ in 0..=nrec {
            let child = c.read_offset(self.offset_size)?.ok_or_else(|| {
                FormatError::MalformedStructure("v2 B-tree child with undefined address".into())
            })?;
            let child_nrec = c.read_var_uint(nrec_width)? as usize;
            if total_width > 0 {
                let _total = c.read_var_uint(total_width)?;
            }
            children.push((child, child_nrec));
        }

        // Records of an internal node sit between its children.
        let mut records = records.into_iter();
        for (i, (child, child_nrec)) in children.into_iter().enumerate() {
            self.visit(child, child_nrec, depth - 1, out)?;
            if i < nrec {
                if let Some(r) = records.next() {
                    out.push(r);
                }
            }
        }
        Ok(())
    }

    fn decode_record(&self, c: &mut ByteCursor<'_>) -> Result<BTreeV2Record, FormatError> {
        let size = self.header.record_size as usize;
        Ok(match self.header.record_type {
            RECORD_HUGE_OBJECT => {
                let address = c.read_offset(self.offset_size)?.unwrap_or(u64::MAX);
                let length = c.read_length(self.length_size)?;
                let id = c.read_length(self.length_size)?;
                BTreeV2Record::HugeObject {
                    address,
                    length,
                    id,
                }
            }
            RECORD_LINK_NAME => {
                let hash = c.read_u32()?;
                let heap_id = c.read_bytes(size.saturating_sub(4))?.to_vec();
                BTreeV2Record::LinkName { hash, heap_id }
            }
            RECORD_ATTRIBUTE_NAME => {
                let heap_id = c.read_bytes(size.saturating_sub(9))?.to_vec();
                let message_flags = c.read_u8()?;
                let creation_order = c.read_u32()?;
                let hash = c.read_u32()?;
                BTreeV2Record::AttributeName {
                    heap_id,
                    message_flags,
                    creation_order,
                    hash,
                }
            }
            _ => BTreeV2Record::Other(c.read_bytes(size)?.to_vec()),
        })
    }
}
