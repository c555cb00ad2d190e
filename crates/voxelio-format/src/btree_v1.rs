//! HDF5 B-tree v1: type 0 indexes group symbol nodes, type 1 indexes
//! raw data chunks.

use crate::cursor::ByteCursor;
use crate::error::FormatError;

pub const NODE_TYPE_GROUP: u8 = 0;
pub const NODE_TYPE_CHUNK: u8 = 1;

/// Key of a chunk B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    /// Stored (possibly compressed) size of the chunk in bytes.
    pub size: u32,
    pub filter_mask: u32,
    /// Element offset of the chunk along each dimension, plus a trailing
    /// element-size offset that is always 0.
    pub offsets: Vec<u64>,
}

/// A node key, shaped by node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeV1Key {
    /// Heap offset of the greatest name in the child.
    Group(u64),
    Chunk(ChunkKey),
}

/// A parsed `TREE` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV1Node {
    pub node_type: u8,
    /// 0 = leaf.
    pub level: u8,
    /// `children.len() + 1` keys.
    pub keys: Vec<BTreeV1Key>,
    pub children: Vec<u64>,
}

impl BTreeV1Node {
    /// Parse the node at `address`. `rank` is the dataset rank and only
    /// matters for chunk nodes.
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
        rank: usize,
    ) -> Result<BTreeV1Node, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        c.expect_signature(b"TREE", "TREE")?;
        let node_type = c.read_u8()?;
        if node_type != NODE_TYPE_GROUP && node_type != NODE_TYPE_CHUNK {
            return Err(FormatError::InvalidBTreeNodeType(node_type));
        }
        let level = c.read_u8()?;
        let entries = c.read_u16()? as usize;
        let _left = c.read_offset(offset_size)?;
        let _right = c.read_offset(offset_size)?;

        let mut keys = Vec::with_capacity(entries + 1);
        let mut children = Vec::with_capacity(entries);
        for i in 0..=entries {
            keys.push(read_key(&mut c, node_type, length_size, rank)?);
            if i < entries {
                let child = c.read_offset(offset_size)?.ok_or_else(|| {
                    FormatError::MalformedStructure("B-tree child with undefined address".into())
                })?;
                children.push(child);
            }
        }

        Ok(BTreeV1Node {
            node_type,
            level,
            keys,
            children,
        })
    }
}

fn read_key(
    c: &mut ByteCursor<'_>,
    node_type: u8,
    length_size: u8,
    rank: usize,
) -> Result<BTreeV1Key, FormatError> {
    if node_type == NODE_TYPE_GROUP {
        return Ok(BTreeV1Key::Group(c.read_length(length_size)?));
    }
    let size = c.read_u32()?;
    let filter_mask = c.read_u32()?;
    let mut offsets = Vec::with_capacity(rank + 1);
    for _ in 0..=rank {
        offsets.push(c.read_u64()?);
    }
    Ok(BTreeV1Key::Chunk(ChunkKey {
        size,
        filter_mask,
        offsets,
    }))
}

/// A leaf chunk reference in traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub key: ChunkKey,
    pub address: u64,
}

/// Walk a group B-tree and return the addresses of its `SNOD` leaves.
pub fn collect_symbol_nodes(
    data: &[u8],
    root: u64,
    offset_size: u8,
    length_size: u8,
    max_depth: usize,
) -> Result<Vec<u64>, FormatError> {
    let mut out = Vec::new();
    walk(data, root, offset_size, length_size, 0, NODE_TYPE_GROUP, max_depth, 0, &mut |node| {
        out.extend_from_slice(&node.children);
        Ok(())
    })?;
    Ok(out)
}

/// Walk a chunk B-tree depth first and return its chunks in leaf order.
pub fn collect_chunks(
    data: &[u8],
    root: u64,
    offset_size: u8,
    length_size: u8,
    rank: usize,
    max_depth: usize,
) -> Result<Vec<ChunkRecord>, FormatError> {
    let mut out = Vec::new();
    walk(data, root, offset_size, length_size, rank, NODE_TYPE_CHUNK, max_depth, 0, &mut |node| {
        for (key, &address) in node.keys.iter().zip(&node.children) {
            if let BTreeV1Key::Chunk(key) = key {
                out.push(ChunkRecord {
                    key: key.clone(),
                    address,
                });
            }
        }
        Ok(())
    })?;
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    data: &[u8],
    address: u64,
    offset_size: u8,
    length_size: u8,
    rank: usize,
    expected_type: u8,
    max_depth: usize,
    depth: usize,
    on_leaf: &mut dyn FnMut(&BTreeV1Node) -> Result<(), FormatError>,
) -> Result<(), FormatError> {
    if depth > max_depth {
        return Err(FormatError::MalformedStructure(format!(
            "B-tree deeper than {max_depth} levels"
        )));
    }
    let node = BTreeV1Node::parse(data, address, offset_size, length_size, rank)?;
    if node.node_type != expected_type {
        return Err(FormatError::InvalidBTreeNodeType(node.node_type));
    }
    if node.level == 0 {
        return on_leaf(&node);
    }
    for &child in &node.children {
        walk(
            data,
            child,
            offset_size,
            length_size,
            rank,
            expected_type,
            max_depth,
            depth + 1,
            on_leaf,
        )?;
    }
    Ok(())
}
