//! Synthetic HDF5 files for tests.
//!
//! [`FileBuilder`] lays out a small object tree either the way old writers
//! do (superblock v0, v1 object headers, symbol-table groups) or the way
//! newer ones do (superblock v2, `OHDR` headers, link messages, optionally
//! dense link and attribute storage in fractal heaps).

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::attribute::AttrValue;
use crate::checksum::lookup3;
use crate::signature::HDF5_SIGNATURE;
use crate::typed_array::{ElementType, TypedArray};

const UNDEF: u64 = u64::MAX;

const MSG_DATASPACE: u16 = 0x0001;
const MSG_LINK_INFO: u16 = 0x0002;
const MSG_DATATYPE: u16 = 0x0003;
const MSG_LINK: u16 = 0x0006;
const MSG_LAYOUT: u16 = 0x0008;
const MSG_GROUP_INFO: u16 = 0x000A;
const MSG_FILTER_PIPELINE: u16 = 0x000B;
const MSG_ATTRIBUTE: u16 = 0x000C;
const MSG_SYMBOL_TABLE: u16 = 0x0011;
const MSG_ATTRIBUTE_INFO: u16 = 0x0015;

/// Which generation of structures to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Superblock v0, v1 object headers, symbol tables.
    V0,
    /// Superblock v2, v2 object headers, link messages.
    V2,
}

/// A dataset to write.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    name: String,
    shape: Vec<u64>,
    values: TypedArray,
    big_endian: bool,
    chunks: Option<Vec<u32>>,
    deflate: bool,
    shuffle: bool,
    legacy_layout: bool,
    compact: bool,
    attrs: Vec<(String, AttrValue)>,
}

impl DatasetBuilder {
    fn new(name: &str) -> Self {
        DatasetBuilder {
            name: name.to_string(),
            shape: Vec::new(),
            values: TypedArray::F64(Vec::new()),
            big_endian: false,
            chunks: None,
            deflate: false,
            shuffle: false,
            legacy_layout: false,
            compact: false,
            attrs: Vec::new(),
        }
    }

    /// Element values; the shape defaults to one dimension.
    pub fn with_values(&mut self, values: TypedArray) -> &mut Self {
        if self.shape.is_empty() {
            self.shape = vec![values.len() as u64];
        }
        self.values = values;
        self
    }

    /// An empty shape writes a scalar.
    pub fn with_shape(&mut self, shape: &[u64]) -> &mut Self {
        self.shape = shape.to_vec();
        self
    }

    pub fn with_chunks(&mut self, chunk_dims: &[u32]) -> &mut Self {
        self.chunks = Some(chunk_dims.to_vec());
        self
    }

    pub fn with_deflate(&mut self) -> &mut Self {
        self.deflate = true;
        self
    }

    /// Byte-shuffle each chunk before any compression.
    pub fn with_shuffle(&mut self) -> &mut Self {
        self.shuffle = true;
        self
    }

    /// Write the chunked layout as a version 1 message.
    pub fn legacy_layout(&mut self) -> &mut Self {
        self.legacy_layout = true;
        self
    }

    pub fn compact(&mut self) -> &mut Self {
        self.compact = true;
        self
    }

    pub fn big_endian(&mut self) -> &mut Self {
        self.big_endian = true;
        self
    }

    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> &mut Self {
        self.attrs.push((name.to_string(), value));
        self
    }
}

/// A group to write. Subgroups are laid out before datasets.
#[derive(Debug, Clone)]
pub struct GroupBuilder {
    name: String,
    groups: Vec<GroupBuilder>,
    datasets: Vec<DatasetBuilder>,
    attrs: Vec<(String, AttrValue)>,
    dense: bool,
}

impl GroupBuilder {
    fn new(name: &str) -> Self {
        GroupBuilder {
            name: name.to_string(),
            groups: Vec::new(),
            datasets: Vec::new(),
            attrs: Vec::new(),
            dense: false,
        }
    }

    pub fn create_group(&mut self, name: &str) -> &mut GroupBuilder {
        self.groups.push(GroupBuilder::new(name));
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn create_dataset(&mut self, name: &str) -> &mut DatasetBuilder {
        self.datasets.push(DatasetBuilder::new(name));
        let last = self.datasets.len() - 1;
        &mut self.datasets[last]
    }

    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> &mut Self {
        self.attrs.push((name.to_string(), value));
        self
    }

    /// Keep links and attributes in fractal heaps (v2 files only).
    pub fn dense_storage(&mut self) -> &mut Self {
        self.dense = true;
        self
    }
}

/// Builds a whole file in memory.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    version: FormatVersion,
    root: GroupBuilder,
}

impl FileBuilder {
    pub fn new(version: FormatVersion) -> Self {
        FileBuilder {
            version,
            root: GroupBuilder::new(""),
        }
    }

    pub fn root(&mut self) -> &mut GroupBuilder {
        &mut self.root
    }

    /// Create `path`'s groups as needed and return the last one.
    pub fn group(&mut self, path: &str) -> &mut GroupBuilder {
        let mut group = &mut self.root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let pos = group.groups.iter().position(|g| g.name == part);
            group = match pos {
                Some(i) => &mut group.groups[i],
                None => group.create_group(part),
            };
        }
        group
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = Writer::default();
        match self.version {
            FormatVersion::V0 => {
                w.reserve(SUPERBLOCK_V0_LEN);
                let (root, btree, heap) = w.group_v1(&self.root);
                let sb = superblock_v0(root, btree, heap, w.buf.len() as u64);
                w.patch(0, &sb);
            }
            FormatVersion::V2 => {
                w.reserve(SUPERBLOCK_V2_LEN);
                let root = w.group_v2(&self.root);
                let sb = superblock_v2(root, w.buf.len() as u64);
                w.patch(0, &sb);
            }
        }
        w.buf
    }
}

const SUPERBLOCK_V0_LEN: usize = 96;
const SUPERBLOCK_V2_LEN: usize = 48;

fn superblock_v0(root: u64, btree: u64, heap: u64, eof: u64) -> Vec<u8> {
    let mut b = HDF5_SIGNATURE.to_vec();
    b.extend_from_slice(&[0, 0, 0, 0, 0, 8, 8, 0]);
    b.extend_from_slice(&4u16.to_le_bytes());
    b.extend_from_slice(&16u16.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    for v in [0, UNDEF, eof, UNDEF, 0, root] {
        b.extend_from_slice(&v.to_le_bytes());
    }
    b.extend_from_slice(&1u32.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.extend_from_slice(&btree.to_le_bytes());
    b.extend_from_slice(&heap.to_le_bytes());
    b
}

fn superblock_v2(root: u64, eof: u64) -> Vec<u8> {
    let mut b = HDF5_SIGNATURE.to_vec();
    b.extend_from_slice(&[2, 8, 8, 0]);
    for v in [0, UNDEF, eof, root] {
        b.extend_from_slice(&v.to_le_bytes());
    }
    let sum = lookup3(&b);
    b.extend_from_slice(&sum.to_le_bytes());
    b
}

fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

/// Bytes needed to store values up to `max`.
fn encoded_size(max: u64) -> usize {
    let bits = 64 - max.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn value_bytes(values: &TypedArray, big_endian: bool) -> Vec<u8> {
    macro_rules! encode {
        ($v:expr) => {
            $v.iter()
                .flat_map(|x| if big_endian { x.to_be_bytes() } else { x.to_le_bytes() })
                .collect()
        };
    }
    match values {
        TypedArray::I8(v) => encode!(v),
        TypedArray::U8(v) => v.clone(),
        TypedArray::I16(v) => encode!(v),
        TypedArray::U16(v) => encode!(v),
        TypedArray::I32(v) => encode!(v),
        TypedArray::U32(v) => encode!(v),
        TypedArray::F32(v) => encode!(v),
        TypedArray::F64(v) => encode!(v),
    }
}

/// Version 1 datatype message for a numeric element type.
fn numeric_datatype(et: ElementType, big_endian: bool) -> Vec<u8> {
    let size = et.size() as u32;
    let order = big_endian as u8;
    let mut b = if et.is_float() {
        vec![0x11, 0x20 | order, (size * 8 - 1) as u8, 0]
    } else {
        let signed = matches!(et, ElementType::Int8 | ElementType::Int16 | ElementType::Int32);
        vec![0x10, order | if signed { 0x08 } else { 0 }, 0, 0]
    };
    b.extend_from_slice(&size.to_le_bytes());
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(&((size * 8) as u16).to_le_bytes());
    if et.is_float() {
        let (exp_loc, exp_size, mant_size, bias): (u8, u8, u8, u32) = if size == 4 {
            (23, 8, 23, 127)
        } else {
            (52, 11, 52, 1023)
        };
        b.extend_from_slice(&[exp_loc, exp_size, 0, mant_size]);
        b.extend_from_slice(&bias.to_le_bytes());
    }
    b
}

fn string_datatype(len: usize) -> Vec<u8> {
    let mut b = vec![0x13, 0, 0, 0];
    b.extend_from_slice(&(len as u32).to_le_bytes());
    b
}

fn dataspace(shape: &[u64]) -> Vec<u8> {
    let mut b = vec![1, shape.len() as u8, 0, 0, 0, 0, 0, 0];
    for d in shape {
        b.extend_from_slice(&d.to_le_bytes());
    }
    b
}

/// Datatype, dataspace and raw bytes of an attribute value.
fn attr_parts(value: &AttrValue) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    match value {
        AttrValue::Scalar(v) => (
            numeric_datatype(ElementType::Float64, false),
            dataspace(&[]),
            v.to_le_bytes().to_vec(),
        ),
        AttrValue::Array(a) => (
            numeric_datatype(a.element_type(), false),
            dataspace(&[a.len() as u64]),
            value_bytes(a, false),
        ),
        AttrValue::Text(s) => (string_datatype(s.len().max(1)), dataspace(&[]), {
            let mut raw = s.as_bytes().to_vec();
            raw.resize(s.len().max(1), 0);
            raw
        }),
    }
}

/// Attribute message: version 1 pads every field to 8 bytes, version 3
/// packs them and adds a character-set byte.
fn attribute(name: &str, value: &AttrValue, version: u8) -> Vec<u8> {
    let name_z = format!("{name}\0");
    let (dt, ds, raw) = attr_parts(value);
    let mut b = vec![version, 0];
    b.extend_from_slice(&(name_z.len() as u16).to_le_bytes());
    b.extend_from_slice(&(dt.len() as u16).to_le_bytes());
    b.extend_from_slice(&(ds.len() as u16).to_le_bytes());
    if version == 3 {
        b.push(0);
    }
    for part in [name_z.as_bytes(), &dt, &ds] {
        b.extend_from_slice(part);
        if version == 1 {
            b.resize(pad8(b.len()), 0);
        }
    }
    b.extend_from_slice(&raw);
    b
}

fn link_message(name: &str, address: u64) -> Vec<u8> {
    let mut b = vec![1, 0, name.len() as u8];
    b.extend_from_slice(name.as_bytes());
    b.extend_from_slice(&address.to_le_bytes());
    b
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Append `bytes` at the next 8-byte boundary and return their address.
    fn alloc(&mut self, bytes: &[u8]) -> u64 {
        let at = pad8(self.buf.len());
        self.buf.resize(at, 0);
        self.buf.extend_from_slice(bytes);
        at as u64
    }

    fn reserve(&mut self, n: usize) -> u64 {
        self.alloc(&vec![0; n])
    }

    fn patch(&mut self, at: u64, bytes: &[u8]) {
        let at = at as usize;
        self.buf[at..at + bytes.len()].copy_from_slice(bytes);
    }

    // ---- v1 structures ----

    fn header_v1(&mut self, messages: &[(u16, Vec<u8>)]) -> u64 {
        let mut body = Vec::new();
        for (msg_type, payload) in messages {
            let size = pad8(payload.len());
            body.extend_from_slice(&msg_type.to_le_bytes());
            body.extend_from_slice(&(size as u16).to_le_bytes());
            body.extend_from_slice(&[0; 4]);
            body.extend_from_slice(payload);
            body.resize(pad8(body.len()), 0);
        }
        let mut b = vec![1, 0];
        b.extend_from_slice(&(messages.len() as u16).to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&(body.len() as u32).to_le_bytes());
        b.extend_from_slice(&[0; 4]);
        b.extend_from_slice(&body);
        self.alloc(&b)
    }

    /// Returns the group header, B-tree and local heap addresses.
    fn group_v1(&mut self, group: &GroupBuilder) -> (u64, u64, u64) {
        let mut entries = Vec::new();
        for child in &group.groups {
            let (addr, _, _) = self.group_v1(child);
            entries.push((child.name.as_str(), addr));
        }
        for ds in &group.datasets {
            let addr = self.dataset(ds, FormatVersion::V0);
            entries.push((ds.name.as_str(), addr));
        }

        // Offset 0 of the heap holds the empty string.
        let mut segment = vec![0u8; 8];
        let mut name_offsets = Vec::new();
        for (name, _) in &entries {
            name_offsets.push(segment.len() as u64);
            segment.extend_from_slice(name.as_bytes());
            segment.push(0);
            segment.resize(pad8(segment.len()), 0);
        }
        let mut heap = b"HEAP".to_vec();
        heap.extend_from_slice(&[0, 0, 0, 0]);
        heap.extend_from_slice(&(segment.len() as u64).to_le_bytes());
        heap.extend_from_slice(&UNDEF.to_le_bytes());
        heap.extend_from_slice(&0u64.to_le_bytes());
        let heap_addr = self.alloc(&heap);
        let segment_addr = self.alloc(&segment);
        self.patch(heap_addr + 24, &segment_addr.to_le_bytes());

        let mut snod = b"SNOD".to_vec();
        snod.extend_from_slice(&[1, 0]);
        snod.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for ((_, addr), offset) in entries.iter().zip(&name_offsets) {
            snod.extend_from_slice(&offset.to_le_bytes());
            snod.extend_from_slice(&addr.to_le_bytes());
            snod.extend_from_slice(&[0; 8 + 16]);
        }
        let snod_addr = self.alloc(&snod);

        let mut tree = b"TREE".to_vec();
        tree.extend_from_slice(&[0, 0]);
        tree.extend_from_slice(&1u16.to_le_bytes());
        tree.extend_from_slice(&UNDEF.to_le_bytes());
        tree.extend_from_slice(&UNDEF.to_le_bytes());
        tree.extend_from_slice(&0u64.to_le_bytes());
        tree.extend_from_slice(&snod_addr.to_le_bytes());
        let last = name_offsets.last().copied().unwrap_or(0);
        tree.extend_from_slice(&last.to_le_bytes());
        let tree_addr = self.alloc(&tree);

        let mut stab = tree_addr.to_le_bytes().to_vec();
        stab.extend_from_slice(&heap_addr.to_le_bytes());
        let mut messages = vec![(MSG_SYMBOL_TABLE, stab)];
        for (name, value) in &group.attrs {
            messages.push((MSG_ATTRIBUTE, attribute(name, value, 1)));
        }
        (self.header_v1(&messages), tree_addr, heap_addr)
    }

    // ---- v2 structures ----

    fn header_v2(&mut self, messages: &[(u16, Vec<u8>)]) -> u64 {
        let mut body = Vec::new();
        for (msg_type, payload) in messages {
            body.push(*msg_type as u8);
            body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            body.push(0);
            body.extend_from_slice(payload);
        }
        // flags 0x02: four-byte chunk size
        let mut b = b"OHDR".to_vec();
        b.extend_from_slice(&[2, 0x02]);
        b.extend_from_slice(&(body.len() as u32).to_le_bytes());
        b.extend_from_slice(&body);
        let sum = lookup3(&b);
        b.extend_from_slice(&sum.to_le_bytes());
        self.alloc(&b)
    }

    fn group_v2(&mut self, group: &GroupBuilder) -> u64 {
        let mut links = Vec::new();
        for child in &group.groups {
            let addr = self.group_v2(child);
            links.push((child.name.as_str(), addr));
        }
        for ds in &group.datasets {
            let addr = self.dataset(ds, FormatVersion::V2);
            links.push((ds.name.as_str(), addr));
        }

        let mut messages = Vec::new();
        if group.dense {
            let objects: Vec<(&str, Vec<u8>)> =
                links.iter().map(|&(name, addr)| (name, link_message(name, addr))).collect();
            let (heap, btree) = self.dense_index(&objects, 5);
            let mut info = vec![0, 0];
            info.extend_from_slice(&heap.to_le_bytes());
            info.extend_from_slice(&btree.to_le_bytes());
            messages.push((MSG_LINK_INFO, info));
            messages.push((MSG_GROUP_INFO, vec![0, 0]));
            if !group.attrs.is_empty() {
                let objects: Vec<(&str, Vec<u8>)> = group
                    .attrs
                    .iter()
                    .map(|(name, value)| (name.as_str(), attribute(name, value, 3)))
                    .collect();
                let (heap, btree) = self.dense_index(&objects, 8);
                let mut info = vec![0, 0];
                info.extend_from_slice(&heap.to_le_bytes());
                info.extend_from_slice(&btree.to_le_bytes());
                messages.push((MSG_ATTRIBUTE_INFO, info));
            }
        } else {
            let mut info = vec![0, 0];
            info.extend_from_slice(&UNDEF.to_le_bytes());
            info.extend_from_slice(&UNDEF.to_le_bytes());
            messages.push((MSG_LINK_INFO, info));
            messages.push((MSG_GROUP_INFO, vec![0, 0]));
            for (name, addr) in &links {
                messages.push((MSG_LINK, link_message(name, *addr)));
            }
            for (name, value) in &group.attrs {
                messages.push((MSG_ATTRIBUTE, attribute(name, value, 3)));
            }
        }
        self.header_v2(&messages)
    }

    /// Store `objects` in a fractal heap with a single direct block and
    /// index them by name hash in a one-leaf v2 B-tree of `record_type`.
    fn dense_index(&mut self, objects: &[(&str, Vec<u8>)], record_type: u8) -> (u64, u64) {
        const BLOCK_HEADER: usize = 4 + 1 + 8 + 4;
        const ID_LEN: usize = 8;
        let payload: usize = objects.iter().map(|(_, o)| o.len()).sum();
        let block_size = ((BLOCK_HEADER + payload) as u64).next_power_of_two().max(512);
        let len_width = encoded_size(block_size);

        let heap_addr = self.reserve(150);
        let mut block = b"FHDB".to_vec();
        block.push(0);
        block.extend_from_slice(&heap_addr.to_le_bytes());
        block.extend_from_slice(&0u32.to_le_bytes());
        let mut records = Vec::new();
        for (name, object) in objects {
            let mut id = vec![0u8];
            id.extend_from_slice(&(block.len() as u32).to_le_bytes());
            id.extend_from_slice(&(object.len() as u64).to_le_bytes()[..len_width]);
            id.resize(ID_LEN, 0);
            block.extend_from_slice(object);
            records.push((lookup3(name.as_bytes()), id));
        }
        block.resize(block_size as usize, 0);
        let block_addr = self.alloc(&block);

        let mut frhp = b"FRHP".to_vec();
        frhp.push(0);
        frhp.extend_from_slice(&(ID_LEN as u16).to_le_bytes());
        frhp.extend_from_slice(&0u16.to_le_bytes());
        frhp.push(0);
        frhp.extend_from_slice(&(block_size as u32).to_le_bytes());
        frhp.extend_from_slice(&0u64.to_le_bytes());
        frhp.extend_from_slice(&UNDEF.to_le_bytes());
        frhp.extend_from_slice(&0u64.to_le_bytes());
        frhp.extend_from_slice(&UNDEF.to_le_bytes());
        for v in [block_size, block_size, 0, objects.len() as u64, 0, 0, 0, 0] {
            frhp.extend_from_slice(&v.to_le_bytes());
        }
        frhp.extend_from_slice(&4u16.to_le_bytes());
        frhp.extend_from_slice(&block_size.to_le_bytes());
        frhp.extend_from_slice(&block_size.to_le_bytes());
        frhp.extend_from_slice(&32u16.to_le_bytes());
        frhp.extend_from_slice(&0u16.to_le_bytes());
        frhp.extend_from_slice(&block_addr.to_le_bytes());
        frhp.extend_from_slice(&0u16.to_le_bytes());
        let sum = lookup3(&frhp);
        frhp.extend_from_slice(&sum.to_le_bytes());
        self.patch(heap_addr, &frhp);

        records.sort_by_key(|(hash, _)| *hash);
        let mut leaf = b"BTLF".to_vec();
        leaf.extend_from_slice(&[0, record_type]);
        let mut record_size = 0;
        for (order, (hash, id)) in records.iter().enumerate() {
            let start = leaf.len();
            if record_type == 5 {
                leaf.extend_from_slice(&hash.to_le_bytes());
                leaf.extend_from_slice(id);
            } else {
                leaf.extend_from_slice(id);
                leaf.push(0);
                leaf.extend_from_slice(&(order as u32).to_le_bytes());
                leaf.extend_from_slice(&hash.to_le_bytes());
            }
            record_size = leaf.len() - start;
        }
        let sum = lookup3(&leaf);
        leaf.extend_from_slice(&sum.to_le_bytes());
        let leaf_addr = self.alloc(&leaf);
        if record_size == 0 {
            record_size = if record_type == 5 { 4 + ID_LEN } else { ID_LEN + 9 };
        }

        let mut bthd = b"BTHD".to_vec();
        bthd.extend_from_slice(&[0, record_type]);
        bthd.extend_from_slice(&(leaf.len().max(512) as u32).to_le_bytes());
        bthd.extend_from_slice(&(record_size as u16).to_le_bytes());
        bthd.extend_from_slice(&0u16.to_le_bytes());
        bthd.extend_from_slice(&[100, 40]);
        bthd.extend_from_slice(&leaf_addr.to_le_bytes());
        bthd.extend_from_slice(&(records.len() as u16).to_le_bytes());
        bthd.extend_from_slice(&(records.len() as u64).to_le_bytes());
        let sum = lookup3(&bthd);
        bthd.extend_from_slice(&sum.to_le_bytes());
        let btree_addr = self.alloc(&bthd);
        (heap_addr, btree_addr)
    }

    // ---- datasets ----

    fn dataset(&mut self, ds: &DatasetBuilder, version: FormatVersion) -> u64 {
        let et = ds.values.element_type();
        let raw = value_bytes(&ds.values, ds.big_endian);

        let mut messages = vec![
            (MSG_DATASPACE, dataspace(&ds.shape)),
            (MSG_DATATYPE, numeric_datatype(et, ds.big_endian)),
        ];
        let layout = if let Some(chunk_dims) = &ds.chunks {
            let btree = self.chunk_tree(ds, chunk_dims, &raw);
            // the element size rides along as the last chunk dimension
            let ndims = chunk_dims.len() as u8 + 1;
            let mut b = if ds.legacy_layout {
                vec![1, ndims, 2, 0, 0, 0, 0, 0]
            } else {
                vec![3, 2, ndims]
            };
            b.extend_from_slice(&btree.to_le_bytes());
            for d in chunk_dims {
                b.extend_from_slice(&d.to_le_bytes());
            }
            b.extend_from_slice(&(et.size() as u32).to_le_bytes());
            let mut filters = Vec::new();
            if ds.shuffle {
                filters.push((2u16, et.size() as u32));
            }
            if ds.deflate {
                filters.push((1u16, 6));
            }
            if !filters.is_empty() {
                messages.push((MSG_FILTER_PIPELINE, filter_pipeline(version, &filters)));
            }
            b
        } else if ds.compact {
            let mut b = vec![3, 0];
            b.extend_from_slice(&(raw.len() as u16).to_le_bytes());
            b.extend_from_slice(&raw);
            b
        } else {
            let addr = self.alloc(&raw);
            let mut b = vec![3, 1];
            b.extend_from_slice(&addr.to_le_bytes());
            b.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            b
        };
        messages.push((MSG_LAYOUT, layout));
        for (name, value) in &ds.attrs {
            let v = if version == FormatVersion::V0 { 1 } else { 3 };
            messages.push((MSG_ATTRIBUTE, attribute(name, value, v)));
        }
        match version {
            FormatVersion::V0 => self.header_v1(&messages),
            FormatVersion::V2 => self.header_v2(&messages),
        }
    }

    /// Write every chunk in row-major grid order, then one leaf `TREE`
    /// node indexing them.
    fn chunk_tree(&mut self, ds: &DatasetBuilder, chunk_dims: &[u32], raw: &[u8]) -> u64 {
        let rank = ds.shape.len();
        let width = ds.values.element_type().size();
        let grid: Vec<u64> = ds
            .shape
            .iter()
            .zip(chunk_dims)
            .map(|(&d, &c)| d.div_ceil(c as u64))
            .collect();
        let chunk_len: usize = chunk_dims.iter().map(|&c| c as usize).product();

        let mut records = Vec::new();
        let n_chunks: u64 = grid.iter().product();
        for index in 0..n_chunks {
            let mut origin = vec![0u64; rank];
            let mut rest = index;
            for d in (0..rank).rev() {
                origin[d] = (rest % grid[d]) * chunk_dims[d] as u64;
                rest /= grid[d];
            }
            let mut chunk = vec![0u8; chunk_len * width];
            for e in 0..chunk_len {
                let mut rest = e;
                let mut linear = 0usize;
                let mut inside = true;
                for d in (0..rank).rev() {
                    let c = chunk_dims[d] as usize;
                    let coord = origin[d] as usize + rest % c;
                    rest /= c;
                    inside &= coord < ds.shape[d] as usize;
                    linear += coord * ds.shape[d + 1..].iter().product::<u64>() as usize;
                }
                if inside {
                    chunk[e * width..(e + 1) * width]
                        .copy_from_slice(&raw[linear * width..(linear + 1) * width]);
                }
            }
            let chunk = if ds.shuffle { shuffle(&chunk, width) } else { chunk };
            let stored = if ds.deflate { deflate(&chunk) } else { chunk };
            let addr = self.alloc(&stored);
            records.push((stored.len() as u32, origin, addr));
        }

        let mut tree = b"TREE".to_vec();
        tree.extend_from_slice(&[1, 0]);
        tree.extend_from_slice(&(records.len() as u16).to_le_bytes());
        tree.extend_from_slice(&UNDEF.to_le_bytes());
        tree.extend_from_slice(&UNDEF.to_le_bytes());
        let key = |tree: &mut Vec<u8>, size: u32, origin: &[u64]| {
            tree.extend_from_slice(&size.to_le_bytes());
            tree.extend_from_slice(&0u32.to_le_bytes());
            for o in origin {
                tree.extend_from_slice(&o.to_le_bytes());
            }
            tree.extend_from_slice(&0u64.to_le_bytes());
        };
        for (size, origin, addr) in &records {
            key(&mut tree, *size, origin);
            tree.extend_from_slice(&addr.to_le_bytes());
        }
        key(&mut tree, 0, &ds.shape);
        self.alloc(&tree)
    }
}

/// Pipeline message for `(filter id, single client value)` entries.
fn filter_pipeline(version: FormatVersion, filters: &[(u16, u32)]) -> Vec<u8> {
    let mut b = match version {
        FormatVersion::V0 => vec![1, filters.len() as u8, 0, 0, 0, 0, 0, 0],
        FormatVersion::V2 => vec![2, filters.len() as u8],
    };
    for &(id, value) in filters {
        b.extend_from_slice(&id.to_le_bytes());
        if version == FormatVersion::V0 {
            b.extend_from_slice(&0u16.to_le_bytes());
        }
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&value.to_le_bytes());
        if version == FormatVersion::V0 {
            b.extend_from_slice(&[0; 4]);
        }
    }
    b
}

/// Split elements into byte planes.
fn shuffle(bytes: &[u8], width: usize) -> Vec<u8> {
    let count = bytes.len() / width;
    let mut out = vec![0u8; bytes.len()];
    for (i, element) in bytes.chunks_exact(width).enumerate() {
        for (plane, &b) in element.iter().enumerate() {
            out[plane * count + i] = b;
        }
    }
    out
}

fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writes into a Vec cannot fail.
    let _ = enc.write_all(bytes);
    enc.finish().unwrap_or_default()
}
