//! Build an [`Hdf5Link`] tree from a whole HDF5 file.
//!
//! Decoding runs in two passes. [`Hdf5Reader::parse_tree`] walks object
//! headers top-down and records names, shapes, layouts and attributes;
//! [`Hdf5Reader::load_data`] then fills every dataset's array.

use std::collections::HashSet;

use log::{debug, trace};

use crate::attribute::AttributeMessage;
use crate::attribute_info::AttributeInfoMessage;
use crate::btree_v1;
use crate::btree_v2::{self, BTreeV2Header, RECORD_ATTRIBUTE_NAME, RECORD_LINK_NAME};
use crate::chunked_read::{self, ChunkedSource};
use crate::cursor::{check_address, ByteCursor};
use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::fractal_heap::FractalHeapHeader;
use crate::link::Hdf5Link;
use crate::link_info::LinkInfoMessage;
use crate::link_message::{LinkMessage, LinkTarget};
use crate::local_heap::LocalHeap;
use crate::message_type::MessageType;
use crate::object_header::ObjectHeader;
use crate::options::DecodeOptions;
use crate::signature;
use crate::superblock::Superblock;
use crate::symbol_table::{SymbolTableMessage, SymbolTableNode};
use crate::typed_array::{ElementType, TypedArray};

/// Decode the object tree of `file` and load every dataset.
pub fn read_tree(file: &[u8], options: &DecodeOptions) -> Result<Hdf5Link, FormatError> {
    let mut reader = Hdf5Reader::new(file, options.clone())?;
    let mut root = reader.parse_tree()?;
    reader.load_data(&mut root)?;
    Ok(root)
}

/// Per-decode parse state. Nothing here outlives one call.
#[derive(Debug)]
pub struct Hdf5Reader<'a> {
    /// The file from the superblock signature on; every address is
    /// relative to its start.
    data: &'a [u8],
    superblock: Superblock,
    options: DecodeOptions,
    /// Object headers already parsed in this decode.
    visited: HashSet<u64>,
}

/// Messages of one header that shape children, kept until the header has
/// been fully read.
#[derive(Default)]
struct GroupMessages {
    links: Vec<LinkMessage>,
    link_info: Option<LinkInfoMessage>,
    attribute_info: Option<AttributeInfoMessage>,
}

impl<'a> Hdf5Reader<'a> {
    /// Locate and parse the superblock.
    pub fn new(file: &'a [u8], options: DecodeOptions) -> Result<Hdf5Reader<'a>, FormatError> {
        let start = signature::find_signature(file)?;
        let data = &file[start..];
        let superblock = Superblock::parse(data, options.verify_checksums)?;
        if let Some(eof) = superblock.eof_address {
            if eof > data.len() as u64 {
                debug!("file is {} bytes short of its end-of-file address", eof - data.len() as u64);
            }
        }
        Ok(Hdf5Reader {
            data,
            superblock,
            options,
            visited: HashSet::new(),
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    fn offset_size(&self) -> u8 {
        self.superblock.offset_size
    }

    fn length_size(&self) -> u8 {
        self.superblock.length_size
    }

    /// Walk every object header reachable from the root group.
    pub fn parse_tree(&mut self) -> Result<Hdf5Link, FormatError> {
        self.visited.clear();
        let root = self.superblock.root_group_address;
        self.parse_object(String::new(), root, 0)
    }

    fn parse_object(&mut self, name: String, address: u64, depth: usize) -> Result<Hdf5Link, FormatError> {
        if depth > self.options.max_depth {
            return Err(FormatError::MalformedStructure(format!(
                "group nesting deeper than {}",
                self.options.max_depth
            )));
        }
        let mut link = Hdf5Link::new(name, address);
        if !self.visited.insert(address) {
            debug!("object header {address:#x} already visited; not descending");
            return Ok(link);
        }

        let header = ObjectHeader::parse(
            self.data,
            address,
            self.offset_size(),
            self.length_size(),
            self.options.verify_checksums,
        )?;
        trace!(
            "object {:?} at {address:#x}: v{} header, {} messages",
            link.name,
            header.version,
            header.messages.len()
        );

        let mut group = GroupMessages::default();
        for msg in &header.messages {
            self.process_message(&mut link, &mut group, msg.msg_type, msg.data)?;
        }

        if let Some(symbol_table) = link.symbol_table {
            self.read_symbol_table(&mut link, symbol_table, depth)?;
        }
        for message in std::mem::take(&mut group.links) {
            self.follow_link(&mut link, message, depth)?;
        }
        if let Some(info) = &group.link_info {
            if info.is_dense() {
                self.read_dense_links(&mut link, info, depth)?;
            }
        }
        if let Some(info) = &group.attribute_info {
            self.read_dense_attributes(&mut link, info)?;
        }
        Ok(link)
    }

    fn process_message(
        &self,
        link: &mut Hdf5Link,
        group: &mut GroupMessages,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), FormatError> {
        let (os, ls) = (self.offset_size(), self.length_size());
        match msg_type {
            MessageType::Dataspace => {
                let space = Dataspace::parse(payload, ls)?;
                link.element_count = space.num_elements();
                link.dims = space.dims;
            }
            MessageType::Datatype => {
                let (datatype, _) = Datatype::parse(payload)?;
                link.datatype = Some(datatype);
            }
            MessageType::DataLayout => {
                link.layout = Some(DataLayout::parse(payload, os, ls)?);
            }
            MessageType::FilterPipeline => {
                let pipeline = FilterPipeline::parse(payload)?;
                pipeline.require_supported()?;
                link.inflate = !pipeline.is_empty();
                link.pipeline = Some(pipeline);
            }
            MessageType::Attribute => {
                let attr = AttributeMessage::parse(payload, ls)?;
                trace!("attribute {:?} on {:?}", attr.name, link.name);
                link.attributes.insert(attr.name, attr.value);
            }
            MessageType::SymbolTable => {
                link.symbol_table = Some(SymbolTableMessage::parse(payload, os)?);
            }
            MessageType::Link => group.links.push(LinkMessage::parse(payload, os)?),
            MessageType::LinkInfo => group.link_info = Some(LinkInfoMessage::parse(payload, os)?),
            MessageType::AttributeInfo => {
                group.attribute_info = Some(AttributeInfoMessage::parse(payload, os)?);
            }
            MessageType::Nil
            | MessageType::FillValueOld
            | MessageType::FillValue
            | MessageType::GroupInfo
            | MessageType::ObjectHeaderContinuation
            | MessageType::ObjectModificationTime
            | MessageType::Unknown(_) => {
                trace!("skipping {msg_type:?} message of {} bytes", payload.len());
            }
        }
        Ok(())
    }

    fn read_symbol_table(
        &mut self,
        link: &mut Hdf5Link,
        table: SymbolTableMessage,
        depth: usize,
    ) -> Result<(), FormatError> {
        let (os, ls) = (self.offset_size(), self.length_size());
        let heap = LocalHeap::parse(self.data, table.local_heap_address, os, ls)?;
        let nodes = btree_v1::collect_symbol_nodes(
            self.data,
            table.btree_address,
            os,
            ls,
            self.options.max_depth,
        )?;
        for node_address in nodes {
            let node = SymbolTableNode::parse(self.data, node_address, os)?;
            for entry in node.entries {
                let name = heap.read_string(self.data, entry.link_name_offset)?;
                let child = self.parse_object(name, entry.object_header_address, depth + 1)?;
                link.children.push(child);
            }
        }
        Ok(())
    }

    fn follow_link(&mut self, link: &mut Hdf5Link, message: LinkMessage, depth: usize) -> Result<(), FormatError> {
        match message.target {
            LinkTarget::Hard(address) => {
                let child = self.parse_object(message.name, address, depth + 1)?;
                link.children.push(child);
            }
            LinkTarget::Soft(path) => debug!("soft link {:?} -> {path:?} not followed", message.name),
            LinkTarget::External => debug!("external link {:?} not followed", message.name),
        }
        Ok(())
    }

    fn read_dense_links(&mut self, link: &mut Hdf5Link, info: &LinkInfoMessage, depth: usize) -> Result<(), FormatError> {
        let (Some(heap_address), Some(btree_address)) =
            (info.fractal_heap_address, info.btree_name_index_address)
        else {
            return Ok(());
        };
        let objects = self.dense_objects(heap_address, btree_address, RECORD_LINK_NAME)?;
        debug!("{} dense links in {:?}", objects.len(), link.name);
        for bytes in objects {
            let message = LinkMessage::parse(&bytes, self.offset_size())?;
            self.follow_link(link, message, depth)?;
        }
        Ok(())
    }

    fn read_dense_attributes(&self, link: &mut Hdf5Link, info: &AttributeInfoMessage) -> Result<(), FormatError> {
        let (Some(heap_address), Some(btree_address)) =
            (info.fractal_heap_address, info.btree_name_index_address)
        else {
            return Ok(());
        };
        for bytes in self.dense_objects(heap_address, btree_address, RECORD_ATTRIBUTE_NAME)? {
            let attr = AttributeMessage::parse(&bytes, self.length_size())?;
            link.attributes.insert(attr.name, attr.value);
        }
        Ok(())
    }

    /// Fetch every heap object indexed by a name B-tree.
    fn dense_objects(&self, heap_address: u64, btree_address: u64, record_type: u8) -> Result<Vec<Vec<u8>>, FormatError> {
        let (os, ls) = (self.offset_size(), self.length_size());
        let heap = FractalHeapHeader::parse(self.data, heap_address, os, ls)?;
        let btree = BTreeV2Header::parse(self.data, btree_address, os, ls)?;
        if btree.record_type != record_type {
            return Err(FormatError::InvalidBTreeNodeType(btree.record_type));
        }
        let records = btree_v2::collect_records(self.data, &btree, os, ls, self.options.strict_btree_v2)?;
        records
            .iter()
            .filter_map(|r| r.heap_id())
            .map(|id| heap.read_object(self.data, id, self.options.strict_btree_v2))
            .collect()
    }

    /// Fill `array` on every numeric dataset of the tree.
    pub fn load_data(&self, link: &mut Hdf5Link) -> Result<(), FormatError> {
        if let Some(datatype) = link.datatype {
            if datatype.element_type != ElementType::String && link.array.is_none() {
                let bytes = self.dataset_bytes(link, &datatype)?;
                link.array = Some(TypedArray::from_bytes(
                    datatype.element_type,
                    &bytes,
                    datatype.big_endian,
                )?);
            }
        }
        for child in &mut link.children {
            self.load_data(child)?;
        }
        Ok(())
    }

    fn dataset_bytes(&self, link: &Hdf5Link, datatype: &Datatype) -> Result<Vec<u8>, FormatError> {
        let element_size = datatype.element_type.size();
        let expected = (link.element_count as usize)
            .checked_mul(element_size)
            .ok_or_else(|| FormatError::MalformedStructure("dataset size overflows".into()))?;
        let bytes = match &link.layout {
            None => {
                return Err(FormatError::MalformedStructure(format!(
                    "dataset {:?} has no layout message",
                    link.name
                )))
            }
            Some(DataLayout::Compact { data }) => data.clone(),
            // Never written: the fill value is zero.
            Some(DataLayout::Contiguous { address: None, .. }) => vec![0; expected],
            Some(DataLayout::Contiguous { address: Some(address), .. }) => {
                let start = check_address(*address, self.data.len())?;
                ByteCursor::at(self.data, start).read_bytes(expected)?.to_vec()
            }
            Some(DataLayout::Chunked { btree_address: None, .. }) => vec![0; expected],
            Some(DataLayout::Chunked {
                btree_address: Some(btree_address),
                chunk_dims,
                ..
            }) => {
                debug!("reading chunked dataset {:?} (inflate: {})", link.name, link.inflate);
                chunked_read::read_chunked(
                    self.data,
                    &ChunkedSource {
                        btree_address: *btree_address,
                        dims: &link.dims,
                        chunk_dims,
                        element_size,
                        pipeline: link.pipeline.as_ref(),
                        offset_size: self.offset_size(),
                        length_size: self.length_size(),
                        max_depth: self.options.max_depth,
                    },
                )?
            }
        };
        if bytes.len() < expected {
            return Err(FormatError::MalformedStructure(format!(
                "dataset {:?} holds {} bytes, expected {expected}",
                link.name,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}
