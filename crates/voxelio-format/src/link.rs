//! The decoded HDF5 object tree.

use std::collections::BTreeMap;

use crate::attribute::AttrValue;
use crate::data_layout::DataLayout;
use crate::datatype::Datatype;
use crate::filter_pipeline::FilterPipeline;
use crate::symbol_table::SymbolTableMessage;
use crate::typed_array::{ElementType, TypedArray};

/// One node of the tree: a group, or a dataset when it has a datatype.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hdf5Link {
    pub name: String,
    /// Address of the object header, relative to the superblock.
    pub header_address: u64,
    pub datatype: Option<Datatype>,
    /// Dataset shape, slowest dimension first.
    pub dims: Vec<u64>,
    pub element_count: u64,
    pub layout: Option<DataLayout>,
    pub pipeline: Option<FilterPipeline>,
    /// Chunks go through a filter pipeline.
    pub inflate: bool,
    /// Index of a v1 group.
    pub symbol_table: Option<SymbolTableMessage>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub children: Vec<Hdf5Link>,
    /// Decoded values, filled by the data pass.
    pub array: Option<TypedArray>,
}

impl Hdf5Link {
    pub fn new(name: impl Into<String>, header_address: u64) -> Hdf5Link {
        Hdf5Link {
            name: name.into(),
            header_address,
            ..Default::default()
        }
    }

    /// `None` for groups.
    pub fn element_type(&self) -> Option<ElementType> {
        self.datatype.as_ref().map(|dt| dt.element_type)
    }

    pub fn is_dataset(&self) -> bool {
        self.datatype.is_some()
    }

    /// File address of contiguous data.
    pub fn data_address(&self) -> Option<u64> {
        match self.layout {
            Some(DataLayout::Contiguous { address, .. }) => address,
            Some(DataLayout::Chunked { btree_address, .. }) => btree_address,
            _ => None,
        }
    }

    /// Stored byte length of the data, when the layout records it.
    pub fn data_length(&self) -> Option<u64> {
        match &self.layout {
            Some(DataLayout::Contiguous { size, .. }) => *size,
            Some(DataLayout::Compact { data }) => Some(data.len() as u64),
            _ => None,
        }
    }

    /// Chunk shape, empty unless chunked.
    pub fn chunk_dims(&self) -> &[u32] {
        match &self.layout {
            Some(DataLayout::Chunked { chunk_dims, .. }) => chunk_dims,
            _ => &[],
        }
    }

    /// Depth-first search for the first dataset called `name`.
    pub fn find_dataset(&self, name: &str) -> Option<&Hdf5Link> {
        if self.name == name && self.is_dataset() {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_dataset(name))
    }

    /// Depth-first search for the first link called `name`, group or not.
    pub fn find_link(&self, name: &str) -> Option<&Hdf5Link> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_link(name))
    }

    /// Depth-first search for the first attribute called `name`.
    pub fn find_attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .get(name)
            .or_else(|| self.children.iter().find_map(|c| c.find_attribute(name)))
    }

    /// Every link of the tree, this one first.
    pub fn walk(&self) -> Vec<&Hdf5Link> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(name: &str) -> Hdf5Link {
        let mut link = Hdf5Link::new(name, 0);
        link.datatype = Some(Datatype {
            element_type: ElementType::Float32,
            size: 4,
            big_endian: false,
        });
        link
    }

    fn tree() -> Hdf5Link {
        let mut image_group = Hdf5Link::new("image", 10);
        let mut image0 = Hdf5Link::new("0", 20);
        let mut image = dataset("image");
        image.attributes.insert("valid_range".into(), AttrValue::Scalar(1.0));
        image0.children.push(image);
        image0.children.push(dataset("image-min"));
        image_group.children.push(image0);

        let mut dims = Hdf5Link::new("dimensions", 30);
        let mut x = dataset("xspace");
        x.attributes.insert("step".into(), AttrValue::Scalar(2.0));
        dims.children.push(x);

        let mut root = Hdf5Link::new("", 0);
        root.children.push(dims);
        root.children.push(image_group);
        root
    }

    #[test]
    fn find_dataset_skips_same_named_group() {
        let root = tree();
        let image = root.find_dataset("image").unwrap();
        assert_eq!(image.header_address, 0);
        assert!(image.is_dataset());
        assert_eq!(root.find_link("image").unwrap().header_address, 10);
    }

    #[test]
    fn find_attribute_depth_first() {
        let root = tree();
        assert_eq!(root.find_attribute("step"), Some(&AttrValue::Scalar(2.0)));
        assert_eq!(root.find_attribute("valid_range"), Some(&AttrValue::Scalar(1.0)));
        assert_eq!(root.find_attribute("missing"), None);
    }

    #[test]
    fn missing_dataset_is_none() {
        assert!(tree().find_dataset("image-max").is_none());
    }

    #[test]
    fn walk_is_preorder() {
        let root = tree();
        let names: Vec<_> = root.walk().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["", "dimensions", "xspace", "image", "0", "image", "image-min"]);
    }
}
