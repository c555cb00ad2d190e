//! Decoding configuration.

/// Options controlling how strictly an HDF5 file is decoded.
///
/// ```
/// use voxelio_format::options::DecodeOptions;
///
/// let opts = DecodeOptions::new().verify_checksums(true).strict_btree_v2(true);
/// assert!(opts.verify_checksums);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Verify lookup3 checksums of v2/v3 superblocks and v2 object headers.
    pub verify_checksums: bool,
    /// Refuse v2 B-trees deeper than one internal level instead of
    /// estimating their record-count field widths.
    pub strict_btree_v2: bool,
    /// Maximum group nesting depth followed while building the link tree.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            strict_btree_v2: false,
            max_depth: 64,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_checksums(mut self, on: bool) -> Self {
        self.verify_checksums = on;
        self
    }

    pub fn strict_btree_v2(mut self, on: bool) -> Self {
        self.strict_btree_v2 = on;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
