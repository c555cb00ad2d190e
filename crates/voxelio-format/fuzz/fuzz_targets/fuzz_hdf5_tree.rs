#![no_main]
use libfuzzer_sys::fuzz_target;
use voxelio_format::{read_tree, DecodeOptions};

fuzz_target!(|data: &[u8]| {
    // Full decode: signature, superblock, object tree, every dataset.
    let _ = read_tree(data, &DecodeOptions::default());
    let _ = read_tree(data, &DecodeOptions::new().verify_checksums(true).strict_btree_v2(true));
});
