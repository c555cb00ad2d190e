#![no_main]
use libfuzzer_sys::fuzz_target;
use voxelio_format::nifti_header::NiftiHeader;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = NiftiHeader::parse(data) {
        let _ = header.read_voxels(data);
    }
});
