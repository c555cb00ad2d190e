#![no_main]
use libfuzzer_sys::fuzz_target;
use voxelio_format::fractal_heap::FractalHeapHeader;

fuzz_target!(|data: &[u8]| {
    let Ok(heap) = FractalHeapHeader::parse(data, 0, 8, 8) else {
        return;
    };
    let _ = heap.enumerate_direct_blocks(data, &mut |_| Ok(()));
    // Use the tail of the input as a heap ID.
    let id_len = heap.heap_id_length as usize;
    if id_len > 0 && data.len() >= id_len {
        let _ = heap.read_object(data, &data[data.len() - id_len..], false);
    }
});
