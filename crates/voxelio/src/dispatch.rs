//! Try-each-decoder dispatch.
//!
//! A [`DecoderList`] holds candidate decoders in priority order. Decoding
//! runs them one at a time until one returns a value; every failure,
//! including a panic, only moves on to the next candidate.

use std::panic::{self, AssertUnwindSafe};

use log::{debug, trace, warn};
use voxelio_format::ErrorKind;

use crate::container::VoxelContainer;
use crate::error::Error;
use crate::options::VolumeOptions;
use crate::{minc2, nifti};

/// One candidate format.
pub trait Decoder<T> {
    /// Short name for logs and [`Decoded::decoder`].
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<T, Error>;
}

/// Where a dispatch run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NotTried,
    Trying(usize),
    Succeeded(usize),
    Exhausted,
}

/// A value and the decoder that produced it.
#[derive(Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub decoder: &'static str,
    /// Position of the decoder in its list.
    pub index: usize,
}

/// Candidate decoders, tried first to last.
pub struct DecoderList<T> {
    decoders: Vec<Box<dyn Decoder<T>>>,
}

impl<T> Default for DecoderList<T> {
    fn default() -> Self {
        DecoderList { decoders: Vec::new() }
    }
}

impl<T> std::fmt::Debug for DecoderList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<T> DecoderList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decoder: impl Decoder<T> + 'static) {
        self.decoders.push(Box::new(decoder));
    }

    pub fn with(mut self, decoder: impl Decoder<T> + 'static) -> Self {
        self.push(decoder);
        self
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// The first decoder's value, or `None` when every decoder failed.
    pub fn decode(&self, bytes: &[u8]) -> Option<Decoded<T>> {
        let mut state = DispatchState::NotTried;
        for (index, decoder) in self.decoders.iter().enumerate() {
            state = advance(state, DispatchState::Trying(index));
            let name = decoder.name();
            match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(bytes))) {
                Ok(Ok(value)) => {
                    advance(state, DispatchState::Succeeded(index));
                    debug!("{name} decoded {} bytes", bytes.len());
                    return Some(Decoded {
                        value,
                        decoder: name,
                        index,
                    });
                }
                Ok(Err(e)) if e.kind() == ErrorKind::UnsupportedFeature => {
                    warn!("{name}: {e}");
                }
                Ok(Err(e)) => debug!("{name} rejected input: {e}"),
                Err(_) => warn!("{name} panicked; trying next decoder"),
            }
        }
        advance(state, DispatchState::Exhausted);
        debug!("no decoder accepted {} bytes", bytes.len());
        None
    }
}

fn advance(from: DispatchState, to: DispatchState) -> DispatchState {
    trace!("dispatch {from:?} -> {to:?}");
    to
}

/// MINC2 (HDF5) volumes.
#[derive(Debug, Clone, Default)]
pub struct Minc2Decoder {
    pub options: VolumeOptions,
}

impl Minc2Decoder {
    pub fn new(options: VolumeOptions) -> Self {
        Minc2Decoder { options }
    }
}

impl Decoder<VoxelContainer> for Minc2Decoder {
    fn name(&self) -> &'static str {
        "minc2"
    }

    fn decode(&self, bytes: &[u8]) -> Result<VoxelContainer, Error> {
        minc2::decode(bytes, &self.options)
    }
}

/// NIfTI-1 single-file volumes.
#[derive(Debug, Clone, Default)]
pub struct NiftiDecoder {
    pub options: VolumeOptions,
}

impl NiftiDecoder {
    pub fn new(options: VolumeOptions) -> Self {
        NiftiDecoder { options }
    }
}

impl Decoder<VoxelContainer> for NiftiDecoder {
    fn name(&self) -> &'static str {
        "nifti1"
    }

    fn decode(&self, bytes: &[u8]) -> Result<VoxelContainer, Error> {
        nifti::decode(bytes, &self.options)
    }
}

/// The 3D volume decoders: MINC2, then NIfTI-1.
pub fn volume_decoders(options: &VolumeOptions) -> DecoderList<VoxelContainer> {
    DecoderList::new()
        .with(Minc2Decoder::new(options.clone()))
        .with(NiftiDecoder::new(options.clone()))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct Fixed {
        name: &'static str,
        result: Option<u32>,
        calls: Rc<Cell<u32>>,
    }

    impl Decoder<u32> for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn decode(&self, _: &[u8]) -> Result<u32, Error> {
            self.calls.set(self.calls.get() + 1);
            self.result.ok_or(Error::NoMatch)
        }
    }

    struct Panics;

    impl Decoder<u32> for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn decode(&self, bytes: &[u8]) -> Result<u32, Error> {
            // out-of-range index
            Ok(bytes[bytes.len()] as u32)
        }
    }

    fn fixed(name: &'static str, result: Option<u32>) -> (Fixed, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let d = Fixed {
            name,
            result,
            calls: Rc::clone(&calls),
        };
        (d, calls)
    }

    #[test]
    fn first_success_wins() {
        let (a, a_calls) = fixed("a", None);
        let (b, b_calls) = fixed("b", Some(7));
        let (c, c_calls) = fixed("c", Some(9));
        let list = DecoderList::new().with(a).with(b).with(c);
        let hit = list.decode(b"x").unwrap();
        assert_eq!((hit.value, hit.decoder, hit.index), (7, "b", 1));
        assert_eq!((a_calls.get(), b_calls.get(), c_calls.get()), (1, 1, 0));
    }

    #[test]
    fn panic_moves_to_next_decoder() {
        let (b, _) = fixed("b", Some(3));
        let list = DecoderList::new().with(Panics).with(b);
        let hit = list.decode(&[]).unwrap();
        assert_eq!(hit.decoder, "b");
    }

    #[test]
    fn all_failing_is_none() {
        let (a, _) = fixed("a", None);
        let list = DecoderList::new().with(a).with(Panics);
        assert!(list.decode(&[1, 2, 3]).is_none());
        assert!(DecoderList::<u32>::new().decode(&[]).is_none());
    }

    #[test]
    fn volume_list_order() {
        let list = volume_decoders(&VolumeOptions::default());
        assert_eq!(list.names(), ["minc2", "nifti1"]);
        assert!(list.decode(b"neither HDF5 nor NIfTI").is_none());
    }
}
