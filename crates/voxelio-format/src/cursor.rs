//! Positioned binary reader over an in-memory buffer.
//!
//! Every structure parser in this crate reads through a [`ByteCursor`].
//! The cursor owns only its position, byte order, and alignment base; the
//! bytes are borrowed, so one file buffer can back many cursors at once.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::FormatError;

/// Byte order used for multi-byte reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Byte order of the host.
    pub fn native() -> Endian {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }
}

/// Convert a file address into a buffer index, failing when it does not
/// point inside a buffer of `len` bytes.
pub fn check_address(address: u64, len: usize) -> Result<usize, FormatError> {
    if address >= len as u64 {
        return Err(FormatError::AddressOutOfRange {
            address,
            limit: len as u64,
        });
    }
    Ok(address as usize)
}

/// A stateful reader over a fixed byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
    align_base: usize,
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $width:expr, $read:ident) => {
        #[doc = concat!("Read a `", stringify!($ty), "` and advance.")]
        pub fn $name(&mut self) -> Result<$ty, FormatError> {
            let bytes = self.take($width)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            })
        }
    };
}

impl<'a> ByteCursor<'a> {
    /// Little-endian cursor at position 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_endian(data, Endian::Little)
    }

    /// Cursor at position 0 with an explicit byte order.
    pub fn with_endian(data: &'a [u8], endian: Endian) -> Self {
        ByteCursor {
            data,
            pos: 0,
            endian,
            align_base: 0,
        }
    }

    /// Cursor positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        let mut c = Self::new(data);
        c.pos = pos;
        c
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// The whole underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position. Seeking to the end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<(), FormatError> {
        if pos > self.data.len() {
            return Err(FormatError::UnexpectedEof {
                expected: pos,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Seek to a file address. Addresses at or past the end of the buffer
    /// are out of range.
    pub fn seek_address(&mut self, address: u64) -> Result<(), FormatError> {
        self.pos = check_address(address, self.data.len())?;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Fail unless `n` more bytes can be read from the current position.
    pub fn ensure(&self, n: usize) -> Result<(), FormatError> {
        match self.pos.checked_add(n) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FormatError::UnexpectedEof {
                expected: self.pos.saturating_add(n),
                available: self.data.len(),
            }),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        self.ensure(n)?;
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        self.take(n)
    }

    /// Borrow the next `n` bytes without advancing.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8], FormatError> {
        self.ensure(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, FormatError> {
        Ok(self.take(1)?[0] as i8)
    }

    read_fixed!(read_u16, u16, 2, read_u16);
    read_fixed!(read_u32, u32, 4, read_u32);
    read_fixed!(read_u64, u64, 8, read_u64);
    read_fixed!(read_i16, i16, 2, read_i16);
    read_fixed!(read_i32, i32, 4, read_i32);
    read_fixed!(read_f32, f32, 4, read_f32);
    read_fixed!(read_f64, f64, 8, read_f64);

    /// Read an `n`-byte unsigned integer, 1 <= n <= 8.
    ///
    /// Widths that are not a power of two are accumulated byte by byte in
    /// the cursor's byte order.
    pub fn read_var_uint(&mut self, n: usize) -> Result<u64, FormatError> {
        if n == 0 || n > 8 {
            return Err(FormatError::MalformedStructure(format!(
                "variable-width integer of {n} bytes"
            )));
        }
        let bytes = self.take(n)?;
        let mut val = 0u64;
        match self.endian {
            Endian::Little => {
                for (i, &b) in bytes.iter().enumerate() {
                    val |= (b as u64) << (i * 8);
                }
            }
            Endian::Big => {
                for &b in bytes {
                    val = (val << 8) | b as u64;
                }
            }
        }
        Ok(val)
    }

    /// Read a file address of `size` bytes. All-ones means "undefined".
    pub fn read_offset(&mut self, size: u8) -> Result<Option<u64>, FormatError> {
        if !matches!(size, 2 | 4 | 8) {
            return Err(FormatError::InvalidOffsetSize(size));
        }
        let val = self.read_var_uint(size as usize)?;
        let undefined = if size == 8 {
            u64::MAX
        } else {
            (1u64 << (size as u32 * 8)) - 1
        };
        Ok(if val == undefined { None } else { Some(val) })
    }

    /// Read a length field of `size` bytes.
    pub fn read_length(&mut self, size: u8) -> Result<u64, FormatError> {
        if !matches!(size, 2 | 4 | 8) {
            return Err(FormatError::InvalidLengthSize(size));
        }
        self.read_var_uint(size as usize)
    }

    /// Read a fixed-width field of `max_len` bytes holding a NUL-terminated
    /// string. The whole field is consumed.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, FormatError> {
        let field = self.take(max_len)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }

    /// Read bytes up to and including the next NUL.
    pub fn read_cstring(&mut self) -> Result<String, FormatError> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::UnexpectedEof {
                expected: self.data.len() + 1,
                available: self.data.len(),
            })?;
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }

    /// Compare the next bytes against `expected`; advance only on a match.
    pub fn check_signature(&mut self, expected: &[u8]) -> bool {
        match self.peek_bytes(expected.len()) {
            Ok(bytes) if bytes == expected => {
                self.pos += expected.len();
                true
            }
            _ => false,
        }
    }

    /// Like [`check_signature`](Self::check_signature) but a mismatch is an error.
    pub fn expect_signature(
        &mut self,
        expected: &'static [u8],
        name: &'static str,
    ) -> Result<(), FormatError> {
        let position = self.pos;
        if self.check_signature(expected) {
            Ok(())
        } else {
            Err(FormatError::InvalidSignature {
                expected: name,
                position,
            })
        }
    }

    /// Remember the current position as the base for alignment.
    pub fn start_alignment(&mut self) {
        self.align_base = self.pos;
    }

    /// Advance to the next multiple of `boundary` measured from the
    /// alignment base, not from the start of the buffer.
    pub fn check_alignment(&mut self, boundary: usize) -> Result<(), FormatError> {
        if boundary == 0 {
            return Ok(());
        }
        let rel = self.pos.checked_sub(self.align_base).ok_or_else(|| {
            FormatError::MalformedStructure(format!(
                "position {} is before the alignment base {}",
                self.pos, self.align_base
            ))
        })?;
        let rem = rel % boundary;
        if rem != 0 {
            self.skip(boundary - rem)?;
        }
        Ok(())
    }

    /// Cursor over the next `n` bytes, positioned at its start. The parent
    /// advances past them.
    pub fn sub_cursor(&mut self, n: usize) -> Result<ByteCursor<'a>, FormatError> {
        let bytes = self.take(n)?;
        Ok(ByteCursor::with_endian(bytes, self.endian))
    }

    /// Copy `count` elements of `width` bytes into a vector of native-order
    /// bytes, swapping each element when the cursor's order is not native.
    pub fn read_array_bytes(&mut self, count: usize, width: usize) -> Result<Vec<u8>, FormatError> {
        let n = count.checked_mul(width).ok_or(FormatError::UnexpectedEof {
            expected: usize::MAX,
            available: self.data.len(),
        })?;
        let mut out = self.take(n)?.to_vec();
        if self.endian != Endian::native() && width > 1 {
            for elem in out.chunks_exact_mut(width) {
                elem.reverse();
            }
        }
        Ok(out)
    }
}
