//! HDF5 object header parsing (v1 and v2).
//!
//! Both versions chain extra message blocks through continuation messages.
//! Those are queued and drained first-in first-out, since a continuation
//! block may itself enqueue further blocks.

use std::collections::{HashSet, VecDeque};

use crate::checksum;
use crate::cursor::ByteCursor;
use crate::error::FormatError;
use crate::message_type::MessageType;

const OHDR_SIGNATURE: &[u8; 4] = b"OHDR";
const OCHK_SIGNATURE: &[u8; 4] = b"OCHK";

/// Message flag: fail if the message type is not understood.
const MSG_FLAG_MUST_UNDERSTAND: u8 = 0x08;

/// v2 header flags.
const FLAG_CREATION_ORDER_TRACKED: u8 = 0x04;
const FLAG_ATTR_PHASE_CHANGE: u8 = 0x10;
const FLAG_TIMES_STORED: u8 = 0x20;

/// A single header message, borrowing its payload from the file buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMessage<'a> {
    pub msg_type: MessageType,
    pub flags: u8,
    /// Creation order (v2, when tracked).
    pub creation_order: Option<u16>,
    /// File address of the payload.
    pub address: usize,
    /// The payload, exactly as long as the declared message size.
    pub data: &'a [u8],
}

/// A parsed object header.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHeader<'a> {
    /// Header version (1 or 2).
    pub version: u8,
    /// Non-NIL, non-continuation messages from every block, in file order.
    pub messages: Vec<HeaderMessage<'a>>,
    /// v2 header flags (0 for v1).
    pub flags: u8,
    /// Modification time (v2, when times are stored).
    pub modification_time: Option<u32>,
}

struct Continuation {
    address: u64,
    length: u64,
}

fn read_continuation(
    msg: &HeaderMessage<'_>,
    offset_size: u8,
    length_size: u8,
) -> Result<Continuation, FormatError> {
    let mut c = ByteCursor::new(msg.data);
    let address = c.read_offset(offset_size)?.ok_or_else(|| {
        FormatError::MalformedStructure("continuation with undefined address".into())
    })?;
    let length = c.read_length(length_size)?;
    Ok(Continuation { address, length })
}

fn overrun_check(c: &ByteCursor<'_>, block_end: usize) -> Result<(), FormatError> {
    if c.tell() > block_end {
        return Err(FormatError::MalformedStructure(format!(
            "header message runs {} bytes past its block",
            c.tell() - block_end
        )));
    }
    Ok(())
}

impl<'a> ObjectHeader<'a> {
    /// Parse the object header at `address`.
    ///
    /// A header starting with `OHDR` is version 2; anything else must be a
    /// version 1 prefix.
    pub fn parse(
        data: &'a [u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
        verify_checksums: bool,
    ) -> Result<ObjectHeader<'a>, FormatError> {
        let mut c = ByteCursor::new(data);
        c.seek_address(address)?;
        if c.check_signature(OHDR_SIGNATURE) {
            Self::parse_v2(c, offset_size, length_size, verify_checksums)
        } else {
            Self::parse_v1(c, offset_size, length_size)
        }
    }

    fn parse_v1(
        mut c: ByteCursor<'a>,
        offset_size: u8,
        length_size: u8,
    ) -> Result<ObjectHeader<'a>, FormatError> {
        c.start_alignment();
        let version = c.read_u8()?;
        if version != 1 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        c.skip(1)?;
        let mut remaining = c.read_u16()? as usize;
        let _ref_count = c.read_u32()?;
        let header_size = c.read_u32()? as usize;
        c.check_alignment(8)?;

        let mut messages = Vec::new();
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();

        let mut block_end = c.tell() + header_size;
        loop {
            // Messages in a v1 block are aligned to 8 bytes from the block start.
            while remaining > 0 && c.tell() + 8 <= block_end {
                let raw_type = c.read_u16()?;
                let size = c.read_u16()? as usize;
                let flags = c.read_u8()?;
                c.skip(3)?;
                let msg = Self::take_message(&mut c, raw_type, size, flags, None)?;
                overrun_check(&c, block_end)?;
                c.check_alignment(8)?;
                remaining -= 1;
                Self::collect(
                    msg,
                    &mut messages,
                    &mut queue,
                    &mut seen,
                    offset_size,
                    length_size,
                )?;
            }

            let Some(next) = queue.pop_front() else { break };
            log::trace!("v1 continuation block at {:#x}", next.address);
            c.seek_address(next.address)?;
            c.ensure(next.length as usize)?;
            c.start_alignment();
            block_end = c.tell() + next.length as usize;
        }

        Ok(ObjectHeader {
            version: 1,
            messages,
            flags: 0,
            modification_time: None,
        })
    }

    fn parse_v2(
        mut c: ByteCursor<'a>,
        offset_size: u8,
        length_size: u8,
        verify_checksums: bool,
    ) -> Result<ObjectHeader<'a>, FormatError> {
        let header_start = c.tell() - OHDR_SIGNATURE.len();
        let version = c.read_u8()?;
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = c.read_u8()?;

        let mut modification_time = None;
        if flags & FLAG_TIMES_STORED != 0 {
            let _access = c.read_u32()?;
            modification_time = Some(c.read_u32()?);
            let _change = c.read_u32()?;
            let _birth = c.read_u32()?;
        }
        if flags & FLAG_ATTR_PHASE_CHANGE != 0 {
            let _max_compact = c.read_u16()?;
            let _min_dense = c.read_u16()?;
        }

        let size_width = 1usize << (flags & 0x03);
        let chunk0_size = c.read_var_uint(size_width)? as usize;
        let tracked = flags & FLAG_CREATION_ORDER_TRACKED != 0;

        let mut messages = Vec::new();
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();

        let mut block_start = header_start;
        let mut block_end = c.tell() + chunk0_size;
        loop {
            c.ensure(block_end - c.tell() + 4)?;
            let prefix = if tracked { 6 } else { 4 };
            // Fewer bytes than a message prefix left over is a gap.
            while c.tell() + prefix <= block_end {
                let raw_type = c.read_u8()? as u16;
                let size = c.read_u16()? as usize;
                let msg_flags = c.read_u8()?;
                let creation_order = if tracked { Some(c.read_u16()?) } else { None };
                let msg = Self::take_message(&mut c, raw_type, size, msg_flags, creation_order)?;
                overrun_check(&c, block_end)?;
                Self::collect(
                    msg,
                    &mut messages,
                    &mut queue,
                    &mut seen,
                    offset_size,
                    length_size,
                )?;
            }

            c.seek(block_end)?;
            let stored = c.read_u32()?;
            if verify_checksums {
                checksum::verify(&c.data()[block_start..block_end], stored)?;
            }

            let Some(next) = queue.pop_front() else { break };
            log::trace!("v2 continuation block at {:#x}", next.address);
            c.seek_address(next.address)?;
            block_start = c.tell();
            c.expect_signature(OCHK_SIGNATURE, "OCHK")?;
            let length = next.length as usize;
            if length < OCHK_SIGNATURE.len() + 4 {
                return Err(FormatError::MalformedStructure(format!(
                    "continuation block of {length} bytes"
                )));
            }
            block_end = block_start + length - 4;
        }

        Ok(ObjectHeader {
            version: 2,
            messages,
            flags,
            modification_time,
        })
    }

    fn take_message(
        c: &mut ByteCursor<'a>,
        raw_type: u16,
        size: usize,
        flags: u8,
        creation_order: Option<u16>,
    ) -> Result<HeaderMessage<'a>, FormatError> {
        let msg_type = MessageType::from_u16(raw_type);
        if let MessageType::Unknown(id) = msg_type {
            if flags & MSG_FLAG_MUST_UNDERSTAND != 0 {
                return Err(FormatError::UnsupportedMessage(id));
            }
        }
        let address = c.tell();
        let data = c.read_bytes(size)?;
        Ok(HeaderMessage {
            msg_type,
            flags,
            creation_order,
            address,
            data,
        })
    }

    fn collect(
        msg: HeaderMessage<'a>,
        messages: &mut Vec<HeaderMessage<'a>>,
        queue: &mut VecDeque<Continuation>,
        seen: &mut HashSet<u64>,
        offset_size: u8,
        length_size: u8,
    ) -> Result<(), FormatError> {
        match msg.msg_type {
            MessageType::Nil => {}
            MessageType::ObjectHeaderContinuation => {
                let cont = read_continuation(&msg, offset_size, length_size)?;
                if seen.insert(cont.address) {
                    queue.push_back(cont);
                } else {
                    log::warn!("continuation block {:#x} already visited", cont.address);
                }
            }
            _ => messages.push(msg),
        }
        Ok(())
    }

    /// Messages of one type, in file order.
    pub fn find(&self, msg_type: MessageType) -> impl Iterator<Item = &HeaderMessage<'a>> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }
}
