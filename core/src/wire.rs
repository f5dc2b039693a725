//! Little-endian field access for NTLM message buffers.
//!
//! NTLM messages are a fixed header of named offsets followed by a payload
//! region that security buffers point into. `MessageWriter` keeps the header
//! and the payload cursor together so every triplet it records matches the
//! bytes it actually wrote.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DecodeError, EncodeError};

/// Signature that opens every NTLM message.
pub const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

pub const OFFSET_MESSAGE_TYPE: usize = 8;

/// Writes a message with a fixed-size header and an appended payload region.
#[derive(Debug)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// Start a message whose payload region begins at `header_len`.
    pub fn new(message_type: u32, header_len: usize) -> Self {
        let mut buf = vec![0u8; header_len];
        buf[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        LittleEndian::write_u32(&mut buf[OFFSET_MESSAGE_TYPE..], message_type);
        Self { buf }
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        LittleEndian::write_u16(&mut self.buf[offset..offset + 2], value);
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buf[offset..offset + 4], value);
    }

    /// Offset where the next payload bytes land.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Append `data` to the payload and describe it with a
    /// (length, max-length, offset) triplet at `field`.
    ///
    /// Nothing is written when `data` or the payload offset does not fit
    /// its triplet field.
    pub fn write_security_buffer(&mut self, field: usize, data: &[u8]) -> Result<(), EncodeError> {
        let too_long = || EncodeError::FieldTooLong {
            field,
            len: data.len(),
        };
        let len = u16::try_from(data.len()).map_err(|_| too_long())?;
        let offset = u32::try_from(self.position()).map_err(|_| too_long())?;
        self.write_u16(field, len);
        self.write_u16(field + 2, len);
        self.write_u32(field + 4, offset);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Like `write_security_buffer`, but an empty value is recorded with a
    /// zero offset, as Type1 messages expect.
    pub fn write_optional_buffer(&mut self, field: usize, data: &[u8]) -> Result<(), EncodeError> {
        if data.is_empty() {
            self.write_u16(field, 0);
            self.write_u16(field + 2, 0);
            self.write_u32(field + 4, 0);
            Ok(())
        } else {
            self.write_security_buffer(field, data)
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked reads over a received message.
#[derive(Debug, Clone, Copy)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn has_signature(&self) -> bool {
        self.buf.len() >= SIGNATURE.len() && &self.buf[..SIGNATURE.len()] == SIGNATURE
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, DecodeError> {
        self.bytes(offset, 2).map(LittleEndian::read_u16)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, DecodeError> {
        self.bytes(offset, 4).map(LittleEndian::read_u32)
    }

    /// Fixed-position bytes inside the header.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        self.buf
            .get(offset..offset + len)
            .ok_or(DecodeError::Truncated(self.buf.len()))
    }

    /// Resolve the (length, max-length, offset) triplet at `field`. Payload
    /// must lie inside the buffer and after the `min_offset`-byte header.
    pub fn security_buffer(&self, field: usize, min_offset: usize) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u16(field)? as usize;
        let offset = self.read_u32(field + 4)? as usize;
        if len == 0 {
            return Ok(&[]);
        }
        match offset.checked_add(len) {
            Some(end) if offset >= min_offset && end <= self.buf.len() => Ok(&self.buf[offset..end]),
            _ => Err(DecodeError::BadTargetBuffer),
        }
    }
}

/// Encode text as UTF-16LE.
pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

/// Decode UTF-16LE, replacing invalid sequences. A trailing odd byte is dropped.
pub fn from_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
    String::from_utf16_lossy(&units)
}

/// Encode text as single-byte OEM characters; anything above U+00FF becomes `?`.
pub fn oem(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

pub fn from_oem(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
