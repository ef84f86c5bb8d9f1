// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The wire codec: packing and unpacking frame headers and typed payload
//! fields.
//!
//! Grounded on the teacher's `core::ser` module: a `Writer`/`Reader` trait
//! pair built on `byteorder`, plus `Writeable`/`Readable` traits for types
//! that know how to serialize themselves. The codec here is pure — no I/O,
//! no state — matching the original's `PACK_*`/`astrpack` helpers, which
//! this crate exposes as typed push/pull methods instead of a C varargs
//! list.
//!
//! Every frame is `type:u32 | version:u32 | size:u32 | payload:size bytes`,
//! big-endian. `string` fields within a payload are `u16 length | bytes`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error while (de)serializing: {0}")]
    Io(#[from] io::Error),
    #[error("frame payload is too large: {0} bytes")]
    TooLarge(usize),
    #[error("a string field exceeded the 16-bit length prefix ({0} bytes)")]
    StringTooLong(usize),
    #[error("unexpected end of payload while reading a field")]
    UnexpectedEnd,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The three header words that precede every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: u32,
    pub version: u32,
    pub size: u32,
}

pub const HEADER_LEN: usize = 12;

impl FrameHeader {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u32::<BigEndian>(self.msg_type)?;
        w.write_u32::<BigEndian>(self.version)?;
        w.write_u32::<BigEndian>(self.size)?;
        Ok(())
    }

    pub fn read(r: &mut impl Read) -> Result<Self> {
        let msg_type = r.read_u32::<BigEndian>()?;
        let version = r.read_u32::<BigEndian>()?;
        let size = r.read_u32::<BigEndian>()?;
        Ok(FrameHeader {
            msg_type,
            version,
            size,
        })
    }
}

/// A complete, owned frame: header plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u32,
    pub version: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: u32, version: u32, payload: Vec<u8>) -> Result<Self> {
        if payload.len() as u64 > u32::MAX as u64 {
            return Err(Error::TooLarge(payload.len()));
        }
        Ok(Frame {
            msg_type,
            version,
            payload,
        })
    }

    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        FrameHeader {
            msg_type: self.msg_type,
            version: self.version,
            size: self.payload.len() as u32,
        }
        .write(w)?;
        w.write_all(&self.payload)?;
        Ok(())
    }

    /// Reads one complete frame, blocking until `size` bytes of payload are
    /// available. Used by the peer reader loop in [`crate::conn`].
    pub fn read(r: &mut impl Read) -> Result<Self> {
        let header = FrameHeader::read(r)?;
        let mut payload = vec![0u8; header.size as usize];
        r.read_exact(&mut payload)?;
        Ok(Frame {
            msg_type: header.msg_type,
            version: header.version,
            payload,
        })
    }
}

/// Builds a payload by appending typed fields in order, the Rust analogue
/// of the original's `astrpack`/`PACK_*` vararg helpers.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        FieldWriter { buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.write_u16::<BigEndian>(v).expect("Vec write is infallible");
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.write_u32::<BigEndian>(v).expect("Vec write is infallible");
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.write_u64::<BigEndian>(v).expect("Vec write is infallible");
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.write_i64::<BigEndian>(v).expect("Vec write is infallible");
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.write_f64::<BigEndian>(v).expect("Vec write is infallible");
        self
    }

    /// Appends a `u16 length | bytes` string field. Callers are expected to
    /// keep names well under the 16-bit limit; this only fails on names long
    /// enough to be a programming error.
    pub fn str(&mut self, v: &str) -> std::result::Result<&mut Self, Error> {
        let bytes = v.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::StringTooLong(bytes.len()));
        }
        self.u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads typed fields back out of a payload in order, the mirror of
/// [`FieldWriter`].
pub struct FieldReader<'a> {
    cursor: io::Cursor<&'a [u8]>,
}

impl<'a> FieldReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        FieldReader {
            cursor: io::Cursor::new(payload),
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.cursor.read_u8().map_err(|_| Error::UnexpectedEnd)?)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| Error::UnexpectedEnd)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| Error::UnexpectedEnd)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| Error::UnexpectedEnd)
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| Error::UnexpectedEnd)
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.cursor
            .read_f64::<BigEndian>()
            .map_err(|_| Error::UnexpectedEnd)
    }

    pub fn str(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| Error::UnexpectedEnd)?;
        String::from_utf8(buf).map_err(|_| Error::UnexpectedEnd)
    }

    pub fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| Error::UnexpectedEnd)?;
        Ok(buf)
    }

    /// Remaining, unread tail of the payload.
    pub fn remainder(&mut self) -> Vec<u8> {
        let pos = self.cursor.position() as usize;
        self.cursor.get_ref()[pos..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let frame = Frame::new(12, 0, b"hi".to_vec()).unwrap();
        let mut buf = Vec::new();
        frame.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 2);
        let mut cursor = io::Cursor::new(buf);
        let back = Frame::read(&mut cursor).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn fields_round_trip() {
        let mut w = FieldWriter::new();
        w.u16(7).str("A").unwrap();
        let payload = w.into_vec();
        let mut r = FieldReader::new(&payload);
        assert_eq!(r.u16().unwrap(), 7);
        assert_eq!(r.str().unwrap(), "A");
    }

    #[test]
    fn empty_string_is_anonymous() {
        let mut w = FieldWriter::new();
        w.str("").unwrap();
        let payload = w.into_vec();
        let mut r = FieldReader::new(&payload);
        assert_eq!(r.str().unwrap(), "");
    }
}
