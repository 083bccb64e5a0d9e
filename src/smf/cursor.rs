//! Big-endian integer and variable-length quantity primitives
//!
//! [`ByteReader`] walks a borrowed byte slice. [`ByteWriter`] emits to any
//! [`Write`] sink or, in counting mode, only tallies the bytes it would have
//! emitted. Both writer modes run through [`ByteWriter::write_u8`] /
//! [`ByteWriter::write_bytes`], so a counting pass and a writing pass over the
//! same data always agree on the length.

use std::io::Write;

use crate::{Error, Result};

/// Largest value a 4-byte variable-length quantity can hold
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Maximum number of bytes in an SMF variable-length quantity
pub const MAX_VLQ_BYTES: usize = 4;

/// Reads big-endian primitives from a byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Look at the next byte without consuming it
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_u8().ok_or_else(|| self.eof(1))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok((u16::from(self.read_u8()?) << 8) | u16::from(self.read_u8()?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..3 {
            value = (value << 8) | u32::from(self.read_u8()?);
        }
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | u32::from(self.read_u8()?);
        }
        Ok(value)
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.eof(len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read `len` bytes as UTF-8, replacing invalid sequences
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a variable-length quantity
    ///
    /// Accumulates `(acc << 7) | (byte & 0x7F)` until a byte with the high
    /// bit clear. More than four bytes is a format error.
    pub fn read_vlq(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..MAX_VLQ_BYTES {
            let byte = self.read_u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::format(format!(
            "variable-length quantity longer than {} bytes at offset {}",
            MAX_VLQ_BYTES,
            self.pos - MAX_VLQ_BYTES
        )))
    }

    fn eof(&self, wanted: usize) -> Error {
        Error::format(format!(
            "unexpected end of data: wanted {} bytes at offset {}, {} left",
            wanted,
            self.pos,
            self.remaining()
        ))
    }
}

/// Writes big-endian primitives, or counts them in counting mode
#[derive(Debug)]
pub struct ByteWriter<W> {
    inner: W,
    counting: bool,
    count: u32,
}

impl<W: Write> ByteWriter<W> {
    /// Create a writer in writing mode
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            counting: false,
            count: 0,
        }
    }

    /// Switch between counting (`true`) and writing (`false`) mode
    pub fn set_counting(&mut self, counting: bool) {
        self.counting = counting;
    }

    pub fn is_counting(&self) -> bool {
        self.counting
    }

    /// Bytes written or counted since the last [`reset_count`](Self::reset_count)
    pub fn bytes_written(&self) -> u32 {
        self.count
    }

    pub fn reset_count(&mut self) {
        self.count = 0;
    }

    /// Give back the underlying sink
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write the low 24 bits of `value`
    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        if value > 0x00FF_FFFF {
            return Err(Error::argument(format!(
                "{} does not fit in 24 bits",
                value
            )));
        }
        self.write_bytes(&value.to_be_bytes()[1..])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.counting {
            self.inner.write_all(bytes)?;
        }
        self.count = self.count.wrapping_add(bytes.len() as u32);
        Ok(())
    }

    /// Write a string's UTF-8 bytes, optionally prefixed by its VLQ length
    pub fn write_string(&mut self, text: &str, length_prefix: bool) -> Result<()> {
        if length_prefix {
            self.write_vlq(payload_len(text.len())?)?;
        }
        self.write_bytes(text.as_bytes())
    }

    /// Write a variable-length quantity, most significant group first
    pub fn write_vlq(&mut self, value: u32) -> Result<()> {
        let (buf, len) = encode_vlq(value)?;
        self.write_bytes(&buf[MAX_VLQ_BYTES - len..])
    }
}

/// Encode a VLQ into a fixed buffer, returning the buffer and the used length
///
/// The encoded bytes occupy the tail of the buffer.
pub fn encode_vlq(mut value: u32) -> Result<([u8; MAX_VLQ_BYTES], usize)> {
    if value > MAX_VLQ {
        return Err(Error::argument(format!(
            "{} exceeds the variable-length quantity maximum {}",
            value, MAX_VLQ
        )));
    }
    let mut buf = [0u8; MAX_VLQ_BYTES];
    let mut start = MAX_VLQ_BYTES;
    loop {
        start -= 1;
        buf[start] = (value & 0x7F) as u8;
        if start != MAX_VLQ_BYTES - 1 {
            buf[start] |= 0x80;
        }
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    Ok((buf, MAX_VLQ_BYTES - start))
}

/// Number of bytes `value` takes as a VLQ
pub fn vlq_size(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

/// Convert a payload length to a VLQ-encodable value
pub(crate) fn payload_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&l| l <= MAX_VLQ)
        .ok_or_else(|| Error::argument(format!("payload of {} bytes is too long", len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq_bytes(value: u32) -> Vec<u8> {
        let mut w = ByteWriter::new(Vec::new());
        w.write_vlq(value).unwrap();
        w.into_inner()
    }

    #[test]
    fn test_vlq_known_encodings() {
        // Encodings listed in the Standard MIDI File 1.0 document
        let cases: &[(u32, &[u8])] = &[
            (0x00, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x10_0000, &[0xC0, 0x80, 0x00]),
            (0x1F_FFFF, &[0xFF, 0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0800_0000, &[0xC0, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for &(value, encoded) in cases {
            assert_eq!(vlq_bytes(value), encoded, "encoding 0x{:X}", value);
            assert_eq!(ByteReader::new(encoded).read_vlq().unwrap(), value);
            assert_eq!(vlq_size(value), encoded.len());
        }
    }

    #[test]
    fn test_vlq_round_trip_sampled() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let value = rng.gen_range(0..=MAX_VLQ);
            let bytes = vlq_bytes(value);
            let mut reader = ByteReader::new(&bytes);
            assert_eq!(reader.read_vlq().unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_vlq_too_large() {
        let mut w = ByteWriter::new(Vec::new());
        assert!(w.write_vlq(MAX_VLQ + 1).unwrap_err().is_argument());
        assert!(w.into_inner().is_empty());

        // Five continuation bytes is malformed
        let mut r = ByteReader::new(&[0x81, 0x81, 0x81, 0x81, 0x01]);
        assert!(r.read_vlq().unwrap_err().is_format());
    }

    #[test]
    fn test_vlq_truncated() {
        let mut r = ByteReader::new(&[0x81, 0x80]);
        assert!(r.read_vlq().unwrap_err().is_format());
    }

    #[test]
    fn test_big_endian_integers() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x11];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u24().unwrap(), 0x56789A);
        assert_eq!(r.read_u32().unwrap(), 0xBCDEF011);
        assert!(r.read_u8().is_err());

        let mut w = ByteWriter::new(Vec::new());
        w.write_u16(0x1234).unwrap();
        w.write_u24(0x56789A).unwrap();
        w.write_u32(0xBCDEF011).unwrap();
        assert_eq!(w.bytes_written(), 9);
        assert_eq!(w.into_inner(), data);
    }

    #[test]
    fn test_counting_mode_emits_nothing() {
        let mut w = ByteWriter::new(Vec::new());
        w.set_counting(true);
        w.write_u32(6).unwrap();
        w.write_vlq(0x4000).unwrap();
        w.write_string("Piano", true).unwrap();
        assert_eq!(w.bytes_written(), 4 + 3 + 1 + 5);
        assert!(w.into_inner().is_empty());
    }

    #[test]
    fn test_counting_matches_writing() {
        let run = |w: &mut ByteWriter<Vec<u8>>| {
            w.write_u8(0x90).unwrap();
            w.write_vlq(1_000_000).unwrap();
            w.write_u24(500_000).unwrap();
            w.write_string("Grand Piano \u{1F3B9}", true).unwrap();
            w.write_bytes(&[1, 2, 3]).unwrap();
        };

        let mut w = ByteWriter::new(Vec::new());
        w.set_counting(true);
        run(&mut w);
        let counted = w.bytes_written();

        w.set_counting(false);
        w.reset_count();
        run(&mut w);
        assert_eq!(w.bytes_written(), counted);
        assert_eq!(w.into_inner().len() as u32, counted);
    }

    #[test]
    fn test_read_string_lossy() {
        let mut r = ByteReader::new(b"Bass\xFF");
        assert_eq!(r.read_string(5).unwrap(), "Bass\u{FFFD}");
        assert_eq!(r.position(), 5);
    }
}
