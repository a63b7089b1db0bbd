//! Primitive wire encoding.
//!
//! All integers travel in network byte order. Strings are a 4-byte length followed
//! by raw bytes, arrays are a 4-byte count followed by their elements.
use crate::error::DecodeError;

/// Append-only buffer for a request body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestWriter {
    buf: Vec<u8>,
}

impl RequestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Float bit pattern, sent like any other 32-bit integer.
    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.put_u32(value.to_bits())
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u32(value as u32)
    }

    pub fn put_len(&mut self, len: usize) -> &mut Self {
        self.put_u32(len as u32)
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.put_len(value.len());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn put_u32_array(&mut self, values: &[u32]) -> &mut Self {
        self.put_len(values.len());
        for v in values {
            self.put_u32(*v);
        }
        self
    }

    pub fn put_i64_array(&mut self, values: &[i64]) -> &mut Self {
        self.put_len(values.len());
        for v in values {
            self.put_i64(*v);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Positional reader over a fully received reply body.
#[derive(Debug, Clone)]
pub struct ReplyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReplyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unconsumed tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Underrun {
                needed,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.take(N)?;
        let mut out = [0; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Length-prefixed string. Invalid UTF-8 is replaced rather than rejected.
    pub fn string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }

    /// Count read up front, sanity-checked against the bytes left so a corrupt count
    /// cannot trigger a huge allocation.
    pub fn count(&mut self, min_item_size: usize) -> Result<usize, DecodeError> {
        let count = self.u32()? as usize;
        if count.saturating_mul(min_item_size) > self.remaining() {
            return Err(DecodeError::Underrun {
                needed: count.saturating_mul(min_item_size),
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    /// Optional trailing integer.
    ///
    /// An exhausted buffer is a clean short reply and yields `None`; a partial integer
    /// means the stream is corrupt.
    pub fn trailing_i32(&mut self) -> Result<Option<i32>, DecodeError> {
        match self.remaining() {
            0 => Ok(None),
            n if n < 4 => Err(DecodeError::Corrupt(format!(
                "{n} dangling bytes where an integer was expected"
            ))),
            _ => self.i32().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_integers() {
        let mut w = RequestWriter::new();
        w.put_u32(1).put_i32(-1);
        assert_eq!(w.as_bytes(), &[0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn int64_past_u32_overflow() {
        let mut w = RequestWriter::new();
        w.put_u64(4294967297);
        assert_eq!(w.as_bytes(), &[0, 0, 0, 1, 0, 0, 0, 1]);

        let mut r = ReplyReader::new(w.as_bytes());
        assert_eq!(r.u64().unwrap(), 4294967297);
        assert!(r.is_empty());
    }

    #[test]
    fn float_bit_pattern() {
        let mut w = RequestWriter::new();
        w.put_f32(1.5);
        assert_eq!(w.as_bytes(), &[0x3f, 0xc0, 0, 0]);
        assert_eq!(ReplyReader::new(w.as_bytes()).f32().unwrap(), 1.5);
    }

    #[test]
    fn length_prefixed_string() {
        let mut w = RequestWriter::new();
        w.put_str("abc");
        assert_eq!(w.as_bytes(), &[0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(ReplyReader::new(w.as_bytes()).string().unwrap(), "abc");
    }

    #[test]
    fn arrays_are_count_prefixed() {
        let mut w = RequestWriter::new();
        w.put_i64_array(&[-2, 3]);
        let mut r = ReplyReader::new(w.as_bytes());
        assert_eq!(r.u32().unwrap(), 2);
        assert_eq!(r.i64().unwrap(), -2);
        assert_eq!(r.i64().unwrap(), 3);
    }

    #[test]
    fn underrun_is_reported() {
        let mut r = ReplyReader::new(&[0, 0, 0, 9, b'x']);
        assert_eq!(
            r.string(),
            Err(DecodeError::Underrun {
                needed: 9,
                remaining: 1
            })
        );
    }

    #[test]
    fn trailing_integer_states() {
        assert_eq!(ReplyReader::new(&[]).trailing_i32(), Ok(None));
        assert_eq!(ReplyReader::new(&[0, 0, 0, 7]).trailing_i32(), Ok(Some(7)));
        assert!(matches!(
            ReplyReader::new(&[0, 0]).trailing_i32(),
            Err(DecodeError::Corrupt(_))
        ));
    }

    #[test]
    fn oversized_count_rejected() {
        let mut r = ReplyReader::new(&[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0]);
        assert!(r.count(4).is_err());
    }
}
