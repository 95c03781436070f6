//! A small writer that appends encoded values to a growable buffer.

use crate::{Error, Result, Writeable};

/// Accumulates the wire encoding of a frame.
///
/// Mirrors [`crate::Reader`] on the encode side: every primitive
/// writer appends big-endian bytes, and [`Writer::write`] accepts
/// anything implementing [`Writeable`].
#[derive(Default, Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes verbatim.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a big-endian `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a 16-bit length prefix followed by `payload`.
    ///
    /// Fails if `payload` is longer than 64 KiB, per `spec.md` §4.1.
    pub fn write_u16_prefixed(&mut self, payload: &[u8]) -> Result<()> {
        let len: u16 = payload
            .len()
            .try_into()
            .map_err(|_| Error::BadLengthValue(payload.len() as u64))?;
        self.write_u16(len);
        self.write_bytes(payload);
        Ok(())
    }

    /// Appends a 32-bit length prefix followed by `payload`, for
    /// payloads larger than 64 KiB.
    pub fn write_u32_prefixed(&mut self, payload: &[u8]) -> Result<()> {
        let len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| Error::BadLengthValue(payload.len() as u64))?;
        self.write_u32(len);
        self.write_bytes(payload);
        Ok(())
    }

    /// Appends the encoding of a [`Writeable`] value.
    pub fn write<T: Writeable + ?Sized>(&mut self, v: &T) {
        v.write_onto(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reader;

    #[test]
    fn round_trips_through_reader() {
        let mut w = Writer::new();
        w.write_u16(0xabcd);
        w.write_u16_prefixed(b"hello").unwrap();
        let bytes = w.into_vec();

        let mut r = Reader::from_slice(&bytes);
        assert_eq!(r.take_u16().unwrap(), 0xabcd);
        assert_eq!(r.take_u16_prefixed().unwrap(), b"hello");
        r.finish().unwrap();
    }

    #[test]
    fn rejects_oversize_u16_payload() {
        let mut w = Writer::new();
        let big = vec![0u8; 70_000];
        assert!(w.write_u16_prefixed(&big).is_err());
    }
}
