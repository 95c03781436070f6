//! A small, panic-free reader over an in-memory byte slice.

use crate::{Error, Readable, Result};

/// Reads fixed-width integers, length-prefixed byte strings, and
/// [`Readable`] values out of a byte slice.
///
/// Unlike `std::io::Read`, every method here returns a [`Result`]
/// instead of panicking, and the reader never advances past the end of
/// its underlying slice.
///
/// # Examples
///
/// ```
/// use teapotnet_bytes::Reader;
/// let msg = [0x00, 0x00, 0x01, 0x23, 0x22];
/// let mut r = Reader::from_slice(&msg);
/// assert_eq!(r.take_u32().unwrap(), 0x123);
/// assert_eq!(r.take_u8().unwrap(), 0x22);
/// r.finish().unwrap();
/// ```
pub struct Reader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    /// Builds a reader over `slice`.
    pub fn from_slice(slice: &'a [u8]) -> Self {
        Reader { buf: slice, off: 0 }
    }

    /// Total length of the underlying slice.
    pub fn total_len(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes already consumed.
    pub fn consumed(&self) -> usize {
        self.off
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.off
    }

    /// Returns the unread tail of the slice without consuming it.
    pub fn peek_rest(&self) -> &'a [u8] {
        &self.buf[self.off..]
    }

    /// Consumes the reader and returns whatever bytes were left
    /// unread.
    pub fn into_rest(self) -> &'a [u8] {
        &self.buf[self.off..]
    }

    /// Returns `Ok(())` if every byte has been consumed, or
    /// [`Error::ExtraneousBytes`] otherwise.
    pub fn finish(&self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(Error::ExtraneousBytes(self.remaining()))
        }
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::Truncated {
                needed: n - self.remaining(),
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    /// Takes and returns the next `n` bytes as a slice.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n)?;
        let out = &self.buf[self.off..self.off + n];
        self.off += n;
        Ok(out)
    }

    /// Skips `n` bytes without returning them.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Takes a single byte.
    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Takes a big-endian `u16`.
    pub fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Takes a big-endian `u32`.
    pub fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Takes a big-endian `u64`.
    pub fn take_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_be_bytes(a))
    }

    /// Takes a 16-bit length prefix followed by that many bytes, as
    /// used for payloads up to 64 KiB (`spec.md` §4.1).
    pub fn take_u16_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u16()? as usize;
        self.take(len)
    }

    /// Takes a 32-bit length prefix followed by that many bytes, as
    /// used for payloads larger than 64 KiB.
    pub fn take_u32_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }

    /// Extracts a value implementing [`Readable`].
    pub fn extract<T: Readable>(&mut self) -> Result<T> {
        T::take_from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_primitives_in_big_endian() {
        let msg = [0x12, 0x34, 0x00, 0x00, 0x00, 0x01];
        let mut r = Reader::from_slice(&msg);
        assert_eq!(r.take_u16().unwrap(), 0x1234);
        assert_eq!(r.take_u32().unwrap(), 1);
        r.finish().unwrap();
    }

    #[test]
    fn truncated_reports_deficit() {
        let msg = [0x00u8];
        let mut r = Reader::from_slice(&msg);
        let err = r.take_u16().unwrap_err();
        assert_eq!(
            err,
            Error::Truncated {
                needed: 1,
                available: 1
            }
        );
    }

    #[test]
    fn extraneous_bytes_detected() {
        let msg = [0x00u8, 0x01];
        let mut r = Reader::from_slice(&msg);
        r.take_u8().unwrap();
        assert_eq!(r.finish().unwrap_err(), Error::ExtraneousBytes(1));
    }

    #[test]
    fn length_prefixed_payload_round_trips() {
        let msg = [0x00, 0x03, b'a', b'b', b'c'];
        let mut r = Reader::from_slice(&msg);
        assert_eq!(r.take_u16_prefixed().unwrap(), b"abc");
    }
}
