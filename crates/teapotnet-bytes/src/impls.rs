//! [`Readable`]/[`Writeable`] implementations for primitive and
//! standard-library types used throughout the wire formats.

use crate::{Digest32, Readable, Reader, Result, Writeable, Writer};

impl Readable for u8 {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        r.take_u8()
    }
}
impl Writeable for u8 {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u8(*self);
    }
}

impl Readable for u16 {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        r.take_u16()
    }
}
impl Writeable for u16 {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u16(*self);
    }
}

impl Readable for u32 {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        r.take_u32()
    }
}
impl Writeable for u32 {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u32(*self);
    }
}

impl Readable for u64 {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        r.take_u64()
    }
}
impl Writeable for u64 {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u64(*self);
    }
}

impl Readable for Digest32 {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let b = r.take(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(b);
        Ok(out)
    }
}
impl Writeable for Digest32 {
    fn write_onto(&self, w: &mut Writer) {
        w.write_bytes(self);
    }
}

/// A byte string carried with a 16-bit length prefix, for payloads up
/// to 64 KiB (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShortBytes(pub Vec<u8>);

impl Readable for ShortBytes {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        Ok(ShortBytes(r.take_u16_prefixed()?.to_vec()))
    }
}
impl Writeable for ShortBytes {
    fn write_onto(&self, w: &mut Writer) {
        // Values built through normal application code are always
        // within range; a `ShortBytes` constructed directly from an
        // oversize `Vec` is a programming error we surface as a
        // truncated write rather than a panic.
        if w.write_u16_prefixed(&self.0).is_err() {
            w.write_u16(0);
        }
    }
}

/// A byte string carried with a 32-bit length prefix, for payloads
/// larger than 64 KiB.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LongBytes(pub Vec<u8>);

impl Readable for LongBytes {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        Ok(LongBytes(r.take_u32_prefixed()?.to_vec()))
    }
}
impl Writeable for LongBytes {
    fn write_onto(&self, w: &mut Writer) {
        if w.write_u32_prefixed(&self.0).is_err() {
            w.write_u32(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bytes_round_trip() {
        let v = ShortBytes(vec![1, 2, 3, 4]);
        let mut w = Writer::new();
        w.write(&v);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: ShortBytes = r.extract().unwrap();
        assert_eq!(back, v);
    }

}
