//! Wire codec primitives for the Teapotnet core engine.
//!
//! This crate is the lowest layer of the workspace (component C1 of
//! the specification): fallible big-endian readers and writers, the
//! [`Readable`]/[`Writeable`] trait pair every wire type in the
//! workspace implements once, and the [`frame`] module describing the
//! fixed overlay frame header.
//!
//! Nothing in this crate knows about sockets, async I/O, or
//! cryptography — it only turns bytes into typed values and back.

mod err;
mod impls;
pub mod frame;
mod reader;
mod writer;

pub use err::{Error, Result};
pub use impls::{LongBytes, ShortBytes};
pub use reader::Reader;
pub use writer::Writer;

/// A fixed-width 32-byte digest, the raw form of an [`Identifier`]
/// before the higher-level crates attach meaning to it.
///
/// [`Identifier`]: https://docs.rs/teapotnet-identity
pub type Digest32 = [u8; 32];

/// A value that can be read out of a [`Reader`].
///
/// Implemented for every primitive and wire type in the workspace so
/// that [`Reader::extract`] and [`Writer::write`] work uniformly.
pub trait Readable: Sized {
    /// Reads one value, consuming exactly the bytes it needs.
    fn take_from(r: &mut Reader<'_>) -> Result<Self>;
}

/// A value that can be written onto a [`Writer`].
pub trait Writeable {
    /// Appends this value's wire encoding onto `w`.
    fn write_onto(&self, w: &mut Writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest32_round_trips_as_readable() {
        let d: Digest32 = [7u8; 32];
        let mut w = Writer::new();
        w.write(&d);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: Digest32 = r.extract().unwrap();
        assert_eq!(back, d);
    }
}
