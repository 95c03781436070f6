//! Wire encodings for the three retrieval-scheduler message contents
//! named in `spec.md` §4.6: Call, Data, and Cancel.

use teapotnet_bytes::{Readable, Reader, Result as BytesResult, Writeable, Writer};
use teapotnet_identity::Identifier;

use crate::combination::Combination;

/// A Forward/Call message: "stream me combinations for `target`'s
/// `[first, last]` range, up to `budget` of them."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallMessage {
    /// Digest of the content being requested.
    pub target: Identifier,
    /// First block index wanted.
    pub first: u64,
    /// Last block index wanted, inclusive.
    pub last: u64,
    /// Maximum number of combinations the source should send before
    /// requiring renewal.
    pub budget: u32,
}

impl Writeable for CallMessage {
    fn write_onto(&self, w: &mut Writer) {
        w.write(&self.target);
        w.write_u64(self.first);
        w.write_u64(self.last);
        w.write_u32(self.budget);
    }
}

impl Readable for CallMessage {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(CallMessage {
            target: r.extract()?,
            first: r.take_u64()?,
            last: r.take_u64()?,
            budget: r.take_u32()?,
        })
    }
}

/// A Forward/Data message: one combination toward `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    /// Digest the combination contributes toward.
    pub target: Identifier,
    /// The combination itself.
    pub combination: Combination,
}

impl Writeable for DataMessage {
    fn write_onto(&self, w: &mut Writer) {
        w.write(&self.target);
        w.write(&self.combination);
    }
}

impl Readable for DataMessage {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(DataMessage {
            target: r.extract()?,
            combination: r.extract()?,
        })
    }
}

/// A Forward/Cancel message: "stop sending combinations for
/// `target`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelMessage {
    /// Digest whose retrieval is being abandoned.
    pub target: Identifier,
}

impl Writeable for CancelMessage {
    fn write_onto(&self, w: &mut Writer) {
        w.write(&self.target);
    }
}

impl Readable for CancelMessage {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(CancelMessage { target: r.extract()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_message_round_trips() {
        let msg = CallMessage {
            target: Identifier::hash(b"target"),
            first: 0,
            last: 99,
            budget: 64,
        };
        let mut w = Writer::new();
        w.write(&msg);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: CallMessage = r.extract().unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn data_message_round_trips() {
        let msg = DataMessage {
            target: Identifier::hash(b"target"),
            combination: Combination::from_block(3, b"payload"),
        };
        let mut w = Writer::new();
        w.write(&msg);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: DataMessage = r.extract().unwrap();
        assert_eq!(back, msg);
    }
}
