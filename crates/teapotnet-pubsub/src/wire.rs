//! Wire encodings for the three pub/sub message contents named in
//! `spec.md` §4.5: Subscribe, Publish, and Call.

use teapotnet_bytes::{Readable, Reader, Result as BytesResult, Writeable, Writer};
use teapotnet_identity::Identifier;

fn write_str(w: &mut Writer, s: &str) {
    // `Writeable::write_onto` cannot fail, so truncate to a length
    // that fits a 16-bit prefix rather than propagate an error, the
    // same fallback `teapotnet_bytes::frame::Frame` uses for its
    // payload length.
    let bytes = s.as_bytes();
    let len: u16 = bytes.len().try_into().unwrap_or(u16::MAX);
    w.write_u16(len);
    w.write_bytes(&bytes[..len as usize]);
}

fn read_str(r: &mut Reader<'_>) -> BytesResult<String> {
    let bytes = r.take_u16_prefixed()?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| teapotnet_bytes::Error::InvalidMessage("prefix is not valid UTF-8"))
}

/// A Broadcast/Subscribe message: "I am interested in `prefix`."
///
/// `public_only` propagates the subscriber-side flag of the same name
/// (`spec.md` §4.5 "Remote subscribers"): set when this subscription
/// is relaying for a delegate and must not surface private content,
/// so that the answering node's [`crate::traits::Publisher::is_public`]
/// check runs before any digest leaves the publisher's own node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeWire {
    /// The prefix being subscribed to.
    pub prefix: String,
    /// Restrict announced digests to publicly-marked content.
    pub public_only: bool,
}

impl Writeable for SubscribeWire {
    fn write_onto(&self, w: &mut Writer) {
        write_str(w, &self.prefix);
        w.write_u8(self.public_only as u8);
    }
}

impl Readable for SubscribeWire {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let prefix = read_str(r)?;
        let public_only = r.take_u8()? != 0;
        Ok(SubscribeWire { prefix, public_only })
    }
}

/// A Publish response: the digests a publisher matched at `prefix`
/// offers for the subscribed `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishWire {
    /// The publisher's matched (possibly shorter) prefix.
    pub prefix: String,
    /// The full path the original subscription named.
    pub path: String,
    /// Content digests offered for `path`.
    pub digests: Vec<Identifier>,
}

impl Writeable for PublishWire {
    fn write_onto(&self, w: &mut Writer) {
        write_str(w, &self.prefix);
        write_str(w, &self.path);
        let count: u16 = self.digests.len().try_into().unwrap_or(u16::MAX);
        w.write_u16(count);
        for digest in self.digests.iter().take(count as usize) {
            w.write(digest);
        }
    }
}

impl Readable for PublishWire {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let prefix = read_str(r)?;
        let path = read_str(r)?;
        let count = r.take_u16()?;
        let mut digests = Vec::with_capacity(count as usize);
        for _ in 0..count {
            digests.push(r.extract()?);
        }
        Ok(PublishWire { prefix, path, digests })
    }
}

/// A Forward/Call message: "send me combinations for `target`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallWire {
    /// The digest being requested.
    pub target: Identifier,
}

impl Writeable for CallWire {
    fn write_onto(&self, w: &mut Writer) {
        w.write(&self.target);
    }
}

impl Readable for CallWire {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(CallWire { target: r.extract()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_wire_round_trips() {
        let msg = PublishWire {
            prefix: "/docs".to_string(),
            path: "/docs/readme".to_string(),
            digests: vec![Identifier::hash(b"a"), Identifier::hash(b"b")],
        };
        let mut w = Writer::new();
        w.write(&msg);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: PublishWire = r.extract().unwrap();
        r.finish().unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn subscribe_wire_round_trips() {
        let msg = SubscribeWire {
            prefix: "/docs".to_string(),
            public_only: true,
        };
        let mut w = Writer::new();
        w.write(&msg);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: SubscribeWire = r.extract().unwrap();
        assert_eq!(back, msg);
    }
}
