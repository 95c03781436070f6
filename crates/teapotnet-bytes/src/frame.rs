//! The overlay frame header and body, exactly as laid out in
//! `spec.md` §4.1 / §6 "Overlay frame on the wire":
//!
//! ```text
//! version(1) flags(1) type(1) content(1) hops(2) payload_length(2)
//! source(32) destination(32) payload(payload_length)
//! ```
//!
//! Bytes are big-endian; there is no alignment padding. A content
//! field the receiver does not recognize is dropped silently; a type
//! field it does not recognize is forwarded once (as a `Broadcast`)
//! and then dropped, per the forwarding rules in `spec.md` §4.3.

use crate::{Digest32, Error, Readable, Reader, Result, Writeable, Writer};

/// The current wire protocol version emitted by this implementation.
pub const CURRENT_VERSION: u8 = 1;

/// The maximum number of hops a frame may accumulate before it is
/// dropped (`spec.md` §4.1, §8 invariant 1).
pub const MAX_HOPS: u16 = 16;

/// `type` field: governs how the overlay routes the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Routed toward a specific `destination`.
    Forward,
    /// Flooded to every neighbour (subject to dedup).
    Broadcast,
    /// A routing-table lookup request/response.
    Lookup,
    /// A value this implementation does not recognize.
    ///
    /// Per `spec.md` §4.3, such a frame is forwarded once (as a
    /// broadcast) and then dropped; it is never dispatched to a
    /// content handler.
    Unknown(u8),
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Forward => 0,
            FrameType::Broadcast => 1,
            FrameType::Lookup => 2,
            FrameType::Unknown(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => FrameType::Forward,
            1 => FrameType::Broadcast,
            2 => FrameType::Lookup,
            other => FrameType::Unknown(other),
        }
    }
}

/// `content` field: selects the upper-layer handler for a `Forward` or
/// `Lookup`-answer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// No payload; used for bare routing probes.
    Empty,
    /// A tunneled datagram (component C4).
    Tunnel,
    /// A pub/sub notification (component C5).
    Notify,
    /// An acknowledgement.
    Ack,
    /// A fountain caller registration (`spec.md` §4.6).
    Call,
    /// A fountain combination (`spec.md` §4.6).
    Data,
    /// A fountain caller cancellation.
    Cancel,
    /// A pub/sub publish response.
    Publish,
    /// A pub/sub subscribe request.
    Subscribe,
    /// A value this implementation does not recognize; dropped
    /// silently (`spec.md` §4.1).
    Unknown(u8),
}

impl ContentType {
    fn to_byte(self) -> u8 {
        match self {
            ContentType::Empty => 0,
            ContentType::Tunnel => 1,
            ContentType::Notify => 2,
            ContentType::Ack => 3,
            ContentType::Call => 4,
            ContentType::Data => 5,
            ContentType::Cancel => 6,
            ContentType::Publish => 7,
            ContentType::Subscribe => 8,
            ContentType::Unknown(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => ContentType::Empty,
            1 => ContentType::Tunnel,
            2 => ContentType::Notify,
            3 => ContentType::Ack,
            4 => ContentType::Call,
            5 => ContentType::Data,
            6 => ContentType::Cancel,
            7 => ContentType::Publish,
            8 => ContentType::Subscribe,
            other => ContentType::Unknown(other),
        }
    }

    /// `true` if a receiver that does not understand this value should
    /// silently drop the frame instead of dispatching it.
    pub fn is_unknown(self) -> bool {
        matches!(self, ContentType::Unknown(_))
    }
}

/// Bit flags carried in the frame header. Currently unused by any
/// operation in the specification but reserved on the wire, the way
/// the original protocol's `flags` byte was reserved for future use.
pub type Flags = u8;

/// One overlay frame: header plus payload, exactly as it appears on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version of the sender.
    pub version: u8,
    /// Reserved bit flags.
    pub flags: Flags,
    /// Routing discipline for this frame.
    pub frame_type: FrameType,
    /// Upper-layer handler selector.
    pub content: ContentType,
    /// Number of times this frame has been forwarded so far.
    pub hops: u16,
    /// Identifier of the node that originated the frame.
    pub source: Digest32,
    /// Identifier of the frame's intended final recipient.
    pub destination: Digest32,
    /// Opaque payload, interpreted according to `content`.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a new frame with `hops = 0` and the current protocol
    /// version, ready to be sent by its originator.
    pub fn new(
        frame_type: FrameType,
        content: ContentType,
        source: Digest32,
        destination: Digest32,
        payload: Vec<u8>,
    ) -> Self {
        Frame {
            version: CURRENT_VERSION,
            flags: 0,
            frame_type,
            content,
            hops: 0,
            source,
            destination,
            payload,
        }
    }

    /// Returns `true` if this frame has already reached the hop limit
    /// and must be dropped rather than forwarded further
    /// (`spec.md` §4.3 step 1, §8 invariant 1).
    pub fn at_hop_limit(&self) -> bool {
        self.hops >= MAX_HOPS
    }

    /// Increments the hop counter, saturating at `u16::MAX` so the
    /// counter itself never overflows even if a caller forgets to
    /// check [`Frame::at_hop_limit`] first.
    pub fn increment_hops(&mut self) {
        self.hops = self.hops.saturating_add(1);
    }
}

impl Writeable for Frame {
    fn write_onto(&self, w: &mut Writer) {
        w.write_u8(self.version);
        w.write_u8(self.flags);
        w.write_u8(self.frame_type.to_byte());
        w.write_u8(self.content.to_byte());
        w.write_u16(self.hops);
        // Fall back to a zero length if the caller built a payload
        // that cannot be represented; `Frame::new` callers are
        // expected to respect the 64 KiB bound themselves.
        let len: u16 = self.payload.len().try_into().unwrap_or(0);
        w.write_u16(len);
        w.write(&self.source);
        w.write(&self.destination);
        w.write_bytes(&self.payload[..len as usize]);
    }
}

impl Readable for Frame {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        let flags = r.take_u8()?;
        let frame_type = FrameType::from_byte(r.take_u8()?);
        let content = ContentType::from_byte(r.take_u8()?);
        let hops = r.take_u16()?;
        let payload_length = r.take_u16()?;
        let source: Digest32 = r.extract()?;
        let destination: Digest32 = r.extract()?;
        let payload = r.take(payload_length as usize)?.to_vec();

        if hops > MAX_HOPS {
            return Err(Error::InvalidMessage("hops exceeds MAX_HOPS on the wire"));
        }

        Ok(Frame {
            version,
            flags,
            frame_type,
            content,
            hops,
            source,
            destination,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(b: u8) -> Digest32 {
        [b; 32]
    }

    #[test]
    fn frame_round_trips() {
        let f = Frame::new(
            FrameType::Forward,
            ContentType::Tunnel,
            digest(1),
            digest(2),
            vec![9, 9, 9],
        );
        let mut w = Writer::new();
        w.write(&f);
        let bytes = w.into_vec();

        let mut r = Reader::from_slice(&bytes);
        let back: Frame = r.extract().unwrap();
        r.finish().unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn unknown_content_type_round_trips_as_unknown() {
        let mut f = Frame::new(
            FrameType::Forward,
            ContentType::Empty,
            digest(1),
            digest(2),
            vec![],
        );
        f.content = ContentType::Unknown(200);
        let mut w = Writer::new();
        w.write(&f);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let back: Frame = r.extract().unwrap();
        assert!(back.content.is_unknown());
    }

    #[test]
    fn unknown_frame_type_round_trips_as_unknown() {
        let bytes = {
            let mut f = Frame::new(
                FrameType::Forward,
                ContentType::Empty,
                digest(1),
                digest(2),
                vec![],
            );
            f.frame_type = FrameType::Unknown(77);
            let mut w = Writer::new();
            w.write(&f);
            w.into_vec()
        };
        let mut r = Reader::from_slice(&bytes);
        let back: Frame = r.extract().unwrap();
        assert_eq!(back.frame_type, FrameType::Unknown(77));
    }

    #[test]
    fn hops_above_limit_is_rejected_on_decode() {
        let mut f = Frame::new(
            FrameType::Broadcast,
            ContentType::Empty,
            digest(1),
            digest(2),
            vec![],
        );
        f.hops = MAX_HOPS + 1;
        let mut w = Writer::new();
        w.write(&f);
        let bytes = w.into_vec();
        let mut r = Reader::from_slice(&bytes);
        let err = r.extract::<Frame>().unwrap_err();
        assert_eq!(err, Error::InvalidMessage("hops exceeds MAX_HOPS on the wire"));
    }

    #[test]
    fn increment_hops_saturates() {
        let mut f = Frame::new(
            FrameType::Forward,
            ContentType::Empty,
            digest(0),
            digest(0),
            vec![],
        );
        f.hops = u16::MAX;
        f.increment_hops();
        assert_eq!(f.hops, u16::MAX);
    }
}
