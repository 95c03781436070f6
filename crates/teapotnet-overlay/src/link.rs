//! A [`Link`]: a bidirectional authenticated association to one
//! neighbour (`spec.md` §3), type-erased over its underlying carrier so
//! the overlay can hold stream-carried and (later) tunnel-carried links
//! in the same map.

use async_trait::async_trait;
use teapotnet_bytes::frame::Frame;
use teapotnet_bytes::{Reader, Writer};
use teapotnet_channel::{NegotiatedMode, RecordTransport, SecureChannel};
use teapotnet_identity::Identifier;

use crate::err::{OverlayError, Result};

/// Lifecycle state of a [`Link`], per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The handshake has not yet completed.
    Opening,
    /// The handshake succeeded; frames may be sent and received.
    Established,
    /// A read or write failed; the link is no longer usable.
    TornDown,
}

/// Sends and receives whole [`Frame`]s over an established secure
/// channel. Object-safe so links over different carriers (a TCP stream
/// today, a tunnel pseudo-stream once C4 reuses this layer) can share
/// one map keyed by remote identifier.
#[async_trait]
pub trait Link: Send {
    /// The verified (or, for Anonymous mode, claimed) remote identity.
    fn remote(&self) -> Identifier;
    /// Which credential mode this link negotiated.
    fn negotiated(&self) -> &NegotiatedMode;
    /// Sends one frame.
    async fn send_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Receives and decodes one frame.
    async fn recv_frame(&mut self) -> Result<Frame>;
}

/// A [`Link`] backed by a [`SecureChannel`] over some
/// [`RecordTransport`].
pub struct ChannelLink<T> {
    channel: SecureChannel<T>,
    remote: Identifier,
}

impl<T: RecordTransport> ChannelLink<T> {
    /// Wraps an established channel as a link, keyed by the remote
    /// identifier the handshake (or anonymous-mode claim) reported.
    pub fn new(channel: SecureChannel<T>) -> Self {
        let remote = channel.negotiated().identifier();
        ChannelLink { channel, remote }
    }
}

#[async_trait]
impl<T: RecordTransport> Link for ChannelLink<T> {
    fn remote(&self) -> Identifier {
        self.remote
    }

    fn negotiated(&self) -> &NegotiatedMode {
        self.channel.negotiated()
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut w = Writer::new();
        w.write(frame);
        self.channel
            .send(&w.into_vec())
            .await
            .map_err(OverlayError::from)
    }

    async fn recv_frame(&mut self) -> Result<Frame> {
        let bytes = self.channel.recv().await?;
        let mut r = Reader::from_slice(&bytes);
        let frame = r
            .extract::<Frame>()
            .map_err(|_| OverlayError::Protocol("malformed frame on link"))?;
        r.finish()
            .map_err(|_| OverlayError::Protocol("extra bytes after frame"))?;
        Ok(frame)
    }
}
