//! The pseudo-datagram stream a [`crate::tunnel::Tunnel`] exposes to
//! the secure-channel layer: `send` emits a Forward/Tunnel frame,
//! `recv` dequeues from the tunnel's inbound FIFO (`spec.md` §4.4
//! "Open" step 2).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teapotnet_bytes::frame::{ContentType, Frame, FrameType};
use teapotnet_channel::{MessageTransport, RecordTransport};
use teapotnet_identity::Identifier;
use teapotnet_overlay::Overlay;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::cookie::COOKIE_LEN;

/// Three consecutive record errors terminate a tunnel (`spec.md`
/// §4.4 "Lifetime").
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

fn broken_pipe(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, msg)
}

fn timed_out() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "tunnel read timed out")
}

/// The pseudo-datagram stream for one tunnel. Implements both
/// [`MessageTransport`] (used for the handshake) and [`RecordTransport`]
/// (used afterward) identically: each `send`/`recv` is already one
/// whole datagram, so there is nothing to length-prefix, unlike the
/// byte-stream adapter `teapotnet-channel` uses for overlay links.
pub struct TunnelTransport {
    pub(crate) id: u64,
    pub(crate) remote: Identifier,
    pub(crate) self_id: Identifier,
    pub(crate) overlay: Arc<Overlay>,
    pub(crate) manager: Arc<crate::tunnel::TunnelManager>,
    pub(crate) inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pub(crate) read_timeout: Duration,
    pub(crate) consecutive_errors: Arc<AtomicU32>,
    /// Set once the opener's first send (which must carry the cookie)
    /// has gone out. Servers never set this: their first outbound
    /// frame needs no cookie, the inbound cookie already authenticated
    /// the tunnel.
    pub(crate) pending_cookie: Option<[u8; COOKIE_LEN]>,
}

impl Drop for TunnelTransport {
    fn drop(&mut self) {
        self.manager.close(self.id);
    }
}

impl TunnelTransport {
    fn build_payload(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8 + COOKIE_LEN + bytes.len());
        payload.extend_from_slice(&self.id.to_be_bytes());
        if let Some(cookie) = self.pending_cookie.take() {
            payload.extend_from_slice(&cookie);
        }
        payload.extend_from_slice(bytes);
        payload
    }

    async fn send_datagram(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let payload = self.build_payload(bytes);
        let frame = Frame::new(
            FrameType::Forward,
            ContentType::Tunnel,
            *self.self_id.as_bytes(),
            *self.remote.as_bytes(),
            payload,
        );
        let result = self.overlay.send_toward(self.remote, frame).await;
        self.record_outcome(result.is_ok());
        result.map_err(|_| broken_pipe("overlay send failed"))
    }

    async fn recv_datagram(&mut self) -> std::io::Result<Vec<u8>> {
        match timeout(self.read_timeout, self.inbound.recv()).await {
            Ok(Some(bytes)) => {
                self.record_outcome(true);
                Ok(bytes)
            }
            Ok(None) => {
                self.record_outcome(false);
                Err(broken_pipe("tunnel closed"))
            }
            Err(_) => Err(timed_out()),
        }
    }

    fn record_outcome(&self, ok: bool) {
        if ok {
            self.consecutive_errors.store(0, Ordering::SeqCst);
            return;
        }
        let failures = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= MAX_CONSECUTIVE_ERRORS {
            self.manager.close(self.id);
        }
    }

    /// This tunnel's id, unique at its initiator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The identity at the other end of this tunnel.
    pub fn remote(&self) -> Identifier {
        self.remote
    }
}

#[async_trait]
impl MessageTransport for TunnelTransport {
    async fn send_msg(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.send_datagram(bytes).await
    }

    async fn recv_msg(&mut self) -> std::io::Result<Vec<u8>> {
        self.recv_datagram().await
    }
}

#[async_trait]
impl RecordTransport for TunnelTransport {
    async fn send_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.send_datagram(record).await
    }

    async fn recv_record(&mut self) -> std::io::Result<Vec<u8>> {
        self.recv_datagram().await
    }
}

/// Monotonically-increasing source of fresh, nonzero tunnel ids, drawn
/// from a CSPRNG rather than a counter so ids are unguessable (id `0`
/// is reserved for cookie requests, `spec.md` §4.4 and
/// [`crate::cookie`]).
pub(crate) fn random_tunnel_id() -> u64 {
    use rand::RngCore;
    let counter = NEXT_FALLBACK.fetch_add(1, Ordering::Relaxed);
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let candidate = u64::from_be_bytes(bytes);
    if candidate == 0 {
        counter.wrapping_add(1)
    } else {
        candidate
    }
}

static NEXT_FALLBACK: AtomicU64 = AtomicU64::new(1);
