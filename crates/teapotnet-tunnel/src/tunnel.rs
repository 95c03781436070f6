//! [`TunnelManager`]: owns the `tunnels : map<u64, Tunnel>` table
//! described in `spec.md` §4.4, dispatches inbound Forward/Tunnel
//! frames, and runs the cookie handshake for newly-opened tunnels.

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use teapotnet_bytes::frame::{ContentType, Frame, FrameType};
use teapotnet_identity::Identifier;
use teapotnet_overlay::Overlay;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cookie::{CookieSecret, COOKIE_LEN};
use crate::err::{Result, TunnelError};
use crate::transport::{random_tunnel_id, TunnelTransport};

/// Default idle timeout: a tunnel with no application activity for
/// this long is torn down (`spec.md` §4.4 "Lifetime").
pub const DEFAULT_TUNNEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Owns every tunnel endpoint local to one node and the dispatcher
/// that routes inbound Forward/Tunnel frames to them.
pub struct TunnelManager {
    overlay: Arc<Overlay>,
    self_id: Identifier,
    secret: CookieSecret,
    tunnels: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>,
    pending_requests: Mutex<HashMap<(Identifier, u64), oneshot::Sender<[u8; COOKIE_LEN]>>>,
    read_timeout: Duration,
    weak_self: Weak<TunnelManager>,
}

impl TunnelManager {
    /// Registers for `ContentType::Tunnel` frames on `overlay`, spawns
    /// the dispatcher task, and returns the manager alongside the
    /// channel newly-accepted inbound tunnels arrive on (already past
    /// the cookie check, ready for a server-side handshake accept).
    pub fn spawn(
        overlay: Arc<Overlay>,
        self_id: Identifier,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TunnelTransport>) {
        Self::spawn_with_timeout(overlay, self_id, DEFAULT_TUNNEL_TIMEOUT)
    }

    /// As [`Self::spawn`], with an explicit idle read timeout.
    pub fn spawn_with_timeout(
        overlay: Arc<Overlay>,
        self_id: Identifier,
        read_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TunnelTransport>) {
        let inbound = overlay.register_content(ContentType::Tunnel);
        let manager = Arc::new_cyclic(|weak_self| TunnelManager {
            overlay,
            self_id,
            secret: CookieSecret::generate(),
            tunnels: Mutex::new(HashMap::new()),
            pending_requests: Mutex::new(HashMap::new()),
            read_timeout,
            weak_self: weak_self.clone(),
        });
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatch(manager.clone(), inbound, accept_tx));
        (manager, accept_rx)
    }

    /// Opens a tunnel to `remote`: runs the cookie round trip, then
    /// returns the pseudo-stream ready for a client-side secure-channel
    /// handshake (`spec.md` §4.4 "Open").
    pub async fn open(&self, remote: Identifier) -> Result<TunnelTransport> {
        let id = random_tunnel_id();
        let (cookie_tx, cookie_rx) = oneshot::channel();
        self.pending_requests
            .lock()
            .unwrap()
            .insert((remote, id), cookie_tx);

        let mut request_payload = Vec::with_capacity(16);
        request_payload.extend_from_slice(&0u64.to_be_bytes());
        request_payload.extend_from_slice(&id.to_be_bytes());
        let request = Frame::new(
            FrameType::Forward,
            ContentType::Tunnel,
            *self.self_id.as_bytes(),
            *remote.as_bytes(),
            request_payload,
        );
        if self.overlay.send_toward(remote, request).await.is_err() {
            self.pending_requests.lock().unwrap().remove(&(remote, id));
            return Err(TunnelError::AuthFailed);
        }

        let cookie = match timeout(self.read_timeout, cookie_rx).await {
            Ok(Ok(cookie)) => cookie,
            _ => {
                self.pending_requests.lock().unwrap().remove(&(remote, id));
                return Err(TunnelError::Timeout);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.tunnels.lock().unwrap().insert(id, tx);
        Ok(self.new_transport_inner(id, remote, rx, Some(cookie)))
    }

    /// Tears down the tunnel with this id, if one exists.
    pub fn close(&self, id: u64) {
        self.tunnels.lock().unwrap().remove(&id);
    }

    /// Number of tunnels currently tracked.
    pub fn len(&self) -> usize {
        self.tunnels.lock().unwrap().len()
    }

    /// `true` if no tunnels are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TunnelManager {
    /// This manager's own `Arc`, recovered from the weak
    /// self-reference stashed at construction time. Always succeeds:
    /// a `TunnelManager` is only ever reachable through one `Arc`
    /// (returned by [`Self::spawn`]), and every [`TunnelTransport`]
    /// holding onto this `Weak` also holds the same `Arc` alive.
    fn arc_self(&self) -> Arc<TunnelManager> {
        self.weak_self
            .upgrade()
            .expect("TunnelManager dropped while a transport referencing it is still alive")
    }

    fn new_transport_inner(
        &self,
        id: u64,
        remote: Identifier,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        pending_cookie: Option<[u8; COOKIE_LEN]>,
    ) -> TunnelTransport {
        TunnelTransport {
            id,
            remote,
            self_id: self.self_id,
            overlay: self.overlay.clone(),
            manager: self.arc_self(),
            inbound,
            read_timeout: self.read_timeout,
            consecutive_errors: Arc::new(AtomicU32::new(0)),
            pending_cookie,
        }
    }
}

async fn run_dispatch(
    manager: Arc<TunnelManager>,
    mut inbound: mpsc::UnboundedReceiver<(Identifier, Frame)>,
    accept_tx: mpsc::UnboundedSender<TunnelTransport>,
) {
    while let Some((_from, frame)) = inbound.recv().await {
        let source = Identifier::from_digest(frame.source);
        if frame.payload.len() < 8 {
            debug!("dropping undersized tunnel payload");
            continue;
        }
        let (id_bytes, rest) = frame.payload.split_at(8);
        let id = u64::from_be_bytes(id_bytes.try_into().unwrap());

        if id == 0 {
            handle_control_message(&manager, source, rest).await;
            continue;
        }

        let existing = manager.tunnels.lock().unwrap().get(&id).cloned();
        if let Some(tx) = existing {
            let _ = tx.send(rest.to_vec());
            continue;
        }

        if rest.len() < COOKIE_LEN {
            debug!(id, "dropping tunnel open with no cookie");
            continue;
        }
        let (cookie, remainder) = rest.split_at(COOKIE_LEN);
        if !manager.secret.verify(&source, id, cookie) {
            warn!(id, remote = %source, "rejected tunnel open with invalid cookie");
            continue;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !remainder.is_empty() {
            let _ = tx.send(remainder.to_vec());
        }
        manager.tunnels.lock().unwrap().insert(id, tx);
        let transport = manager.new_transport_inner(id, source, rx, None);
        if accept_tx.send(transport).is_err() {
            manager.close(id);
        }
    }
}

async fn handle_control_message(manager: &Arc<TunnelManager>, source: Identifier, rest: &[u8]) {
    match rest.len() {
        8 => {
            // Cookie request: `rest` is the opener's proposed id.
            let proposed = u64::from_be_bytes(rest.try_into().unwrap());
            let cookie = manager.secret.compute(&source, proposed);
            let mut reply_payload = Vec::with_capacity(8 + COOKIE_LEN + 8);
            reply_payload.extend_from_slice(&0u64.to_be_bytes());
            reply_payload.extend_from_slice(&cookie);
            reply_payload.extend_from_slice(&proposed.to_be_bytes());
            let reply = Frame::new(
                FrameType::Forward,
                ContentType::Tunnel,
                *manager.self_id.as_bytes(),
                *source.as_bytes(),
                reply_payload,
            );
            let _ = manager.overlay.send_toward(source, reply).await;
        }
        n if n == COOKIE_LEN + 8 => {
            // Cookie reply: cookie, then the id it was issued for.
            let cookie: [u8; COOKIE_LEN] = rest[..COOKIE_LEN].try_into().unwrap();
            let proposed = u64::from_be_bytes(rest[COOKIE_LEN..].try_into().unwrap());
            if let Some(tx) = manager
                .pending_requests
                .lock()
                .unwrap()
                .remove(&(source, proposed))
            {
                let _ = tx.send(cookie);
            }
        }
        _ => debug!("dropping malformed tunnel control message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_times_out_with_no_peer() {
        let overlay = Arc::new(Overlay::new(Identifier::hash(b"self")));
        let (manager, _accepts) =
            TunnelManager::spawn_with_timeout(overlay, Identifier::hash(b"self"), Duration::from_millis(50));
        let result = manager.open(Identifier::hash(b"nobody")).await;
        assert!(matches!(result, Err(TunnelError::Timeout)));
    }

    #[tokio::test]
    async fn cookie_round_trip_authenticates_accept() {
        let overlay = Arc::new(Overlay::new(Identifier::hash(b"self")));
        let source = Identifier::hash(b"opener");
        let secret = CookieSecret::generate();
        let cookie = secret.compute(&source, 7);
        assert!(secret.verify(&source, 7, &cookie));
        let _ = overlay; // overlay wiring exercised end-to-end in teapotnet-core's tests
    }
}
