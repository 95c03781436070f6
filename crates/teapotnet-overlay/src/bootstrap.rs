//! Link establishment: running a handshake over a freshly-connected
//! stream, registering the resulting link, and spawning the read loop
//! that feeds the forwarding pipeline (`spec.md` §4.3 "Link
//! establishment").

use std::sync::Arc;

use teapotnet_channel::{LocalCredentials, RemoteVerifier, SecureChannel};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::err::Result;
use crate::link::{ChannelLink, Link};
use crate::node::{Overlay, RegisterOutcome};

/// Runs the client side of the handshake over `stream`, registers the
/// resulting link with `overlay`, and spawns its read loop.
///
/// Returns the registration outcome so callers can decide whether to
/// retry a `ClosedDuplicate` connection attempt against a different
/// address.
pub async fn connect_link<S>(
    overlay: &Arc<Overlay>,
    stream: S,
    local: &LocalCredentials,
    remote: &RemoteVerifier,
) -> Result<RegisterOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let channel = SecureChannel::connect(stream, local, remote).await?;
    Ok(spawn_link(overlay, ChannelLink::new(channel)))
}

/// Runs the server side of the handshake over `stream`, registers the
/// resulting link with `overlay`, and spawns its read loop.
pub async fn accept_link<S>(
    overlay: &Arc<Overlay>,
    stream: S,
    local: &LocalCredentials,
    remote: &RemoteVerifier,
) -> Result<RegisterOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let channel = SecureChannel::accept(stream, local, remote).await?;
    Ok(spawn_link(overlay, ChannelLink::new(channel)))
}

/// Registers an already-handshaken link and, if it was accepted, spawns
/// the task that pumps inbound frames into the forwarding pipeline
/// until the link fails.
fn spawn_link<L: Link + 'static>(overlay: &Arc<Overlay>, link: L) -> RegisterOutcome {
    let remote = link.remote();
    let outcome = overlay.register_link(Box::new(link));
    if outcome == RegisterOutcome::Registered {
        let overlay = overlay.clone();
        tokio::spawn(async move { run_read_loop(overlay, remote).await });
        info!(remote = %remote, "link registered");
    } else {
        debug!(remote = %remote, outcome = ?outcome, "link not registered");
    }
    outcome
}

/// Pumps frames from the link to `remote` into
/// [`Overlay::accept_inbound`] until a read fails, at which point the
/// link is torn down (`spec.md` §4.3 "Failure").
async fn run_read_loop(overlay: Arc<Overlay>, remote: teapotnet_identity::Identifier) {
    loop {
        let Some(handle) = overlay.link_handle(&remote) else {
            return;
        };
        let frame = {
            let mut guard = handle.lock().await;
            guard.recv_frame().await
        };
        match frame {
            Ok(frame) => {
                if let Err(err) = overlay.accept_inbound(remote, frame).await {
                    debug!(remote = %remote, error = %err, "dropping frame");
                }
            }
            Err(_) => {
                overlay.handle_link_failure(remote);
                return;
            }
        }
    }
}
