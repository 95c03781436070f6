//! End-to-end datagram tunnels multiplexed over the overlay
//! (`spec.md` §4.4, "C4 — Tunneler").

mod cookie;
mod err;
mod transport;
mod tunnel;

pub use cookie::{CookieSecret, COOKIE_LEN};
pub use err::{Result, TunnelError};
pub use transport::{TunnelTransport, MAX_CONSECUTIVE_ERRORS};
pub use tunnel::{TunnelManager, DEFAULT_TUNNEL_TIMEOUT};
