//! Darknet overlay router: link table, broadcast/forwarding pipeline,
//! route table, and tracker bootstrap (`spec.md` §4.3, "C3 — Overlay
//! router").

mod bootstrap;
mod err;
mod link;
mod node;
mod routes;
mod seen;
mod tracker;

pub use bootstrap::{accept_link, connect_link};
pub use err::{OverlayError, Result};
pub use link::{ChannelLink, Link, LinkState};
pub use node::{Listener, Overlay, RegisterOutcome};
pub use routes::{RouteTable, MAX_ROUTES};
pub use seen::{SeenSet, SEEN_CAPACITY};
pub use tracker::{TrackerClient, TrackerRecord};
