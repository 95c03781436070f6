//! Publish/subscribe content-discovery engine: prefix matching and the
//! Subscribe/Publish/Call protocol over the overlay (`spec.md` §4.5,
//! "C5 — Pub/sub engine").

mod engine;
mod err;
mod traits;
mod trie;
mod wire;

pub use engine::{PubsubEngine, PUBLISHER_CACHE_TTL, SUBSCRIBE_COLLAPSE_WINDOW};
pub use err::{PubsubError, Result};
pub use traits::{Caller, Publisher, Subscriber};
pub use trie::PrefixTable;
pub use wire::{CallWire, PublishWire, SubscribeWire};
