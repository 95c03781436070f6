//! The pub/sub engine's capability traits (`spec.md` §4.5, §9 redesign
//! note: capability traits rather than a class hierarchy). `Listener`
//! is reused from `teapotnet-overlay` rather than redefined — both
//! components key it by `Identifier` and want the same callback.

use teapotnet_identity::Identifier;

/// Serves content under one or more registered prefixes.
pub trait Publisher: Send + Sync {
    /// A subscription from `subscriber` matched this publisher's
    /// `prefix` against the subscribed `path`. Returns the digests
    /// this publisher currently offers for `path`.
    fn announce(&self, subscriber: Identifier, prefix: &str, path: &str) -> Vec<Identifier>;

    /// `true` if this publisher's announcements for `path` may be
    /// handed to subscribers marked `public_only` (`spec.md` §4.5
    /// "Remote subscribers"). Defaults to `true`; a publisher serving
    /// private content overrides it.
    fn is_public(&self, _path: &str) -> bool {
        true
    }
}

/// Consumes content discovered under a subscribed prefix.
pub trait Subscriber: Send + Sync {
    /// A matching Publish response arrived: `peer` announced `target`
    /// under `path`, matched against this subscriber's `prefix`.
    fn incoming(&self, peer: Identifier, prefix: &str, path: &str, target: Identifier);
}

/// A transient registration expressing interest in one content digest
/// (`spec.md` §3 "Caller"). Notified once the digest becomes
/// available, however it was obtained.
pub trait Caller: Send + Sync {
    /// The digest this caller is waiting on became available.
    fn satisfied(&self, target: Identifier);
}
