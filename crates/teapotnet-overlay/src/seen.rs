//! Broadcast-dedup set, capacity-bounded at 65536 entries
//! (`spec.md` §4.3's `seen` table).
//!
//! Implemented as an exact ring-buffered set rather than a probabilistic
//! Bloom filter: at this capacity the memory cost of an exact
//! `HashSet` plus an eviction ring is negligible, and exactness avoids
//! the false-positive risk of dropping a broadcast that was never
//! actually seen before (`spec.md` §8 invariant 2, "no broadcast frame
//! is delivered twice", would be trivially satisfied by a filter with
//! false positives, but at the cost of also satisfying "never delivered
//! at all" for frames that collide).

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use teapotnet_identity::Identifier;

/// Capacity of the dedup window.
pub const SEEN_CAPACITY: usize = 65536;

struct Inner {
    members: HashSet<u64>,
    order: VecDeque<u64>,
}

/// Tracks which `(source, message_id)` pairs have already been
/// broadcast-forwarded.
pub struct SeenSet {
    inner: Mutex<Inner>,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenSet {
    /// Creates an empty dedup set.
    pub fn new() -> Self {
        SeenSet {
            inner: Mutex::new(Inner {
                members: HashSet::with_capacity(SEEN_CAPACITY),
                order: VecDeque::with_capacity(SEEN_CAPACITY),
            }),
        }
    }

    /// Computes `message_id = hash(source || payload_digest || hops)`,
    /// per `spec.md` §4.3.
    pub fn message_id(source: &Identifier, payload: &[u8], hops: u16) -> [u8; 32] {
        let payload_digest = Sha256::digest(payload);
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(payload_digest);
        hasher.update(hops.to_be_bytes());
        let out = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&out);
        digest
    }

    /// Returns `true` if `(source, message_id)` was already seen, and
    /// records it for next time if not. The combined key is compacted
    /// to a 64-bit fingerprint for set storage; collisions would cause
    /// an extra (harmless) drop, never a false "not seen".
    pub fn check_and_insert(&self, source: &Identifier, message_id: &[u8; 32]) -> bool {
        let mut hasher = DefaultHasher::new();
        source.as_bytes().hash(&mut hasher);
        message_id.hash(&mut hasher);
        let key = hasher.finish();

        let mut inner = self.inner.lock().unwrap();
        if !inner.members.insert(key) {
            return true;
        }
        inner.order.push_back(key);
        if inner.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = inner.order.pop_front() {
                inner.members.remove(&oldest);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_second_is_not() {
        let seen = SeenSet::new();
        let source = Identifier::hash(b"node-a");
        let id = SeenSet::message_id(&source, b"payload", 1);
        assert!(!seen.check_and_insert(&source, &id));
        assert!(seen.check_and_insert(&source, &id));
    }

    #[test]
    fn different_hops_produce_different_message_ids() {
        let source = Identifier::hash(b"node-a");
        let a = SeenSet::message_id(&source, b"payload", 1);
        let b = SeenSet::message_id(&source, b"payload", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn window_evicts_oldest_entries() {
        let seen = SeenSet::new();
        let source = Identifier::hash(b"node-a");
        for i in 0..(SEEN_CAPACITY + 1) {
            let id = SeenSet::message_id(&source, format!("payload-{i}").as_bytes(), 0);
            seen.check_and_insert(&source, &id);
        }
        let first_id = SeenSet::message_id(&source, b"payload-0", 0);
        assert!(!seen.check_and_insert(&source, &first_id));
    }
}
