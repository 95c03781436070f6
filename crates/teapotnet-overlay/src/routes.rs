//! The route table: `destination -> (next_hop, freshness)` hints,
//! LRU-bounded at 4096 entries (`spec.md` §4.3).
//!
//! Freshness is tracked as an explicit monotonic sequence number
//! rather than wall-clock age, per the resolution of the route
//! freshness open question in `spec.md` §9: wall-clock age makes
//! tie-break behaviour depend on test timing, a counter does not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use teapotnet_identity::Identifier;

/// Upper bound on the number of routes retained at once.
pub const MAX_ROUTES: usize = 4096;

#[derive(Clone, Copy, Debug)]
struct RouteEntry {
    next_hop: Identifier,
    freshness: u64,
}

struct Inner {
    routes: HashMap<Identifier, RouteEntry>,
}

/// The overlay's routing hints, guarded by a single mutex — routes
/// change on every forwarded frame, so the lock is held only for the
/// duration of a hashmap operation, never across an `.await`, mirroring
/// the channel-map pattern the overlay's link table also follows.
pub struct RouteTable {
    inner: Mutex<Inner>,
    sequence: AtomicU64,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Creates an empty route table.
    pub fn new() -> Self {
        RouteTable {
            inner: Mutex::new(Inner {
                routes: HashMap::new(),
            }),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Returns the current next-hop hint for `destination`, if any.
    pub fn lookup(&self, destination: &Identifier) -> Option<Identifier> {
        self.inner
            .lock()
            .unwrap()
            .routes
            .get(destination)
            .map(|e| e.next_hop)
    }

    /// Records that `via` is a plausible next hop toward `destination`,
    /// replacing any existing route only if the new candidate wins the
    /// freshness-weighted XOR-distance tie-break (`spec.md` §4.3).
    ///
    /// Called every time a frame is accepted from a neighbour: the
    /// neighbour a frame arrived from is a plausible next hop back
    /// toward that frame's source, the way flood routing learns reverse
    /// paths.
    pub fn learn(&self, destination: Identifier, via: Identifier) {
        let mut inner = self.inner.lock().unwrap();
        let freshness = self.next_sequence();
        let now = freshness;

        let replace = match inner.routes.get(&destination) {
            None => true,
            Some(existing) => {
                score(&destination, &via, freshness, now)
                    < score(&destination, &existing.next_hop, existing.freshness, now)
            }
        };
        if replace {
            inner
                .routes
                .insert(destination, RouteEntry { next_hop: via, freshness });
        }

        if inner.routes.len() > MAX_ROUTES {
            evict_stalest(&mut inner.routes);
        }
    }

    /// Removes every route whose next hop is `via`, because the link to
    /// it was torn down (`spec.md` §4.3 "Failure"), returning the
    /// destinations that were reachable through it so the caller can
    /// notify the listeners registered on them.
    pub fn purge_via(&self, via: &Identifier) -> Vec<Identifier> {
        let mut inner = self.inner.lock().unwrap();
        let affected: Vec<Identifier> = inner
            .routes
            .iter()
            .filter(|(_, e)| e.next_hop == *via)
            .map(|(dest, _)| *dest)
            .collect();
        inner.routes.retain(|_, e| e.next_hop != *via);
        affected
    }

    /// Number of routes currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().routes.len()
    }

    /// `true` if no routes are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower is better. `dist(destination, next_hop) / (1 + age)`, using
/// the top 8 bytes of the XOR distance as a `u64` magnitude — plenty of
/// entropy to break ties between real 32-byte identifiers without
/// needing a bignum type.
fn score(destination: &Identifier, next_hop: &Identifier, freshness: u64, now: u64) -> u128 {
    let distance = destination.xor_distance(next_hop);
    let mut high = [0u8; 8];
    high.copy_from_slice(&distance[..8]);
    let magnitude = u64::from_be_bytes(high) as u128;
    let age = now.saturating_sub(freshness) as u128;
    magnitude / (1 + age)
}

fn evict_stalest(routes: &mut HashMap<Identifier, RouteEntry>) {
    if let Some((&stalest, _)) = routes.iter().min_by_key(|(_, e)| e.freshness) {
        routes.remove(&stalest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Identifier {
        Identifier::from_digest([b; 32])
    }

    #[test]
    fn first_candidate_is_always_learned() {
        let table = RouteTable::new();
        table.learn(id(1), id(2));
        assert_eq!(table.lookup(&id(1)), Some(id(2)));
    }

    #[test]
    fn purge_via_removes_affected_routes_only() {
        let table = RouteTable::new();
        table.learn(id(1), id(9));
        table.learn(id(2), id(8));
        table.purge_via(&id(9));
        assert_eq!(table.lookup(&id(1)), None);
        assert_eq!(table.lookup(&id(2)), Some(id(8)));
    }

    #[test]
    fn eviction_keeps_table_bounded() {
        let table = RouteTable::new();
        for i in 0..(MAX_ROUTES as u16 + 10) {
            let bytes = i.to_be_bytes();
            let mut digest = [0u8; 32];
            digest[0] = bytes[0];
            digest[1] = bytes[1];
            table.learn(Identifier::from_digest(digest), id(1));
        }
        assert!(table.len() <= MAX_ROUTES);
    }
}
