//! The pub/sub engine itself: local publisher/subscriber registration,
//! the Subscribe/Publish/Call dispatch loops, and the caller registry
//! C6's retrieval scheduler consumes (`spec.md` §4.5).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use teapotnet_bytes::frame::{ContentType, Frame, FrameType};
use teapotnet_bytes::{Reader, Writer};
use teapotnet_identity::Identifier;
use teapotnet_overlay::Overlay;
use tokio::sync::mpsc;
use tracing::debug;

use crate::err::Result;
use crate::traits::{Caller, Publisher, Subscriber};
use crate::trie::PrefixTable;
use crate::wire::{CallWire, PublishWire, SubscribeWire};

/// A publisher's announcement for one (prefix, path) pair is reused for
/// this long before `announce` is called again (`spec.md` §4.5
/// "Rate-limit").
pub const PUBLISHER_CACHE_TTL: Duration = Duration::from_secs(10);

/// Subscribe broadcasts from the same peer for the same prefix are
/// collapsed within this window (`spec.md` §4.5 "Rate-limit").
pub const SUBSCRIBE_COLLAPSE_WINDOW: Duration = Duration::from_secs(30);

struct SubscriberEntry {
    subscriber: Arc<dyn Subscriber>,
    /// Set when this registration relays for a delegate peer rather
    /// than consuming announcements itself (`spec.md` §4.5 "Remote
    /// subscribers").
    remote: Option<Identifier>,
}

/// Owns the local publisher and subscriber tables and runs the
/// Subscribe/Publish/Call dispatch loops over one [`Overlay`].
///
/// Constructed explicitly with the owning node's identity rather than
/// reached through a process-wide singleton, per `spec.md` §9's
/// `CoreContext` redesign note.
pub struct PubsubEngine {
    overlay: Arc<Overlay>,
    self_id: Identifier,
    publishers: PrefixTable<Arc<dyn Publisher>>,
    subscribers: PrefixTable<Arc<SubscriberEntry>>,
    callers: Mutex<HashMap<Identifier, Vec<Arc<dyn Caller>>>>,
    publish_cache: Mutex<HashMap<(String, String), (Instant, Vec<Identifier>)>>,
    subscribe_dedup: Mutex<HashMap<(Identifier, String), Instant>>,
}

impl PubsubEngine {
    /// Spawns the dispatch loops for Subscribe, Publish, and Call
    /// content and returns the running engine.
    pub fn spawn(overlay: Arc<Overlay>, self_id: Identifier) -> Arc<Self> {
        let subscribe_rx = overlay.register_content(ContentType::Subscribe);
        let publish_rx = overlay.register_content(ContentType::Publish);

        let engine = Arc::new(PubsubEngine {
            overlay,
            self_id,
            publishers: PrefixTable::new(),
            subscribers: PrefixTable::new(),
            callers: Mutex::new(HashMap::new()),
            publish_cache: Mutex::new(HashMap::new()),
            subscribe_dedup: Mutex::new(HashMap::new()),
        });

        tokio::spawn(run_subscribe_dispatch(engine.clone(), subscribe_rx));
        tokio::spawn(run_publish_dispatch(engine.clone(), publish_rx));
        engine
    }

    /// Registers `publisher` to answer subscriptions matching `prefix`.
    pub fn publish(&self, prefix: &str, publisher: Arc<dyn Publisher>) {
        self.publishers.register(prefix, publisher);
    }

    /// Registers `subscriber` for `prefix` and broadcasts a Subscribe
    /// announcing the interest to every reachable node.
    ///
    /// When `remote` is set, this registration relays announcements on
    /// toward that peer instead of handing them to `subscriber` alone
    /// (`spec.md` §4.5 "Remote subscribers"); `public_only` is carried
    /// on the wire so that publishers answering the Subscribe can
    /// withhold non-public digests before they ever leave their node.
    pub async fn subscribe(
        &self,
        prefix: &str,
        subscriber: Arc<dyn Subscriber>,
        remote: Option<Identifier>,
        public_only: bool,
    ) -> Result<()> {
        self.subscribers.register(
            prefix,
            Arc::new(SubscriberEntry { subscriber, remote }),
        );
        let mut w = Writer::new();
        w.write(&SubscribeWire {
            prefix: prefix.to_string(),
            public_only,
        });
        self.overlay
            .originate_broadcast(ContentType::Subscribe, w.into_vec())
            .await?;
        Ok(())
    }

    /// Registers `caller` to be notified once `target` becomes
    /// available, and sends it a Call requesting combinations from
    /// `peer`.
    ///
    /// This engine only originates Call requests; serving them (and
    /// dispatching the resulting caller registry, via
    /// [`Self::register_caller`] / [`Self::satisfy`]) is the fountain
    /// retrieval scheduler's job (`spec.md` §4.6, component C6), which
    /// registers for `ContentType::Call` on the same [`Overlay`] itself.
    pub async fn fetch(&self, peer: Identifier, target: Identifier, caller: Arc<dyn Caller>) -> Result<()> {
        self.register_caller(target, caller);
        let mut w = Writer::new();
        w.write(&CallWire { target });
        let frame = Frame::new(
            FrameType::Forward,
            ContentType::Call,
            *self.self_id.as_bytes(),
            *peer.as_bytes(),
            w.into_vec(),
        );
        self.overlay.send_toward(peer, frame).await?;
        Ok(())
    }

    /// Registers `caller` against `target` without sending a Call,
    /// for callers created in response to a Call this node received.
    pub fn register_caller(&self, target: Identifier, caller: Arc<dyn Caller>) {
        self.callers.lock().unwrap().entry(target).or_default().push(caller);
    }

    /// The callers currently waiting on `target`, without removing
    /// them. Used by C6's retrieval scheduler to decide whether a
    /// digest is still wanted before acting on a Data message for it.
    pub fn callers_for(&self, target: Identifier) -> Vec<Arc<dyn Caller>> {
        self.callers.lock().unwrap().get(&target).cloned().unwrap_or_default()
    }

    /// Notifies and clears every caller waiting on `target`: `target`
    /// has become fully available.
    pub fn satisfy(&self, target: Identifier) {
        let callers = self.callers.lock().unwrap().remove(&target);
        if let Some(callers) = callers {
            for caller in callers {
                caller.satisfied(target);
            }
        }
    }

    fn should_process_subscribe(&self, peer: Identifier, prefix: &str) -> bool {
        let key = (peer, prefix.to_string());
        let mut dedup = self.subscribe_dedup.lock().unwrap();
        if let Some(seen_at) = dedup.get(&key) {
            if seen_at.elapsed() < SUBSCRIBE_COLLAPSE_WINDOW {
                return false;
            }
        }
        dedup.insert(key, Instant::now());
        true
    }

    fn announce_cached(&self, publisher: &Arc<dyn Publisher>, peer: Identifier, prefix: &str, path: &str, public_only: bool) -> Vec<Identifier> {
        let key = (prefix.to_string(), path.to_string());
        if let Some((seen_at, digests)) = self.publish_cache.lock().unwrap().get(&key) {
            if seen_at.elapsed() < PUBLISHER_CACHE_TTL {
                return digests.clone();
            }
        }
        let mut digests = publisher.announce(peer, prefix, path);
        if public_only {
            digests.retain(|_| publisher.is_public(path));
        }
        self.publish_cache
            .lock()
            .unwrap()
            .insert(key, (Instant::now(), digests.clone()));
        digests
    }
}

async fn run_subscribe_dispatch(engine: Arc<PubsubEngine>, mut rx: mpsc::UnboundedReceiver<(Identifier, Frame)>) {
    while let Some((_from, frame)) = rx.recv().await {
        let peer = Identifier::from_digest(frame.source);
        let mut r = Reader::from_slice(&frame.payload);
        let msg: SubscribeWire = match r.extract() {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "malformed subscribe payload");
                continue;
            }
        };
        if !engine.should_process_subscribe(peer, &msg.prefix) {
            continue;
        }

        for (matched_prefix, publishers) in engine.publishers.matches(&msg.prefix) {
            let mut digests = Vec::new();
            for publisher in &publishers {
                digests.extend(engine.announce_cached(publisher, peer, &matched_prefix, &msg.prefix, msg.public_only));
            }
            if digests.is_empty() {
                continue;
            }
            let mut w = Writer::new();
            w.write(&PublishWire {
                prefix: matched_prefix.clone(),
                path: msg.prefix.clone(),
                digests,
            });
            let reply = Frame::new(
                FrameType::Forward,
                ContentType::Publish,
                *engine.self_id.as_bytes(),
                *peer.as_bytes(),
                w.into_vec(),
            );
            if let Err(err) = engine.overlay.send_toward(peer, reply).await {
                debug!(%err, peer = %peer, "failed to send publish response");
            }
        }
    }
}

async fn run_publish_dispatch(engine: Arc<PubsubEngine>, mut rx: mpsc::UnboundedReceiver<(Identifier, Frame)>) {
    while let Some((_from, frame)) = rx.recv().await {
        let peer = Identifier::from_digest(frame.source);
        let mut r = Reader::from_slice(&frame.payload);
        let msg: PublishWire = match r.extract() {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "malformed publish payload");
                continue;
            }
        };

        for (matched_prefix, entries) in engine.subscribers.matches(&msg.path) {
            for entry in &entries {
                for &target in &msg.digests {
                    entry.subscriber.incoming(peer, &matched_prefix, &msg.path, target);
                }
                if let Some(remote) = entry.remote {
                    let mut w = Writer::new();
                    w.write(&PublishWire {
                        prefix: matched_prefix.clone(),
                        path: msg.path.clone(),
                        digests: msg.digests.clone(),
                    });
                    let relay = Frame::new(
                        FrameType::Forward,
                        ContentType::Publish,
                        *engine.self_id.as_bytes(),
                        *remote.as_bytes(),
                        w.into_vec(),
                    );
                    if let Err(err) = engine.overlay.send_toward(remote, relay).await {
                        debug!(%err, remote = %remote, "failed to relay publish to delegate");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingPublisher {
        digest: Identifier,
        calls: Arc<AtomicUsize>,
    }
    impl Publisher for RecordingPublisher {
        fn announce(&self, _subscriber: Identifier, _prefix: &str, _path: &str) -> Vec<Identifier> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![self.digest]
        }
    }

    struct RecordingSubscriber {
        seen: Arc<Mutex<Vec<Identifier>>>,
    }
    impl Subscriber for RecordingSubscriber {
        fn incoming(&self, _peer: Identifier, _prefix: &str, _path: &str, target: Identifier) {
            self.seen.lock().unwrap().push(target);
        }
    }

    #[tokio::test]
    async fn subscribe_dispatch_answers_matching_publisher() {
        let overlay = Arc::new(Overlay::new(Identifier::hash(b"self")));
        let engine = PubsubEngine::spawn(overlay.clone(), Identifier::hash(b"self"));

        let calls = Arc::new(AtomicUsize::new(0));
        let digest = Identifier::hash(b"content");
        engine.publish(
            "/docs",
            Arc::new(RecordingPublisher { digest, calls: calls.clone() }),
        );

        let mut w = Writer::new();
        w.write(&SubscribeWire {
            prefix: "/docs/readme".to_string(),
            public_only: false,
        });
        let frame = Frame::new(
            FrameType::Broadcast,
            ContentType::Subscribe,
            *Identifier::hash(b"peer").as_bytes(),
            *Identifier::hash(b"peer").as_bytes(),
            w.into_vec(),
        );
        overlay
            .accept_inbound(Identifier::hash(b"peer"), frame)
            .await
            .unwrap();

        // Give the spawned dispatch task a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caller_registry_round_trips() {
        let overlay = Arc::new(Overlay::new(Identifier::hash(b"self")));
        let engine = PubsubEngine::spawn(overlay, Identifier::hash(b"self"));
        let fired = Arc::new(AtomicUsize::new(0));

        struct CountingCaller(Arc<AtomicUsize>);
        impl Caller for CountingCaller {
            fn satisfied(&self, _target: Identifier) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let target = Identifier::hash(b"target");
        engine.register_caller(target, Arc::new(CountingCaller(fired.clone())));
        assert_eq!(engine.callers_for(target).len(), 1);
        engine.satisfy(target);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(engine.callers_for(target).is_empty());
    }
}
