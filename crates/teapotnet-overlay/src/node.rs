//! The overlay router itself: link registration, the forwarding
//! pipeline (`spec.md` §4.3), and link-failure propagation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use teapotnet_bytes::frame::{ContentType, Frame, FrameType};
use teapotnet_channel::NegotiatedMode;
use teapotnet_identity::Identifier;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::err::{OverlayError, Result};
use crate::link::Link;
use crate::routes::RouteTable;
use crate::seen::SeenSet;

/// Observes link failures for identities it is interested in, the way
/// `spec.md` §4.3's "Failure" rule and §4.5's `listeners` map both
/// require.
pub trait Listener: Send + Sync {
    /// Called once, with the identifier that became unreachable, the
    /// first time a route through a failed link is purged.
    fn link_failed(&self, identity: Identifier);
}

struct LinkEntry {
    link: Arc<AsyncMutex<Box<dyn Link>>>,
    negotiated: NegotiatedMode,
}

/// The darknet overlay router for one node.
///
/// Owns the link table, the route table, and the broadcast dedup set,
/// and implements the forwarding pipeline every inbound frame goes
/// through. Constructed with an explicit `self_id` rather than reached
/// through a process-wide singleton, per `spec.md` §9's `CoreContext`
/// redesign note.
pub struct Overlay {
    self_id: Identifier,
    links: Mutex<HashMap<Identifier, LinkEntry>>,
    routes: RouteTable,
    seen: SeenSet,
    listeners: Mutex<HashMap<Identifier, Vec<Arc<dyn Listener>>>>,
    dispatch: Mutex<HashMap<ContentType, mpsc::UnboundedSender<(Identifier, Frame)>>>,
}

/// The outcome of attempting to register a newly-handshaken link.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The link was accepted and is now routable.
    Registered,
    /// An anonymous-mode link is never kept as a routable neighbour;
    /// it exists only for address discovery (`spec.md` §4.2).
    RefusedAnonymous,
    /// A link to this identifier already existed and won the
    /// deterministic tie-break (`spec.md` §4.3); the new one was
    /// closed.
    ClosedDuplicate,
}

impl Overlay {
    /// Creates a router for the node identified by `self_id`.
    pub fn new(self_id: Identifier) -> Self {
        Overlay {
            self_id,
            links: Mutex::new(HashMap::new()),
            routes: RouteTable::new(),
            seen: SeenSet::new(),
            listeners: Mutex::new(HashMap::new()),
            dispatch: Mutex::new(HashMap::new()),
        }
    }

    /// This node's own identifier.
    pub fn self_id(&self) -> Identifier {
        self.self_id
    }

    /// Registers a completed handshake as a neighbour link.
    ///
    /// Anonymous-mode links are refused outright: per `spec.md` §4.2
    /// they exist only for initial address discovery and are never
    /// kept as a routable neighbour. For authenticated modes, at most
    /// one link per remote identifier is kept; on a collision the side
    /// with the lexicographically smaller identifier wins
    /// (`spec.md` §4.3 "Link establishment").
    pub fn register_link(&self, link: Box<dyn Link>) -> RegisterOutcome {
        let negotiated = link.negotiated().clone();
        if !negotiated.is_authenticated() {
            return RegisterOutcome::RefusedAnonymous;
        }
        let remote = link.remote();

        let mut links = self.links.lock().unwrap();
        if links.contains_key(&remote) {
            if self.self_id < remote {
                links.insert(
                    remote,
                    LinkEntry {
                        link: Arc::new(AsyncMutex::new(link)),
                        negotiated,
                    },
                );
                RegisterOutcome::Registered
            } else {
                RegisterOutcome::ClosedDuplicate
            }
        } else {
            links.insert(
                remote,
                LinkEntry {
                    link: Arc::new(AsyncMutex::new(link)),
                    negotiated,
                },
            );
            RegisterOutcome::Registered
        }
    }

    /// Registers interest in frames of a given content type addressed
    /// to this node, returning the channel they arrive on.
    pub fn register_content(&self, content: ContentType) -> mpsc::UnboundedReceiver<(Identifier, Frame)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch.lock().unwrap().insert(content, tx);
        rx
    }

    /// Registers `listener` to be notified when `identity` becomes
    /// unreachable.
    pub fn add_listener(&self, identity: Identifier, listener: Arc<dyn Listener>) {
        self.listeners
            .lock()
            .unwrap()
            .entry(identity)
            .or_default()
            .push(listener);
    }

    /// The current route-table hint for `destination`, if any.
    pub fn route_for(&self, destination: &Identifier) -> Option<Identifier> {
        self.routes.lookup(destination)
    }

    /// Number of active neighbour links.
    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// The credential mode negotiated with `remote`, if a link to it is
    /// currently active.
    pub fn negotiated_mode(&self, remote: &Identifier) -> Option<NegotiatedMode> {
        self.links
            .lock()
            .unwrap()
            .get(remote)
            .map(|e| e.negotiated.clone())
    }

    /// The shared handle for the link to `remote`, if one is active.
    /// Exposed to [`crate::bootstrap`]'s read loop, which needs to hold
    /// it across an `.await` without keeping the link table locked.
    pub(crate) fn link_handle(&self, remote: &Identifier) -> Option<Arc<AsyncMutex<Box<dyn Link>>>> {
        self.links.lock().unwrap().get(remote).map(|e| e.link.clone())
    }

    fn all_links_except(&self, exclude: Option<Identifier>) -> Vec<(Identifier, Arc<AsyncMutex<Box<dyn Link>>>)> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, e)| (*id, e.link.clone()))
            .collect()
    }

    /// Sends `frame` on the link to `remote`, tearing the link down on
    /// write failure.
    async fn send_on_link(&self, remote: Identifier, frame: &Frame) -> Result<()> {
        let Some(handle) = self.link_handle(&remote) else {
            return Err(OverlayError::NoRoute);
        };
        let result = handle.lock().await.send_frame(frame).await;
        if result.is_err() {
            self.handle_link_failure(remote);
        }
        result
    }

    /// Originates a fresh broadcast of application `content`, flooding
    /// it to every current neighbour. Used by upper layers that emit
    /// their own Broadcast-type frames (pub/sub Subscribe, `spec.md`
    /// §4.5) rather than forwarding one that arrived from elsewhere.
    pub async fn originate_broadcast(&self, content: ContentType, payload: Vec<u8>) -> Result<()> {
        let frame = Frame::new(
            FrameType::Broadcast,
            content,
            *self.self_id.as_bytes(),
            *self.self_id.as_bytes(),
            payload,
        );
        self.flood(frame, None).await
    }

    /// Sends `frame` toward `destination`: directly if a route is
    /// known, otherwise by broadcast.
    pub async fn send_toward(&self, destination: Identifier, frame: Frame) -> Result<()> {
        if let Some(next_hop) = self.routes.lookup(&destination) {
            if self.send_on_link(next_hop, &frame).await.is_ok() {
                return Ok(());
            }
        }
        self.flood(frame, None).await
    }

    /// `true` the first time `(source, message_id)` is seen, inserting
    /// it into the dedup set; `false` (and a no-op) on every
    /// subsequent sighting (`spec.md` §4.3 step 6, §8 invariant 2).
    fn first_sighting(&self, frame: &Frame) -> bool {
        let source = Identifier::from_digest(frame.source);
        let message_id = SeenSet::message_id(&source, &frame.payload, frame.hops);
        !self.seen.check_and_insert(&source, &message_id)
    }

    /// Forwards `frame` to every link except `exclude`, unconditionally
    /// — callers are responsible for the dedup check.
    async fn forward_to_all_except(&self, mut frame: Frame, exclude: Option<Identifier>) {
        frame.frame_type = FrameType::Broadcast;
        for (remote, handle) in self.all_links_except(exclude) {
            let mut guard = handle.lock().await;
            if guard.send_frame(&frame).await.is_err() {
                drop(guard);
                self.handle_link_failure(remote);
            }
        }
    }

    /// Deduplicates and floods `frame` to every link except `exclude`.
    /// Used for the "no route, fall back to flooding" cases of
    /// `Forward`, `Lookup`, and unrecognized frame types; genuine
    /// inbound `Broadcast` frames use [`Self::first_sighting`] directly
    /// so they can also dispatch locally exactly once.
    async fn flood(&self, frame: Frame, exclude: Option<Identifier>) -> Result<()> {
        if !self.first_sighting(&frame) {
            return Ok(());
        }
        self.forward_to_all_except(frame, exclude).await;
        Ok(())
    }

    /// Runs the forwarding pipeline in `spec.md` §4.3 on a frame that
    /// just arrived from neighbour `from`.
    pub async fn accept_inbound(&self, from: Identifier, mut frame: Frame) -> Result<()> {
        if frame.at_hop_limit() {
            return Ok(());
        }
        frame.increment_hops();
        let source = Identifier::from_digest(frame.source);
        let destination = Identifier::from_digest(frame.destination);
        self.routes.learn(source, from);

        match frame.frame_type {
            FrameType::Forward => {
                if destination == self.self_id {
                    self.dispatch_local(from, frame);
                    return Ok(());
                }
                if self.routes.lookup(&destination).is_some()
                    && self.send_toward(destination, frame.clone()).await.is_ok()
                {
                    return Ok(());
                }
                self.flood(frame, Some(from)).await
            }
            FrameType::Lookup => {
                if destination == self.self_id {
                    let reply = Frame::new(
                        FrameType::Forward,
                        ContentType::Ack,
                        self.self_id.into(),
                        frame.source,
                        Vec::new(),
                    );
                    let _ = self.send_toward(source, reply).await;
                    Ok(())
                } else {
                    self.flood(frame, Some(from)).await
                }
            }
            FrameType::Broadcast => {
                if !self.first_sighting(&frame) {
                    return Ok(());
                }
                self.dispatch_local(from, frame.clone());
                self.forward_to_all_except(frame, Some(from)).await;
                Ok(())
            }
            FrameType::Unknown(_) => {
                // Forwarded once more (as a broadcast) and then
                // necessarily dropped, since the dedup set will reject
                // the next sighting (`spec.md` §4.1). Never dispatched
                // locally.
                self.flood(frame, Some(from)).await
            }
        }
    }

    fn dispatch_local(&self, from: Identifier, frame: Frame) {
        if frame.content.is_unknown() {
            debug!(content = ?frame.content, "dropping frame with unrecognized content type");
            return;
        }
        let sender = self.dispatch.lock().unwrap().get(&frame.content).cloned();
        match sender {
            Some(tx) => {
                let _ = tx.send((from, frame));
            }
            None => debug!(content = ?frame.content, "no handler registered for content type"),
        }
    }

    /// Tears down the link to `remote`: removes it from the link table,
    /// purges routes through it, and notifies listeners observing any
    /// identifier that was reachable via it (`spec.md` §4.3 "Failure").
    pub fn handle_link_failure(&self, remote: Identifier) {
        let had_link = self.links.lock().unwrap().remove(&remote).is_some();
        if !had_link {
            return;
        }
        warn!(remote = %remote, "link torn down");

        let mut affected = self.routes.purge_via(&remote);
        affected.push(remote);
        affected.sort();
        affected.dedup();

        let listeners = self.listeners.lock().unwrap();
        for identity in affected {
            if let Some(subscribers) = listeners.get(&identity) {
                for listener in subscribers {
                    listener.link_failed(identity);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);
    impl Listener for CountingListener {
        fn link_failed(&self, _identity: Identifier) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unregistered_remote_is_a_no_op() {
        let overlay = Overlay::new(Identifier::hash(b"self"));
        overlay.handle_link_failure(Identifier::hash(b"stranger"));
        assert_eq!(overlay.link_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_without_links_completes() {
        let overlay = Overlay::new(Identifier::hash(b"self"));
        let frame = Frame::new(
            FrameType::Broadcast,
            ContentType::Empty,
            *Identifier::hash(b"source").as_bytes(),
            *Identifier::hash(b"dest").as_bytes(),
            Vec::new(),
        );
        overlay.flood(frame, None).await.unwrap();
    }

    #[test]
    fn listener_fires_once_on_link_failure_affecting_it() {
        let overlay = Overlay::new(Identifier::hash(b"self"));
        let count = Arc::new(AtomicUsize::new(0));
        let remote = Identifier::hash(b"neighbour");
        overlay.add_listener(remote, Arc::new(CountingListener(count.clone())));

        // Simulate an established link by inserting its route-learning
        // side effect directly: a link to `remote` is always reachable
        // via itself once established, so a failure on it is reported.
        overlay.routes.learn(remote, remote);
        overlay.links.lock().unwrap().insert(
            remote,
            LinkEntry {
                link: Arc::new(AsyncMutex::new(Box::new(NullLink(remote)))),
                negotiated: NegotiatedMode::Certificate(remote),
            },
        );
        overlay.handle_link_failure(remote);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    struct NullLink(Identifier);
    #[async_trait::async_trait]
    impl Link for NullLink {
        fn remote(&self) -> Identifier {
            self.0
        }
        fn negotiated(&self) -> &NegotiatedMode {
            unimplemented!("not exercised by this test")
        }
        async fn send_frame(&mut self, _frame: &Frame) -> Result<()> {
            Ok(())
        }
        async fn recv_frame(&mut self) -> Result<Frame> {
            unimplemented!("not exercised by this test")
        }
    }
}
