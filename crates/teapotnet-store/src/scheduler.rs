//! The parallel retrieval scheduler (`spec.md` §4.6 "Retrieval
//! scheduler"): for each digest a caller wants, requests combinations
//! from up to four sources, feeds them to a [`Sink`], and serves
//! combinations for digests this node has content for.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use teapotnet_bytes::frame::{ContentType, Frame, FrameType};
use teapotnet_bytes::{Reader, Writer};
use teapotnet_identity::Identifier;
use teapotnet_overlay::Overlay;
use teapotnet_pubsub::PubsubEngine;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::block_file::BlockFile;
use crate::combination::BLOCK_SIZE;
use crate::err::Result;
use crate::generate;
use crate::sink::Sink;
use crate::store::Store;
use crate::wire::{CallMessage, CancelMessage, DataMessage};

/// Default per-source token budget (`spec.md` §4.6 "Retrieval
/// scheduler" step 1).
pub const DEFAULT_TOKEN_BUDGET: u32 = 64;

/// Sources are capped at this many per retrieval.
pub const MAX_SOURCES: usize = 4;

/// No progress within this window drops the slowest source
/// (`spec.md` §4.6 "Retrieval scheduler" step 4).
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Starting backoff applied to a link that sent an adversarial Data
/// message, doubled on each further offense up to [`MAX_BACKOFF`].
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Backoff ceiling (`spec.md` §4.6 "Failure semantics": "up to 10
/// min").
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);

struct SourceState {
    peer: Identifier,
    tokens_remaining: u32,
    last_seen: Instant,
}

struct Retrieval {
    first: u64,
    last: u64,
    sink: Mutex<Sink>,
    file: Mutex<BlockFile>,
    sources: Mutex<Vec<SourceState>>,
    last_progress: Mutex<Instant>,
    done: AtomicBool,
}

struct LinkBackoff {
    until: Instant,
    next_delay: Duration,
}

/// Coordinates fetching one or more targets' block ranges from
/// remote sources, and answers Call requests from peers fetching
/// content this node has.
pub struct RetrievalScheduler {
    overlay: Arc<Overlay>,
    pubsub: Arc<PubsubEngine>,
    store: Arc<Store>,
    self_id: Identifier,
    blocks_dir: PathBuf,
    active: Mutex<HashMap<Identifier, Arc<Retrieval>>>,
    backoff: Mutex<HashMap<Identifier, LinkBackoff>>,
}

impl RetrievalScheduler {
    /// Spawns the Call/Data/Cancel dispatch loops and returns the
    /// running scheduler. `blocks_dir` holds one backing file per
    /// target digest this node is either downloading or serving.
    pub fn spawn(
        overlay: Arc<Overlay>,
        pubsub: Arc<PubsubEngine>,
        store: Arc<Store>,
        self_id: Identifier,
        blocks_dir: PathBuf,
    ) -> Arc<Self> {
        let call_rx = overlay.register_content(ContentType::Call);
        let data_rx = overlay.register_content(ContentType::Data);
        let cancel_rx = overlay.register_content(ContentType::Cancel);

        let scheduler = Arc::new(RetrievalScheduler {
            overlay,
            pubsub,
            store,
            self_id,
            blocks_dir,
            active: Mutex::new(HashMap::new()),
            backoff: Mutex::new(HashMap::new()),
        });

        tokio::spawn(run_call_dispatch(scheduler.clone(), call_rx));
        tokio::spawn(run_data_dispatch(scheduler.clone(), data_rx));
        tokio::spawn(run_cancel_dispatch(scheduler.clone(), cancel_rx));
        scheduler
    }

    fn block_file_path(&self, target: &Identifier) -> PathBuf {
        self.blocks_dir.join(format!("{}.blk", target.to_hex()))
    }

    fn open_block_file(&self, target: &Identifier) -> Result<BlockFile> {
        BlockFile::open(self.block_file_path(target))
    }

    /// Writes `blocks` (in order, starting at index 0) into `target`'s
    /// block file and registers each with the content store, making
    /// this node a source that can answer Call requests for it
    /// without ever having run a retrieval itself.
    pub fn seed(&self, target: Identifier, blocks: &[Vec<u8>]) -> Result<()> {
        let mut file = self.open_block_file(&target)?;
        for (index, content) in blocks.iter().enumerate() {
            file.write_block(index as u64, content)?;
            let digest = Identifier::hash(content);
            self.store.notify_block(
                digest,
                self.block_file_path(&target),
                index as u64 * BLOCK_SIZE as u64,
                content.len() as u32,
            );
        }
        Ok(())
    }

    fn is_backed_off(&self, peer: &Identifier) -> bool {
        self.backoff
            .lock()
            .unwrap()
            .get(peer)
            .map(|b| Instant::now() < b.until)
            .unwrap_or(false)
    }

    fn penalize(&self, peer: Identifier) {
        let mut backoff = self.backoff.lock().unwrap();
        let delay = backoff
            .get(&peer)
            .map(|b| (b.next_delay * 2).min(MAX_BACKOFF))
            .unwrap_or(INITIAL_BACKOFF);
        warn!(peer = %peer, delay = ?delay, "penalizing link for adversarial data message");
        backoff.insert(
            peer,
            LinkBackoff {
                until: Instant::now() + delay,
                next_delay: delay,
            },
        );
    }

    /// Starts fetching `target`'s `[first, last]` block range from
    /// `initial_sources`, ordered most-recently-seen first.
    pub async fn fetch(
        self: &Arc<Self>,
        target: Identifier,
        first: u64,
        last: u64,
        initial_sources: Vec<Identifier>,
    ) -> Result<()> {
        if self.active.lock().unwrap().contains_key(&target) {
            // Already being retrieved; additional sources arrive
            // through `add_source`.
            return Ok(());
        }

        let file = self.open_block_file(&target)?;
        let retrieval = Arc::new(Retrieval {
            first,
            last,
            sink: Mutex::new(Sink::new()),
            file: Mutex::new(file),
            sources: Mutex::new(Vec::new()),
            last_progress: Mutex::new(Instant::now()),
            done: AtomicBool::new(false),
        });
        self.active.lock().unwrap().insert(target, retrieval.clone());

        for peer in initial_sources.into_iter().take(MAX_SOURCES) {
            self.add_source(target, peer).await;
        }

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.watch_stall(target).await });
        Ok(())
    }

    /// Adds `peer` as a candidate source for an in-flight retrieval
    /// of `target`, sending it an initial Call. This is how a
    /// long-lived pub/sub subscription's later announcements feed the
    /// scheduler a replacement source after a stall drops one
    /// (`spec.md` §4.6 step 4's "solicited via a fresh pub/sub
    /// round").
    pub async fn add_source(self: &Arc<Self>, target: Identifier, peer: Identifier) {
        if self.is_backed_off(&peer) {
            return;
        }
        let Some(retrieval) = self.active.lock().unwrap().get(&target).cloned() else {
            return;
        };
        {
            let mut sources = retrieval.sources.lock().unwrap();
            if sources.len() >= MAX_SOURCES || sources.iter().any(|s| s.peer == peer) {
                return;
            }
            sources.push(SourceState {
                peer,
                tokens_remaining: DEFAULT_TOKEN_BUDGET,
                last_seen: Instant::now(),
            });
        }
        self.send_call(peer, target, retrieval.first, retrieval.last, DEFAULT_TOKEN_BUDGET).await;
    }

    async fn send_call(&self, peer: Identifier, target: Identifier, first: u64, last: u64, budget: u32) {
        let mut w = Writer::new();
        w.write(&CallMessage { target, first, last, budget });
        let frame = Frame::new(
            FrameType::Forward,
            ContentType::Call,
            *self.self_id.as_bytes(),
            *peer.as_bytes(),
            w.into_vec(),
        );
        if let Err(err) = self.overlay.send_toward(peer, frame).await {
            debug!(%err, peer = %peer, "failed to send call");
        }
    }

    async fn send_cancel(&self, peer: Identifier, target: Identifier) {
        let mut w = Writer::new();
        w.write(&CancelMessage { target });
        let frame = Frame::new(
            FrameType::Forward,
            ContentType::Cancel,
            *self.self_id.as_bytes(),
            *peer.as_bytes(),
            w.into_vec(),
        );
        let _ = self.overlay.send_toward(peer, frame).await;
    }

    async fn watch_stall(self: Arc<Self>, target: Identifier) {
        loop {
            tokio::time::sleep(STALL_TIMEOUT).await;
            let Some(retrieval) = self.active.lock().unwrap().get(&target).cloned() else {
                return;
            };
            if retrieval.done.load(Ordering::SeqCst) {
                return;
            }
            let stalled = retrieval.last_progress.lock().unwrap().elapsed() >= STALL_TIMEOUT;
            if !stalled {
                continue;
            }
            let slowest = {
                let mut sources = retrieval.sources.lock().unwrap();
                if sources.len() <= 1 {
                    None
                } else {
                    let idx = sources
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, s)| s.last_seen)
                        .map(|(i, _)| i);
                    idx.map(|i| sources.remove(i).peer)
                }
            };
            if let Some(peer) = slowest {
                debug!(target = %target, peer = %peer, "dropping stalled source");
                self.send_cancel(peer, target).await;
            }
        }
    }

    fn complete(&self, target: Identifier) {
        let Some(retrieval) = self.active.lock().unwrap().remove(&target) else {
            return;
        };
        retrieval.done.store(true, Ordering::SeqCst);
        let sources: Vec<Identifier> = retrieval.sources.lock().unwrap().iter().map(|s| s.peer).collect();
        let overlay = self.overlay.clone();
        tokio::spawn(async move {
            for peer in sources {
                let mut w = Writer::new();
                w.write(&CancelMessage { target });
                let frame = Frame::new(
                    FrameType::Forward,
                    ContentType::Cancel,
                    *target.as_bytes(),
                    *peer.as_bytes(),
                    w.into_vec(),
                );
                let _ = overlay.send_toward(peer, frame).await;
            }
        });
        self.pubsub.satisfy(target);
    }
}

async fn run_call_dispatch(scheduler: Arc<RetrievalScheduler>, mut rx: mpsc::UnboundedReceiver<(Identifier, Frame)>) {
    while let Some((_from, frame)) = rx.recv().await {
        let peer = Identifier::from_digest(frame.source);
        if scheduler.is_backed_off(&peer) {
            continue;
        }
        let mut r = Reader::from_slice(&frame.payload);
        let msg: CallMessage = match r.extract() {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "malformed call message");
                continue;
            }
        };
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let file = match scheduler.open_block_file(&msg.target) {
                Ok(f) => f,
                Err(err) => {
                    debug!(%err, "could not open block file to serve call");
                    return;
                }
            };
            let combinations = match generate::generate(&file, msg.first, msg.last, msg.budget as usize) {
                Ok(c) => c,
                Err(err) => {
                    debug!(%err, "failed generating combinations");
                    return;
                }
            };
            for combination in combinations {
                let mut w = Writer::new();
                w.write(&DataMessage { target: msg.target, combination });
                let frame = Frame::new(
                    FrameType::Forward,
                    ContentType::Data,
                    *scheduler.self_id.as_bytes(),
                    *peer.as_bytes(),
                    w.into_vec(),
                );
                if scheduler.overlay.send_toward(peer, frame).await.is_err() {
                    break;
                }
            }
        });
    }
}

async fn run_data_dispatch(scheduler: Arc<RetrievalScheduler>, mut rx: mpsc::UnboundedReceiver<(Identifier, Frame)>) {
    while let Some((_from, frame)) = rx.recv().await {
        let peer = Identifier::from_digest(frame.source);
        if scheduler.is_backed_off(&peer) {
            continue;
        }
        let mut r = Reader::from_slice(&frame.payload);
        let msg: DataMessage = match r.extract() {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "malformed data message");
                continue;
            }
        };

        // Open Question: a Data message whose digest is no longer an
        // active retrieval (the caller's interest already resolved or
        // was never registered) is dropped silently rather than
        // buffered, since there is nothing left to feed it to.
        let Some(retrieval) = scheduler.active.lock().unwrap().get(&msg.target).cloned() else {
            continue;
        };

        let leading = msg.combination.first_component();
        if msg.combination.components_count() > 0 && (leading < retrieval.first || leading > retrieval.last) {
            scheduler.penalize(peer);
            continue;
        }

        {
            let mut sources = retrieval.sources.lock().unwrap();
            if let Some(source) = sources.iter_mut().find(|s| s.peer == peer) {
                source.last_seen = Instant::now();
                source.tokens_remaining = source.tokens_remaining.saturating_sub(1);
            }
        }

        let decoded = retrieval.sink.lock().unwrap().solve(msg.combination);
        if !decoded.is_empty() {
            *retrieval.last_progress.lock().unwrap() = Instant::now();
        }
        for (index, content) in decoded {
            let mut file = retrieval.file.lock().unwrap();
            if let Err(err) = file.write_block(index, &content) {
                debug!(%err, "failed to write decoded block");
                continue;
            }
            drop(file);
            let digest = Identifier::hash(&content);
            let path = scheduler.block_file_path(&msg.target);
            scheduler
                .store
                .notify_block(digest, path, index * BLOCK_SIZE as u64, content.len() as u32);
        }

        let needs_renewal = {
            let sources = retrieval.sources.lock().unwrap();
            sources.iter().find(|s| s.peer == peer).map(|s| s.tokens_remaining == 0)
        };
        if needs_renewal == Some(true) {
            scheduler.send_call(peer, msg.target, retrieval.first, retrieval.last, DEFAULT_TOKEN_BUDGET).await;
            if let Some(source) = retrieval.sources.lock().unwrap().iter_mut().find(|s| s.peer == peer) {
                source.tokens_remaining = DEFAULT_TOKEN_BUDGET;
            }
        }

        if retrieval.sink.lock().unwrap().next_decoded() > retrieval.last {
            scheduler.complete(msg.target);
        }
    }
}

async fn run_cancel_dispatch(_scheduler: Arc<RetrievalScheduler>, mut rx: mpsc::UnboundedReceiver<(Identifier, Frame)>) {
    while let Some((_from, frame)) = rx.recv().await {
        let mut r = Reader::from_slice(&frame.payload);
        match r.extract::<CancelMessage>() {
            Ok(msg) => debug!(target = %msg.target, "peer cancelled interest"),
            Err(err) => debug!(%err, "malformed cancel message"),
        }
        // Our Call handling is request/response rather than a
        // long-lived push stream, so there is no outstanding send
        // loop to tear down here; the peer simply stops receiving
        // further Data once it stops issuing Call renewals.
    }
}
