//! The composition root: wires identity, the overlay, the secure
//! channel, pub/sub, and the block store into one running node, the
//! way `arti-client`'s `TorClient` assembles `tor-chanmgr`,
//! `tor-circmgr`, and `tor-dirmgr` (`spec.md` §9 "Global singletons").

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use teapotnet_channel::{CertVerifier, LocalCredentials, RemoteVerifier};
use teapotnet_config::CoreConfig;
use teapotnet_identity::{Identifier, NodeCertificate, NodeKeyPair};
use teapotnet_overlay::{accept_link, connect_link, Overlay, TrackerClient};
use teapotnet_pubsub::{Caller, Publisher, PubsubEngine, Subscriber};
use teapotnet_store::{RetrievalScheduler, Store};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::err::Result;
use crate::identity::load_or_generate;

/// Authorizes any certificate-mode peer.
///
/// This is the default policy: a real deployment with a contact list
/// should supply its own [`CertVerifier`] via
/// [`CoreContext::bootstrap_with_verifier`], the way
/// `tpn::SecureTransport`'s original verifier callback was always
/// application-supplied rather than hardcoded.
struct AcceptAllVerifier;

impl CertVerifier for AcceptAllVerifier {
    fn authorize(&self, _identity: &Identifier) -> bool {
        true
    }
}

/// One running Teapotnet node: identity, overlay, pub/sub, and block
/// store, all sharing the same `self_id`.
pub struct CoreContext {
    keypair: Arc<NodeKeyPair>,
    certificate: NodeCertificate,
    config: CoreConfig,
    overlay: Arc<Overlay>,
    pubsub: Arc<PubsubEngine>,
    store: Arc<Store>,
    scheduler: Arc<RetrievalScheduler>,
    cert_verifier: Arc<dyn CertVerifier>,
    listen_addr: OnceLock<SocketAddr>,
}

impl CoreContext {
    /// Bootstraps a node from `config`, authorizing any peer
    /// certificate (see [`AcceptAllVerifier`]).
    pub async fn bootstrap(config: CoreConfig) -> Result<Arc<Self>> {
        Self::bootstrap_with_verifier(config, Arc::new(AcceptAllVerifier)).await
    }

    /// Bootstraps a node from `config`, authorizing peers through
    /// `cert_verifier` instead of the default accept-all policy.
    pub async fn bootstrap_with_verifier(
        config: CoreConfig,
        cert_verifier: Arc<dyn CertVerifier>,
    ) -> Result<Arc<Self>> {
        let identity = load_or_generate(&config.identity, &config.storage.data_dir)?;
        let keypair = Arc::new(identity.keypair);
        let self_id = keypair.identifier();

        let overlay = Arc::new(Overlay::new(self_id));
        let store = Arc::new(Store::open(&config.storage.cache_dir)?);
        let pubsub = PubsubEngine::spawn(overlay.clone(), self_id);
        let blocks_dir = config.storage.cache_dir.join("blocks");
        let scheduler = RetrievalScheduler::spawn(overlay.clone(), pubsub.clone(), store.clone(), self_id, blocks_dir);

        let context = Arc::new(CoreContext {
            keypair,
            certificate: identity.certificate,
            config,
            overlay,
            pubsub,
            store,
            scheduler,
            cert_verifier,
            listen_addr: OnceLock::new(),
        });

        if !context.config.network.nointerface {
            context.clone().spawn_listener().await?;
        }
        for peer in context.config.network.peers.clone() {
            let context = context.clone();
            tokio::spawn(async move {
                if let Err(err) = context.dial(&peer).await {
                    warn!(peer = %peer, %err, "failed to dial configured peer");
                }
            });
        }
        context.clone().spawn_tracker_bootstrap();

        Ok(context)
    }

    /// This node's own identifier.
    pub fn self_id(&self) -> Identifier {
        self.keypair.identifier()
    }

    /// The overlay router, for components built outside this crate
    /// that still need direct access (tests, alternate front ends).
    pub fn overlay(&self) -> &Arc<Overlay> {
        &self.overlay
    }

    /// The pub/sub engine.
    pub fn pubsub(&self) -> &Arc<PubsubEngine> {
        &self.pubsub
    }

    /// The content-addressed block store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The retrieval scheduler.
    pub fn scheduler(&self) -> &Arc<RetrievalScheduler> {
        &self.scheduler
    }

    /// The address this node's listener is bound to, once started.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.get().copied()
    }

    fn local_credentials(&self) -> LocalCredentials {
        LocalCredentials::Certificate {
            keypair: self.keypair.clone(),
            certificate: self.certificate.clone(),
        }
    }

    fn remote_verifier(&self) -> RemoteVerifier {
        RemoteVerifier::Certificate(self.cert_verifier.clone())
    }

    /// Dials `addr` (`host:port`), runs the handshake, and registers
    /// the resulting link.
    pub async fn dial(&self, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr).await?;
        let outcome = connect_link(&self.overlay, stream, &self.local_credentials(), &self.remote_verifier()).await?;
        debug!(addr, outcome = ?outcome, "dialed peer");
        Ok(())
    }

    async fn spawn_listener(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.network.port)).await?;
        let bound = listener.local_addr()?;
        let _ = self.listen_addr.set(bound);
        info!(addr = %bound, "listening for peer connections");
        tokio::spawn(async move {
            loop {
                let (stream, remote_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                };
                let context = self.clone();
                tokio::spawn(async move {
                    let result = accept_link(
                        &context.overlay,
                        stream,
                        &context.local_credentials(),
                        &context.remote_verifier(),
                    )
                    .await;
                    match result {
                        Ok(outcome) => debug!(remote = %remote_addr, outcome = ?outcome, "accepted peer"),
                        Err(err) => debug!(remote = %remote_addr, %err, "handshake failed"),
                    }
                });
            }
        });
        Ok(())
    }

    fn spawn_tracker_bootstrap(self: Arc<Self>) {
        for tracker_url in self.config.network.trackers.clone() {
            let context = self.clone();
            tokio::spawn(async move {
                let client = TrackerClient::new(tracker_url.clone());
                if let Err(err) = client.announce(&context.self_id(), &[]).await {
                    debug!(tracker = %tracker_url, %err, "tracker announce failed");
                }
                match client.lookup(&context.self_id()).await {
                    Ok(addresses) => {
                        for addr in addresses {
                            let context = context.clone();
                            tokio::spawn(async move {
                                if let Err(err) = context.dial(&addr).await {
                                    debug!(%addr, %err, "failed to dial tracker-discovered address");
                                }
                            });
                        }
                    }
                    Err(err) => debug!(tracker = %tracker_url, %err, "tracker lookup failed"),
                }
            });
        }
    }

    /// Starts (or joins) retrieval of `target`'s `[first, last]` block
    /// range from `sources`, registering `caller` to be notified once
    /// fully decoded (`spec.md` §4.6 "Retrieval scheduler").
    pub async fn fetch(
        &self,
        target: Identifier,
        first: u64,
        last: u64,
        sources: Vec<Identifier>,
        caller: Arc<dyn Caller>,
    ) -> Result<()> {
        self.pubsub.register_caller(target, caller);
        self.scheduler.fetch(target, first, last, sources).await?;
        Ok(())
    }

    /// Makes `target` available for other nodes to fetch, writing
    /// `blocks` into this node's own block file (`spec.md` §4.6: any
    /// node already holding the content can serve Call requests for
    /// it, not only one that downloaded it through a retrieval).
    pub fn seed_content(&self, target: Identifier, blocks: &[Vec<u8>]) -> Result<()> {
        self.scheduler.seed(target, blocks)?;
        Ok(())
    }

    /// Publishes under `prefix` via `publisher` (`spec.md` §4.5).
    pub fn publish(&self, prefix: &str, publisher: Arc<dyn Publisher>) {
        self.pubsub.publish(prefix, publisher);
    }

    /// Subscribes to `prefix`, broadcasting interest across the
    /// overlay (`spec.md` §4.5).
    pub async fn subscribe(&self, prefix: &str, subscriber: Arc<dyn Subscriber>, public_only: bool) -> Result<()> {
        self.pubsub.subscribe(prefix, subscriber, None, public_only).await?;
        Ok(())
    }
}
