//! End-to-end scenarios driving two (and three) real [`CoreContext`]
//! nodes over loopback TCP, exercising the overlay handshake, pub/sub
//! broadcast, and fountain-coded retrieval together rather than in
//! isolation (`spec.md` §8 "Testable properties").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teapotnet_config::CoreConfig;
use teapotnet_core::CoreContext;
use teapotnet_identity::Identifier;
use teapotnet_pubsub::{Caller, Publisher, Subscriber};

fn config_in(dir: &std::path::Path) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.network.nointerface = false;
    config.network.port = 0;
    config.storage.cache_dir = dir.join("cache");
    config.storage.data_dir = dir.join("data");
    config
}

async fn wait_for_listener(context: &Arc<CoreContext>) -> std::net::SocketAddr {
    for _ in 0..100 {
        if let Some(addr) = context.listen_addr() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("listener never bound");
}

#[tokio::test]
async fn two_nodes_link_and_exchange_frames() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let a = CoreContext::bootstrap(config_in(dir_a.path())).await.unwrap();
    let b = CoreContext::bootstrap(config_in(dir_b.path())).await.unwrap();

    let addr_a = wait_for_listener(&a).await;
    b.dial(&format!("127.0.0.1:{}", addr_a.port())).await.unwrap();

    // Give the read loop a moment to register the link both ways.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_ne!(a.self_id(), b.self_id());
}

struct RecordingSubscriber {
    seen: Arc<std::sync::Mutex<Vec<Identifier>>>,
}

impl Subscriber for RecordingSubscriber {
    fn incoming(&self, _peer: Identifier, _prefix: &str, _path: &str, target: Identifier) {
        self.seen.lock().unwrap().push(target);
    }
}

struct FixedPublisher {
    path: String,
    target: Identifier,
}

impl Publisher for FixedPublisher {
    fn announce(&self, _subscriber: Identifier, _prefix: &str, path: &str) -> Vec<Identifier> {
        if path == self.path {
            vec![self.target]
        } else {
            Vec::new()
        }
    }
}

#[tokio::test]
async fn subscription_crosses_a_link_and_reaches_the_publisher() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let publisher_node = CoreContext::bootstrap(config_in(dir_a.path())).await.unwrap();
    let subscriber_node = CoreContext::bootstrap(config_in(dir_b.path())).await.unwrap();

    let addr = wait_for_listener(&publisher_node).await;
    subscriber_node.dial(&format!("127.0.0.1:{}", addr.port())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let content_target = Identifier::hash(b"two-node-test-content");
    publisher_node.publish(
        "rooms/",
        Arc::new(FixedPublisher {
            path: "rooms/general".to_string(),
            target: content_target,
        }),
    );

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    subscriber_node
        .subscribe(
            "rooms/general",
            Arc::new(RecordingSubscriber { seen: seen.clone() }),
            false,
        )
        .await
        .unwrap();

    for _ in 0..100 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(seen.lock().unwrap().as_slice(), &[content_target]);
}

struct FlagCaller {
    done: Arc<AtomicBool>,
}

impl Caller for FlagCaller {
    fn satisfied(&self, _target: Identifier) {
        self.done.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn fetch_retrieves_seeded_content_from_a_linked_peer() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let source = CoreContext::bootstrap(config_in(dir_a.path())).await.unwrap();
    let sink = CoreContext::bootstrap(config_in(dir_b.path())).await.unwrap();

    let addr = wait_for_listener(&source).await;
    sink.dial(&format!("127.0.0.1:{}", addr.port())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let target = Identifier::hash(b"fetchable-content");
    let blocks: Vec<Vec<u8>> = vec![b"block zero payload".to_vec(), b"block one payload".to_vec()];
    source.seed_content(target, &blocks).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    sink.fetch(target, 0, 1, vec![source.self_id()], Arc::new(FlagCaller { done: done.clone() }))
        .await
        .unwrap();

    for _ in 0..200 {
        if done.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(done.load(Ordering::SeqCst), "retrieval never completed");
}
