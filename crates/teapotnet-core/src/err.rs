//! Error type for the composition root.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors raised while bootstrapping or operating a [`crate::CoreContext`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Loading or generating node key material failed.
    #[error("node identity error: {0}")]
    Identity(#[from] teapotnet_identity::KeyError),
    /// The configuration file could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] teapotnet_config::ConfigError),
    /// The overlay router rejected or failed an operation.
    #[error("overlay error: {0}")]
    Overlay(#[from] teapotnet_overlay::OverlayError),
    /// The block store or retrieval scheduler failed an operation.
    #[error("store error: {0}")]
    Store(#[from] teapotnet_store::StoreError),
    /// A pub/sub registration or dispatch failed.
    #[error("pubsub error: {0}")]
    Pubsub(#[from] teapotnet_pubsub::PubsubError),
    /// A secure-channel handshake failed.
    #[error("channel error: {0}")]
    Channel(#[from] teapotnet_channel::ChannelError),
    /// Reading or writing identity files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HasKind for CoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Identity(_) => ErrorKind::AuthFailed,
            CoreError::Config(e) => e.kind(),
            CoreError::Overlay(e) => e.kind(),
            CoreError::Store(e) => e.kind(),
            CoreError::Pubsub(e) => e.kind(),
            CoreError::Channel(e) => e.kind(),
            CoreError::Io(e) => HasKind::kind(e),
        }
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, CoreError>;
