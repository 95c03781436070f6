//! [`SecureChannel`]: the post-handshake encrypted channel applications
//! actually talk to, plus the length-prefixing adapter that lets the
//! handshake run its message-oriented protocol over a byte stream.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::credential::{LocalCredentials, NegotiatedMode, RemoteVerifier};
use crate::err::{ChannelError, Result};
use crate::handshake::{run_handshake, MessageTransport, Role};
use crate::record::{RecordCipher, MAX_DATAGRAM_RECORD};

/// Default handshake deadline, per `spec.md` §4.2.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapts a reliable, ordered `AsyncRead + AsyncWrite` carrier into the
/// message-oriented [`MessageTransport`] the handshake speaks, using a
/// 16-bit length prefix per message (handshake messages are always
/// well under 64 KiB).
pub struct StreamTransport<S> {
    inner: S,
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> MessageTransport for StreamTransport<S> {
    async fn send_msg(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let len: u16 = bytes.len().try_into().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "handshake message too large")
        })?;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(bytes).await?;
        self.inner.flush().await
    }

    async fn recv_msg(&mut self) -> std::io::Result<Vec<u8>> {
        let mut len_buf = [0u8; 2];
        self.inner.read_exact(&mut len_buf).await?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// A channel carrier after the handshake completes: either a reliable
/// byte stream, framed one record at a time, or a real datagram
/// carrier (a tunnel pseudo-stream, in practice) where each `send`/
/// `recv` is already a whole record.
#[async_trait]
pub trait RecordTransport: Send {
    /// Sends one whole ciphertext record.
    async fn send_record(&mut self, record: &[u8]) -> std::io::Result<()>;
    /// Receives one whole ciphertext record.
    async fn recv_record(&mut self) -> std::io::Result<Vec<u8>>;
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> RecordTransport for StreamTransport<S> {
    async fn send_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        let len: u32 = record.len().try_into().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "record too large")
        })?;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(record).await?;
        self.inner.flush().await
    }

    async fn recv_record(&mut self) -> std::io::Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// A mutually-authenticated, encrypted channel to a peer.
///
/// Carries application messages only after [`SecureChannel::connect`]
/// or [`SecureChannel::accept`] has completed the full handshake; there
/// is no partially-authenticated state visible to callers.
pub struct SecureChannel<T> {
    transport: T,
    cipher: RecordCipher,
    negotiated: NegotiatedMode,
    max_record_len: usize,
}

impl<T: RecordTransport> SecureChannel<T> {
    /// The credential mode and identifier the handshake actually
    /// agreed on.
    pub fn negotiated(&self) -> &NegotiatedMode {
        &self.negotiated
    }

    /// Bounds outgoing plaintext to `max`, per message. Callers
    /// wrapping a genuine datagram carrier (the tunneler's
    /// pseudo-datagram stream, `spec.md` §4.2/§4.4) should set this to
    /// [`MAX_DATAGRAM_RECORD`]; stream-carried overlay links leave the
    /// protocol's own framing (a `u32` length prefix) as the only
    /// bound.
    pub fn with_max_record_len(mut self, max: usize) -> Self {
        self.max_record_len = max;
        self
    }

    /// Encrypts and sends one application message.
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        if plaintext.len() > self.max_record_len {
            return Err(ChannelError::Protocol("message exceeds the record size bound"));
        }
        let record = self.cipher.encrypt(plaintext)?;
        self.transport.send_record(&record).await?;
        Ok(())
    }

    /// Receives and decrypts one application message.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let record = self.transport.recv_record().await?;
        self.cipher.decrypt(&record)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SecureChannel<StreamTransport<S>> {
    /// Opens a channel as the connecting side over a reliable stream
    /// (a TCP connection, typically), running the handshake with a
    /// 30-second deadline.
    pub async fn connect(
        stream: S,
        local: &LocalCredentials,
        remote: &RemoteVerifier,
    ) -> Result<Self> {
        Self::connect_with_timeout(stream, local, remote, DEFAULT_HANDSHAKE_TIMEOUT).await
    }

    /// As [`Self::connect`], with an explicit handshake deadline.
    pub async fn connect_with_timeout(
        stream: S,
        local: &LocalCredentials,
        remote: &RemoteVerifier,
        deadline: Duration,
    ) -> Result<Self> {
        let mut transport = StreamTransport { inner: stream };
        let (cipher, negotiated) = timeout(
            deadline,
            run_handshake(&mut transport, Role::Client, local, remote),
        )
        .await
        .map_err(|_| ChannelError::Timeout)??;
        Ok(SecureChannel {
            transport,
            cipher,
            negotiated,
            max_record_len: u32::MAX as usize,
        })
    }

    /// Accepts a channel as the listening side over a reliable stream.
    pub async fn accept(
        stream: S,
        local: &LocalCredentials,
        remote: &RemoteVerifier,
    ) -> Result<Self> {
        Self::accept_with_timeout(stream, local, remote, DEFAULT_HANDSHAKE_TIMEOUT).await
    }

    /// As [`Self::accept`], with an explicit handshake deadline.
    pub async fn accept_with_timeout(
        stream: S,
        local: &LocalCredentials,
        remote: &RemoteVerifier,
        deadline: Duration,
    ) -> Result<Self> {
        let mut transport = StreamTransport { inner: stream };
        let (cipher, negotiated) = timeout(
            deadline,
            run_handshake(&mut transport, Role::Server, local, remote),
        )
        .await
        .map_err(|_| ChannelError::Timeout)??;
        Ok(SecureChannel {
            transport,
            cipher,
            negotiated,
            max_record_len: u32::MAX as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn anonymous_stream_channel_round_trips() {
        let (client_io, server_io) = duplex(4096);
        let local = LocalCredentials::Anonymous;
        let remote = RemoteVerifier::Anonymous;
        let local2 = local.clone();
        let remote2 = remote.clone();

        let client = tokio::spawn(async move {
            SecureChannel::connect(client_io, &local, &remote).await
        });
        let server = tokio::spawn(async move {
            SecureChannel::accept(server_io, &local2, &remote2).await
        });

        let mut client_channel = client.await.unwrap().unwrap();
        let mut server_channel = server.await.unwrap().unwrap();

        client_channel.send(b"hello").await.unwrap();
        let received = server_channel.recv().await.unwrap();
        assert_eq!(received, b"hello");
        assert!(!client_channel.negotiated().is_authenticated());
    }

    #[tokio::test]
    async fn oversize_message_rejected_before_encryption() {
        let (client_io, server_io) = duplex(4096);
        let local = LocalCredentials::Anonymous;
        let remote = RemoteVerifier::Anonymous;
        let local2 = local.clone();
        let remote2 = remote.clone();

        let client = tokio::spawn(async move {
            SecureChannel::connect(client_io, &local, &remote).await
        });
        let server = tokio::spawn(async move {
            SecureChannel::accept(server_io, &local2, &remote2).await
        });
        let mut client_channel = client.await.unwrap().unwrap().with_max_record_len(MAX_DATAGRAM_RECORD);
        let _server_channel = server.await.unwrap().unwrap();

        let oversized = vec![0u8; MAX_DATAGRAM_RECORD + 1];
        assert!(client_channel.send(&oversized).await.is_err());
    }
}
