//! The handshake protocol: anonymous-DH key agreement, optionally
//! strengthened by a pre-shared key or authenticated by an RSA
//! certificate signature, per the three credential modes in
//! `spec.md` §4.2.

use async_trait::async_trait;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};

use teapotnet_bytes::{Reader, Writer};
use teapotnet_identity::{Identifier, NodeCertificate};

use crate::credential::{LocalCredentials, NegotiatedMode, RemoteVerifier};
use crate::err::{ChannelError, Result};
use crate::record::{RecordCipher, RecordKeys};

/// A message-oriented carrier the handshake runs over: either a
/// length-prefixing adapter around a reliable byte stream, or a real
/// datagram socket / tunnel pseudo-stream that already preserves
/// message boundaries.
#[async_trait]
pub trait MessageTransport: Send {
    /// Sends one whole handshake message.
    async fn send_msg(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    /// Receives one whole handshake message.
    async fn recv_msg(&mut self) -> std::io::Result<Vec<u8>>;
}

const MODE_ANONYMOUS: u8 = 0;
const MODE_PSK: u8 = 1;
const MODE_CERTIFICATE: u8 = 2;

struct Hello {
    mode_tag: u8,
    ephemeral_pub: [u8; 32],
    nonce: [u8; 32],
    peering_name: Option<Identifier>,
    cert_der: Option<Vec<u8>>,
    signature: Option<Vec<u8>>,
}

impl Hello {
    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(self.mode_tag);
        w.write_bytes(&self.ephemeral_pub);
        w.write_bytes(&self.nonce);
        match self.mode_tag {
            MODE_PSK => {
                w.write(&self.peering_name.expect("psk hello carries peering_name"));
            }
            MODE_CERTIFICATE => {
                let cert = self.cert_der.as_deref().unwrap_or_default();
                let _ = w.write_u32_prefixed(cert);
                let sig = self.signature.as_deref().unwrap_or_default();
                let _ = w.write_u16_prefixed(sig);
            }
            _ => {}
        }
        w.into_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::from_slice(bytes);
        let mode_tag = r
            .take_u8()
            .map_err(|_| ChannelError::Protocol("truncated hello"))?;
        let mut ephemeral_pub = [0u8; 32];
        ephemeral_pub.copy_from_slice(
            r.take(32)
                .map_err(|_| ChannelError::Protocol("truncated hello ephemeral key"))?,
        );
        let mut nonce = [0u8; 32];
        nonce.copy_from_slice(
            r.take(32)
                .map_err(|_| ChannelError::Protocol("truncated hello nonce"))?,
        );

        let mut peering_name = None;
        let mut cert_der = None;
        let mut signature = None;
        match mode_tag {
            MODE_ANONYMOUS => {}
            MODE_PSK => {
                let id: Identifier = r
                    .extract()
                    .map_err(|_| ChannelError::Protocol("truncated hello peering name"))?;
                peering_name = Some(id);
            }
            MODE_CERTIFICATE => {
                let cert = r
                    .take_u32_prefixed()
                    .map_err(|_| ChannelError::Protocol("truncated hello certificate"))?;
                let sig = r
                    .take_u16_prefixed()
                    .map_err(|_| ChannelError::Protocol("truncated hello signature"))?;
                cert_der = Some(cert.to_vec());
                signature = Some(sig.to_vec());
            }
            _ => return Err(ChannelError::Protocol("unknown credential mode tag")),
        }
        r.finish()
            .map_err(|_| ChannelError::Protocol("extra bytes in hello"))?;

        Ok(Hello {
            mode_tag,
            ephemeral_pub,
            nonce,
            peering_name,
            cert_der,
            signature,
        })
    }
}

fn mode_tag_of(creds: &LocalCredentials) -> u8 {
    match creds {
        LocalCredentials::Anonymous => MODE_ANONYMOUS,
        LocalCredentials::PreSharedKey { .. } => MODE_PSK,
        LocalCredentials::Certificate { .. } => MODE_CERTIFICATE,
    }
}

fn build_hello(creds: &LocalCredentials, ephemeral_pub: [u8; 32], nonce: [u8; 32]) -> Hello {
    let mode_tag = mode_tag_of(creds);
    match creds {
        LocalCredentials::Anonymous => Hello {
            mode_tag,
            ephemeral_pub,
            nonce,
            peering_name: None,
            cert_der: None,
            signature: None,
        },
        LocalCredentials::PreSharedKey { peering_name, .. } => Hello {
            mode_tag,
            ephemeral_pub,
            nonce,
            peering_name: Some(*peering_name),
            cert_der: None,
            signature: None,
        },
        LocalCredentials::Certificate {
            keypair,
            certificate,
        } => {
            let cert_der = certificate.der().to_vec();
            let transcript = signed_transcript(mode_tag, &ephemeral_pub, &nonce, &cert_der);
            let signature = sign_transcript(keypair.private_key(), &transcript);
            Hello {
                mode_tag,
                ephemeral_pub,
                nonce,
                peering_name: None,
                cert_der: Some(cert_der),
                signature: Some(signature),
            }
        }
    }
}

fn signed_transcript(mode_tag: u8, ephemeral_pub: &[u8; 32], nonce: &[u8; 32], cert_der: &[u8]) -> Vec<u8> {
    let mut t = Vec::with_capacity(1 + 32 + 32 + cert_der.len());
    t.push(mode_tag);
    t.extend_from_slice(ephemeral_pub);
    t.extend_from_slice(nonce);
    t.extend_from_slice(cert_der);
    t
}

fn sign_transcript(private: &rsa::RsaPrivateKey, transcript: &[u8]) -> Vec<u8> {
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::RandomizedSigner;
    let signing_key = SigningKey::<Sha256>::new(private.clone());
    let mut rng = rand::rngs::OsRng;
    let sig = signing_key.sign_with_rng(&mut rng, transcript);
    use rsa::signature::SignatureEncoding;
    sig.to_vec()
}

fn verify_cert_hello(hello: &Hello, verifier: &RemoteVerifier) -> Result<Identifier> {
    let cert_der = hello
        .cert_der
        .clone()
        .ok_or(ChannelError::Protocol("certificate mode hello missing certificate"))?;
    let signature = hello
        .signature
        .clone()
        .ok_or(ChannelError::Protocol("certificate mode hello missing signature"))?;

    let cert = NodeCertificate::from_der(cert_der.clone());
    let identity = cert
        .spki_identifier()
        .map_err(|_| ChannelError::Protocol("malformed certificate"))?;

    if !cert
        .verify_binds(identity)
        .map_err(|_| ChannelError::AuthFailed("malformed certificate"))?
    {
        return Err(ChannelError::AuthFailed("certificate does not bind its own identity"));
    }

    let transcript = signed_transcript(hello.mode_tag, &hello.ephemeral_pub, &hello.nonce, &cert_der);
    let public = cert
        .public_key()
        .map_err(|_| ChannelError::Protocol("malformed certificate public key"))?;
    verify_rsa_signature(&public, &transcript, &signature)?;

    match verifier {
        RemoteVerifier::Certificate(cert_verifier) => {
            if !cert_verifier.authorize(&identity) {
                return Err(ChannelError::AuthFailed("peer identity not authorized"));
            }
        }
        _ => return Err(ChannelError::Protocol("mode mismatch: expected certificate verifier")),
    }

    Ok(identity)
}

fn verify_rsa_signature(public: &rsa::RsaPublicKey, transcript: &[u8], signature: &[u8]) -> Result<()> {
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
    let sig =
        Signature::try_from(signature).map_err(|_| ChannelError::AuthFailed("malformed signature"))?;
    verifying_key
        .verify(transcript, &sig)
        .map_err(|_| ChannelError::AuthFailed("signature verification failed"))
}

/// Which side of the handshake this endpoint plays. The wire protocol
/// is symmetric in shape (both sides send one [`Hello`] then one
/// Finished message) but key derivation labels each direction, so the
/// role must be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that opened the underlying carrier.
    Client,
    /// The side that accepted the underlying carrier.
    Server,
}

/// Runs the handshake to completion over `transport`, returning the
/// negotiated [`RecordCipher`] and the mode that was agreed on.
pub async fn run_handshake(
    transport: &mut dyn MessageTransport,
    role: Role,
    local: &LocalCredentials,
    remote: &RemoteVerifier,
) -> Result<(RecordCipher, NegotiatedMode)> {
    let mut rng = rand::rngs::OsRng;
    let ephemeral_secret = EphemeralSecret::random_from_rng(rng);
    let ephemeral_pub = X25519Public::from(&ephemeral_secret);
    let mut nonce = [0u8; 32];
    rng.fill_bytes(&mut nonce);

    let own_hello = build_hello(local, ephemeral_pub.to_bytes(), nonce);

    let (own_bytes, peer_bytes) = match role {
        Role::Client => {
            let own_bytes = own_hello.encode();
            transport.send_msg(&own_bytes).await?;
            let peer_bytes = transport.recv_msg().await?;
            (own_bytes, peer_bytes)
        }
        Role::Server => {
            let peer_bytes = transport.recv_msg().await?;
            let own_bytes = own_hello.encode();
            transport.send_msg(&own_bytes).await?;
            (own_bytes, peer_bytes)
        }
    };

    let peer_hello = Hello::decode(&peer_bytes)?;

    let (identity, psk_key) = authenticate_peer(&peer_hello, local, remote)?;

    let peer_ephemeral = X25519Public::from(peer_hello.ephemeral_pub);
    let shared = ephemeral_secret.diffie_hellman(&peer_ephemeral);

    let salt = psk_key.as_deref();
    let hk = Hkdf::<Sha256>::new(salt, shared.as_bytes());

    let (client_bytes, server_bytes) = match role {
        Role::Client => (&own_bytes, &peer_bytes),
        Role::Server => (&peer_bytes, &own_bytes),
    };
    let mut transcript_hasher = Sha256::new();
    transcript_hasher.update(client_bytes);
    transcript_hasher.update(server_bytes);
    let transcript_hash = transcript_hasher.finalize();

    let mut okm = [0u8; 128];
    hk.expand(&transcript_hash, &mut okm)
        .map_err(|_| ChannelError::Protocol("key derivation failed"))?;
    let client_finished_key = &okm[0..32];
    let server_finished_key = &okm[32..64];
    let client_to_server_key = &okm[64..96];
    let server_to_client_key = &okm[96..128];

    let (own_finished_key, peer_finished_key) = match role {
        Role::Client => (client_finished_key, server_finished_key),
        Role::Server => (server_finished_key, client_finished_key),
    };

    let own_finished = compute_finished_mac(own_finished_key, &transcript_hash);
    let peer_finished_expected = compute_finished_mac(peer_finished_key, &transcript_hash);

    let peer_finished = match role {
        Role::Client => {
            transport.send_msg(&own_finished).await?;
            transport.recv_msg().await?
        }
        Role::Server => {
            let received = transport.recv_msg().await?;
            transport.send_msg(&own_finished).await?;
            received
        }
    };

    if peer_finished.ct_eq(&peer_finished_expected).unwrap_u8() != 1 {
        return Err(ChannelError::AuthFailed("finished MAC mismatch"));
    }

    let (send_key, recv_key) = match role {
        Role::Client => (client_to_server_key, server_to_client_key),
        Role::Server => (server_to_client_key, client_to_server_key),
    };
    let mut send_arr = [0u8; 32];
    let mut recv_arr = [0u8; 32];
    send_arr.copy_from_slice(send_key);
    recv_arr.copy_from_slice(recv_key);

    let cipher = RecordCipher::new(RecordKeys {
        send_key: send_arr,
        recv_key: recv_arr,
    });

    let negotiated = match peer_hello.mode_tag {
        MODE_ANONYMOUS => NegotiatedMode::Anonymous { claimed: identity },
        MODE_PSK => NegotiatedMode::PreSharedKey(identity),
        MODE_CERTIFICATE => NegotiatedMode::Certificate(identity),
        _ => unreachable!("validated in Hello::decode"),
    };

    Ok((cipher, negotiated))
}

fn compute_finished_mac(key: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(transcript_hash);
    mac.finalize().into_bytes().to_vec()
}

/// Authenticates the peer's [`Hello`] against our local mode and the
/// caller-supplied [`RemoteVerifier`], returning the peer's identifier
/// (verified, for PSK/Certificate; a TOFU hint, for Anonymous) and the
/// PSK bytes to mix into key derivation, if any.
fn authenticate_peer(
    peer_hello: &Hello,
    local: &LocalCredentials,
    remote: &RemoteVerifier,
) -> Result<(Identifier, Option<Vec<u8>>)> {
    if mode_tag_of(local) != peer_hello.mode_tag {
        return Err(ChannelError::Protocol("credential mode mismatch"));
    }

    match peer_hello.mode_tag {
        MODE_ANONYMOUS => {
            let claimed = Identifier::hash(&peer_hello.ephemeral_pub);
            Ok((claimed, None))
        }
        MODE_PSK => {
            let peering_name = peer_hello
                .peering_name
                .ok_or(ChannelError::Protocol("psk hello missing peering name"))?;
            let lookup = match remote {
                RemoteVerifier::PreSharedKey(lookup) => lookup,
                _ => return Err(ChannelError::Protocol("mode mismatch: expected psk verifier")),
            };
            let key = lookup
                .lookup(&peering_name)
                .ok_or(ChannelError::AuthFailed("no pre-shared key for peering name"))?;
            Ok((peering_name, Some(key)))
        }
        MODE_CERTIFICATE => {
            let identity = verify_cert_hello(peer_hello, remote)?;
            Ok((identity, None))
        }
        _ => Err(ChannelError::Protocol("unknown credential mode tag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CertVerifier;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    struct ChannelPipe {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    #[async_trait]
    impl MessageTransport for ChannelPipe {
        async fn send_msg(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.tx
                .send(bytes.to_vec())
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        async fn recv_msg(&mut self) -> std::io::Result<Vec<u8>> {
            self.rx
                .recv()
                .await
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn pipe_pair() -> (ChannelPipe, ChannelPipe) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            ChannelPipe { tx: a_tx, rx: a_rx },
            ChannelPipe { tx: b_tx, rx: b_rx },
        )
    }

    struct StaticPsk(HashMap<Identifier, Vec<u8>>);
    impl crate::credential::PskLookup for StaticPsk {
        fn lookup(&self, peering_name: &Identifier) -> Option<Vec<u8>> {
            self.0.get(peering_name).cloned()
        }
    }

    struct AllowAll(Mutex<Vec<Identifier>>);
    impl CertVerifier for AllowAll {
        fn authorize(&self, identity: &Identifier) -> bool {
            self.0.lock().unwrap().push(*identity);
            true
        }
    }

    #[tokio::test]
    async fn anonymous_handshake_agrees_on_keys() {
        let (mut a, mut b) = pipe_pair();
        let local = LocalCredentials::Anonymous;
        let remote = RemoteVerifier::Anonymous;
        let local2 = local.clone();
        let remote2 = remote.clone();

        let client = tokio::spawn(async move {
            run_handshake(&mut a, Role::Client, &local, &remote).await
        });
        let server = tokio::spawn(async move {
            run_handshake(&mut b, Role::Server, &local2, &remote2).await
        });

        let (mut c_cipher, c_mode) = client.await.unwrap().unwrap();
        let (mut s_cipher, s_mode) = server.await.unwrap().unwrap();
        assert!(!c_mode.is_authenticated());
        assert!(!s_mode.is_authenticated());

        let record = c_cipher.encrypt(b"ping").unwrap();
        assert_eq!(s_cipher.decrypt(&record).unwrap(), b"ping");
    }

    #[tokio::test]
    async fn psk_handshake_fails_with_wrong_key() {
        let (mut a, mut b) = pipe_pair();
        let peering_name = Identifier::hash(b"peer-name");

        let client_creds = LocalCredentials::PreSharedKey {
            peering_name,
            key: b"right-key".to_vec(),
        };
        let server_creds = LocalCredentials::PreSharedKey {
            peering_name,
            key: b"right-key".to_vec(),
        };

        let mut store = HashMap::new();
        store.insert(peering_name, b"wrong-key".to_vec());
        let server_verifier = RemoteVerifier::PreSharedKey(Arc::new(StaticPsk(store)));
        let client_verifier = RemoteVerifier::PreSharedKey(Arc::new(StaticPsk({
            let mut m = HashMap::new();
            m.insert(peering_name, b"right-key".to_vec());
            m
        })));

        let client = tokio::spawn(async move {
            run_handshake(&mut a, Role::Client, &client_creds, &client_verifier).await
        });
        let server = tokio::spawn(async move {
            run_handshake(&mut b, Role::Server, &server_creds, &server_verifier).await
        });

        let client_result = client.await.unwrap();
        let server_result = server.await.unwrap();
        assert!(client_result.is_err() || server_result.is_err());
    }
}
