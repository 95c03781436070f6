//! Loads a node's key material from the paths named in a
//! [`teapotnet_config::IdentityConfig`], generating and persisting a
//! fresh keypair the first time a node is started
//! (`spec.md` §6 "Node certificate file").

use std::path::Path;

use teapotnet_config::IdentityConfig;
use teapotnet_identity::{NodeCertificate, NodeKeyPair};

use crate::err::Result;

/// The key and certificate a node presents during the certificate-mode
/// handshake.
pub struct NodeIdentity {
    /// The keypair, used to sign the handshake transcript.
    pub keypair: NodeKeyPair,
    /// The self-signed certificate bound to it.
    pub certificate: NodeCertificate,
}

/// Loads the keypair and certificate at `config`'s paths, or generates
/// and writes fresh ones if either file is absent.
pub fn load_or_generate(config: &IdentityConfig, default_dir: &Path) -> Result<NodeIdentity> {
    let key_path = config
        .key_path
        .clone()
        .unwrap_or_else(|| default_dir.join("node_key.pem"));
    let cert_path = config
        .cert_path
        .clone()
        .unwrap_or_else(|| default_dir.join("node_cert.pem"));

    if key_path.exists() && cert_path.exists() {
        let key_pem = std::fs::read_to_string(&key_path)?;
        let cert_pem = std::fs::read_to_string(&cert_path)?;
        let keypair = NodeKeyPair::from_pkcs8_pem(&key_pem)?;
        let certificate = NodeCertificate::from_pem(&cert_pem)?;
        return Ok(NodeIdentity { keypair, certificate });
    }

    std::fs::create_dir_all(default_dir)?;
    let keypair = NodeKeyPair::generate()?;
    let certificate = keypair.self_signed_certificate()?;
    std::fs::write(&key_path, keypair.to_pkcs8_pem()?)?;
    std::fs::write(&cert_path, certificate.to_pem()?)?;
    Ok(NodeIdentity { keypair, certificate })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_then_reloads_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let config = IdentityConfig { key_path: None, cert_path: None };

        let first = load_or_generate(&config, dir.path()).unwrap();
        let second = load_or_generate(&config, dir.path()).unwrap();

        assert_eq!(first.keypair.identifier(), second.keypair.identifier());
        assert_eq!(first.certificate.der(), second.certificate.der());
    }
}
