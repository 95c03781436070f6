//! Node key material: an RSA keypair, the [`Identifier`] derived from
//! it, and the self-signed certificate binding the two
//! (`spec.md` §3 "Node", §6 "Node certificate file").

use std::str::FromStr;

use der::asn1::PrintableStringRef;
use der::Decode;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::Verifier;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::Encode;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::Identifier;

/// Recommended RSA modulus size for freshly generated node keys.
pub const KEY_BITS: usize = 2048;

/// Errors raised while generating, loading, or verifying node key
/// material.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// RSA key generation or use failed.
    #[error("RSA key error: {0}")]
    Rsa(#[from] rsa::Error),
    /// PKCS#8 encoding/decoding of a key failed.
    #[error("PKCS#8 error: {0}")]
    Pkcs8(String),
    /// X.509 certificate construction or parsing failed.
    #[error("certificate error: {0}")]
    Cert(String),
    /// The certificate's Subject CN did not match the expected
    /// identity, or its self-signature did not verify.
    #[error("certificate does not authenticate the claimed identity")]
    IdentityMismatch,
}

/// A node's RSA keypair.
///
/// The node's [`Identifier`] is `SHA-256` of the DER-encoded
/// `SubjectPublicKeyInfo`, per `spec.md` §3 ("identifier (derived from
/// its public signing key)").
#[derive(Clone)]
pub struct NodeKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    identifier: Identifier,
}

impl NodeKeyPair {
    /// Generates a fresh keypair using the operating system CSPRNG.
    pub fn generate() -> Result<Self, KeyError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        let identifier = identifier_of(&public)?;
        Ok(NodeKeyPair {
            private,
            public,
            identifier,
        })
    }

    /// Loads a keypair from a PEM-encoded PKCS#8 private key, as read
    /// from the node certificate file (`spec.md` §6).
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, KeyError> {
        let private =
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        let identifier = identifier_of(&public)?;
        Ok(NodeKeyPair {
            private,
            public,
            identifier,
        })
    }

    /// The public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// The private key, for handshake signing.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The identity digest derived from the public key.
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    /// Generates the self-signed [`NodeCertificate`] for this keypair.
    pub fn self_signed_certificate(&self) -> Result<NodeCertificate, KeyError> {
        NodeCertificate::generate(self)
    }

    /// Encodes the private key as a PEM-wrapped PKCS#8 document, the
    /// form the node certificate file's key section takes
    /// (`spec.md` §6).
    pub fn to_pkcs8_pem(&self) -> Result<String, KeyError> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| KeyError::Pkcs8(e.to_string()))
    }
}

fn identifier_of(public: &RsaPublicKey) -> Result<Identifier, KeyError> {
    let spki = public
        .to_public_key_der()
        .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
    Ok(Identifier::hash(spki.as_bytes()))
}

/// A self-signed X.509 certificate whose Subject CN is the hex
/// encoding of the holder's [`Identifier`] (`spec.md` §6).
///
/// The overlay and secure-channel layers treat this as an opaque blob
/// to exchange during the certificate-mode handshake; only
/// [`NodeCertificate::verify_binds`] is load-bearing for security.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeCertificate {
    der: Vec<u8>,
}

impl NodeCertificate {
    /// Builds the self-signed certificate for `keypair`.
    fn generate(keypair: &NodeKeyPair) -> Result<Self, KeyError> {
        let subject_cn = keypair.identifier.to_hex();
        let subject = Name::from_str(&format!("CN={subject_cn}"))
            .map_err(|e| KeyError::Cert(e.to_string()))?;

        let serial = SerialNumber::from(1u32);
        let validity =
            Validity::from_now(std::time::Duration::from_secs(20 * 365 * 24 * 3600))
                .map_err(|e| KeyError::Cert(e.to_string()))?;

        let signing_key = SigningKey::<Sha256>::new(keypair.private.clone());
        let spki = keypair
            .public
            .to_public_key_der()
            .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        let spki_info = x509_cert::spki::SubjectPublicKeyInfoOwned::from_der(spki.as_bytes())
            .map_err(|e| KeyError::Cert(e.to_string()))?;

        let builder = CertificateBuilder::new(
            Profile::Root,
            serial,
            validity,
            subject,
            spki_info,
            &signing_key,
        )
        .map_err(|e| KeyError::Cert(e.to_string()))?;

        let cert: Certificate = builder
            .build()
            .map_err(|e| KeyError::Cert(e.to_string()))?;
        let der = cert
            .to_der()
            .map_err(|e| KeyError::Cert(e.to_string()))?;

        let result = NodeCertificate { der };
        if !result.verify_binds(keypair.identifier)? {
            return Err(KeyError::IdentityMismatch);
        }
        Ok(result)
    }

    /// Wraps a DER-encoded certificate received from a peer.
    pub fn from_der(der: Vec<u8>) -> Self {
        NodeCertificate { der }
    }

    /// The DER encoding, as exchanged during the handshake.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Encodes this certificate as PEM, the form the node certificate
    /// file's certificate section takes (`spec.md` §6).
    pub fn to_pem(&self) -> Result<String, KeyError> {
        use x509_cert::der::EncodePem;
        let cert = Certificate::from_der(&self.der).map_err(|e| KeyError::Cert(e.to_string()))?;
        cert.to_pem(LineEnding::LF)
            .map_err(|e| KeyError::Cert(e.to_string()))
    }

    /// Parses a PEM-encoded certificate, as read from the node
    /// certificate file.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        use x509_cert::der::DecodePem;
        let cert = Certificate::from_pem(pem).map_err(|e| KeyError::Cert(e.to_string()))?;
        let der = cert.to_der().map_err(|e| KeyError::Cert(e.to_string()))?;
        Ok(NodeCertificate { der })
    }

    /// The RSA public key embedded in this certificate, for verifying
    /// signatures made by its holder (e.g. a handshake transcript
    /// signature, which is distinct from the certificate's own
    /// self-signature).
    pub fn public_key(&self) -> Result<RsaPublicKey, KeyError> {
        let cert =
            Certificate::from_der(&self.der).map_err(|e| KeyError::Cert(e.to_string()))?;
        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| KeyError::Cert(e.to_string()))?;
        RsaPublicKey::from_public_key_der(&spki_der).map_err(|e| KeyError::Pkcs8(e.to_string()))
    }

    /// The identifier this certificate's embedded public key hashes
    /// to, independent of whatever its Subject CN claims.
    pub fn spki_identifier(&self) -> Result<Identifier, KeyError> {
        let public = self.public_key()?;
        let spki = public
            .to_public_key_der()
            .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        Ok(Identifier::hash(spki.as_bytes()))
    }

    /// Verifies that this certificate is self-signed by the RSA key it
    /// embeds and that its Subject CN equals `expected`'s hex
    /// encoding, per `spec.md` §6. Returns `Ok(true)` only if both
    /// checks pass.
    pub fn verify_binds(&self, expected: Identifier) -> Result<bool, KeyError> {
        let cert =
            Certificate::from_der(&self.der).map_err(|e| KeyError::Cert(e.to_string()))?;

        let cn = subject_common_name(&cert).ok_or(KeyError::IdentityMismatch)?;
        if cn != expected.to_hex() {
            return Ok(false);
        }

        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| KeyError::Cert(e.to_string()))?;
        let public = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        if Identifier::hash(&spki_der) != expected {
            return Ok(false);
        }

        let verifying_key = VerifyingKey::<Sha256>::new(public);
        let tbs_der = cert
            .tbs_certificate
            .to_der()
            .map_err(|e| KeyError::Cert(e.to_string()))?;
        let sig_bytes = cert.signature.raw_bytes();
        let signature = Signature::try_from(sig_bytes).map_err(|_| KeyError::IdentityMismatch)?;

        Ok(verifying_key.verify(&tbs_der, &signature).is_ok())
    }
}

fn subject_common_name(cert: &Certificate) -> Option<String> {
    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == const_oid::db::rfc4519::CN {
                if let Ok(s) = PrintableStringRef::try_from(&atv.value) {
                    return Some(s.as_str().to_string());
                }
                if let Ok(s) = std::str::from_utf8(atv.value.value()) {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_certificate_binds_its_own_identity() {
        let kp = NodeKeyPair::generate().unwrap();
        let cert = kp.self_signed_certificate().unwrap();
        assert!(cert.verify_binds(kp.identifier()).unwrap());
    }

    #[test]
    fn key_and_certificate_round_trip_through_pem() {
        let kp = NodeKeyPair::generate().unwrap();
        let cert = kp.self_signed_certificate().unwrap();

        let key_pem = kp.to_pkcs8_pem().unwrap();
        let loaded = NodeKeyPair::from_pkcs8_pem(&key_pem).unwrap();
        assert_eq!(loaded.identifier(), kp.identifier());

        let cert_pem = cert.to_pem().unwrap();
        let loaded_cert = NodeCertificate::from_pem(&cert_pem).unwrap();
        assert_eq!(loaded_cert.der(), cert.der());
        assert!(loaded_cert.verify_binds(kp.identifier()).unwrap());
    }

    #[test]
    fn certificate_rejects_wrong_identity() {
        let kp = NodeKeyPair::generate().unwrap();
        let other = NodeKeyPair::generate().unwrap();
        let cert = kp.self_signed_certificate().unwrap();
        assert!(!cert.verify_binds(other.identifier()).unwrap());
    }
}
