//! Tracker protocol client (`spec.md` §6): announce this node's
//! reachable addresses to a tracker and look up a peer's.

use serde::{Deserialize, Serialize};
use teapotnet_identity::Identifier;
use url::Url;

use crate::err::{OverlayError, Result};

/// The JSON body exchanged with a tracker, both ways.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackerRecord {
    /// Reachable `ip:port` strings for the identifier named in the URL
    /// path.
    pub addresses: Vec<String>,
}

/// A client for one tracker base URL.
pub struct TrackerClient {
    base_url: Url,
    http: reqwest::Client,
}

impl TrackerClient {
    /// Builds a client for the tracker at `base_url`
    /// (e.g. `https://tracker.example/teapotnet`).
    pub fn new(base_url: Url) -> Self {
        TrackerClient {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    fn identity_url(&self, identity: &Identifier) -> Result<Url> {
        self.base_url
            .join(&identity.to_hex())
            .map_err(|_| OverlayError::Protocol("malformed tracker URL"))
    }

    /// Announces that `identity` is reachable at `addresses`.
    pub async fn announce(&self, identity: &Identifier, addresses: &[String]) -> Result<()> {
        let url = self.identity_url(identity)?;
        let record = TrackerRecord {
            addresses: addresses.to_vec(),
        };
        self.http
            .post(url)
            .json(&record)
            .send()
            .await
            .map_err(|_| OverlayError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "tracker announce failed",
            )))?
            .error_for_status()
            .map_err(|_| OverlayError::Protocol("tracker rejected announce"))?;
        Ok(())
    }

    /// Looks up the addresses a tracker has on file for `identity`.
    /// Returns an empty list if the tracker has nothing (it only
    /// guarantees presence within the last hour, per `spec.md` §6).
    pub async fn lookup(&self, identity: &Identifier) -> Result<Vec<String>> {
        let url = self.identity_url(identity)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|_| OverlayError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "tracker lookup failed",
            )))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let record: TrackerRecord = response
            .error_for_status()
            .map_err(|_| OverlayError::Protocol("tracker returned an error status"))?
            .json()
            .await
            .map_err(|_| OverlayError::Protocol("malformed tracker response body"))?;
        Ok(record.addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_url_joins_hex_onto_base() {
        let client = TrackerClient::new(Url::parse("https://tracker.example/teapotnet/").unwrap());
        let id = Identifier::hash(b"node");
        let url = client.identity_url(&id).unwrap();
        assert!(url.as_str().ends_with(&id.to_hex()));
    }
}
