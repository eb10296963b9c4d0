//! Write path of the content-addressed store

use async_trait::async_trait;
use courier_core::{ContentLocator, CourierError, Result};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Descriptive metadata attached to a published object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMetadata {
    /// Object name shown by the pinning service
    pub name: String,
    /// Free-form key/value annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keyvalues: BTreeMap<String, String>,
}

impl PublishMetadata {
    /// Metadata with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keyvalues: BTreeMap::new(),
        }
    }

    /// Add an annotation
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyvalues.insert(key.into(), value.into());
        self
    }
}

/// Anything that can store bytes and hand back their locator
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    /// Store `bytes` and return the locator readers will fetch
    async fn publish(&self, bytes: Vec<u8>, metadata: &PublishMetadata) -> Result<ContentLocator>;
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Multipart upload to an HTTP pinning service
#[derive(Clone)]
pub struct HttpPinningClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpPinningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPinningClient")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpPinningClient {
    /// Client for `endpoint`, authenticating with `token` when present
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
            timeout: Duration::from_secs(60),
        }
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ContentPublisher for HttpPinningClient {
    async fn publish(&self, bytes: Vec<u8>, metadata: &PublishMetadata) -> Result<ContentLocator> {
        let size = bytes.len();
        let metadata_json = serde_json::to_string(metadata)?;
        let file_name = if metadata.name.is_empty() {
            "content.bin".to_string()
        } else {
            metadata.name.clone()
        };
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("pinataMetadata", metadata_json);

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CourierError::transport(format!("Pinning upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::storage(format!(
                "Pinning service rejected upload ({status}): {body}"
            )));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| CourierError::serialization(format!("Invalid pinning response: {e}")))?;

        tracing::info!(locator = %pinned.ipfs_hash, size, name = %metadata.name, "Published content");
        Ok(ContentLocator::new(pinned.ipfs_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serialization() {
        let meta = PublishMetadata::named("job-4-application").with("job", "4");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "job-4-application");
        assert_eq!(json["keyvalues"]["job"], "4");

        let bare = serde_json::to_value(PublishMetadata::named("x")).unwrap();
        assert!(bare.get("keyvalues").is_none());
    }

    #[test]
    fn test_pin_response_shape() {
        let parsed: PinResponse = serde_json::from_str(
            r#"{"IpfsHash":"QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4","PinSize":11,"Timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.ipfs_hash, "QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = HttpPinningClient::new("https://pin.example/upload", Some("secret".into()));
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("authenticated: true"));
    }
}
