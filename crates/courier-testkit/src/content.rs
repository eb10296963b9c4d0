//! In-memory content store and gateways
//!
//! [`MemoryContentStore`] is both the pinning backend and every gateway.
//! Gateway URLs use the form `mem://<name>/<locator>`; each named gateway
//! can be told to serve, fail, hang, or corrupt what it returns.

use async_trait::async_trait;
use courier_core::{ContentDigest, ContentLocator, CourierError, EnvelopeEncoding, Result};
use courier_crypto::{sha256, EnvelopeCodec, NonceLength};
use courier_store::{
    digest_to_locator, ContentPublisher, ContentStore, GatewayClient, GatewayFetcher, PublishMetadata,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How a named gateway answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayBehavior {
    /// Return the stored bytes
    Serve,
    /// Fail with a transport error
    Fail(String),
    /// Never answer
    Hang,
    /// Return the stored bytes with the last byte flipped
    Corrupt,
}

#[derive(Debug, Default)]
struct ContentState {
    objects: HashMap<String, Vec<u8>>,
    behaviors: HashMap<String, GatewayBehavior>,
    hits: Vec<String>,
    published: Vec<PublishMetadata>,
}

/// Pinning backend and gateway set backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    state: Mutex<ContentState>,
}

impl MemoryContentStore {
    /// Empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gateway template for a named in-memory gateway
    pub fn gateway_url(name: &str) -> String {
        format!("mem://{name}/{{locator}}")
    }

    /// Set how a named gateway answers
    pub fn set_behavior(&self, gateway: &str, behavior: GatewayBehavior) {
        self.state
            .lock()
            .behaviors
            .insert(gateway.to_string(), behavior);
    }

    /// Store bytes directly, returning their digest
    pub fn put(&self, bytes: &[u8]) -> ContentDigest {
        let digest = ContentDigest::from_bytes(sha256(bytes));
        let locator = digest_to_locator(&digest);
        self.state
            .lock()
            .objects
            .insert(locator.as_str().to_string(), bytes.to_vec());
        digest
    }

    /// Bytes stored under a digest
    pub fn object(&self, digest: &ContentDigest) -> Option<Vec<u8>> {
        let locator = digest_to_locator(digest);
        self.state.lock().objects.get(locator.as_str()).cloned()
    }

    /// Gateways contacted so far, in order
    pub fn hits(&self) -> Vec<String> {
        self.state.lock().hits.clone()
    }

    /// Metadata of every publish, in order
    pub fn published(&self) -> Vec<PublishMetadata> {
        self.state.lock().published.clone()
    }

    /// Facade over this store reading through `gateways` in order
    pub fn content_store(
        self: &Arc<Self>,
        gateways: &[&str],
        per_gateway_timeout: Duration,
        nonce_len: NonceLength,
        encoding: EnvelopeEncoding,
    ) -> ContentStore {
        let fetcher = GatewayFetcher::new(
            self.clone(),
            gateways.iter().map(|name| Self::gateway_url(name)),
            per_gateway_timeout,
        );
        ContentStore::new(self.clone(), fetcher, EnvelopeCodec::new(nonce_len), encoding)
    }
}

#[async_trait]
impl ContentPublisher for MemoryContentStore {
    async fn publish(&self, bytes: Vec<u8>, metadata: &PublishMetadata) -> Result<ContentLocator> {
        let locator = digest_to_locator(&ContentDigest::from_bytes(sha256(&bytes)));
        let mut state = self.state.lock();
        state.objects.insert(locator.as_str().to_string(), bytes);
        state.published.push(metadata.clone());
        Ok(locator)
    }
}

#[async_trait]
impl GatewayClient for MemoryContentStore {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let (gateway, locator) = url
            .strip_prefix("mem://")
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(|| CourierError::invalid(format!("Not an in-memory gateway URL: {url}")))?;

        let (behavior, object) = {
            let mut state = self.state.lock();
            state.hits.push(gateway.to_string());
            (
                state
                    .behaviors
                    .get(gateway)
                    .cloned()
                    .unwrap_or(GatewayBehavior::Serve),
                state.objects.get(locator).cloned(),
            )
        };

        match behavior {
            GatewayBehavior::Hang => std::future::pending().await,
            GatewayBehavior::Fail(reason) => Err(CourierError::transport(reason)),
            GatewayBehavior::Serve => {
                object.ok_or_else(|| CourierError::transport(format!("{gateway}: 404 for {locator}")))
            }
            GatewayBehavior::Corrupt => {
                let mut bytes = object
                    .ok_or_else(|| CourierError::transport(format!("{gateway}: 404 for {locator}")))?;
                if let Some(last) = bytes.last_mut() {
                    *last ^= 0x01;
                }
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_published_bytes_are_served_by_locator() {
        let store = MemoryContentStore::new();
        let locator = store
            .publish(b"hello world".to_vec(), &PublishMetadata::named("greeting"))
            .await
            .unwrap();
        assert_eq!(locator.as_str(), "QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4");

        let url = format!("mem://alpha/{locator}");
        let fetched = GatewayClient::get(store.as_ref(), &url).await.unwrap();
        assert_eq!(fetched, b"hello world");
        assert_eq!(store.hits(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_failing_gateway() {
        let store = MemoryContentStore::new();
        store.put(b"x");
        store.set_behavior("beta", GatewayBehavior::Fail("502".into()));
        let locator = digest_to_locator(&ContentDigest::from_bytes(sha256(b"x")));
        let err = GatewayClient::get(store.as_ref(), &format!("mem://beta/{locator}"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
