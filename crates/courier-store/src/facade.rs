//! Sealed publish and retrieve
//!
//! [`ContentStore`] is the only component that combines the envelope codec,
//! the locator resolver, the pinning backend, and the gateway fetcher. With a
//! session key, content is sealed before upload and opened after download.
//! Without one it is stored and read as plaintext, which is reserved for
//! public listings and diagnostics.

use crate::address::{digest_to_locator, locator_to_digest};
use crate::gateway::GatewayFetcher;
use crate::pinning::{ContentPublisher, PublishMetadata};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use courier_core::{
    ContentDigest, ContentLocator, CourierError, EnvelopeEncoding, Result,
};
use courier_crypto::{EnvelopeCodec, SessionKey};
use std::sync::Arc;

/// Where a published object ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedContent {
    /// Digest to record on the ledger
    pub digest: ContentDigest,
    /// Locator readers fetch
    pub locator: ContentLocator,
    /// Number of bytes actually stored
    pub stored_len: usize,
}

/// Publish/retrieve facade over the content-addressed store
#[derive(Clone)]
pub struct ContentStore {
    publisher: Arc<dyn ContentPublisher>,
    fetcher: GatewayFetcher,
    codec: EnvelopeCodec,
    encoding: EnvelopeEncoding,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("fetcher", &self.fetcher)
            .field("codec", &self.codec)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Build a store over a publisher and a gateway fetcher
    pub fn new(
        publisher: Arc<dyn ContentPublisher>,
        fetcher: GatewayFetcher,
        codec: EnvelopeCodec,
        encoding: EnvelopeEncoding,
    ) -> Self {
        Self {
            publisher,
            fetcher,
            codec,
            encoding,
        }
    }

    /// Store `plaintext`, sealed under `key` when one is given, and return
    /// the digest that identifies the stored bytes.
    pub async fn publish(
        &self,
        plaintext: &[u8],
        key: Option<&SessionKey>,
        metadata: &PublishMetadata,
    ) -> Result<PublishedContent> {
        let stored = match key {
            Some(key) => {
                let sealed = self.codec.seal_to_bytes(plaintext, key)?;
                match self.encoding {
                    EnvelopeEncoding::Raw => sealed,
                    EnvelopeEncoding::Base64 => STANDARD.encode(sealed).into_bytes(),
                }
            }
            None => plaintext.to_vec(),
        };
        let stored_len = stored.len();

        let locator = self.publisher.publish(stored, metadata).await?;
        let digest = locator_to_digest(&locator).ok_or_else(|| {
            CourierError::storage(format!(
                "Store returned locator {locator} that has no 32-byte digest form"
            ))
        })?;

        tracing::debug!(%locator, %digest, stored_len, sealed = key.is_some(), "Content published");
        Ok(PublishedContent {
            digest,
            locator,
            stored_len,
        })
    }

    /// Fetch the content at `locator`, opening it with `key` when given.
    ///
    /// A tag mismatch surfaces as `AuthenticationFailure` and is never
    /// retried here.
    pub async fn retrieve(
        &self,
        locator: &ContentLocator,
        key: Option<&SessionKey>,
    ) -> Result<Vec<u8>> {
        let fetched = self.fetcher.fetch(locator).await?;
        match key {
            None => Ok(fetched),
            Some(key) => {
                let blob = decode_stored_envelope(&fetched);
                self.codec.open_bytes(&blob, key).map_err(|err| {
                    if matches!(err, CourierError::AuthenticationFailure { .. }) {
                        tracing::warn!(%locator, "Envelope failed authentication");
                    }
                    err
                })
            }
        }
    }

    /// Fetch by ledger digest
    pub async fn retrieve_digest(
        &self,
        digest: &ContentDigest,
        key: Option<&SessionKey>,
    ) -> Result<Vec<u8>> {
        self.retrieve(&digest_to_locator(digest), key).await
    }
}

/// Undo base64 text encoding when the stored object is base64, else pass
/// the raw bytes through.
pub fn decode_stored_envelope(fetched: &[u8]) -> Vec<u8> {
    let trimmed = trim_ascii_whitespace(fetched);
    let looks_like_base64 = !trimmed.is_empty()
        && trimmed.len() % 4 == 0
        && trimmed
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    if looks_like_base64 {
        if let Ok(decoded) = STANDARD.decode(trimmed) {
            return decoded;
        }
    }
    fetched.to_vec()
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
