//! # Courier Store
//!
//! Content-addressed storage for Courier messages.
//!
//! - **Addressing**: 32-byte ledger digests ⇄ base-58 multihash locators
//! - **Gateways**: ordered, per-attempt-timeout fallback reads
//! - **Pinning**: HTTP write path returning locators
//! - **Facade**: sealed `publish` / `retrieve` used by the lifecycle manager

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Digest and locator conversion
pub mod address;
/// Sealed publish/retrieve
pub mod facade;
/// Gateway fallback reads
pub mod gateway;
/// Pinning write path
pub mod pinning;

pub use address::{digest_to_locator, is_locator, locator_to_digest, resolve_locator};
pub use facade::{decode_stored_envelope, ContentStore, PublishedContent};
pub use gateway::{
    AttemptOutcome, GatewayAttempt, GatewayClient, GatewayFetcher, GatewayTemplate,
    HttpGatewayClient,
};
pub use pinning::{ContentPublisher, HttpPinningClient, PublishMetadata};
