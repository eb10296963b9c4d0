//! Sealed publish/retrieve through gateways that misbehave
#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use courier_core::{CourierError, EnvelopeEncoding};
use courier_crypto::{NonceLength, SessionKey};
use courier_store::{digest_to_locator, PublishMetadata};
use courier_testkit::{GatewayBehavior, MemoryContentStore};
use std::time::Duration;

const GATEWAYS: [&str; 3] = ["primary", "secondary", "tertiary"];

fn key(byte: u8) -> SessionKey {
    SessionKey::from_bytes([byte; 32])
}

fn metadata() -> PublishMetadata {
    PublishMetadata::named("job-4-application").with("job", "4")
}

#[tokio::test]
async fn test_sealed_content_survives_failing_gateways() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );

    let published = store
        .publish(b"deliverable", Some(&key(9)), &metadata())
        .await
        .unwrap();
    assert_eq!(published.locator, digest_to_locator(&published.digest));
    assert_ne!(memory.object(&published.digest).unwrap(), b"deliverable");

    memory.set_behavior("primary", GatewayBehavior::Fail("502 bad gateway".into()));
    memory.set_behavior("secondary", GatewayBehavior::Fail("connection refused".into()));
    let opened = store
        .retrieve(&published.locator, Some(&key(9)))
        .await
        .unwrap();
    assert_eq!(opened, b"deliverable");
    assert_eq!(memory.hits(), vec!["primary", "secondary", "tertiary"]);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_gateway_times_out() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );
    let published = store
        .publish(b"listing", Some(&key(3)), &metadata())
        .await
        .unwrap();

    memory.set_behavior("primary", GatewayBehavior::Hang);
    let opened = store
        .retrieve_digest(&published.digest, Some(&key(3)))
        .await
        .unwrap();
    assert_eq!(opened, b"listing");
    assert_eq!(memory.hits(), vec!["primary", "secondary"]);
}

#[tokio::test]
async fn test_tampered_bytes_fail_authentication_without_fallback() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );
    let published = store
        .publish(b"secret", Some(&key(1)), &metadata())
        .await
        .unwrap();

    memory.set_behavior("primary", GatewayBehavior::Corrupt);
    let err = store
        .retrieve(&published.locator, Some(&key(1)))
        .await
        .unwrap_err();
    assert_matches!(err, CourierError::AuthenticationFailure { .. });
    assert_eq!(memory.hits(), vec!["primary"]);
}

#[tokio::test]
async fn test_wrong_key_fails_authentication() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );
    let published = store
        .publish(b"secret", Some(&key(1)), &metadata())
        .await
        .unwrap();

    let err = store
        .retrieve(&published.locator, Some(&key(2)))
        .await
        .unwrap_err();
    assert_matches!(err, CourierError::AuthenticationFailure { .. });
}

#[tokio::test]
async fn test_base64_envelopes_with_long_nonce() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Extended,
        EnvelopeEncoding::Base64,
    );
    let published = store
        .publish(b"result body", Some(&key(5)), &metadata())
        .await
        .unwrap();

    let stored = memory.object(&published.digest).unwrap();
    assert!(stored.iter().all(u8::is_ascii));
    assert_eq!(published.stored_len, stored.len());

    let opened = store
        .retrieve(&published.locator, Some(&key(5)))
        .await
        .unwrap();
    assert_eq!(opened, b"result body");
}

#[tokio::test]
async fn test_every_gateway_failing_is_reported() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );
    let published = store.publish(b"plain", None, &metadata()).await.unwrap();
    for gateway in GATEWAYS {
        memory.set_behavior(gateway, GatewayBehavior::Fail("503".into()));
    }

    let err = store.retrieve(&published.locator, None).await.unwrap_err();
    assert_matches!(err, CourierError::AllGatewaysFailed { attempts: 3, .. });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_plaintext_round_trip_without_key() {
    let memory = MemoryContentStore::new();
    let store = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Base64,
    );
    let published = store
        .publish(br#"{"title":"bot"}"#, None, &metadata())
        .await
        .unwrap();
    assert_eq!(memory.object(&published.digest).unwrap(), br#"{"title":"bot"}"#);
    assert_eq!(memory.published()[0].name, "job-4-application");

    let fetched = store.retrieve(&published.locator, None).await.unwrap();
    assert_eq!(fetched, br#"{"title":"bot"}"#);
}

#[tokio::test]
async fn test_any_gateway_order_returns_the_plaintext() {
    let orders = [
        ["primary", "secondary", "tertiary"],
        ["primary", "tertiary", "secondary"],
        ["secondary", "primary", "tertiary"],
        ["secondary", "tertiary", "primary"],
        ["tertiary", "primary", "secondary"],
        ["tertiary", "secondary", "primary"],
    ];
    let memory = MemoryContentStore::new();
    memory.set_behavior("secondary", GatewayBehavior::Fail("404".into()));
    let writer = memory.content_store(
        &GATEWAYS,
        Duration::from_secs(2),
        NonceLength::Standard,
        EnvelopeEncoding::Raw,
    );
    let published = writer
        .publish(b"application", Some(&key(8)), &metadata())
        .await
        .unwrap();

    for order in orders {
        let reader = memory.content_store(
            &order,
            Duration::from_secs(2),
            NonceLength::Standard,
            EnvelopeEncoding::Raw,
        );
        let opened = reader
            .retrieve(&published.locator, Some(&key(8)))
            .await
            .unwrap();
        assert_eq!(opened, b"application");
    }
}
