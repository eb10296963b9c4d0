//! Cryptographic building blocks for Courier messaging
#![forbid(unsafe_code)]

/// AES-256-GCM envelope sealing
pub mod envelope;
/// SHA-256 helpers
pub mod hash;
/// Per-conversation session keys
pub mod session;
/// Signing capability and key agreement
pub mod signer;

pub use envelope::{EnvelopeCodec, NonceLength, SealedEnvelope, TAG_LEN};
pub use hash::{sha256, Sha256Hash};
pub use session::{canonical_session_context, derive_session_key, SessionKey};
pub use signer::{
    address_for_key, parse_verifying_key, verify_signature, Ed25519Signer, SigningCapability,
    VERIFYING_KEY_LEN,
};
