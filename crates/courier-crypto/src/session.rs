//! Session key derivation
//!
//! Both parties of a conversation derive the same 32-byte key on their own:
//! each runs X25519 between its signing key and the other's published
//! verification key, then expands the shared secret with HKDF-SHA256 over a
//! canonical context string. The context orders the two verification keys
//! by byte value, never by role, so sender and recipient build identical
//! bytes:
//!
//! ```text
//! courier/session/v1|<conversation id>|<hex(min key)>|<hex(max key)>
//! ```
//!
//! Keys are computed on demand and never persisted. A different
//! conversation id always yields an unrelated key.

use crate::signer::SigningCapability;
use courier_core::{CourierError, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain label at the front of every session context
pub const SESSION_CONTEXT_LABEL: &str = "courier/session/v1";

/// 32-byte symmetric key for one conversation
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Build the canonical context string for a conversation between the
/// holders of `key_a` and `key_b`. Argument order does not matter.
pub fn canonical_session_context(conversation_id: &str, key_a: &[u8], key_b: &[u8]) -> Vec<u8> {
    let (low, high) = if key_a <= key_b {
        (key_a, key_b)
    } else {
        (key_b, key_a)
    };
    format!(
        "{SESSION_CONTEXT_LABEL}|{conversation_id}|{}|{}",
        hex::encode(low),
        hex::encode(high)
    )
    .into_bytes()
}

/// Derive the session key shared with `counterparty_key` for one conversation
pub fn derive_session_key(
    local: &dyn SigningCapability,
    counterparty_key: &[u8],
    conversation_id: &str,
) -> Result<SessionKey> {
    if conversation_id.is_empty() {
        return Err(CourierError::invalid("Conversation id must not be empty"));
    }

    let shared = local.agree(counterparty_key)?;
    let info = canonical_session_context(conversation_id, &local.verifying_key(), counterparty_key);

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_slice());
    let mut okm = [0u8; 32];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| CourierError::internal(format!("HKDF expansion failed: {e:?}")))?;

    tracing::trace!(conversation_id, "Derived session key");
    Ok(SessionKey(okm))
}
