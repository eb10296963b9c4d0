//! Signing capability
//!
//! Callers get signatures and key agreement out of a [`SigningCapability`]
//! without ever seeing private key bytes. [`Ed25519Signer`] is the only
//! implementation; ed25519 signatures are deterministic, which the
//! take-action flow relies on when it re-signs after a retry.

use crate::hash::sha256;
use courier_core::{ActorAddress, CourierError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Length of a published verification key
pub const VERIFYING_KEY_LEN: usize = 32;

/// Something that can sign and agree keys on behalf of the local actor
pub trait SigningCapability: Send + Sync {
    /// Public verification key
    fn verifying_key(&self) -> [u8; VERIFYING_KEY_LEN];

    /// Ledger address derived from the verification key
    fn address(&self) -> ActorAddress {
        address_for_key(&self.verifying_key())
    }

    /// Sign an arbitrary message
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Raw X25519 shared secret with the holder of `counterparty_key`
    fn agree(&self, counterparty_key: &[u8]) -> Result<Zeroizing<[u8; 32]>>;
}

/// Derive the ledger address for a verification key: the last 20 bytes of
/// its SHA-256.
pub fn address_for_key(verifying_key: &[u8]) -> ActorAddress {
    let digest = sha256(verifying_key);
    let mut raw = [0u8; ActorAddress::LEN];
    raw.copy_from_slice(&digest[32 - ActorAddress::LEN..]);
    ActorAddress::from_bytes(raw)
}

/// Parse a published verification key
pub fn parse_verifying_key(bytes: &[u8]) -> Result<VerifyingKey> {
    let array: [u8; VERIFYING_KEY_LEN] = bytes.try_into().map_err(|_| {
        CourierError::invalid(format!(
            "Verification key must be {VERIFYING_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&array)
        .map_err(|e| CourierError::invalid(format!("Invalid verification key: {e}")))
}

/// Check an ed25519 signature against a published key
pub fn verify_signature(verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = parse_verifying_key(verifying_key)?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| CourierError::invalid(format!("Malformed signature: {e}")))?;
    key.verify(message, &signature)
        .map_err(|_| CourierError::authentication_failure("Signature did not verify"))
}

/// Ed25519 signing capability
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Signer from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Signer from a hex seed, with or without `0x`
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            hex::decode(seed_hex.trim().trim_start_matches("0x"))
                .map_err(|e| CourierError::configuration(format!("Secret key is not hex: {e}")))?,
        );
        let seed: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            CourierError::configuration(format!(
                "Secret key must be 32 bytes, got {}",
                decoded.len()
            ))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Fresh random signer
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            key: SigningKey::generate(rng),
        }
    }

    /// Hex of the seed, for key generation output only
    pub fn seed_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key.to_bytes()))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &hex::encode(self.verifying_key()))
            .finish_non_exhaustive()
    }
}

impl SigningCapability for Ed25519Signer {
    fn verifying_key(&self) -> [u8; VERIFYING_KEY_LEN] {
        self.key.verifying_key().to_bytes()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }

    fn agree(&self, counterparty_key: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let counterparty = parse_verifying_key(counterparty_key)?;
        let scalar = Zeroizing::new(self.key.to_scalar_bytes());
        let shared = counterparty.to_montgomery().mul_clamped(*scalar).to_bytes();
        if shared.iter().all(|b| *b == 0) {
            return Err(CourierError::invalid(
                "Key agreement produced the identity point",
            ));
        }
        Ok(Zeroizing::new(shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures_are_deterministic_and_verify() {
        let signer = Ed25519Signer::from_seed([9u8; 32]);
        let a = signer.sign(b"take:1:5");
        let b = signer.sign(b"take:1:5");
        assert_eq!(a, b);
        verify_signature(&signer.verifying_key(), b"take:1:5", &a).unwrap();
        assert!(verify_signature(&signer.verifying_key(), b"take:1:6", &a).is_err());
    }

    #[test]
    fn test_agreement_is_symmetric() {
        let alice = Ed25519Signer::from_seed([1u8; 32]);
        let bob = Ed25519Signer::from_seed([2u8; 32]);
        let ab = alice.agree(&bob.verifying_key()).unwrap();
        let ba = bob.agree(&alice.verifying_key()).unwrap();
        assert_eq!(*ab, *ba);

        let carol = Ed25519Signer::from_seed([3u8; 32]);
        assert_ne!(*ab, *alice.agree(&carol.verifying_key()).unwrap());
    }

    #[test]
    fn test_from_hex_validates_length() {
        assert!(Ed25519Signer::from_hex("abcd").is_err());
        assert!(Ed25519Signer::from_hex("zz").is_err());
        let signer = Ed25519Signer::from_hex(&format!("0x{}", "07".repeat(32))).unwrap();
        assert_eq!(signer.verifying_key(), Ed25519Signer::from_seed([7u8; 32]).verifying_key());
        assert_eq!(signer.seed_hex().as_str(), "07".repeat(32));
    }

    #[test]
    fn test_address_is_stable_per_key() {
        let signer = Ed25519Signer::from_seed([4u8; 32]);
        assert_eq!(signer.address(), address_for_key(&signer.verifying_key()));
        assert_ne!(
            signer.address(),
            Ed25519Signer::from_seed([5u8; 32]).address()
        );
    }

    #[test]
    fn test_bad_counterparty_key_is_rejected() {
        let signer = Ed25519Signer::from_seed([1u8; 32]);
        assert!(signer.agree(&[0u8; 31]).is_err());
    }
}
