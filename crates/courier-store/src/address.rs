//! Digest ⇄ locator conversion
//!
//! A locator is the base-58 text of a SHA2-256 multihash: the byte `0x12`
//! (hash function code), the byte `0x20` (digest length), then the 32-byte
//! digest. Those locators always start with `Qm` and are 46 characters
//! long. Inputs that already look like a locator pass through unchanged, so
//! resolving twice is the same as resolving once.
//!
//! Going back from a locator to a digest only works for that exact
//! multihash shape; other locator formats (CIDv1, custom hashes) have no
//! 32-byte digest to recover.

use courier_core::{ContentDigest, ContentLocator, CourierError, Result};

/// Multihash function code for SHA2-256
pub const SHA2_256_CODE: u8 = 0x12;
/// Multihash digest length for SHA2-256
pub const SHA2_256_LEN: u8 = 0x20;
/// Text length of a SHA2-256 multihash in base-58
pub const MULTIHASH_LOCATOR_LEN: usize = 46;
/// Prefix every SHA2-256 multihash locator starts with
pub const MULTIHASH_LOCATOR_PREFIX: &str = "Qm";
/// Prefix of base32 CIDv1 locators, passed through untouched
pub const CIDV1_BASE32_PREFIX: &str = "bafy";

/// Encode a digest as a multihash locator
pub fn digest_to_locator(digest: &ContentDigest) -> ContentLocator {
    let mut multihash = Vec::with_capacity(34);
    multihash.push(SHA2_256_CODE);
    multihash.push(SHA2_256_LEN);
    multihash.extend_from_slice(digest.as_bytes());
    ContentLocator::new(bs58::encode(multihash).into_string())
}

/// Recover the digest from a multihash locator, when it is one
pub fn locator_to_digest(locator: &ContentLocator) -> Option<ContentDigest> {
    let decoded = bs58::decode(locator.as_str()).into_vec().ok()?;
    match decoded.as_slice() {
        [SHA2_256_CODE, SHA2_256_LEN, digest @ ..] if digest.len() == 32 => {
            ContentDigest::from_slice(digest).ok()
        }
        _ => None,
    }
}

/// Whether `input` is already a locator rather than a digest
pub fn is_locator(input: &str) -> bool {
    let input = input.trim();
    if let Some(rest) = input.strip_prefix(CIDV1_BASE32_PREFIX) {
        return !rest.is_empty() && rest.bytes().all(is_base32_lower);
    }
    input.len() == MULTIHASH_LOCATOR_LEN
        && input.starts_with(MULTIHASH_LOCATOR_PREFIX)
        && locator_to_digest(&ContentLocator::new(input)).is_some()
}

/// RFC 4648 base32 alphabet, lowercase as CIDv1 uses it
fn is_base32_lower(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'2'..=b'7')
}

/// Resolve either a locator or a hex digest to a locator
pub fn resolve_locator(input: &str) -> Result<ContentLocator> {
    let trimmed = input.trim();
    if is_locator(trimmed) {
        return Ok(ContentLocator::new(trimmed));
    }
    let digest = ContentDigest::from_hex(trimmed).map_err(|_| {
        CourierError::invalid(format!("Neither a locator nor a 32-byte hex digest: {input}"))
    })?;
    Ok(digest_to_locator(&digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_locator() {
        // sha256("hello world")
        let digest = ContentDigest::from_hex(
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        )
        .unwrap();
        let locator = digest_to_locator(&digest);
        assert_eq!(
            locator.as_str(),
            "QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4"
        );
        assert_eq!(locator_to_digest(&locator), Some(digest));
    }

    #[test]
    fn test_resolve_passes_locators_through() {
        let locator = "QmaozNR7DZHQK1ZcU9p7QdrshMvXqWK6gpu5rmrkPdT3L4";
        assert_eq!(resolve_locator(locator).unwrap().as_str(), locator);

        let cid_v1 = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";
        assert_eq!(resolve_locator(cid_v1).unwrap().as_str(), cid_v1);
        assert_eq!(locator_to_digest(&ContentLocator::new(cid_v1)), None);
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(resolve_locator("not-a-thing").is_err());
        assert!(resolve_locator("0x1234").is_err());
    }

    #[test]
    fn test_cid_prefix_alone_is_not_a_locator() {
        assert!(!is_locator("bafy"));
        assert!(!is_locator("bafy-not/a cid"));
        assert!(!is_locator("bafybeig0dyr"));
        assert!(!is_locator("bafyBEIGDYRZ"));
        assert!(resolve_locator("bafy../../etc").is_err());
        assert!(is_locator("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi"));
    }

    proptest! {
        #[test]
        fn resolve_is_idempotent(bytes in any::<[u8; 32]>()) {
            let digest = ContentDigest::from_bytes(bytes);
            let once = resolve_locator(&digest.to_hex()).unwrap();
            prop_assert!(once.as_str().starts_with(MULTIHASH_LOCATOR_PREFIX));
            prop_assert_eq!(once.as_str().len(), MULTIHASH_LOCATOR_LEN);
            let twice = resolve_locator(once.as_str()).unwrap();
            prop_assert_eq!(&twice, &once);
            prop_assert_eq!(locator_to_digest(&once), Some(digest));
        }
    }
}
