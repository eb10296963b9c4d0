//! SHA-256 helpers
//!
//! SHA-256 is the digest the content-addressed store tags in its multihash
//! locators, so it is the one hash used throughout Courier.

use sha2::{Digest, Sha256};

/// SHA-256 digest (32 bytes)
pub type Sha256Hash = [u8; 32];

/// Hash the input data
pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
