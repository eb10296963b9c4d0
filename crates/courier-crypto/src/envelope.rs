//! Authenticated encryption of message envelopes

use crate::SessionKey;
use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    Aes256Gcm, AesGcm, Tag,
};
use courier_core::{CourierError, Result};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// AES-256-GCM with a 16-byte nonce, for peers that write 16-byte IVs
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Nonce (IV) length used by a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonceLength {
    /// 96-bit nonce, the GCM standard
    #[default]
    Standard,
    /// 128-bit nonce
    Extended,
}

impl NonceLength {
    /// Length in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            NonceLength::Standard => 12,
            NonceLength::Extended => 16,
        }
    }
}

impl TryFrom<usize> for NonceLength {
    type Error = CourierError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            12 => Ok(NonceLength::Standard),
            16 => Ok(NonceLength::Extended),
            other => Err(CourierError::configuration(format!(
                "Unsupported nonce length {other}"
            ))),
        }
    }
}

/// Sealed message: `iv || tag || ciphertext` on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    /// Fresh random nonce
    pub iv: Vec<u8>,
    /// GCM authentication tag
    pub tag: [u8; TAG_LEN],
    /// Encrypted payload, same length as the plaintext
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Serialize as `iv || tag || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.iv.len() + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a blob into its parts. The nonce length is not self-describing,
    /// so both sides must agree on it.
    pub fn from_bytes(bytes: &[u8], nonce_len: NonceLength) -> Result<Self> {
        let header = nonce_len.byte_len() + TAG_LEN;
        if bytes.len() < header {
            return Err(CourierError::invalid(format!(
                "Envelope too short: {} bytes, need at least {header}",
                bytes.len()
            )));
        }
        let (iv, rest) = bytes.split_at(nonce_len.byte_len());
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag);
        Ok(Self {
            iv: iv.to_vec(),
            tag: tag_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// AES-256-GCM envelope codec
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    nonce_len: NonceLength,
}

impl EnvelopeCodec {
    /// Codec using the given nonce length
    pub fn new(nonce_len: NonceLength) -> Self {
        Self { nonce_len }
    }

    /// Configured nonce length
    pub fn nonce_len(&self) -> NonceLength {
        self.nonce_len
    }

    /// Encrypt with a fresh OS-random nonce
    pub fn seal(&self, plaintext: &[u8], key: &SessionKey) -> Result<SealedEnvelope> {
        self.seal_with_rng(plaintext, key, &mut OsRng)
    }

    /// Encrypt drawing the nonce from `rng`
    pub fn seal_with_rng<R>(
        &self,
        plaintext: &[u8],
        key: &SessionKey,
        rng: &mut R,
    ) -> Result<SealedEnvelope>
    where
        R: RngCore + CryptoRng,
    {
        let mut iv = vec![0u8; self.nonce_len.byte_len()];
        rng.fill_bytes(&mut iv);

        let mut buffer = plaintext.to_vec();
        let tag = match self.nonce_len {
            NonceLength::Standard => Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()))
                .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer),
            NonceLength::Extended => Aes256Gcm16::new(GenericArray::from_slice(key.as_bytes()))
                .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer),
        }
        .map_err(|e| {
            buffer.zeroize();
            CourierError::internal(format!("Encryption failed: {e}"))
        })?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag.as_slice());
        Ok(SealedEnvelope {
            iv,
            tag: tag_bytes,
            ciphertext: buffer,
        })
    }

    /// Verify the tag and decrypt. A tag mismatch is always
    /// [`CourierError::AuthenticationFailure`] and releases no bytes.
    pub fn open(&self, envelope: &SealedEnvelope, key: &SessionKey) -> Result<Vec<u8>> {
        if envelope.iv.len() != self.nonce_len.byte_len() {
            return Err(CourierError::invalid(format!(
                "Envelope nonce is {} bytes, codec expects {}",
                envelope.iv.len(),
                self.nonce_len.byte_len()
            )));
        }

        let mut buffer = envelope.ciphertext.clone();
        let nonce = &envelope.iv;
        let tag: &Tag = GenericArray::from_slice(envelope.tag.as_slice());
        let outcome = match self.nonce_len {
            NonceLength::Standard => Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()))
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer, tag),
            NonceLength::Extended => Aes256Gcm16::new(GenericArray::from_slice(key.as_bytes()))
                .decrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer, tag),
        };

        match outcome {
            Ok(()) => Ok(buffer),
            Err(_) => {
                buffer.zeroize();
                Err(CourierError::authentication_failure(
                    "Envelope tag did not verify (wrong key or tampered data)",
                ))
            }
        }
    }

    /// Seal and serialize in one step
    pub fn seal_to_bytes(&self, plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
        Ok(self.seal(plaintext, key)?.to_bytes())
    }

    /// Parse and open in one step
    pub fn open_bytes(&self, bytes: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
        let envelope = SealedEnvelope::from_bytes(bytes, self.nonce_len)?;
        self.open(&envelope, key)
    }
}
