//! AES-256-GCM page encryption codec.
//!
//! Page layout on disk: `[nonce: 12][ciphertext + tag: n + 16]`.
//!
//! The GCM tag authenticates every page, so a flipped bit or a wrong key
//! is detected before any decoded byte reaches the node layer. Tag
//! verification failure is reported as `DecryptionFailed` and aborts the
//! read; there is no retry at this layer.

use super::traits::StorageCodec;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use mica_core::{Error, Result};
use rand::RngCore;

/// Nonce size for AES-GCM, in bytes
const NONCE_LEN: usize = 12;

/// GCM authentication tag size, in bytes
const TAG_LEN: usize = 16;

/// AES-256-GCM codec with a per-page random nonce.
pub struct AesGcmCodec {
    cipher: Aes256Gcm,
}

impl AesGcmCodec {
    /// Create a codec from a 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl StorageCodec for AesGcmCodec {
    fn encode(&self, page: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, page)
            .map_err(|_| Error::Corruption("page encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decode(&self, page: &[u8]) -> Result<Vec<u8>> {
        if page.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailed(format!(
                "encrypted page too short: {} bytes",
                page.len()
            )));
        }
        let (nonce_bytes, ciphertext) = page.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::DecryptionFailed("page authentication failed".to_string()))
    }

    fn codec_id(&self) -> &'static str {
        "aes-256-gcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_round_trip() {
        let codec = AesGcmCodec::new(&[42u8; 32]);
        let page = b"node bytes node bytes node bytes";
        let encoded = codec.encode(page).unwrap();
        assert_ne!(&encoded[NONCE_LEN..], page.as_slice());
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, page);
    }

    #[test]
    fn test_nonces_differ_per_page() {
        let codec = AesGcmCodec::new(&[42u8; 32]);
        let a = codec.encode(b"same page").unwrap();
        let b = codec.encode(b"same page").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_page_fails_authentication() {
        let codec = AesGcmCodec::new(&[42u8; 32]);
        let mut encoded = codec.encode(b"important bytes").unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        let err = codec.decode(&encoded).unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let codec = AesGcmCodec::new(&[1u8; 32]);
        let other = AesGcmCodec::new(&[2u8; 32]);
        let encoded = codec.encode(b"secret").unwrap();
        assert!(matches!(
            other.decode(&encoded),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_page_rejected() {
        let codec = AesGcmCodec::new(&[3u8; 32]);
        assert!(matches!(
            codec.decode(&[0u8; 10]),
            Err(Error::DecryptionFailed(_))
        ));
    }
}
