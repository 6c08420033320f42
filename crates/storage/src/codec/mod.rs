//! Storage codec abstraction.
//!
//! All node payloads passing through the file layer go through a codec for
//! encode/decode operations. `IdentityCodec` performs no transformation;
//! `AesGcmCodec` provides transparent AES-256-GCM encryption at page
//! granularity, with the GCM authentication tag playing the per-page
//! integrity check. A failed tag check surfaces as `DecryptionFailed` and is
//! fatal for that read.
//!
//! # Usage
//!
//! ```
//! use mica_storage::codec::{IdentityCodec, StorageCodec};
//!
//! let codec = IdentityCodec;
//! let data = b"hello world";
//!
//! let encoded = codec.encode(data).unwrap();
//! let decoded = codec.decode(&encoded).unwrap();
//!
//! assert_eq!(data.as_slice(), decoded.as_slice());
//! ```

mod aes;
mod identity;
mod traits;

pub use aes::AesGcmCodec;
pub use identity::IdentityCodec;
pub use traits::StorageCodec;

use mica_core::Result;
use std::sync::Arc;

/// Build the codec matching an optional encryption key.
///
/// `None` yields the identity codec; `Some(key)` yields AES-256-GCM with
/// that key. The file header records which codec a store was created with
/// so a mismatched open fails fast.
pub fn codec_for_key(key: Option<[u8; 32]>) -> Result<Arc<dyn StorageCodec>> {
    match key {
        None => Ok(Arc::new(IdentityCodec)),
        Some(key) => Ok(Arc::new(AesGcmCodec::new(&key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_for_key_identity() {
        let codec = codec_for_key(None).unwrap();
        assert_eq!(codec.codec_id(), "identity");
    }

    #[test]
    fn test_codec_for_key_aes() {
        let codec = codec_for_key(Some([7u8; 32])).unwrap();
        assert_eq!(codec.codec_id(), "aes-256-gcm");
    }
}
