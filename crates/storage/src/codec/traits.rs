//! Storage codec trait definition.

use mica_core::Result;

/// Storage codec trait.
///
/// All node payloads written by the file layer go through the codec.
/// This is the seam for encryption-at-rest (and a hook point for future
/// compression codecs).
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync`; pages are decoded concurrently from
/// multiple reader threads.
///
/// # Codec Identity
///
/// Each codec has a unique identifier stored in the file header. Reopening
/// a store with the wrong codec fails before any page is misread.
pub trait StorageCodec: Send + Sync {
    /// Encode a page for storage.
    ///
    /// The returned bytes are what gets written to disk. For
    /// `IdentityCodec` this is a plain copy; for `AesGcmCodec` it is
    /// nonce + ciphertext + tag.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    fn encode(&self, page: &[u8]) -> Result<Vec<u8>>;

    /// Decode a page from storage.
    ///
    /// Reverses `encode`. Returns `DecryptionFailed` when authentication
    /// fails, `Corruption` when the page is structurally malformed.
    ///
    /// # Errors
    /// See above; decode failures are fatal for the affected read.
    fn decode(&self, page: &[u8]) -> Result<Vec<u8>>;

    /// Unique codec identifier recorded in the file header.
    fn codec_id(&self) -> &'static str;
}
