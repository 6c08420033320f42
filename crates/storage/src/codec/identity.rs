//! Identity codec: no transformation.

use super::traits::StorageCodec;
use mica_core::Result;

/// Codec that stores pages verbatim.
///
/// Used for unencrypted stores. Establishes the codec seam with zero
/// overhead beyond the copy into the caller-owned buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl StorageCodec for IdentityCodec {
    fn encode(&self, page: &[u8]) -> Result<Vec<u8>> {
        Ok(page.to_vec())
    }

    fn decode(&self, page: &[u8]) -> Result<Vec<u8>> {
        Ok(page.to_vec())
    }

    fn codec_id(&self) -> &'static str {
        "identity"
    }
}
