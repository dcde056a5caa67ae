use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the (compressed) body.
pub const HASH_HEADER: &str = "HashSHA256";

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("incorrect hash format: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("HMAC key rejected: {0}")]
    InvalidKey(String),
}

/// HMAC-SHA256 signer/verifier keyed once at construction.
///
/// # Examples
///
/// ```
/// use gaugemon_common::hasher::Hasher;
///
/// let hasher = Hasher::new("secret").unwrap();
/// let sig = hasher.hash(b"payload");
/// assert!(hasher.validate(b"payload", &sig).unwrap());
/// assert!(!hasher.validate(b"tampered", &sig).unwrap());
/// ```
#[derive(Clone)]
pub struct Hasher {
    mac: HmacSha256,
}

impl Hasher {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let mac = HmacSha256::new_from_slice(key.as_ref())
            .map_err(|e| HashError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Hex-encoded digest of `data`.
    pub fn hash(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` (hex) against `data` in constant time.
    ///
    /// A signature that is not valid hex is an error, not a mismatch.
    pub fn validate(&self, data: &[u8], signature: &str) -> Result<bool, HashError> {
        let expected = hex::decode(signature.trim())?;
        let mut mac = self.mac.clone();
        mac.update(data);
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher").finish_non_exhaustive()
    }
}
