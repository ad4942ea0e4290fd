/// Cryptographic token units and the session that serializes access to them.
///
/// A token session is shared and non-reentrant. Every unit operation takes a
/// `&TokenSession`, and the only way to obtain one is to hold the
/// [`TokenLock`], so unit calls cannot run outside the lock.
pub mod software;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::crypto::params::{DeliveryParams, WrappingParams};
use crate::crypto::sensitive::{SensitiveVec, SessionKey};
use crate::error::CryptoError;

pub use software::{ArchiveEnvelope, SoftwareStorageUnit, SoftwareTransportUnit};

/// Shared handle to a token session.
pub type TokenLock = Arc<Mutex<TokenSession>>;

/// A named token session.
#[derive(Debug)]
pub struct TokenSession {
    name: String,
    operations: u64,
}

impl TokenSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: 0,
        }
    }

    /// A session wrapped in its lock, ready to share between workers.
    pub fn shared(name: impl Into<String>) -> TokenLock {
        Arc::new(Mutex::new(Self::new(name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of recoveries started on this session.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Count a new recovery and return its sequence number.
    pub fn begin_operation(&mut self) -> u64 {
        self.operations += 1;
        self.operations
    }
}

/// A private key held by a token; it never leaves as raw bytes except
/// through a unit's wrap operation.
///
/// The handle keeps the PKCS#8 encoding it was parsed from and export
/// reuses those bytes. Re-encoding through `rsa` frees unscrubbed copies
/// of the private exponent.
pub struct PrivateKeyHandle {
    key: RsaPrivateKey,
    pkcs8: SensitiveVec,
}

impl PrivateKeyHandle {
    pub fn from_pkcs8_der(pkcs8: SensitiveVec) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(pkcs8.as_bytes())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Ok(Self { key, pkcs8 })
    }

    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// DER PrivateKeyInfo for the key.
    pub fn pkcs8(&self) -> &[u8] {
        self.pkcs8.as_bytes()
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyHandle([REDACTED])")
    }
}

/// Holds the transport private key clients wrap their session keys to.
pub trait TransportKeyUnit: Send + Sync {
    fn unwrap_symmetric(
        &self,
        session: &TokenSession,
        wrapped: &[u8],
        params: &WrappingParams,
    ) -> Result<SessionKey, CryptoError>;
}

/// Holds the storage private key archives are sealed to.
pub trait StorageKeyUnit: Send + Sync {
    /// Parameters for archives that carry none of their own.
    fn legacy_wrapping_params(&self) -> WrappingParams;

    /// Decrypt an archive into raw PKCS#8 bytes.
    fn decrypt_internal(
        &self,
        session: &TokenSession,
        data: &[u8],
        params: &WrappingParams,
    ) -> Result<SensitiveVec, CryptoError>;

    /// Unwrap an archive into a token-held key bound to `public_key` (SPKI DER).
    fn unwrap(
        &self,
        session: &TokenSession,
        data: &[u8],
        public_key: &[u8],
        params: &WrappingParams,
    ) -> Result<PrivateKeyHandle, CryptoError>;

    /// Export a token-held key as PKCS#8 encrypted under `session_key`.
    fn wrap_private_key(
        &self,
        session: &TokenSession,
        key: &PrivateKeyHandle,
        session_key: &SessionKey,
        params: &DeliveryParams,
    ) -> Result<Vec<u8>, CryptoError>;
}
