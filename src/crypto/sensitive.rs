/// Wrappers for sensitive key material that is automatically zeroized on drop.
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::params::SymmetricAlgorithm;
use crate::error::CryptoError;

/// A variable-length sensitive buffer that is zeroized when dropped.
///
/// Zeroizing covers the full allocation, including capacity left behind
/// by `truncate`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveVec(Vec<u8>);

impl SensitiveVec {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shortens the buffer in place. The dropped tail stays in the
    /// allocation until the buffer itself is dropped and zeroized.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Copies the first `len` bytes into a fresh buffer and scrubs `self`.
    pub fn into_prefix(self, len: usize) -> Self {
        let len = len.min(self.0.len());
        Self::from_slice(&self.0[..len])
    }
}

impl AsRef<[u8]> for SensitiveVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SensitiveVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveVec([REDACTED; {}])", self.0.len())
    }
}

/// A symmetric session key tagged with its algorithm.
pub struct SessionKey {
    algorithm: SymmetricAlgorithm,
    bytes: SensitiveVec,
}

impl SessionKey {
    /// Binds key bytes to an algorithm, rejecting a length that does not fit it.
    pub fn new(algorithm: SymmetricAlgorithm, bytes: SensitiveVec) -> Result<Self, CryptoError> {
        let expected = algorithm.key_len();
        if bytes.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
