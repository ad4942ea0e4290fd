/// Algorithm parameters for wrapping and unwrapping key material.
///
/// `WrappingParams` covers the transport unwrap and archival recovery.
/// Delivery has its own [`DeliveryParams`] so the three uses cannot be
/// mixed up at a call site.
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::encoding::hex_option;
use crate::error::CryptoError;

/// IV used by legacy archives and the transport wrap.
pub const LEGACY_IV: [u8; 8] = [0x01; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymmetricAlgorithm {
    Des3,
    Aes128,
    Aes256,
}

impl SymmetricAlgorithm {
    pub fn key_len(self) -> usize {
        match self {
            Self::Des3 => 24,
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }
}

/// Asymmetric wrap of a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyWrapAlgorithm {
    /// RSA PKCS#1 v1.5.
    Rsa,
    /// RSA-OAEP with SHA-256.
    RsaOaep,
}

/// Symmetric payload cipher. Both are CBC with PKCS#7 padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadAlgorithm {
    Des3CbcPad,
    AesCbcPad,
}

impl PayloadAlgorithm {
    pub fn iv_len(self) -> usize {
        match self {
            Self::Des3CbcPad => 8,
            Self::AesCbcPad => 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappingParams {
    pub session_key: SymmetricAlgorithm,
    pub key_wrap: KeyWrapAlgorithm,
    pub payload_encryption: PayloadAlgorithm,
    pub payload_wrap: PayloadAlgorithm,
    #[serde(default, with = "hex_option")]
    pub payload_encryption_iv: Option<Vec<u8>>,
    #[serde(default, with = "hex_option")]
    pub payload_wrap_iv: Option<Vec<u8>>,
}

impl WrappingParams {
    /// Parameters for archives written before per-record params existed.
    pub fn legacy() -> Self {
        Self {
            session_key: SymmetricAlgorithm::Des3,
            key_wrap: KeyWrapAlgorithm::Rsa,
            payload_encryption: PayloadAlgorithm::Des3CbcPad,
            payload_wrap: PayloadAlgorithm::Des3CbcPad,
            payload_encryption_iv: Some(LEGACY_IV.to_vec()),
            payload_wrap_iv: Some(LEGACY_IV.to_vec()),
        }
    }

    /// Parameters for unwrapping the caller's 3DES transport key.
    pub fn transport(key_wrap: KeyWrapAlgorithm) -> Self {
        Self {
            key_wrap,
            ..Self::legacy()
        }
    }
}

impl Default for WrappingParams {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Parameters for re-wrapping a recovered key for the caller's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryParams {
    iv: [u8; 8],
}

impl DeliveryParams {
    pub const ALGORITHM: PayloadAlgorithm = PayloadAlgorithm::Des3CbcPad;
    pub const SESSION_KEY: SymmetricAlgorithm = SymmetricAlgorithm::Des3;

    /// Fresh parameters with a random IV from the OS RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut iv = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self { iv })
    }

    pub fn with_iv(iv: [u8; 8]) -> Self {
        Self { iv }
    }

    pub fn iv(&self) -> &[u8; 8] {
        &self.iv
    }
}
