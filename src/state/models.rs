/// Request and archive models.
///
/// Byte fields of [`KeyRecord`] serialize as hex so a repository file can
/// be inspected and edited by hand.
use std::fmt;
use std::str::FromStr;

use rsa::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::encoding::hex_option;
use crate::crypto::params::WrappingParams;

/// A recovery request as received from the token client.
///
/// Output fields are written back by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub request_id: String,
    pub device_id: String,
    pub user_id: String,
    /// Special-encoded session key, RSA-wrapped to the transport key.
    #[serde(default)]
    pub transport_wrapped_key: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub key_identifier: Option<String>,

    #[serde(default)]
    pub wrapped_private_key: Option<String>,
    #[serde(default)]
    pub encoded_public_key: Option<String>,
    #[serde(default)]
    pub delivery_iv: Option<String>,
    #[serde(default)]
    pub result_code: Option<u32>,
    #[serde(default)]
    pub delay_commit: bool,
}

impl RecoveryRequest {
    /// Owner identity in `deviceId:userId` form.
    pub fn subject_id(&self) -> String {
        format!("{}:{}", self.device_id, self.user_id)
    }
}

/// Archive identifier: an arbitrary-precision non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct KeyId(BigUint);

impl KeyId {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key identifier {0:?}")]
pub struct ParseKeyIdError(String);

impl FromStr for KeyId {
    type Err = ParseKeyIdError;

    /// Accepts decimal, or hex with a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (digits, radix) = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (trimmed, 10),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(ParseKeyIdError(s.to_string()));
        }
        BigUint::parse_bytes(digits.as_bytes(), radix)
            .map(Self)
            .ok_or_else(|| ParseKeyIdError(s.to_string()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for KeyId {
    type Error = ParseKeyIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// How an archive's private key is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtRest {
    /// Encrypted under a session key; recovered as raw bytes.
    Encrypted,
    /// Wrapped for a token unwrap; recovered as an opaque handle.
    Direct,
    /// Written before the flag existed; resolved by deployment policy.
    #[default]
    LegacyUnspecified,
}

/// Recovery strategy chosen for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPath {
    EncryptedAtRest,
    DirectUnwrap,
}

impl AtRest {
    /// Resolve to a path. Legacy archives follow `allow_encrypt_decrypt_recovery`.
    pub fn resolve(self, allow_encrypt_decrypt_recovery: bool) -> RecoveryPath {
        match self {
            Self::Encrypted => RecoveryPath::EncryptedAtRest,
            Self::Direct => RecoveryPath::DirectUnwrap,
            Self::LegacyUnspecified if allow_encrypt_decrypt_recovery => RecoveryPath::EncryptedAtRest,
            Self::LegacyUnspecified => RecoveryPath::DirectUnwrap,
        }
    }
}

/// An archived key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: KeyId,
    /// Certificate DER, when the archive was created from one.
    #[serde(default, with = "hex_option")]
    pub certificate: Option<Vec<u8>>,
    /// DER SubjectPublicKeyInfo.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// Archived private key, in the storage unit's envelope format.
    #[serde(with = "hex::serde")]
    pub private_key_data: Vec<u8>,
    #[serde(default)]
    pub wrapping_params: Option<WrappingParams>,
    #[serde(default)]
    pub encrypted_at_rest: AtRest,
    /// `deviceId:userId` of the archiving subject.
    #[serde(default)]
    pub owner: Option<String>,
}
