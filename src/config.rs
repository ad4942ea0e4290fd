/// Deployment configuration for the recovery service.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::params::{KeyWrapAlgorithm, WrappingParams};
use crate::error::{RecoveryError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Name of the token session recoveries run on.
    pub token_name: String,
    /// Unwrap transport keys with RSA-OAEP instead of PKCS#1 v1.5.
    pub use_oaep_key_wrap: bool,
    /// Recover legacy archives (no at-rest flag) by internal decrypt.
    pub allow_encrypt_decrypt_recovery: bool,
    /// Parameters applied to archives that carry none.
    pub legacy_wrapping_params: WrappingParams,
    /// Upper bound on one recovery, enforced by the async service.
    pub deadline_ms: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            token_name: "internal".to_string(),
            use_oaep_key_wrap: false,
            allow_encrypt_decrypt_recovery: false,
            legacy_wrapping_params: WrappingParams::legacy(),
            deadline_ms: None,
        }
    }
}

impl RecoveryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RecoveryError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn transport_key_wrap(&self) -> KeyWrapAlgorithm {
        if self.use_oaep_key_wrap {
            KeyWrapAlgorithm::RsaOaep
        } else {
            KeyWrapAlgorithm::Rsa
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
