/// Unwraps the caller's transport-wrapped session key.
use std::sync::Arc;

use tracing::debug;

use crate::crypto::params::WrappingParams;
use crate::crypto::sensitive::SessionKey;
use crate::error::CryptoError;
use crate::units::{TokenSession, TransportKeyUnit};

pub struct TransportKeyUnwrapper {
    unit: Arc<dyn TransportKeyUnit>,
}

impl TransportKeyUnwrapper {
    pub fn new(unit: Arc<dyn TransportKeyUnit>) -> Self {
        Self { unit }
    }

    /// Single attempt; a failure is returned as-is.
    pub fn unwrap(
        &self,
        session: &TokenSession,
        wrapped: &[u8],
        params: &WrappingParams,
    ) -> Result<SessionKey, CryptoError> {
        if wrapped.is_empty() {
            return Err(CryptoError::InvalidParameters("empty transport blob".into()));
        }
        let key = self.unit.unwrap_symmetric(session, wrapped, params)?;
        if key.algorithm() != params.session_key || key.as_bytes().len() != params.session_key.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: params.session_key.key_len(),
                got: key.as_bytes().len(),
            });
        }
        debug!(algorithm = ?key.algorithm(), "Transport session key unwrapped");
        Ok(key)
    }
}
