/// Recovers an archived private key through the storage unit.
use std::sync::Arc;

use tracing::debug;

use crate::crypto::asn1::normalize_der_length;
use crate::crypto::params::WrappingParams;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::CryptoError;
use crate::state::models::KeyRecord;
use crate::units::{PrivateKeyHandle, StorageKeyUnit, TokenSession};

/// A recovered private key, in whichever form its path produces.
#[derive(Debug)]
pub enum RecoveredKey {
    /// Raw PKCS#8 bytes from the encrypted-at-rest path.
    Bytes(SensitiveVec),
    /// Token-held key from the direct-unwrap path.
    Handle(PrivateKeyHandle),
}

pub struct KeyRecoveryEngine {
    unit: Arc<dyn StorageKeyUnit>,
}

impl KeyRecoveryEngine {
    pub fn new(unit: Arc<dyn StorageKeyUnit>) -> Self {
        Self { unit }
    }

    /// The record's own parameters, or the unit's legacy set.
    pub fn params_for(&self, record: &KeyRecord) -> WrappingParams {
        record
            .wrapping_params
            .clone()
            .unwrap_or_else(|| self.unit.legacy_wrapping_params())
    }

    pub fn recover_direct(
        &self,
        session: &TokenSession,
        record: &KeyRecord,
    ) -> Result<PrivateKeyHandle, CryptoError> {
        let params = self.params_for(record);
        debug!(key_id = %record.key_id, "Recovering key by direct unwrap");
        self.unit
            .unwrap(session, &record.private_key_data, &record.public_key, &params)
    }

    /// Decrypt the archive and trim any token padding past the PKCS#8 structure.
    pub fn recover_encrypted(
        &self,
        session: &TokenSession,
        record: &KeyRecord,
    ) -> Result<SensitiveVec, CryptoError> {
        let params = self.params_for(record);
        debug!(key_id = %record.key_id, "Recovering key by internal decrypt");
        let decrypted = self
            .unit
            .decrypt_internal(session, &record.private_key_data, &params)?;
        normalize_der_length(decrypted)
    }
}
