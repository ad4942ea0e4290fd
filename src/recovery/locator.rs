/// Resolves a key reference to an archived record.
use std::sync::Arc;

use tracing::debug;

use crate::crypto::cert::ParsedCertificate;
use crate::error::LookupError;
use crate::state::models::{KeyId, KeyRecord};
use crate::state::repository::KeyRepository;

/// How the caller identified the key to recover.
#[derive(Debug, Clone)]
pub enum KeyReference {
    Id(KeyId),
    Certificate(ParsedCertificate),
}

pub struct KeyRecordLocator {
    repository: Arc<dyn KeyRepository>,
}

impl KeyRecordLocator {
    pub fn new(repository: Arc<dyn KeyRepository>) -> Self {
        Self { repository }
    }

    pub fn find_by_id(&self, id: &KeyId) -> Result<Option<KeyRecord>, LookupError> {
        debug!(key_id = %id, "Looking up key record by id");
        self.repository.read_by_key_id(id)
    }

    pub fn find_by_certificate(&self, certificate_der: &[u8]) -> Result<Option<KeyRecord>, LookupError> {
        debug!(cert_len = certificate_der.len(), "Looking up key record by certificate");
        self.repository.read_by_certificate(certificate_der)
    }

    pub fn find(&self, reference: &KeyReference) -> Result<Option<KeyRecord>, LookupError> {
        match reference {
            KeyReference::Id(id) => self.find_by_id(id),
            KeyReference::Certificate(cert) => self.find_by_certificate(&cert.der),
        }
    }
}
