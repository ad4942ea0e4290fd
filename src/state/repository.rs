/// Key record repositories.
///
/// Lookups return `Ok(None)` when no record matches; `Err` is reserved for
/// the backend itself failing.
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use super::models::{KeyId, KeyRecord};
use crate::error::LookupError;

/// Read access to archived key records.
pub trait KeyRepository: Send + Sync {
    fn read_by_key_id(&self, id: &KeyId) -> Result<Option<KeyRecord>, LookupError>;

    /// Find the record archived with this exact certificate DER.
    fn read_by_certificate(&self, certificate_der: &[u8]) -> Result<Option<KeyRecord>, LookupError>;
}

fn find_by_id(records: &[KeyRecord], id: &KeyId) -> Option<KeyRecord> {
    records.iter().find(|r| &r.key_id == id).cloned()
}

fn find_by_certificate(records: &[KeyRecord], certificate_der: &[u8]) -> Option<KeyRecord> {
    records
        .iter()
        .find(|r| r.certificate.as_deref() == Some(certificate_der))
        .cloned()
}

/// In-process repository.
#[derive(Default)]
pub struct MemoryKeyRepository {
    records: RwLock<Vec<KeyRecord>>,
}

impl MemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record with the same key id.
    pub fn insert(&self, record: KeyRecord) {
        let mut records = self.records.write();
        records.retain(|r| r.key_id != record.key_id);
        records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyRepository for MemoryKeyRepository {
    fn read_by_key_id(&self, id: &KeyId) -> Result<Option<KeyRecord>, LookupError> {
        Ok(find_by_id(&self.records.read(), id))
    }

    fn read_by_certificate(&self, certificate_der: &[u8]) -> Result<Option<KeyRecord>, LookupError> {
        Ok(find_by_certificate(&self.records.read(), certificate_der))
    }
}

/// Repository backed by a JSON array of records on disk.
///
/// The file is re-read on every lookup so external edits are picked up
/// without a restart.
pub struct JsonFileKeyRepository {
    path: PathBuf,
}

impl JsonFileKeyRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` to `path`, replacing its contents.
    pub fn save(path: impl AsRef<Path>, records: &[KeyRecord]) -> Result<(), LookupError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| LookupError::Corrupt(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<KeyRecord>, LookupError> {
        let bytes = std::fs::read(&self.path)?;
        let records: Vec<KeyRecord> =
            serde_json::from_slice(&bytes).map_err(|e| LookupError::Corrupt(e.to_string()))?;
        debug!(path = %self.path.display(), records = records.len(), "Loaded key records");
        Ok(records)
    }
}

impl KeyRepository for JsonFileKeyRepository {
    fn read_by_key_id(&self, id: &KeyId) -> Result<Option<KeyRecord>, LookupError> {
        Ok(find_by_id(&self.load()?, id))
    }

    fn read_by_certificate(&self, certificate_der: &[u8]) -> Result<Option<KeyRecord>, LookupError> {
        Ok(find_by_certificate(&self.load()?, certificate_der))
    }
}
