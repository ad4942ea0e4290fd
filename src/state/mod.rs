/// Archive state: request and key record models plus the repositories
/// that hold archived key pairs.
pub mod models;
pub mod repository;

pub use models::{AtRest, KeyId, KeyRecord, RecoveryPath, RecoveryRequest};
pub use repository::{JsonFileKeyRepository, KeyRepository, MemoryKeyRepository};
