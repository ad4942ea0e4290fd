//! Shared fixtures for unit tests.
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use der::asn1::{BitString, ObjectIdentifier};
use der::{Decode, Encode};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::{Certificate, TbsCertificate, Version};

use crate::audit::MemoryAuditSink;
use crate::config::RecoveryConfig;
use crate::crypto::encoding::{base64_encode, special_decode, special_encode};
use crate::crypto::params::{
    DeliveryParams, KeyWrapAlgorithm, PayloadAlgorithm, WrappingParams, LEGACY_IV,
};
use crate::crypto::sensitive::{SensitiveVec, SessionKey};
use crate::crypto::{cipher, rsa_wrap};
use crate::error::{CryptoError, LookupError};
use crate::outcome::RecoveryOutcome;
use crate::recovery::{CallerContext, RecoveryOrchestrator};
use crate::state::models::{AtRest, KeyId, KeyRecord, RecoveryPath, RecoveryRequest};
use crate::state::repository::{KeyRepository, MemoryKeyRepository};
use crate::units::software::{payload_params, ArchiveEnvelope};
use crate::units::{
    PrivateKeyHandle, SoftwareStorageUnit, SoftwareTransportUnit, StorageKeyUnit, TokenSession,
};

/// 3DES session key clients wrap to the transport key in tests.
pub const SESSION_KEY: [u8; 24] = [0x5e; 24];

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

pub struct Fixtures {
    pub storage: RsaPrivateKey,
    pub transport: RsaPrivateKey,
    pub user: RsaPrivateKey,
    pub other: RsaPrivateKey,
}

/// Keys are generated once per test binary.
pub fn fixtures() -> &'static Fixtures {
    static FIXTURES: OnceLock<Fixtures> = OnceLock::new();
    FIXTURES.get_or_init(|| {
        let generate = || RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        Fixtures {
            storage: generate(),
            transport: generate(),
            user: generate(),
            other: generate(),
        }
    })
}

impl Fixtures {
    pub fn storage_pem(&self) -> String {
        self.storage.to_pkcs8_pem(LineEnding::LF).unwrap().as_str().to_owned()
    }

    pub fn user_pkcs8(&self) -> Vec<u8> {
        self.user.to_pkcs8_der().unwrap().as_bytes().to_vec()
    }

    pub fn user_spki(&self) -> Vec<u8> {
        spki_of(&self.user)
    }

    pub fn other_spki(&self) -> Vec<u8> {
        spki_of(&self.other)
    }

    pub fn user_cert(&self) -> Vec<u8> {
        certificate_for(&self.user, "CN=alice")
    }

    pub fn other_cert(&self) -> Vec<u8> {
        certificate_for(&self.other, "CN=bob")
    }
}

fn spki_of(key: &RsaPrivateKey) -> Vec<u8> {
    key.to_public_key().to_public_key_der().unwrap().as_bytes().to_vec()
}

/// Minimal certificate for `key`. The signature is a placeholder; nothing
/// in the recovery path validates it.
pub fn certificate_for(key: &RsaPrivateKey, subject: &str) -> Vec<u8> {
    let spki = SubjectPublicKeyInfoOwned::from_der(&spki_of(key)).unwrap();
    let algorithm = AlgorithmIdentifierOwned {
        oid: SHA256_WITH_RSA,
        parameters: None,
    };
    let name = Name::from_str(subject).unwrap();
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[0x01, 0x02]).unwrap(),
        signature: algorithm.clone(),
        issuer: name.clone(),
        validity: Validity::from_now(Duration::from_secs(3600)).unwrap(),
        subject: name,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    Certificate {
        tbs_certificate,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&[0u8; 16]).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// Seal a PKCS#8 private key into an archive for the storage key, using
/// the payload algorithm and IV `params` gives for `path`.
pub fn seal_archive(
    storage_key: &RsaPublicKey,
    params: &WrappingParams,
    path: RecoveryPath,
    private_key_der: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (algorithm, iv) = payload_params(params, path)?;

    let mut session_key = SensitiveVec::new(vec![0u8; params.session_key.key_len()]);
    OsRng
        .try_fill_bytes(session_key.as_mut_slice())
        .map_err(|e| CryptoError::Rng(e.to_string()))?;

    let wrapped_session_key = rsa_wrap::wrap(storage_key, params.key_wrap, session_key.as_bytes())?;
    let payload = cipher::encrypt(algorithm, session_key.as_bytes(), iv, private_key_der)?;
    Ok(ArchiveEnvelope::new(&wrapped_session_key, &payload)?.to_der()?)
}

/// Repository wrapper that counts lookups and can be made to fail.
#[derive(Default)]
pub struct CountingRepository {
    inner: MemoryKeyRepository,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl CountingRepository {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

impl KeyRepository for CountingRepository {
    fn read_by_key_id(&self, id: &KeyId) -> Result<Option<KeyRecord>, LookupError> {
        self.check()?;
        self.inner.read_by_key_id(id)
    }

    fn read_by_certificate(&self, certificate_der: &[u8]) -> Result<Option<KeyRecord>, LookupError> {
        self.check()?;
        self.inner.read_by_certificate(certificate_der)
    }
}

/// Storage unit wrapper that counts private-key operations.
pub struct CountingStorageUnit {
    inner: SoftwareStorageUnit,
    decrypts: AtomicUsize,
    unwraps: AtomicUsize,
}

impl CountingStorageUnit {
    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn unwraps(&self) -> usize {
        self.unwraps.load(Ordering::SeqCst)
    }
}

impl StorageKeyUnit for CountingStorageUnit {
    fn legacy_wrapping_params(&self) -> WrappingParams {
        self.inner.legacy_wrapping_params()
    }

    fn decrypt_internal(
        &self,
        session: &TokenSession,
        data: &[u8],
        params: &WrappingParams,
    ) -> Result<SensitiveVec, CryptoError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt_internal(session, data, params)
    }

    fn unwrap(
        &self,
        session: &TokenSession,
        data: &[u8],
        public_key: &[u8],
        params: &WrappingParams,
    ) -> Result<PrivateKeyHandle, CryptoError> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap(session, data, public_key, params)
    }

    fn wrap_private_key(
        &self,
        session: &TokenSession,
        key: &PrivateKeyHandle,
        session_key: &SessionKey,
        params: &DeliveryParams,
    ) -> Result<Vec<u8>, CryptoError> {
        self.inner.wrap_private_key(session, key, session_key, params)
    }
}

/// An orchestrator wired to software units, an in-memory repository and
/// an in-memory audit sink.
pub struct Harness {
    pub orchestrator: RecoveryOrchestrator,
    pub repository: Arc<CountingRepository>,
    pub storage: Arc<CountingStorageUnit>,
    pub audit: Arc<MemoryAuditSink>,
    key_wrap: KeyWrapAlgorithm,
}

impl Harness {
    pub fn new(config: RecoveryConfig) -> Self {
        let f = fixtures();
        let key_wrap = config.transport_key_wrap();
        let repository = Arc::new(CountingRepository::default());
        let storage = Arc::new(CountingStorageUnit {
            inner: SoftwareStorageUnit::new(f.storage.clone(), config.legacy_wrapping_params.clone()),
            decrypts: AtomicUsize::new(0),
            unwraps: AtomicUsize::new(0),
        });
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RecoveryOrchestrator::new(
            config.clone(),
            TokenSession::shared(config.token_name.clone()),
            Arc::new(SoftwareTransportUnit::new(f.transport.clone())),
            storage.clone(),
            repository.clone(),
            audit.clone(),
        );
        Self {
            orchestrator,
            repository,
            storage,
            audit,
            key_wrap,
        }
    }

    pub fn insert(&self, record: KeyRecord) {
        self.repository.inner.insert(record);
    }

    /// The user's key archived under `id` with legacy params.
    pub fn record(&self, id: u64, at_rest: AtRest) -> KeyRecord {
        let f = fixtures();
        let path = match at_rest {
            AtRest::Direct => RecoveryPath::DirectUnwrap,
            AtRest::Encrypted | AtRest::LegacyUnspecified => RecoveryPath::EncryptedAtRest,
        };
        let archive = seal_archive(
            &f.storage.to_public_key(),
            &WrappingParams::legacy(),
            path,
            &f.user_pkcs8(),
        )
        .unwrap();
        KeyRecord {
            key_id: KeyId::from(id),
            certificate: None,
            public_key: f.user_spki(),
            private_key_data: archive,
            wrapping_params: None,
            encrypted_at_rest: at_rest,
            owner: Some("token-01:alice".into()),
        }
    }

    /// Encrypted-at-rest record whose plaintext has `padding` zero bytes
    /// after the PKCS#8 structure.
    pub fn padded_record(&self, id: u64, padding: usize) -> KeyRecord {
        let f = fixtures();
        let mut plaintext = f.user_pkcs8();
        plaintext.extend(std::iter::repeat(0u8).take(padding));

        let session_key = [0x29u8; 24];
        let wrapped =
            rsa_wrap::wrap(&f.storage.to_public_key(), KeyWrapAlgorithm::Rsa, &session_key).unwrap();
        let payload =
            cipher::encrypt(PayloadAlgorithm::Des3CbcPad, &session_key, &LEGACY_IV, &plaintext).unwrap();
        let mut record = self.record(id, AtRest::Encrypted);
        record.private_key_data = ArchiveEnvelope::new(&wrapped, &payload).unwrap().to_der().unwrap();
        record
    }

    pub fn transport_blob(&self, algorithm: KeyWrapAlgorithm) -> String {
        let wrapped =
            rsa_wrap::wrap(&fixtures().transport.to_public_key(), algorithm, &SESSION_KEY).unwrap();
        special_encode(&wrapped)
    }

    fn base_request(&self) -> RecoveryRequest {
        RecoveryRequest {
            request_id: "req-1".into(),
            device_id: "token-01".into(),
            user_id: "alice".into(),
            transport_wrapped_key: Some(self.transport_blob(self.key_wrap)),
            ..Default::default()
        }
    }

    pub fn request_with_id(&self, id: &str) -> RecoveryRequest {
        RecoveryRequest {
            key_identifier: Some(id.into()),
            ..self.base_request()
        }
    }

    /// Certificate sent the way token clients quote it.
    pub fn request_with_certificate(&self, der: &[u8]) -> RecoveryRequest {
        let b64 = base64_encode(der);
        let lines: Vec<&str> = b64
            .as_bytes()
            .chunks(64)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        let certificate = format!(
            "\"-----BEGIN CERTIFICATE-----\\n{}\\n-----END CERTIFICATE-----\"",
            lines.join("\\n")
        );
        RecoveryRequest {
            certificate: Some(certificate),
            ..self.base_request()
        }
    }

    pub fn recover(&self, request: &mut RecoveryRequest) -> RecoveryOutcome {
        self.orchestrator
            .recover(&CallerContext::new("ra-agent"), request)
    }

    /// Decrypt the delivered key with the test session key.
    pub fn open_delivery(&self, request: &RecoveryRequest) -> Vec<u8> {
        let wrapped = special_decode(request.wrapped_private_key.as_deref().unwrap()).unwrap();
        let iv = special_decode(request.delivery_iv.as_deref().unwrap()).unwrap();
        cipher::decrypt(PayloadAlgorithm::Des3CbcPad, &SESSION_KEY, &iv, &wrapped)
            .unwrap()
            .as_bytes()
            .to_vec()
    }
}
