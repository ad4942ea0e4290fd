/// In-process token units backed by RSA key pairs loaded from PKCS#8 PEM.
///
/// Archives use a two-layer envelope:
///
/// ```text
/// ArchiveEnvelope ::= SEQUENCE {
///     wrappedSessionKey  OCTET STRING,  -- session key under the storage RSA key
///     payload            OCTET STRING   -- PKCS#8 private key, CBC-encrypted
/// }
/// ```
use der::asn1::OctetStringRef;
use der::{Decode, Sequence};
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use super::{PrivateKeyHandle, StorageKeyUnit, TokenSession, TransportKeyUnit};
use crate::crypto::params::{DeliveryParams, PayloadAlgorithm, WrappingParams};
use crate::crypto::sensitive::{SensitiveVec, SessionKey};
use crate::crypto::{cipher, rsa_wrap};
use crate::error::CryptoError;
use crate::state::models::RecoveryPath;

/// DER envelope around an archived private key.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ArchiveEnvelope<'a> {
    pub wrapped_session_key: OctetStringRef<'a>,
    pub payload: OctetStringRef<'a>,
}

impl<'a> ArchiveEnvelope<'a> {
    pub fn new(wrapped_session_key: &'a [u8], payload: &'a [u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            wrapped_session_key: OctetStringRef::new(wrapped_session_key)?,
            payload: OctetStringRef::new(payload)?,
        })
    }

    pub fn parse(bytes: &'a [u8]) -> Result<Self, CryptoError> {
        Ok(Self::from_der(bytes)?)
    }
}

/// Payload algorithm and IV that apply to `path`.
pub(crate) fn payload_params(
    params: &WrappingParams,
    path: RecoveryPath,
) -> Result<(PayloadAlgorithm, &[u8]), CryptoError> {
    let (algorithm, iv) = match path {
        RecoveryPath::EncryptedAtRest => (params.payload_encryption, &params.payload_encryption_iv),
        RecoveryPath::DirectUnwrap => (params.payload_wrap, &params.payload_wrap_iv),
    };
    let iv = iv
        .as_deref()
        .ok_or_else(|| CryptoError::InvalidParameters(format!("no IV for {algorithm:?} payload")))?;
    Ok((algorithm, iv))
}

/// Transport unit holding the private half of the client-facing transport key.
pub struct SoftwareTransportUnit {
    private_key: RsaPrivateKey,
}

impl SoftwareTransportUnit {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(rsa_wrap::private_key_from_pem(pem)?))
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }
}

impl TransportKeyUnit for SoftwareTransportUnit {
    fn unwrap_symmetric(
        &self,
        session: &TokenSession,
        wrapped: &[u8],
        params: &WrappingParams,
    ) -> Result<SessionKey, CryptoError> {
        debug!(token = session.name(), key_wrap = ?params.key_wrap, "Unwrapping transport session key");
        let bytes = rsa_wrap::unwrap(&self.private_key, params.key_wrap, wrapped)?;
        SessionKey::new(params.session_key, bytes)
    }
}

/// Storage unit holding the private half of the archive storage key.
pub struct SoftwareStorageUnit {
    private_key: RsaPrivateKey,
    legacy: WrappingParams,
}

impl SoftwareStorageUnit {
    pub fn new(private_key: RsaPrivateKey, legacy: WrappingParams) -> Self {
        Self { private_key, legacy }
    }

    pub fn from_pkcs8_pem(pem: &str, legacy: WrappingParams) -> Result<Self, CryptoError> {
        Ok(Self::new(rsa_wrap::private_key_from_pem(pem)?, legacy))
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    fn open(
        &self,
        data: &[u8],
        params: &WrappingParams,
        path: RecoveryPath,
    ) -> Result<SensitiveVec, CryptoError> {
        let (algorithm, iv) = payload_params(params, path)?;
        let envelope = ArchiveEnvelope::parse(data)?;

        let session_key = rsa_wrap::unwrap(
            &self.private_key,
            params.key_wrap,
            envelope.wrapped_session_key.as_bytes(),
        )?;
        let session_key = SessionKey::new(params.session_key, session_key)?;

        cipher::decrypt(algorithm, session_key.as_bytes(), iv, envelope.payload.as_bytes())
    }
}

impl StorageKeyUnit for SoftwareStorageUnit {
    fn legacy_wrapping_params(&self) -> WrappingParams {
        self.legacy.clone()
    }

    fn decrypt_internal(
        &self,
        session: &TokenSession,
        data: &[u8],
        params: &WrappingParams,
    ) -> Result<SensitiveVec, CryptoError> {
        debug!(token = session.name(), "Decrypting archived key");
        self.open(data, params, RecoveryPath::EncryptedAtRest)
    }

    fn unwrap(
        &self,
        session: &TokenSession,
        data: &[u8],
        public_key: &[u8],
        params: &WrappingParams,
    ) -> Result<PrivateKeyHandle, CryptoError> {
        debug!(token = session.name(), "Unwrapping archived key");
        let expected = RsaPublicKey::from_public_key_der(public_key)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;

        let der = self.open(data, params, RecoveryPath::DirectUnwrap)?;
        let handle = PrivateKeyHandle::from_pkcs8_der(der)?;

        if handle.key().to_public_key() != expected {
            return Err(CryptoError::KeyMismatch(
                "unwrapped key does not belong to the archived public key".into(),
            ));
        }
        Ok(handle)
    }

    fn wrap_private_key(
        &self,
        session: &TokenSession,
        key: &PrivateKeyHandle,
        session_key: &SessionKey,
        params: &DeliveryParams,
    ) -> Result<Vec<u8>, CryptoError> {
        debug!(token = session.name(), "Wrapping token-held key for delivery");
        cipher::encrypt(
            DeliveryParams::ALGORITHM,
            session_key.as_bytes(),
            params.iv(),
            key.pkcs8(),
        )
    }
}
