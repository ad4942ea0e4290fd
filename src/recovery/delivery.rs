/// Re-wraps a recovered key for the caller and encodes its public key.
use std::sync::Arc;

use crate::crypto::asn1::{spki_algorithm, KeyAlgorithm};
use crate::crypto::cipher;
use crate::crypto::encoding::{base64_encode, special_encode};
use crate::crypto::params::DeliveryParams;
use crate::crypto::sensitive::SessionKey;
use crate::error::CryptoError;
use crate::recovery::engine::RecoveredKey;
use crate::units::{StorageKeyUnit, TokenSession};

pub struct ResponseWrapper {
    unit: Arc<dyn StorageKeyUnit>,
}

impl ResponseWrapper {
    pub fn new(unit: Arc<dyn StorageKeyUnit>) -> Self {
        Self { unit }
    }

    /// Encrypt the PKCS#8 form of `key` under the caller's session key.
    pub fn wrap_for_delivery(
        &self,
        session: &TokenSession,
        key: &RecoveredKey,
        session_key: &SessionKey,
        params: &DeliveryParams,
    ) -> Result<Vec<u8>, CryptoError> {
        if session_key.algorithm() != DeliveryParams::SESSION_KEY {
            return Err(CryptoError::InvalidParameters(format!(
                "delivery needs a {:?} session key, got {:?}",
                DeliveryParams::SESSION_KEY,
                session_key.algorithm()
            )));
        }
        match key {
            RecoveredKey::Bytes(der) => cipher::encrypt(
                DeliveryParams::ALGORITHM,
                session_key.as_bytes(),
                params.iv(),
                der.as_bytes(),
            ),
            RecoveredKey::Handle(handle) => {
                self.unit
                    .wrap_private_key(session, handle, session_key, params)
            }
        }
    }

    /// Base64 for RSA keys, `#xx` escaping for EC keys.
    pub fn encode_public_key(spki_der: &[u8]) -> Result<String, CryptoError> {
        match spki_algorithm(spki_der)? {
            KeyAlgorithm::Rsa => Ok(base64_encode(spki_der)),
            KeyAlgorithm::Ec => Ok(special_encode(spki_der)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::asn1::EC_PUBLIC_KEY_OID;
    use crate::crypto::encoding::base64_decode;
    use crate::crypto::params::{PayloadAlgorithm, SymmetricAlgorithm, WrappingParams};
    use crate::crypto::sensitive::SensitiveVec;
    use crate::testing::fixtures;
    use crate::units::{PrivateKeyHandle, SoftwareStorageUnit};
    use der::asn1::{BitStringRef, ObjectIdentifier};
    use der::Encode;
    use spki::{AlgorithmIdentifier, SubjectPublicKeyInfo};

    fn wrapper() -> ResponseWrapper {
        ResponseWrapper::new(Arc::new(SoftwareStorageUnit::new(
            fixtures().storage.clone(),
            WrappingParams::legacy(),
        )))
    }

    fn des3_key() -> SessionKey {
        SessionKey::new(SymmetricAlgorithm::Des3, SensitiveVec::new(vec![0x3c; 24])).unwrap()
    }

    #[test]
    fn test_both_forms_deliver_the_same_pkcs8() {
        let f = fixtures();
        let session = TokenSession::new("internal");
        let params = DeliveryParams::generate().unwrap();
        let key = des3_key();

        let from_bytes = wrapper()
            .wrap_for_delivery(
                &session,
                &RecoveredKey::Bytes(SensitiveVec::new(f.user_pkcs8())),
                &key,
                &params,
            )
            .unwrap();
        let from_handle = wrapper()
            .wrap_for_delivery(
                &session,
                &RecoveredKey::Handle(
                    PrivateKeyHandle::from_pkcs8_der(SensitiveVec::new(f.user_pkcs8())).unwrap(),
                ),
                &key,
                &params,
            )
            .unwrap();
        assert_eq!(from_bytes, from_handle);

        let plain =
            cipher::decrypt(PayloadAlgorithm::Des3CbcPad, key.as_bytes(), params.iv(), &from_bytes)
                .unwrap();
        assert_eq!(plain.as_bytes(), f.user_pkcs8().as_slice());
    }

    #[test]
    fn test_rejects_non_des3_session_key() {
        let key = SessionKey::new(SymmetricAlgorithm::Aes128, SensitiveVec::new(vec![1; 16])).unwrap();
        let err = wrapper()
            .wrap_for_delivery(
                &TokenSession::new("internal"),
                &RecoveredKey::Bytes(SensitiveVec::new(vec![0x30, 0x00])),
                &key,
                &DeliveryParams::generate().unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidParameters(_)));
    }

    #[test]
    fn test_encode_rsa_public_key_as_base64() {
        let spki = fixtures().user_spki();
        let encoded = ResponseWrapper::encode_public_key(&spki).unwrap();
        assert_eq!(base64_decode(&encoded).unwrap(), spki);
    }

    #[test]
    fn test_encode_ec_public_key_as_special() {
        let prime256v1 = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
        let point = [0x04u8; 65];
        let spki = SubjectPublicKeyInfo {
            algorithm: AlgorithmIdentifier {
                oid: EC_PUBLIC_KEY_OID,
                parameters: Some(prime256v1),
            },
            subject_public_key: BitStringRef::from_bytes(&point).unwrap(),
        }
        .to_der()
        .unwrap();

        let encoded = ResponseWrapper::encode_public_key(&spki).unwrap();
        assert!(encoded.starts_with("#30#"));
        assert_eq!(encoded.len(), spki.len() * 3);
    }

    #[test]
    fn test_encode_rejects_unknown_algorithm() {
        let ed25519 = ObjectIdentifier::new_unwrap("1.3.101.112");
        let spki = SubjectPublicKeyInfo::<der::asn1::AnyRef<'_>, BitStringRef<'_>> {
            algorithm: AlgorithmIdentifier {
                oid: ed25519,
                parameters: None,
            },
            subject_public_key: BitStringRef::from_bytes(&[0u8; 32]).unwrap(),
        }
        .to_der()
        .unwrap();
        assert!(matches!(
            ResponseWrapper::encode_public_key(&spki),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }
}
