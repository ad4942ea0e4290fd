/// RSA key wrap of symmetric session keys (PKCS#1 v1.5 or OAEP/SHA-256).
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::crypto::params::KeyWrapAlgorithm;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::CryptoError;

/// Recover a session key wrapped under `private_key`'s public half.
pub fn unwrap(
    private_key: &RsaPrivateKey,
    algorithm: KeyWrapAlgorithm,
    wrapped: &[u8],
) -> Result<SensitiveVec, CryptoError> {
    let result = match algorithm {
        KeyWrapAlgorithm::Rsa => private_key.decrypt(Pkcs1v15Encrypt, wrapped),
        KeyWrapAlgorithm::RsaOaep => private_key.decrypt(Oaep::new::<Sha256>(), wrapped),
    };
    result
        .map(SensitiveVec::new)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// Wrap a session key under `public_key`.
pub fn wrap(
    public_key: &RsaPublicKey,
    algorithm: KeyWrapAlgorithm,
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut rng = OsRng;
    let result = match algorithm {
        KeyWrapAlgorithm::Rsa => public_key.encrypt(&mut rng, Pkcs1v15Encrypt, key),
        KeyWrapAlgorithm::RsaOaep => public_key.encrypt(&mut rng, Oaep::new::<Sha256>(), key),
    };
    result.map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Load an RSA private key from a PKCS#8 PEM document.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::Encoding(e.to_string()))
}
