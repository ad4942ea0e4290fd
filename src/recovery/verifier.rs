/// Checks that a recovered private key belongs to the archived public key.
///
/// Both sides are reduced to their RSA modulus and public exponent, which
/// are compared as integers so encoding differences such as leading zero
/// bytes do not matter.
use der::Decode;
use pkcs8::PrivateKeyInfo;
use rsa::BigUint;
use spki::SubjectPublicKeyInfoRef;
use tracing::warn;

use crate::error::CryptoError;

pub struct KeyPairVerifier;

impl KeyPairVerifier {
    /// `public_key` is DER SubjectPublicKeyInfo, `private_key` DER PKCS#8.
    /// Any parse failure counts as a mismatch.
    pub fn verify(public_key: &[u8], private_key: &[u8]) -> bool {
        let public = match public_components(public_key) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Unable to parse archived public key");
                return false;
            }
        };
        let private = match private_components(private_key) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Unable to parse recovered private key");
                return false;
            }
        };
        public == private
    }
}

fn public_components(spki_der: &[u8]) -> Result<(BigUint, BigUint), CryptoError> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)?;
    let key_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| CryptoError::Encoding("public key BIT STRING has unused bits".into()))?;
    let key = pkcs1::RsaPublicKey::from_der(key_bytes)?;
    Ok((
        BigUint::from_bytes_be(key.modulus.as_bytes()),
        BigUint::from_bytes_be(key.public_exponent.as_bytes()),
    ))
}

fn private_components(pkcs8_der: &[u8]) -> Result<(BigUint, BigUint), CryptoError> {
    let info = PrivateKeyInfo::from_der(pkcs8_der)?;
    let key = pkcs1::RsaPrivateKey::from_der(info.private_key)?;
    Ok((
        BigUint::from_bytes_be(key.modulus.as_bytes()),
        BigUint::from_bytes_be(key.public_exponent.as_bytes()),
    ))
}
