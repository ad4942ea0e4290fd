/// DER helpers: outer TLV length and public key algorithm identification.
use der::asn1::ObjectIdentifier;
use der::{Decode, Encode, Header, SliceReader};
use spki::SubjectPublicKeyInfoRef;

use crate::crypto::sensitive::SensitiveVec;
use crate::error::CryptoError;

/// rsaEncryption (PKCS#1).
pub const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey (RFC 5480).
pub const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Public key algorithm named by a SubjectPublicKeyInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
}

/// Total length (header plus content) of the TLV at the start of `bytes`.
pub fn tlv_len(bytes: &[u8]) -> Result<usize, CryptoError> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    let total = (header.encoded_len()? + header.length)?;
    Ok(usize::try_from(total)?)
}

/// Drop trailing bytes some tokens leave after a decrypted DER structure.
///
/// A buffer longer than its outer TLV is cut to the TLV length and the
/// padded original is scrubbed. A buffer shorter than the TLV claims is
/// an error.
pub fn normalize_der_length(buf: SensitiveVec) -> Result<SensitiveVec, CryptoError> {
    let expected = tlv_len(buf.as_bytes())?;
    match buf.len().cmp(&expected) {
        std::cmp::Ordering::Equal => Ok(buf),
        std::cmp::Ordering::Greater => {
            tracing::debug!(
                decrypted_len = buf.len(),
                der_len = expected,
                "Trimming trailing bytes after DER structure"
            );
            Ok(buf.into_prefix(expected))
        }
        std::cmp::Ordering::Less => Err(CryptoError::Encoding(format!(
            "DER structure claims {expected} bytes but only {} are present",
            buf.len()
        ))),
    }
}

/// Identify the algorithm of a DER SubjectPublicKeyInfo.
pub fn spki_algorithm(spki_der: &[u8]) -> Result<KeyAlgorithm, CryptoError> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)?;
    let oid = spki.algorithm.oid;
    if oid == RSA_ENCRYPTION_OID {
        Ok(KeyAlgorithm::Rsa)
    } else if oid == EC_PUBLIC_KEY_OID {
        Ok(KeyAlgorithm::Ec)
    } else {
        Err(CryptoError::UnsupportedAlgorithm(oid.to_string()))
    }
}
