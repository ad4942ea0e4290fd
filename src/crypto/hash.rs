/// BLAKE3 hashing utilities.
///
/// Only used to fingerprint public keys in audit messages; nothing here is
/// security-critical for the recovery path itself.

/// Hash arbitrary data with BLAKE3.
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Short hex fingerprint (first 16 bytes of the BLAKE3 digest).
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(&hash(data)[..16])
}
