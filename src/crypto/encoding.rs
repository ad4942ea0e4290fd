/// Text encodings used on the request boundary.
///
/// Token clients exchange binary fields in a `#xx` escaped form; public
/// keys go out as standard base64.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CryptoError;

/// Escape every byte as `#` followed by two lowercase hex digits.
pub fn special_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        out.push('#');
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Reverse of [`special_encode`], also accepting `%xx` escapes and `+` for a space.
///
/// Any other character passes through as its UTF-8 bytes.
pub fn special_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 3 + 1);
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' | b'%' => {
                let pair = bytes.get(i + 1..i + 3).ok_or_else(|| {
                    CryptoError::Encoding(format!("truncated escape at offset {i}"))
                })?;
                let hi = hex_digit(pair[0]);
                let lo = hex_digit(pair[1]);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => {
                        return Err(CryptoError::Encoding(format!(
                            "invalid escape at offset {i}"
                        )))
                    }
                }
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Standard-alphabet base64 without line breaks.
pub fn base64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn base64_decode(input: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(input)
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

/// Serde adapter for optional byte fields stored as hex strings.
pub mod hex_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
