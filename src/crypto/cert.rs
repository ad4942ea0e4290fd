/// Certificate text normalization and X.509 parsing.
use der::{Decode, Encode};
use x509_cert::Certificate;

use crate::crypto::encoding::base64_decode;
use crate::error::CryptoError;

/// A decoded certificate, reduced to what key lookup needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    /// Full certificate DER.
    pub der: Vec<u8>,
    /// DER SubjectPublicKeyInfo from the certificate.
    pub public_key: Vec<u8>,
}

/// Undo the quoting token clients apply to certificate strings.
///
/// A backslash is dropped together with the character after it; double
/// quotes and spaces are dropped.
pub fn normalize_certificate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' | ' ' => {}
            c => out.push(c),
        }
    }
    out
}

/// Remove every `-----...-----` armour line marker.
fn strip_armour(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("-----") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        match after.find("-----") {
            Some(end) => rest = &after[end + 5..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Normalize, de-armour, base64-decode and parse a certificate string.
pub fn decode_certificate(raw: &str) -> Result<ParsedCertificate, CryptoError> {
    let normalized = normalize_certificate(raw);
    let body: String = strip_armour(&normalized)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(CryptoError::Encoding("certificate is empty".into()));
    }

    let der = base64_decode(&body)?;
    let certificate = Certificate::from_der(&der)?;
    let public_key = certificate.tbs_certificate.subject_public_key_info.to_der()?;
    Ok(ParsedCertificate { der, public_key })
}
