/// Result codes and the per-request recovery outcome.
///
/// The outcome is the only channel through which key material leaves the
/// core, and it only ever carries the delivery-wrapped form.
use serde::{Deserialize, Serialize};

/// Stable result codes written back onto the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    MissingTransportKey,
    MissingKeyReference,
    TransportKeyUnwrapFailed,
    InvalidCertificateEncoding,
    PublicKeyMismatch,
    KeyRecordNotFound,
    KeyRecordLookupError,
    PrivateKeyRecoveryFailed,
    KeyVerificationFailed,
    DeliveryWrapFailed,
    AuditWriteFailed,
    CryptoError,
}

impl ResultCode {
    /// Numeric value stored in the request's result field.
    pub fn value(self) -> u32 {
        match self {
            Self::Success => 1,
            Self::MissingTransportKey => 2,
            Self::MissingKeyReference => 3,
            Self::TransportKeyUnwrapFailed => 4,
            Self::InvalidCertificateEncoding => 5,
            Self::PublicKeyMismatch => 7,
            Self::KeyRecordNotFound => 8,
            Self::KeyRecordLookupError => 9,
            Self::PrivateKeyRecoveryFailed => 10,
            Self::KeyVerificationFailed => 11,
            Self::DeliveryWrapFailed => 12,
            Self::AuditWriteFailed => 13,
            Self::CryptoError => 14,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Whether this failure means the compliance guarantee itself is broken
    /// and should page an operator rather than deny a user.
    pub fn is_operational_alert(self) -> bool {
        self == Self::AuditWriteFailed
    }

    /// Fixed, non-diagnostic description returned to callers.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Success => "key recovered",
            Self::MissingTransportKey => "transport key not supplied",
            Self::MissingKeyReference => "certificate or key identifier required",
            Self::TransportKeyUnwrapFailed => "transport key could not be unwrapped",
            Self::InvalidCertificateEncoding => "certificate could not be decoded",
            Self::PublicKeyMismatch => "certificate does not match archived key",
            Self::KeyRecordNotFound => "no archived key found",
            Self::KeyRecordLookupError => "key repository unavailable",
            Self::PrivateKeyRecoveryFailed => "archived key could not be recovered",
            Self::KeyVerificationFailed => "recovered key failed verification",
            Self::DeliveryWrapFailed => "recovered key could not be wrapped for delivery",
            Self::AuditWriteFailed => "audit trail unavailable",
            Self::CryptoError => "cryptographic token failure",
        }
    }
}

/// Delivery payload produced by a successful recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPayload {
    /// PKCS#8 private key encrypted under the caller's session key.
    pub wrapped_private_key: Vec<u8>,
    /// Public key, base64 for RSA and special-encoded for EC.
    pub encoded_public_key: String,
    /// CBC IV used for the delivery encryption.
    pub iv: Vec<u8>,
}

/// Terminal outcome of one recovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Success(DeliveryPayload),
    Failure { code: ResultCode, reason: &'static str },
}

impl RecoveryOutcome {
    pub fn failure(code: ResultCode) -> Self {
        debug_assert!(!code.is_success());
        Self::Failure {
            code,
            reason: code.reason(),
        }
    }

    pub fn code(&self) -> ResultCode {
        match self {
            Self::Success(_) => ResultCode::Success,
            Self::Failure { code, .. } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn payload(&self) -> Option<&DeliveryPayload> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_values_are_unique() {
        let codes = [
            ResultCode::Success,
            ResultCode::MissingTransportKey,
            ResultCode::MissingKeyReference,
            ResultCode::TransportKeyUnwrapFailed,
            ResultCode::InvalidCertificateEncoding,
            ResultCode::PublicKeyMismatch,
            ResultCode::KeyRecordNotFound,
            ResultCode::KeyRecordLookupError,
            ResultCode::PrivateKeyRecoveryFailed,
            ResultCode::KeyVerificationFailed,
            ResultCode::DeliveryWrapFailed,
            ResultCode::AuditWriteFailed,
            ResultCode::CryptoError,
        ];
        let mut values: Vec<u32> = codes.iter().map(|c| c.value()).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), codes.len());
    }

    #[test]
    fn test_only_audit_failure_alerts() {
        assert!(ResultCode::AuditWriteFailed.is_operational_alert());
        assert!(!ResultCode::CryptoError.is_operational_alert());
        assert!(!ResultCode::KeyRecordLookupError.is_operational_alert());
    }

    #[test]
    fn test_failure_outcome_carries_fixed_reason() {
        let outcome = RecoveryOutcome::failure(ResultCode::KeyRecordNotFound);
        assert_eq!(outcome.code(), ResultCode::KeyRecordNotFound);
        assert!(!outcome.is_success());
        assert!(outcome.payload().is_none());
        match outcome {
            RecoveryOutcome::Failure { reason, .. } => assert_eq!(reason, "no archived key found"),
            RecoveryOutcome::Success(_) => unreachable!(),
        }
    }
}
