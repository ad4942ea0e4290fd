/// Key recovery orchestrator.
///
/// A request runs through these stages while holding the token lock:
/// 1. Read and clear the transport-wrapped session key
/// 2. Unwrap it with the transport unit
/// 3. Resolve the key reference (identifier first, else certificate)
/// 4. Locate the archived record
/// 5. Cross-check the certificate's public key (certificate lookups only)
/// 6. Recover the private key, encrypted-at-rest or by direct unwrap
/// 7. Verify the key pair (encrypted-at-rest only)
/// 8. Re-wrap the key for delivery under the caller's session key
/// 9. Record one audit event, then write the result onto the request
///
/// Every stage returns early on failure. Raw key material lives in
/// zeroize-on-drop buffers, so early returns scrub it too.
pub mod delivery;
pub mod engine;
pub mod locator;
pub mod transport;
pub mod verifier;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditSink, AuditTrail};
use crate::config::RecoveryConfig;
use crate::crypto::cert::decode_certificate;
use crate::crypto::encoding::{special_decode, special_encode};
use crate::crypto::hash;
use crate::crypto::params::{DeliveryParams, WrappingParams};
use crate::outcome::{DeliveryPayload, RecoveryOutcome, ResultCode};
use crate::state::models::{KeyId, KeyRecord, RecoveryPath, RecoveryRequest};
use crate::state::repository::KeyRepository;
use crate::units::{StorageKeyUnit, TokenLock, TokenSession, TransportKeyUnit};

pub use delivery::ResponseWrapper;
pub use engine::{KeyRecoveryEngine, RecoveredKey};
pub use locator::{KeyRecordLocator, KeyReference};
pub use transport::TransportKeyUnwrapper;
pub use verifier::KeyPairVerifier;

/// Identity of the agent submitting requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub agent_id: String,
}

impl CallerContext {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

/// Per-request bookkeeping carried into the audit event.
struct RequestScope {
    subject_id: String,
    request_id: String,
    key_id: Option<String>,
}

/// A failed stage: the code returned to the caller and the detail that
/// only goes to the audit trail and logs.
struct Failure {
    code: ResultCode,
    detail: String,
}

impl Failure {
    fn new(code: ResultCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

pub struct RecoveryOrchestrator {
    config: RecoveryConfig,
    token: TokenLock,
    transport: TransportKeyUnwrapper,
    locator: KeyRecordLocator,
    engine: KeyRecoveryEngine,
    wrapper: ResponseWrapper,
    audit: AuditTrail,
}

impl RecoveryOrchestrator {
    pub fn new(
        config: RecoveryConfig,
        token: TokenLock,
        transport_unit: Arc<dyn TransportKeyUnit>,
        storage_unit: Arc<dyn StorageKeyUnit>,
        repository: Arc<dyn KeyRepository>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            token,
            transport: TransportKeyUnwrapper::new(transport_unit),
            locator: KeyRecordLocator::new(repository),
            engine: KeyRecoveryEngine::new(storage_unit.clone()),
            wrapper: ResponseWrapper::new(storage_unit),
            audit: AuditTrail::new(audit_sink),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn token(&self) -> &TokenLock {
        &self.token
    }

    /// Process one request. Outputs are written back onto `request`; the
    /// returned outcome carries the same result.
    pub fn recover(&self, ctx: &CallerContext, request: &mut RecoveryRequest) -> RecoveryOutcome {
        let mut session = self.token.lock();
        let operation = session.begin_operation();

        let mut scope = RequestScope {
            subject_id: request.subject_id(),
            request_id: request.request_id.clone(),
            key_id: None,
        };
        info!(
            request_id = %scope.request_id,
            subject_id = %scope.subject_id,
            agent_id = %ctx.agent_id,
            token = session.name(),
            operation,
            "Starting key recovery"
        );

        let (outcome, message) = match self.run(&session, &mut scope, request) {
            Ok((payload, message)) => {
                info!(
                    request_id = %scope.request_id,
                    key_id = scope.key_id.as_deref().unwrap_or("-"),
                    "Key recovered"
                );
                (RecoveryOutcome::Success(payload), message)
            }
            Err(failure) => {
                warn!(
                    request_id = %scope.request_id,
                    code = ?failure.code,
                    detail = %failure.detail,
                    "Key recovery failed"
                );
                (RecoveryOutcome::failure(failure.code), failure.detail)
            }
        };

        let event = AuditEvent::new(
            scope.subject_id,
            scope.request_id.clone(),
            scope.key_id,
            ctx.agent_id.clone(),
            outcome.code(),
            message,
        );
        let outcome = match self.audit.record(event) {
            Ok(()) => outcome,
            Err(e) => {
                error!(
                    request_id = %scope.request_id,
                    error = %e,
                    alert = true,
                    "Audit write failed, withholding recovery result"
                );
                RecoveryOutcome::failure(ResultCode::AuditWriteFailed)
            }
        };

        apply_outcome(request, &outcome);
        outcome
    }

    fn run(
        &self,
        session: &TokenSession,
        scope: &mut RequestScope,
        request: &mut RecoveryRequest,
    ) -> Result<(DeliveryPayload, String), Failure> {
        request.delay_commit = true;
        let transport_blob = request.transport_wrapped_key.take().unwrap_or_default();
        if transport_blob.trim().is_empty() {
            return Err(Failure::new(
                ResultCode::MissingTransportKey,
                "did not receive transport-wrapped session key",
            ));
        }
        let transport_blob = special_decode(&transport_blob).map_err(|e| {
            Failure::new(
                ResultCode::TransportKeyUnwrapFailed,
                format!("transport-wrapped session key is malformed: {e}"),
            )
        })?;

        let transport_params = WrappingParams::transport(self.config.transport_key_wrap());
        let session_key = self
            .transport
            .unwrap(session, &transport_blob, &transport_params)
            .map_err(|e| {
                Failure::new(
                    ResultCode::TransportKeyUnwrapFailed,
                    format!("failed to unwrap transport session key: {e}"),
                )
            })?;

        let reference = resolve_reference(request)?;
        if let KeyReference::Id(id) = &reference {
            scope.key_id = Some(id.to_string());
        }

        let record = match self.locator.find(&reference) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(Failure::new(
                    ResultCode::KeyRecordNotFound,
                    format!("no archived key for {}", describe(&reference)),
                ))
            }
            Err(e) => {
                return Err(Failure::new(
                    ResultCode::KeyRecordLookupError,
                    format!("key record lookup for {} failed: {e}", describe(&reference)),
                ))
            }
        };
        scope.key_id = Some(record.key_id.to_string());
        check_owner(&record, scope);

        // Only a certificate lookup carries an independent public key to compare.
        if let KeyReference::Certificate(cert) = &reference {
            check_public_key(&cert.public_key, &record.public_key)?;
        }

        let path = record
            .encrypted_at_rest
            .resolve(self.config.allow_encrypt_decrypt_recovery);
        debug!(key_id = %record.key_id, ?path, "Recovery path selected");

        let recovered = match path {
            RecoveryPath::EncryptedAtRest => {
                let der = self.engine.recover_encrypted(session, &record).map_err(|e| {
                    Failure::new(
                        ResultCode::PrivateKeyRecoveryFailed,
                        format!("failed to decrypt archived key {}: {e}", record.key_id),
                    )
                })?;
                if !KeyPairVerifier::verify(&record.public_key, der.as_bytes()) {
                    return Err(Failure::new(
                        ResultCode::KeyVerificationFailed,
                        format!(
                            "recovered key {} does not match its archived public key",
                            record.key_id
                        ),
                    ));
                }
                RecoveredKey::Bytes(der)
            }
            RecoveryPath::DirectUnwrap => {
                let handle = self.engine.recover_direct(session, &record).map_err(|e| {
                    Failure::new(
                        ResultCode::PrivateKeyRecoveryFailed,
                        format!("failed to unwrap archived key {}: {e}", record.key_id),
                    )
                })?;
                RecoveredKey::Handle(handle)
            }
        };

        let delivery = DeliveryParams::generate().map_err(|e| {
            Failure::new(
                ResultCode::CryptoError,
                format!("failed to generate delivery IV: {e}"),
            )
        })?;
        let wrapped_private_key = self
            .wrapper
            .wrap_for_delivery(session, &recovered, &session_key, &delivery)
            .map_err(|e| {
                Failure::new(
                    ResultCode::DeliveryWrapFailed,
                    format!("failed to wrap key {} for delivery: {e}", record.key_id),
                )
            })?;
        drop(recovered);

        let encoded_public_key =
            ResponseWrapper::encode_public_key(&record.public_key).map_err(|e| {
                Failure::new(
                    ResultCode::DeliveryWrapFailed,
                    format!("failed to encode public key of {}: {e}", record.key_id),
                )
            })?;

        let message = format!(
            "recovered key {} for {} ({path:?}), public key fingerprint {}",
            record.key_id,
            scope.subject_id,
            hash::fingerprint(&record.public_key)
        );
        Ok((
            DeliveryPayload {
                wrapped_private_key,
                encoded_public_key,
                iv: delivery.iv().to_vec(),
            },
            message,
        ))
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// The identifier wins when both an identifier and a certificate are present.
fn resolve_reference(request: &RecoveryRequest) -> Result<KeyReference, Failure> {
    match (non_empty(&request.key_identifier), non_empty(&request.certificate)) {
        (Some(id), _) => id.parse::<KeyId>().map(KeyReference::Id).map_err(|e| {
            Failure::new(
                ResultCode::MissingKeyReference,
                format!("key identifier is not a non-negative integer: {e}"),
            )
        }),
        (None, Some(cert)) => decode_certificate(cert)
            .map(KeyReference::Certificate)
            .map_err(|e| {
                Failure::new(
                    ResultCode::InvalidCertificateEncoding,
                    format!("failed to decode certificate: {e}"),
                )
            }),
        (None, None) => Err(Failure::new(
            ResultCode::MissingKeyReference,
            "did not receive certificate or key identifier",
        )),
    }
}

fn describe(reference: &KeyReference) -> String {
    match reference {
        KeyReference::Id(id) => format!("key id {id}"),
        KeyReference::Certificate(cert) => {
            format!("certificate {}", hash::fingerprint(&cert.der))
        }
    }
}

/// Informational only: a mismatch is logged and never fails the request.
fn check_owner(record: &KeyRecord, scope: &RequestScope) {
    match record.owner.as_deref() {
        Some(owner) if owner == scope.subject_id => {
            debug!(request_id = %scope.request_id, "Archive owner matches requester");
        }
        Some(owner) => {
            info!(
                request_id = %scope.request_id,
                owner,
                subject_id = %scope.subject_id,
                "Archive owner differs from requester"
            );
        }
        None => debug!(request_id = %scope.request_id, "Archive has no recorded owner"),
    }
}

fn check_public_key(certificate_key: &[u8], archived_key: &[u8]) -> Result<(), Failure> {
    if certificate_key.len() != archived_key.len() {
        return Err(Failure::new(
            ResultCode::PublicKeyMismatch,
            format!(
                "certificate public key is {} bytes, archived public key is {} bytes",
                certificate_key.len(),
                archived_key.len()
            ),
        ));
    }
    if certificate_key != archived_key {
        return Err(Failure::new(
            ResultCode::PublicKeyMismatch,
            "certificate public key differs from archived public key",
        ));
    }
    Ok(())
}

fn apply_outcome(request: &mut RecoveryRequest, outcome: &RecoveryOutcome) {
    request.result_code = Some(outcome.code().value());
    match outcome.payload() {
        Some(payload) => {
            request.wrapped_private_key = Some(special_encode(&payload.wrapped_private_key));
            request.encoded_public_key = Some(payload.encoded_public_key.clone());
            request.delivery_iv = Some(special_encode(&payload.iv));
        }
        None => {
            request.wrapped_private_key = None;
            request.encoded_public_key = None;
            request.delivery_iv = None;
        }
    }
}
