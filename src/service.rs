/// Async front end for the blocking orchestrator.
///
/// Each request runs on tokio's blocking pool. With a deadline configured,
/// the caller stops waiting once it passes and gets a `CryptoError` result.
/// The in-flight recovery still finishes and audits its own outcome under
/// the token lock, and its payload is dropped.
use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::outcome::{RecoveryOutcome, ResultCode};
use crate::recovery::{CallerContext, RecoveryOrchestrator};
use crate::state::models::RecoveryRequest;

#[derive(Clone)]
pub struct RecoveryService {
    orchestrator: Arc<RecoveryOrchestrator>,
    deadline: Option<Duration>,
}

impl RecoveryService {
    /// Uses the orchestrator's configured deadline.
    pub fn new(orchestrator: Arc<RecoveryOrchestrator>) -> Self {
        let deadline = orchestrator.config().deadline();
        Self {
            orchestrator,
            deadline,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn orchestrator(&self) -> &Arc<RecoveryOrchestrator> {
        &self.orchestrator
    }

    /// Recover one request, returning it with its outputs filled in.
    pub async fn recover(
        &self,
        ctx: CallerContext,
        request: RecoveryRequest,
    ) -> (RecoveryRequest, RecoveryOutcome) {
        let mut fallback = request.clone();
        fallback.transport_wrapped_key = None;
        fallback.delay_commit = true;

        let orchestrator = Arc::clone(&self.orchestrator);
        let mut request = request;
        let task = tokio::task::spawn_blocking(move || {
            let outcome = orchestrator.recover(&ctx, &mut request);
            (request, outcome)
        });

        let joined = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    error!(
                        request_id = %fallback.request_id,
                        deadline_ms = deadline.as_millis() as u64,
                        "Key recovery exceeded its deadline"
                    );
                    return abandon(fallback);
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) => {
                error!(request_id = %fallback.request_id, error = %e, "Key recovery task failed");
                abandon(fallback)
            }
        }
    }
}

fn abandon(mut request: RecoveryRequest) -> (RecoveryRequest, RecoveryOutcome) {
    let outcome = RecoveryOutcome::failure(ResultCode::CryptoError);
    request.result_code = Some(outcome.code().value());
    request.wrapped_private_key = None;
    request.encoded_public_key = None;
    request.delivery_iv = None;
    (request, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::RecoveryConfig;
    use crate::crypto::params::WrappingParams;
    use crate::crypto::sensitive::SessionKey;
    use crate::error::CryptoError;
    use crate::state::models::AtRest;
    use crate::state::repository::MemoryKeyRepository;
    use crate::testing::{fixtures, Harness};
    use crate::units::{
        SoftwareStorageUnit, SoftwareTransportUnit, TokenSession, TransportKeyUnit,
    };

    /// Transport unit that stalls before delegating.
    struct SlowTransportUnit {
        inner: SoftwareTransportUnit,
        delay: Duration,
    }

    impl TransportKeyUnit for SlowTransportUnit {
        fn unwrap_symmetric(
            &self,
            session: &TokenSession,
            wrapped: &[u8],
            params: &WrappingParams,
        ) -> Result<SessionKey, CryptoError> {
            std::thread::sleep(self.delay);
            self.inner.unwrap_symmetric(session, wrapped, params)
        }
    }

    #[tokio::test]
    async fn test_service_recovers() {
        let h = Harness::new(RecoveryConfig::default());
        h.insert(h.record(42, AtRest::Encrypted));
        let request = h.request_with_id("42");

        let Harness {
            orchestrator,
            audit,
            ..
        } = h;
        let service = RecoveryService::new(Arc::new(orchestrator));
        let (request, outcome) = service.recover(CallerContext::new("svc"), request).await;

        assert!(outcome.is_success());
        assert_eq!(request.result_code, Some(1));
        assert!(request.wrapped_private_key.is_some());
        assert_eq!(audit.events()[0].agent_id, "svc");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_expiry_maps_to_crypto_error() {
        let f = fixtures();
        let repository = Arc::new(MemoryKeyRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RecoveryOrchestrator::new(
            RecoveryConfig::default(),
            TokenSession::shared("internal"),
            Arc::new(SlowTransportUnit {
                inner: SoftwareTransportUnit::new(f.transport.clone()),
                delay: Duration::from_millis(400),
            }),
            Arc::new(SoftwareStorageUnit::new(f.storage.clone(), WrappingParams::legacy())),
            repository.clone(),
            audit.clone(),
        );

        let h = Harness::new(RecoveryConfig::default());
        let mut record = h.record(42, AtRest::Encrypted);
        record.owner = None;
        repository.insert(record);
        let request = h.request_with_id("42");

        let service = RecoveryService::new(Arc::new(orchestrator))
            .with_deadline(Some(Duration::from_millis(50)));
        let (request, outcome) = service.recover(CallerContext::new("svc"), request).await;

        assert_eq!(outcome.code(), ResultCode::CryptoError);
        assert_eq!(request.result_code, Some(14));
        assert!(request.wrapped_private_key.is_none());
        assert!(request.transport_wrapped_key.is_none());

        // The abandoned call still completes and audits its own result.
        let lock = service.orchestrator().token().clone();
        for _ in 0..50 {
            if audit.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.events()[0].outcome, ResultCode::Success);
        assert_eq!(lock.lock().operations(), 1);
    }
}
