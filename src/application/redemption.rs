use async_trait::async_trait;

use crate::domain::errors::DomainError;
use crate::domain::ports::{RedemptionStore, VerifyTransport};
use crate::domain::redemption::{OperatorCredentials, VerifyOutcome};

use super::retry::RetryPolicy;

/// Server-side verification authority.
///
/// Credentials are request-scoped: every call carries the operator's token
/// explicitly, checked here against the configured gate token. Transient
/// store failures are retried within the policy budget and then surfaced,
/// never reported as a valid scan.
pub struct RedemptionService<R> {
    store: R,
    retry: RetryPolicy,
    gate_token: String,
}

impl<R: Clone> Clone for RedemptionService<R> {
    fn clone(&self) -> Self {
        RedemptionService {
            store: self.store.clone(),
            retry: self.retry,
            gate_token: self.gate_token.clone(),
        }
    }
}

impl<R: RedemptionStore> RedemptionService<R> {
    pub fn new(store: R, retry: RetryPolicy, gate_token: String) -> Self {
        RedemptionService {
            store,
            retry,
            gate_token,
        }
    }

    pub fn verify(
        &self,
        credentials: &OperatorCredentials,
        code: &str,
    ) -> Result<VerifyOutcome, DomainError> {
        if credentials.token != self.gate_token {
            return Err(DomainError::Unauthorized);
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::InvalidInput("empty ticket code".to_string()));
        }
        self.retry.run(|| self.store.verify(code))
    }
}

/// In-process transport for scanners embedded alongside the service: runs the
/// synchronous verification on the blocking pool.
pub struct LocalVerifyTransport<R> {
    service: RedemptionService<R>,
}

impl<R> LocalVerifyTransport<R> {
    pub fn new(service: RedemptionService<R>) -> Self {
        LocalVerifyTransport { service }
    }
}

#[async_trait]
impl<R> VerifyTransport for LocalVerifyTransport<R>
where
    R: RedemptionStore + Clone + 'static,
{
    async fn verify(
        &self,
        credentials: &OperatorCredentials,
        code: &str,
    ) -> Result<VerifyOutcome, DomainError> {
        let service = self.service.clone();
        let credentials = credentials.clone();
        let code = code.to_string();
        tokio::task::spawn_blocking(move || service.verify(&credentials, &code))
            .await
            .map_err(|e| DomainError::Internal(format!("blocking task failed: {e}")))?
    }
}
