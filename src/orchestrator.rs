//! # Fallback Orchestrator Module
//!
//! Drives proposal generation across the backend registry:
//!
//! ```text
//! SELECT_BACKEND -> INVOKE -> NORMALIZE -> VALIDATE -> SUCCESS | RETRY_SAME | ADVANCE | ABORT
//! ```
//!
//! Backends are tried strictly one after another. Rate limits are retried on
//! the same backend with exponential backoff and jitter; unusable backends
//! and unusable answers advance to the next candidate. When the registry is
//! exhausted, or the wall-clock ceiling is reached, a placeholder proposal is
//! returned. The only hard error is a missing configuration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{error, info, warn};

use crate::config::{AppConfig, RetryPolicy, MAX_TOTAL_TIMEOUT};
use crate::enrichment::{ContextEnricher, TavilySearch};
use crate::errors::{FailureKind, GenerationError, InvokeError};
use crate::invoker::{ChatCompletionsInvoker, GenerationBackend, GenerationRequest};
use crate::normalizer::normalize;
use crate::placeholder;
use crate::proposal::{ProposalBrief, ProposalDocument};
use crate::registry::{BackendDescriptor, BackendRegistry, DescriptorId, OpenRouterCatalog};
use crate::validator::validate;

/// Result of one backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    NotFound,
    MalformedOutput,
    Transient,
    OtherError,
}

impl From<FailureKind> for AttemptOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::RateLimited => AttemptOutcome::RateLimited,
            FailureKind::NotFound => AttemptOutcome::NotFound,
            FailureKind::Malformed => AttemptOutcome::MalformedOutput,
            FailureKind::Transient => AttemptOutcome::Transient,
            FailureKind::Unconfigured | FailureKind::Unknown => AttemptOutcome::OtherError,
        }
    }
}

/// Record of one call made while serving a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub backend: DescriptorId,
    /// 1-based call number against this backend
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// What a generation request produced
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub document: ProposalDocument,
    pub attempts: Vec<GenerationAttempt>,
    /// Set when `document` is a placeholder
    pub degraded_reason: Option<String>,
}

impl GenerationReport {
    pub fn is_placeholder(&self) -> bool {
        self.degraded_reason.is_some()
    }
}

/// Next step after a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Call the same backend again after the delay
    RetrySame(Duration),
    /// Move on to the next candidate
    Advance,
}

/// Exponential backoff with jitter.
///
/// `attempt` is the number of calls already made against the backend.
pub fn calculate_retry_delay(attempt: u32, policy: &RetryPolicy) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = policy
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(policy.max_retry_delay_ms);
    let jitter = if policy.max_jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=policy.max_jitter_ms)
    } else {
        0
    };
    delay + jitter
}

/// Retry policy as a pure function of the failure and the call count
pub fn decide(kind: FailureKind, attempt: u32, policy: &RetryPolicy) -> Decision {
    let cap = match kind {
        FailureKind::RateLimited => policy.rate_limit_attempts,
        FailureKind::Transient => policy.transient_attempts,
        // Not viable, or answered unusably: another model is the better bet
        FailureKind::NotFound
        | FailureKind::Malformed
        | FailureKind::Unknown
        | FailureKind::Unconfigured => return Decision::Advance,
    };

    if attempt < cap {
        Decision::RetrySame(Duration::from_millis(calculate_retry_delay(attempt, policy)))
    } else {
        Decision::Advance
    }
}

/// Normalize and validate raw backend text
pub fn evaluate(raw_text: &str) -> Result<ProposalDocument, InvokeError> {
    let obj = normalize(raw_text).map_err(|e| InvokeError::Malformed(e.to_string()))?;
    validate(&obj).map_err(|e| InvokeError::Malformed(e.to_string()))
}

/// Turns a brief into a proposal, falling back across backends
pub struct ProposalGenerator {
    registry: Arc<BackendRegistry>,
    backend: Arc<dyn GenerationBackend>,
    enricher: ContextEnricher,
    policy: RetryPolicy,
}

impl ProposalGenerator {
    pub fn new(
        registry: Arc<BackendRegistry>,
        backend: Arc<dyn GenerationBackend>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            backend,
            enricher: ContextEnricher::new(),
            policy: policy.bounded(),
        }
    }

    pub fn with_enricher(mut self, enricher: ContextEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    /// Wire the HTTP-backed registry, invoker and search from configuration
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let registry = BackendRegistry::with_defaults(config.credentials.clone())
            .with_catalog(Arc::new(OpenRouterCatalog::new(client.clone())))
            .with_seed(config.selection_seed);
        let backend = ChatCompletionsInvoker::new(client.clone(), config.credentials.clone());

        let mut enricher = ContextEnricher::new();
        if let Some(key) = config.search_api_key.as_deref() {
            enricher = enricher.with_search(Arc::new(TavilySearch::new(client, key)));
        }

        Self::new(Arc::new(registry), Arc::new(backend), config.retry.clone()).with_enricher(enricher)
    }

    fn degraded(reason: String, attempts: Vec<GenerationAttempt>) -> GenerationReport {
        error!(reason = %reason, attempts = attempts.len(), "Proposal generation degraded to placeholder");
        GenerationReport {
            document: placeholder::build(&reason),
            attempts,
            degraded_reason: Some(reason),
        }
    }

    /// Generate a proposal for `brief`.
    ///
    /// Always resolves to a document within the policy's time ceiling, except
    /// when no backend has credentials.
    pub async fn generate(&self, brief: &ProposalBrief) -> Result<GenerationReport, GenerationError> {
        if !self.registry.is_configured() {
            return Err(GenerationError::Unconfigured(
                "no provider API key is set (OPENROUTER_API_KEY, GROQ_API_KEY or GOOGLE_API_KEY)"
                    .to_string(),
            ));
        }

        let started = Instant::now();
        let deadline = started
            .checked_add(self.policy.total_timeout)
            .unwrap_or(started + MAX_TOTAL_TIMEOUT);

        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, self.registry.refresh_if_stale())
            .await
            .is_err()
        {
            warn!("Backend refresh cut short by the time limit");
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let context = match tokio::time::timeout(remaining, self.enricher.build_context(brief.as_str())).await {
            Ok(context) => context,
            Err(_) => {
                warn!("Context enrichment cut short by the time limit");
                String::new()
            }
        };

        let mut tried: HashSet<DescriptorId> = HashSet::new();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut last_failure: Option<InvokeError> = None;

        while tried.len() < self.policy.max_backends {
            let Some(descriptor) = self.registry.next_candidate(&tried) else {
                break;
            };
            tried.insert(descriptor.id());

            match self
                .run_backend(&descriptor, brief, &context, deadline, &mut attempts)
                .await
            {
                BackendRun::Succeeded(document) => {
                    return Ok(GenerationReport {
                        document,
                        attempts,
                        degraded_reason: None,
                    });
                }
                BackendRun::Failed(e) => last_failure = Some(e),
                BackendRun::OutOfTime => {
                    let reason = format!(
                        "time limit of {}s reached",
                        self.policy.total_timeout.as_secs()
                    );
                    return Ok(Self::degraded(reason, attempts));
                }
            }
        }

        let reason = match last_failure {
            Some(e) => {
                warn!(backends = tried.len(), error = %e, "Every backend failed");
                format!("all {} backends exhausted; last failure: {}", tried.len(), e.kind())
            }
            None => "no backends available".to_string(),
        };
        Ok(Self::degraded(reason, attempts))
    }

    /// Call one backend until it succeeds or the policy says to move on
    async fn run_backend(
        &self,
        descriptor: &BackendDescriptor,
        brief: &ProposalBrief,
        context: &str,
        deadline: Instant,
        attempts: &mut Vec<GenerationAttempt>,
    ) -> BackendRun {
        let backend_id = descriptor.id();
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return BackendRun::OutOfTime;
            }
            attempt += 1;

            let call_timeout = self.policy.call_timeout.min(remaining);
            let request = GenerationRequest::new(brief.as_str(), context, call_timeout);
            let started = Instant::now();

            let result = match tokio::time::timeout(call_timeout, self.backend.invoke(descriptor, &request)).await {
                Ok(Ok(text)) => evaluate(&text),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(InvokeError::Transient(format!(
                    "no answer within {}ms",
                    call_timeout.as_millis()
                ))),
            };
            let elapsed = started.elapsed();

            let failure = match result {
                Ok(document) => {
                    attempts.push(GenerationAttempt {
                        backend: backend_id.clone(),
                        attempt,
                        outcome: AttemptOutcome::Success,
                        elapsed,
                    });
                    info!(
                        backend = %backend_id,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Proposal generated"
                    );
                    return BackendRun::Succeeded(document);
                }
                Err(e) => e,
            };

            let kind = failure.kind();
            attempts.push(GenerationAttempt {
                backend: backend_id.clone(),
                attempt,
                outcome: kind.into(),
                elapsed,
            });
            warn!(
                backend = %backend_id,
                attempt,
                outcome = %kind,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %failure,
                "Backend attempt failed"
            );

            match decide(kind, attempt, &self.policy) {
                Decision::RetrySame(delay) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if delay >= remaining {
                        warn!(backend = %backend_id, "Backoff exceeds remaining time, advancing");
                        return BackendRun::Failed(failure);
                    }
                    info!(backend = %backend_id, delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
                Decision::Advance => return BackendRun::Failed(failure),
            }
        }
    }
}

enum BackendRun {
    Succeeded(ProposalDocument),
    Failed(InvokeError),
    OutOfTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_policy() -> RetryPolicy {
        RetryPolicy {
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 400,
            max_jitter_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_calculate_retry_delay() {
        let policy = quiet_policy();
        assert_eq!(calculate_retry_delay(1, &policy), 100);
        assert_eq!(calculate_retry_delay(2, &policy), 200);
        assert_eq!(calculate_retry_delay(3, &policy), 400);
        assert_eq!(calculate_retry_delay(10, &policy), 400);

        let jittery = RetryPolicy::default();
        let delay = calculate_retry_delay(1, &jittery);
        assert!(delay >= jittery.base_retry_delay_ms);
        assert!(delay <= jittery.base_retry_delay_ms + jittery.max_jitter_ms);
    }

    #[test]
    fn test_decide_rate_limit_respects_cap() {
        let policy = quiet_policy();
        assert!(matches!(decide(FailureKind::RateLimited, 1, &policy), Decision::RetrySame(_)));
        assert!(matches!(decide(FailureKind::RateLimited, 2, &policy), Decision::RetrySame(_)));
        assert_eq!(decide(FailureKind::RateLimited, 3, &policy), Decision::Advance);
    }

    #[test]
    fn test_decide_advances_immediately_on_unusable_backends() {
        let policy = quiet_policy();
        assert_eq!(decide(FailureKind::NotFound, 1, &policy), Decision::Advance);
        assert_eq!(decide(FailureKind::Malformed, 1, &policy), Decision::Advance);
        assert_eq!(decide(FailureKind::Unknown, 1, &policy), Decision::Advance);
    }

    #[test]
    fn test_decide_transient_retries_once() {
        let policy = quiet_policy();
        assert!(matches!(decide(FailureKind::Transient, 1, &policy), Decision::RetrySame(_)));
        assert_eq!(decide(FailureKind::Transient, 2, &policy), Decision::Advance);
    }

    #[test]
    fn test_evaluate_maps_parse_and_validation_failures() {
        assert!(matches!(evaluate("no json here"), Err(InvokeError::Malformed(_))));
        assert!(matches!(evaluate("{\"title\": \"A\"}"), Err(InvokeError::Malformed(_))));
        let doc = evaluate(r#"{"title":"A","executive_summary":"B","budget_items":[],"cta":"C"}"#).unwrap();
        assert_eq!(doc.title, "A");
    }
}
