//! Hybrid classification orchestrator
//!
//! Every unique comment gets exactly one [`ClassificationResult`]:
//!
//! 1. Classification service (when configured and the breaker is closed),
//!    bounded by the configured timeout. Connection-level failures get one
//!    reattempt; timeouts and bad responses do not.
//! 2. Structural validation of the response.
//! 3. Confidence gating against `min_confidence`.
//! 4. Deterministic rule-based fallback for everything else.
//!
//! `classify` never fails. A panic in either path becomes a neutral
//! rule-based result tagged [`ErrorKind::Internal`].

use super::ai_client::{validate_response, AiClassifier, AiServiceError, AiVerdict};
use super::circuit_breaker::CircuitBreaker;
use super::rule_classifier::RuleClassifier;
use crate::config::AiSettings;
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::models::{ClassificationResult, ClassificationSource, Comment, FallbackReason, Sentiment};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Per-comment classification stage
///
/// Stages only move forward; traced at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClassificationStage {
    Pending,
    AiAttempted,
    AiAccepted,
    RuleFallback,
    Done,
}

struct StageTrace<'a> {
    key: &'a str,
    stage: ClassificationStage,
}

impl<'a> StageTrace<'a> {
    fn new(key: &'a str) -> Self {
        debug!(comment = key, stage = ?ClassificationStage::Pending, "Classification stage");
        Self {
            key,
            stage: ClassificationStage::Pending,
        }
    }

    fn advance(&mut self, next: ClassificationStage) {
        debug_assert!(next > self.stage, "stage {:?} re-entered after {:?}", next, self.stage);
        debug!(comment = self.key, from = ?self.stage, to = ?next, "Classification stage");
        self.stage = next;
    }
}

/// Routes comments between the classification service and the rule classifier
pub struct ClassificationOrchestrator {
    settings: AiSettings,
    rules: RuleClassifier,
    ai: Option<Arc<dyn AiClassifier>>,
    breaker: CircuitBreaker,
}

impl ClassificationOrchestrator {
    /// Create orchestrator; `ai = None` means rule-based only
    pub fn new(settings: AiSettings, rules: RuleClassifier, ai: Option<Arc<dyn AiClassifier>>) -> Self {
        let breaker = CircuitBreaker::new(settings.circuit_breaker_threshold);
        Self {
            settings,
            rules,
            ai,
            breaker,
        }
    }

    /// True when a classification service client is attached
    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    /// True once the circuit breaker has opened for this run
    pub fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Classification service failures recorded so far
    pub fn ai_failures(&self) -> usize {
        self.breaker.total_failures()
    }

    /// Breaker threshold in consecutive failures
    pub fn circuit_threshold(&self) -> usize {
        self.breaker.threshold()
    }

    /// Classify one comment; never fails
    pub async fn classify(&self, comment: &Comment) -> ClassificationResult {
        match AssertUnwindSafe(self.classify_inner(comment)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                error!(
                    comment = %comment.normalized_text,
                    panic = panic_message(panic.as_ref()),
                    "Classification panicked; recording neutral result"
                );
                self.internal_failure(comment)
            }
        }
    }

    /// Classify all comments in order with bounded concurrency
    pub async fn classify_all(
        &self,
        comments: Vec<Comment>,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<ClassificationResult>> {
        self.classify_all_with_progress(comments, cancel, |_, _| {}).await
    }

    /// [`classify_all`](Self::classify_all) with a callback after each result
    ///
    /// The callback receives the number of results completed so far. Results
    /// are delivered in input order. On cancellation in-flight requests are
    /// dropped and no further comments are started.
    pub async fn classify_all_with_progress<F>(
        &self,
        comments: Vec<Comment>,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> PipelineResult<Vec<ClassificationResult>>
    where
        F: FnMut(usize, &ClassificationResult),
    {
        let total = comments.len();
        let mut results = Vec::with_capacity(total);

        let mut pending = stream::iter(comments)
            .map(|comment| async move { self.classify(&comment).await })
            .buffered(self.settings.concurrency.max(1));

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(completed = results.len(), total, "Classification cancelled");
                    return Err(PipelineError::Cancelled);
                }

                next = pending.next() => match next {
                    Some(result) => {
                        results.push(result);
                        on_result(results.len(), &results[results.len() - 1]);
                    }
                    None => break,
                }
            }
        }

        Ok(results)
    }

    async fn classify_inner(&self, comment: &Comment) -> ClassificationResult {
        let mut stage = StageTrace::new(&comment.normalized_text);

        let Some(ai) = self.ai.as_deref() else {
            return self.fallback(comment, FallbackReason::AiNotConfigured, None, &mut stage);
        };

        if self.breaker.is_open() {
            return self.fallback(comment, FallbackReason::CircuitOpen, None, &mut stage);
        }

        stage.advance(ClassificationStage::AiAttempted);

        match self.query(ai, &comment.normalized_text).await {
            Ok(verdict) => {
                self.breaker.record_success();

                if verdict.confidence >= self.settings.min_confidence {
                    stage.advance(ClassificationStage::AiAccepted);
                    stage.advance(ClassificationStage::Done);
                    return ClassificationResult {
                        comment: comment.clone(),
                        sentiment: verdict.sentiment,
                        confidence: verdict.confidence,
                        themes: verdict.themes,
                        source: ClassificationSource::Ai,
                        fallback_reason: None,
                        error: None,
                    };
                }

                debug!(
                    comment = %comment.normalized_text,
                    confidence = verdict.confidence,
                    min_confidence = self.settings.min_confidence,
                    "Service confidence below threshold"
                );
                self.fallback(comment, FallbackReason::LowConfidence, None, &mut stage)
            }
            Err(err) => {
                warn!(
                    client = ai.name(),
                    comment = %comment.normalized_text,
                    error = %err,
                    "Classification service failed; using rules"
                );

                if self.breaker.record_failure() {
                    warn!(
                        threshold = self.breaker.threshold(),
                        "Circuit breaker opened; remaining comments use rules"
                    );
                }

                let kind = ErrorKind::AiService(err.failure());
                self.fallback(comment, FallbackReason::AiError, Some(kind), &mut stage)
            }
        }
    }

    /// Service call with timeout, one transient reattempt, then validation
    async fn query(&self, ai: &dyn AiClassifier, text: &str) -> Result<AiVerdict, AiServiceError> {
        let mut response = self.attempt(ai, text).await;

        if let Err(err) = &response {
            if err.is_transient() {
                debug!(error = %err, "Reattempting classification request");
                response = self.attempt(ai, text).await;
            }
        }

        validate_response(&response?)
    }

    async fn attempt(&self, ai: &dyn AiClassifier, text: &str) -> Result<Value, AiServiceError> {
        // Queueing for the rate limiter does not count against the timeout
        ai.ready().await;
        match tokio::time::timeout(self.settings.timeout, ai.classify(text)).await {
            Ok(response) => response,
            Err(_) => Err(AiServiceError::Timeout(self.settings.timeout)),
        }
    }

    fn fallback(
        &self,
        comment: &Comment,
        reason: FallbackReason,
        error: Option<ErrorKind>,
        stage: &mut StageTrace<'_>,
    ) -> ClassificationResult {
        stage.advance(ClassificationStage::RuleFallback);
        let verdict = self.rules.classify(&comment.normalized_text);
        stage.advance(ClassificationStage::Done);

        ClassificationResult {
            comment: comment.clone(),
            sentiment: verdict.sentiment,
            confidence: verdict.confidence,
            themes: verdict.themes,
            source: ClassificationSource::RuleBased,
            fallback_reason: Some(reason),
            error,
        }
    }

    fn internal_failure(&self, comment: &Comment) -> ClassificationResult {
        let reason = if self.ai.is_some() {
            FallbackReason::AiError
        } else {
            FallbackReason::AiNotConfigured
        };

        ClassificationResult {
            comment: comment.clone(),
            sentiment: Sentiment::Neutral,
            confidence: 0.0,
            themes: BTreeSet::new(),
            source: ClassificationSource::RuleBased,
            fallback_reason: Some(reason),
            error: Some(ErrorKind::Internal),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
