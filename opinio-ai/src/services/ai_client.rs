//! Classification service client
//!
//! The service is an opaque RPC boundary: request `{ "text": ... }`, response
//! `{ "sentiment": ..., "confidence": ..., "themes"?: [...] }`. Clients return
//! the raw JSON body; [`validate_response`] enforces the structural contract
//! so every client implementation is held to the same rules.

use crate::config::AiSettings;
use crate::error::AiFailure;
use crate::models::Sentiment;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "Opinio/0.1.0";

/// Maximum response body echoed into error messages
const MAX_ERROR_BODY: usize = 200;

/// Classification service errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiServiceError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl AiServiceError {
    /// Failure category recorded on results
    pub fn failure(&self) -> AiFailure {
        match self {
            AiServiceError::Timeout(_) => AiFailure::Timeout,
            AiServiceError::Transport(_) => AiFailure::Transport,
            AiServiceError::HttpStatus(..) => AiFailure::HttpStatus,
            AiServiceError::Malformed(_) => AiFailure::MalformedResponse,
        }
    }

    /// Worth one reattempt (connection-level failures only)
    pub fn is_transient(&self) -> bool {
        matches!(self, AiServiceError::Transport(_))
    }
}

/// Validated service verdict
#[derive(Debug, Clone, PartialEq)]
pub struct AiVerdict {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub themes: BTreeSet<String>,
}

/// Classification service client
///
/// Implementations perform a single attempt; timeouts and reattempts are the
/// orchestrator's job.
#[async_trait]
pub trait AiClassifier: Send + Sync {
    /// Client name for logging
    fn name(&self) -> &'static str;

    /// Wait until the client may send another request
    ///
    /// Called before every attempt, outside the request timeout.
    async fn ready(&self) {}

    /// Submit one comment and return the raw response body
    async fn classify(&self, text: &str) -> Result<Value, AiServiceError>;
}

/// Check a response against the structural contract
///
/// - `sentiment`: one of positive/neutral/negative (case-insensitive)
/// - `confidence`: number within 0.0-1.0
/// - `themes`: optional array; non-string and blank entries are dropped
pub fn validate_response(value: &Value) -> Result<AiVerdict, AiServiceError> {
    let object = value
        .as_object()
        .ok_or_else(|| AiServiceError::Malformed("response is not a JSON object".to_string()))?;

    let sentiment = object
        .get("sentiment")
        .and_then(Value::as_str)
        .ok_or_else(|| AiServiceError::Malformed("missing string field 'sentiment'".to_string()))?
        .parse::<Sentiment>()
        .map_err(AiServiceError::Malformed)?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| AiServiceError::Malformed("missing numeric field 'confidence'".to_string()))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(AiServiceError::Malformed(format!(
            "confidence {} outside 0.0-1.0",
            confidence
        )));
    }

    let themes = match object.get("themes") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(_) => {
            return Err(AiServiceError::Malformed(
                "'themes' must be an array of strings".to_string(),
            ))
        }
    };

    Ok(AiVerdict {
        sentiment,
        confidence: confidence as f32,
        themes,
    })
}

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP JSON classification client
pub struct HttpAiClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    rate_limiter: DirectRateLimiter,
}

impl HttpAiClassifier {
    /// Build client from settings; requires `endpoint`
    pub fn new(settings: &AiSettings) -> Result<Self, AiServiceError> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| AiServiceError::Transport("no endpoint configured".to_string()))?;

        let per_second = NonZeroU32::new(settings.requests_per_second)
            .ok_or_else(|| AiServiceError::Transport("requests_per_second must be > 0".to_string()))?;
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_second(per_second));

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AiServiceError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key: settings.api_key.clone(),
            timeout: settings.timeout,
            rate_limiter,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> AiServiceError {
        if err.is_timeout() {
            AiServiceError::Timeout(self.timeout)
        } else {
            AiServiceError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl AiClassifier for HttpAiClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn ready(&self) {
        self.rate_limiter.until_ready().await;
    }

    async fn classify(&self, text: &str) -> Result<Value, AiServiceError> {
        let mut request = self.http_client.post(&self.endpoint).json(&json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(endpoint = %self.endpoint, chars = text.len(), "Querying classification service");

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(AiServiceError::HttpStatus(status.as_u16(), body));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                AiServiceError::Timeout(self.timeout)
            } else {
                AiServiceError::Malformed(e.to_string())
            }
        })
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
