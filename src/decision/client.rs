//! Decision-service client: transport, retries, circuit breaking
//!
//! The transport is a trait so the coordinator is agnostic to which
//! concrete provider answers; the HTTP implementation speaks both
//! Anthropic and OpenAI-compatible formats. The client wraps a transport
//! with retry/backoff/jitter and a failure-rate circuit breaker that
//! short-circuits to the deterministic fallback generator while open.

use crate::core::config::DecisionConfig;
use crate::core::error::{AgoraError, Result};
use crate::core::types::Provenance;
use crate::decision::fallback::FallbackGenerator;
use crate::decision::{DecisionRequest, DecisionResponse, GenerationParams};
use crate::world::metrics::MetricsCollector;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// The opaque decision-service boundary
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn generate(&self, context: &str, params: &GenerationParams) -> Result<String>;
}

/// API format type
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAi,
}

/// HTTP decision service for Anthropic and OpenAI-compatible APIs
pub struct HttpDecisionService {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
}

impl HttpDecisionService {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            api_format,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            // DeepSeek, OpenAI, vLLM and other compatible endpoints
            ApiFormat::OpenAi
        }
    }

    /// Create a service from environment variables
    ///
    /// Required: AGORA_API_KEY
    /// Optional: AGORA_API_URL (defaults to the Anthropic API)
    /// Optional: AGORA_MODEL
    pub fn from_env(default_model: &str) -> Result<Self> {
        let api_key = std::env::var("AGORA_API_KEY")
            .map_err(|_| AgoraError::ServiceUnavailable("AGORA_API_KEY not set".into()))?;
        let api_url = std::env::var("AGORA_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".into());
        let model = std::env::var("AGORA_MODEL").unwrap_or_else(|_| default_model.into());
        Ok(Self::new(api_key, api_url, model))
    }

    async fn generate_anthropic(&self, context: &str, params: &GenerationParams) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![Message {
                role: "user".into(),
                content: context.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgoraError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgoraError::ServiceUnavailable(format!(
                "API error: {}",
                error_text
            )));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgoraError::ServiceUnavailable(e.to_string()))?;

        completion
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| AgoraError::ServiceUnavailable("Empty response".into()))
    }

    async fn generate_openai(&self, context: &str, params: &GenerationParams) -> Result<String> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![Message {
                role: "user".into(),
                content: context.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgoraError::ServiceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgoraError::ServiceUnavailable(format!(
                "API error: {}",
                error_text
            )));
        }

        let completion: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AgoraError::ServiceUnavailable(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AgoraError::ServiceUnavailable("Empty response".into()))
    }
}

#[async_trait]
impl DecisionService for HttpDecisionService {
    async fn generate(&self, context: &str, params: &GenerationParams) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => self.generate_anthropic(context, params).await,
            ApiFormat::OpenAi => self.generate_openai(context, params).await,
        }
    }
}

/// A service that is never reachable. Offline runs and degradation tests
/// use it to exercise the full fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineDecisionService;

#[async_trait]
impl DecisionService for OfflineDecisionService {
    async fn generate(&self, _context: &str, _params: &GenerationParams) -> Result<String> {
        Err(AgoraError::ServiceUnavailable("offline".into()))
    }
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

// Shared
#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Failure-rate circuit breaker over a fixed-size call window
struct CircuitBreaker {
    window: u32,
    failure_rate: f64,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, Default)]
struct BreakerState {
    calls: u32,
    failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    fn new(window: u32, failure_rate: f64, cooldown: Duration) -> Self {
        Self {
            window: window.max(1),
            failure_rate,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn is_open(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Cooldown elapsed; close and probe the service again.
                state.open_until = None;
                state.calls = 0;
                state.failures = 0;
                false
            }
            None => false,
        }
    }

    fn record(&self, success: bool) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.calls += 1;
        if !success {
            state.failures += 1;
        }
        if state.calls >= self.window {
            let rate = f64::from(state.failures) / f64::from(state.calls);
            if rate >= self.failure_rate {
                state.open_until = Some(Instant::now() + self.cooldown);
                tracing::warn!(
                    failures = state.failures,
                    calls = state.calls,
                    cooldown_ms = self.cooldown.as_millis() as u64,
                    "decision service circuit breaker tripped"
                );
            }
            state.calls = 0;
            state.failures = 0;
        }
    }
}

/// Retrying client over a decision service
pub struct DecisionClient {
    service: Arc<dyn DecisionService>,
    fallback: FallbackGenerator,
    metrics: Arc<MetricsCollector>,
    breaker: CircuitBreaker,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    request_timeout: Duration,
}

impl DecisionClient {
    pub fn new(
        service: Arc<dyn DecisionService>,
        metrics: Arc<MetricsCollector>,
        config: &DecisionConfig,
    ) -> Self {
        Self {
            service,
            fallback: FallbackGenerator::new(),
            metrics,
            breaker: CircuitBreaker::new(
                config.breaker_window,
                config.breaker_failure_rate,
                Duration::from_millis(config.breaker_cooldown_ms),
            ),
            max_retries: config.max_retries.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// One decision call with retries.
    ///
    /// While the breaker is open this resolves immediately from the
    /// fallback generator. After exhausting retries it fails with
    /// `ServiceUnavailable`; the coordinator turns that into a fallback
    /// response, so the failure never reaches an actor.
    pub async fn call(&self, request: &DecisionRequest) -> Result<DecisionResponse> {
        let started = Instant::now();

        if self.breaker.is_open() {
            let text = self.fallback.generate(request);
            let latency = started.elapsed();
            self.metrics.record_decision(Provenance::Fallback, latency);
            return Ok(DecisionResponse {
                text,
                provenance: Provenance::Fallback,
                latency,
            });
        }

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            let outcome = tokio::time::timeout(
                self.request_timeout,
                self.service.generate(&request.context, &request.params),
            )
            .await;

            match outcome {
                Ok(Ok(text)) => {
                    self.breaker.record(true);
                    let latency = started.elapsed();
                    self.metrics.record_decision(Provenance::Live, latency);
                    return Ok(DecisionResponse {
                        text,
                        provenance: Provenance::Live,
                        latency,
                    });
                }
                Ok(Err(e)) => {
                    self.breaker.record(false);
                    last_error = e.to_string();
                }
                Err(_) => {
                    self.breaker.record(false);
                    last_error = format!("timed out after {:?}", self.request_timeout);
                }
            }

            tracing::debug!(
                actor = %request.actor,
                attempt = attempt + 1,
                error = %last_error,
                "decision call failed"
            );

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(AgoraError::ServiceUnavailable(last_error))
    }

    /// Exponential backoff with up to 50% jitter, capped at `max_backoff`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        let jitter_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..=exp.as_millis().max(1) as u64 / 2)
        };
        (exp + Duration::from_millis(jitter_ms)).min(self.max_backoff)
    }
}
