//! The extraction oracle: image + instruction in, field map out.
//!
//! The pipeline only sees the [`ExtractionOracle`] trait, so tests run
//! against a deterministic stub and deployments can swap the backend without
//! touching orchestration. [`VlmOracle`] is the production implementation on
//! top of any `edgequake_llm` vision provider.
//!
//! ## Concurrency
//!
//! A loaded model is a scarce resource and is not assumed to be reentrant.
//! The pipeline itself never calls the oracle concurrently, but a service
//! running many invocations at once must bound access. [`BoundedOracle`]
//! wraps any oracle with a semaphore and an optional per-call timeout for
//! exactly that; the pipeline adds no locking, timeout, or retry of its own.

use crate::config::ExtractionConfig;
use crate::error::{BoxError, ExtractError};
use crate::output::FieldMap;
use crate::pipeline::encode::encode_page;
use crate::pipeline::parse::{parse_fields, ParseError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Field-extraction capability invoked once per page.
///
/// Implementations must fail loudly: an unparseable or empty answer is an
/// error, never a silently empty map.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn infer(&self, image: &DynamicImage, instruction: &str) -> Result<FieldMap, BoxError>;
}

/// Failures raised by the built-in oracles.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to encode page image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("provider call failed: {0}")]
    Provider(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("oracle call timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("oracle is shut down")]
    Closed,
}

// ── VlmOracle ────────────────────────────────────────────────────────────

/// Oracle backed by a vision LLM provider.
///
/// Sends one user turn holding the instruction text and the page PNG, then
/// parses the reply with [`parse_fields`].
pub struct VlmOracle {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl VlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExtractionOracle for VlmOracle {
    async fn infer(&self, image: &DynamicImage, instruction: &str) -> Result<FieldMap, BoxError> {
        let start = Instant::now();
        let image_data = encode_page(image).map_err(OracleError::from)?;
        let messages = vec![ChatMessage::user_with_images(instruction, vec![image_data])];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| OracleError::Provider(e.to_string()))?;

        debug!(
            "Oracle: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(parse_fields(&response.content).map_err(OracleError::from)?)
    }
}

// ── BoundedOracle ────────────────────────────────────────────────────────

/// Wraps an oracle with at-most-N concurrent calls and an optional timeout.
///
/// Share one `BoundedOracle` (behind an `Arc`) across every concurrent
/// pipeline invocation that targets the same model instance.
pub struct BoundedOracle {
    inner: Arc<dyn ExtractionOracle>,
    permits: Semaphore,
    timeout: Option<Duration>,
}

impl BoundedOracle {
    /// `max_concurrent` is clamped to at least 1.
    pub fn new(inner: Arc<dyn ExtractionOracle>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
            timeout: None,
        }
    }

    /// Fail a call that has not returned within `timeout` (queueing excluded).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ExtractionOracle for BoundedOracle {
    async fn infer(&self, image: &DynamicImage, instruction: &str) -> Result<FieldMap, BoxError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OracleError::Closed)?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.infer(image, instruction))
                .await
                .map_err(|_| OracleError::Timeout {
                    ms: limit.as_millis() as u64,
                })?,
            None => self.inner.infer(image, instruction).await,
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::Configuration(format!(
            "LLM provider '{provider_name}' is not configured: {e}"
        ))
    })
}

/// Resolve the oracle, from most-specific to least-specific:
///
/// 1. `config.oracle`, used as-is.
/// 2. `config.provider`, wrapped in a [`VlmOracle`].
/// 3. `config.provider_name` (+ `config.model`, default [`DEFAULT_MODEL`]).
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 5. `OPENAI_API_KEY` present → OpenAI.
/// 6. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_oracle(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionOracle>, ExtractError> {
    if let Some(ref oracle) = config.oracle {
        return Ok(Arc::clone(oracle));
    }

    let provider = resolve_provider(config)?;
    info!(
        "Using vision provider {} (model {})",
        config.provider_name.as_deref().unwrap_or("auto"),
        config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    );
    Ok(Arc::new(VlmOracle::new(
        provider,
        config.temperature,
        config.max_tokens,
    )))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        ExtractError::Configuration(format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
             Error: {e}"
        ))
    })?;
    Ok(llm_provider)
}
