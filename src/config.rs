//! Configuration types for document extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Setters clamp out-of-range values;
//! [`ExtractionConfigBuilder::build`] rejects combinations that cannot work
//! (an empty blur window, a glare window too small to have a neighbourhood).

use crate::error::ExtractError;
use crate::pipeline::oracle::ExtractionOracle;
use crate::progress::ProgressCallback;
use crate::prompts::InstructionRegistry;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a document extraction.
///
/// # Example
/// ```rust
/// use edgequake_docextract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rasterisation DPI for PDF input. Range: 72–600. Default: 300.
    ///
    /// Identity documents carry small print (MRZ lines, security text);
    /// 300 DPI keeps it legible to the vision model.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 4000.
    ///
    /// An A4 page at 300 DPI is 2480 × 3508 px; the cap only bites on
    /// oversized pages, keeping memory bounded.
    pub max_rendered_pixels: u32,

    /// Blur and glare scoring parameters.
    pub quality: QualityConfig,

    /// Pre-constructed oracle. Takes precedence over every provider setting.
    pub oracle: Option<Arc<dyn ExtractionOracle>>,

    /// Pre-constructed LLM provider wrapped in a [`crate::pipeline::oracle::VlmOracle`].
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1024.
    pub max_tokens: usize,

    /// Instruction text per document type.
    pub instructions: InstructionRegistry,

    /// Maximum accepted input size in bytes. Default: 10 MiB.
    pub max_file_size: u64,

    /// Accepted file extensions, lower-case without the dot.
    pub allowed_extensions: Vec<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback fired by the orchestrator.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            quality: QualityConfig::default(),
            oracle: None,
            provider: None,
            provider_name: None,
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            instructions: InstructionRegistry::default(),
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "pdf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("quality", &self.quality)
            .field("oracle", &self.oracle.as_ref().map(|_| "<dyn ExtractionOracle>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_extensions", &self.allowed_extensions)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn quality(mut self, quality: QualityConfig) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn ExtractionOracle>) -> Self {
        self.config.oracle = Some(oracle);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn instructions(mut self, registry: InstructionRegistry) -> Self {
        self.config.instructions = registry;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.quality.validate()?;
        if self.config.max_file_size == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_file_size must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Quality scoring ──────────────────────────────────────────────────────

/// Parameters for blur and glare scoring.
///
/// The defaults are tuned for phone photos and flatbed scans of ID cards
/// at 300 DPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Laplacian variance at or below which blur scores 100. Default: 100.
    pub min_var: f64,
    /// Laplacian variance at or above which blur scores 0. Default: 1000.
    pub max_var: f64,
    /// Absolute luminance (0–255) a pixel must exceed to count as glare. Default: 240.
    pub glare_threshold: u8,
    /// Side length of the local-contrast window in pixels. Default: 64.
    pub glare_window: u32,
    /// Step between windows. `None` means half the window.
    pub glare_stride: Option<u32>,
    /// How far above the window mean a pixel must be to count as glare. Default: 20.
    pub glare_local_offset: f64,
    /// Pixels at each image edge never flagged as glare. Default: 0.
    pub border_margin: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_var: 100.0,
            max_var: 1000.0,
            glare_threshold: 240,
            glare_window: 64,
            glare_stride: None,
            glare_local_offset: 20.0,
            border_margin: 0,
        }
    }
}

impl QualityConfig {
    /// Effective stride between glare windows.
    pub fn stride(&self) -> u32 {
        self.glare_stride
            .unwrap_or(self.glare_window / 2)
            .max(1)
    }

    fn validate(&self) -> Result<(), ExtractError> {
        if !(self.min_var.is_finite() && self.max_var.is_finite()) || self.min_var >= self.max_var {
            return Err(ExtractError::InvalidConfig(format!(
                "blur variance window must satisfy min_var < max_var, got {}..{}",
                self.min_var, self.max_var
            )));
        }
        if self.glare_window < 2 {
            return Err(ExtractError::InvalidConfig(format!(
                "glare window must be ≥ 2 px, got {}",
                self.glare_window
            )));
        }
        Ok(())
    }
}
