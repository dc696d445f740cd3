//! Extraction entry points: type check → split → per-page oracle → results.
//!
//! [`Extractor`] owns the collaborators (oracle, rasteriser, scorer,
//! normaliser table) and runs one invocation at a time over a byte buffer.
//! The free functions ([`process`], [`process_file`], [`process_sync`]) build
//! an `Extractor` from an [`ExtractionConfig`] for one-shot use.
//!
//! ## Why sequential pages?
//!
//! The oracle is the bottleneck and is not assumed to be reentrant, so pages
//! within one invocation go through it strictly one after another. Callers
//! that run many invocations at once should share a
//! [`BoundedOracle`](crate::pipeline::oracle::BoundedOracle).
//!
//! ## Failure model
//!
//! No retries and no partial results: the first page whose oracle call fails
//! fails the whole invocation with [`ExtractError::OracleInvocation`].

use crate::config::ExtractionConfig;
use crate::document::DocumentType;
use crate::error::ExtractError;
use crate::output::{ExtractionOutput, ExtractionResult, ExtractionStats};
use crate::pipeline::input::load_input;
use crate::pipeline::normalize::NormalizerRegistry;
use crate::pipeline::oracle::{resolve_oracle, ExtractionOracle};
use crate::pipeline::quality::QualityScorer;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::split::{split_pages, PageImage};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The extraction pipeline with its collaborators bound.
pub struct Extractor {
    oracle: Arc<dyn ExtractionOracle>,
    rasterizer: Arc<dyn Rasterizer>,
    scorer: QualityScorer,
    normalizers: NormalizerRegistry,
    config: ExtractionConfig,
}

impl Extractor {
    /// Build an extractor, resolving the oracle from `config` (see
    /// [`resolve_oracle`]) and rasterising PDFs with pdfium.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let oracle = resolve_oracle(&config)?;
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.max_rendered_pixels));
        Ok(Self::with_parts(oracle, rasterizer, config))
    }

    /// Build an extractor from explicit collaborators.
    pub fn with_parts(
        oracle: Arc<dyn ExtractionOracle>,
        rasterizer: Arc<dyn Rasterizer>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            oracle,
            rasterizer,
            scorer: QualityScorer::new(config.quality.clone()),
            normalizers: NormalizerRegistry::default(),
            config,
        }
    }

    /// Replace the normaliser table (defaults: passport, SSM Form D).
    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the pipeline on raw bytes for a caller-declared type string.
    ///
    /// The type is validated before any decoding or oracle call.
    pub async fn process(
        &self,
        bytes: &[u8],
        doc_type: &str,
    ) -> Result<Vec<ExtractionResult>, ExtractError> {
        let doc_type: DocumentType = doc_type.parse()?;
        self.process_document(bytes, doc_type).await
    }

    /// Run the pipeline on raw bytes for an already-validated type.
    pub async fn process_document(
        &self,
        bytes: &[u8],
        doc_type: DocumentType,
    ) -> Result<Vec<ExtractionResult>, ExtractError> {
        Ok(self.run(bytes, doc_type).await?.results)
    }

    /// Like [`Extractor::process_document`], with timing statistics.
    pub async fn run(
        &self,
        bytes: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();
        info!("Starting extraction: {} ({} bytes)", doc_type, bytes.len());

        let split_start = Instant::now();
        let pages = self.split(bytes).await?;
        let split_duration_ms = split_start.elapsed().as_millis() as u64;

        let (results, oracle_duration_ms) = self.extract_timed(&pages, doc_type).await?;

        let stats = ExtractionStats {
            page_count: pages.len(),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            split_duration_ms,
            oracle_duration_ms,
        };
        info!(
            "Extraction complete: {} pages in {}ms (oracle {}ms)",
            stats.page_count, stats.total_duration_ms, stats.oracle_duration_ms
        );
        Ok(ExtractionOutput { results, stats })
    }

    /// Split raw bytes into page images at the configured DPI.
    pub async fn split(&self, bytes: &[u8]) -> Result<Vec<PageImage>, ExtractError> {
        let pages = split_pages(bytes, self.rasterizer.as_ref(), self.config.dpi).await?;
        debug!("Split into {} page(s)", pages.len());
        Ok(pages)
    }

    /// Extract fields from already-split pages, one oracle call per page, in
    /// page order.
    pub async fn extract(
        &self,
        pages: &[PageImage],
        doc_type: DocumentType,
    ) -> Result<Vec<ExtractionResult>, ExtractError> {
        Ok(self.extract_timed(pages, doc_type).await?.0)
    }

    async fn extract_timed(
        &self,
        pages: &[PageImage],
        doc_type: DocumentType,
    ) -> Result<(Vec<ExtractionResult>, u64), ExtractError> {
        let instruction = self.config.instructions.lookup(doc_type)?;
        let total = pages.len();
        let callback = self.config.progress_callback.as_ref();

        if let Some(cb) = callback {
            cb.on_extraction_start(total);
        }

        let mut results = Vec::with_capacity(total);
        let mut oracle_ms = 0u64;

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            if let Some(cb) = callback {
                cb.on_page_start(page_num, total);
            }

            let oracle_start = Instant::now();
            let fields = self.oracle.infer(&page.image, instruction).await;
            oracle_ms += oracle_start.elapsed().as_millis() as u64;

            let fields = match fields {
                Ok(fields) => fields,
                Err(source) => {
                    warn!("Oracle failed on page {}/{}: {}", page_num, total, source);
                    if let Some(cb) = callback {
                        cb.on_page_error(page_num, total, &source.to_string());
                        cb.on_extraction_complete(total, results.len());
                    }
                    return Err(ExtractError::OracleInvocation {
                        page: page_num,
                        source,
                    });
                }
            };

            let scores = self.scorer.score(&page.image);
            let data = self.normalizers.apply(doc_type, &fields);
            debug!(
                "Page {}/{}: {} fields, blur {}, glare {}",
                page_num,
                total,
                data.len(),
                scores.blur,
                scores.glare
            );

            if let Some(cb) = callback {
                cb.on_page_complete(page_num, total, data.len());
            }
            results.push(ExtractionResult {
                data,
                page: page.page,
                blur_intensity: scores.blur,
                glare_intensity: scores.glare,
            });
        }

        if let Some(cb) = callback {
            cb.on_extraction_complete(total, results.len());
        }
        Ok((results, oracle_ms))
    }
}

// ── One-shot entry points ────────────────────────────────────────────────

/// Extract fields from raw bytes.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docextract::{process, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("passport.jpg")?;
/// let results = process(&bytes, "passport", &ExtractionConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&results)?);
/// # Ok(())
/// # }
/// ```
pub async fn process(
    bytes: &[u8],
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractionResult>, ExtractError> {
    let doc_type: DocumentType = doc_type.parse()?;
    Extractor::new(config.clone())?
        .process_document(bytes, doc_type)
        .await
}

/// Load a path or URL, then extract with statistics.
pub async fn process_file(
    input: impl AsRef<str>,
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let doc_type: DocumentType = doc_type.parse()?;
    let loaded = load_input(input.as_ref(), config).await?;
    Extractor::new(config.clone())?
        .run(&loaded.bytes, doc_type)
        .await
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    bytes: &[u8],
    doc_type: &str,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractionResult>, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(bytes, doc_type, config))
}

/// Write results as pretty JSON.
///
/// Atomic: the JSON goes to a temp file in the target directory, which is
/// then renamed over `path`, so readers never see a partial file.
pub fn write_results(results: &[ExtractionResult], path: impl AsRef<Path>) -> Result<(), ExtractError> {
    let path = path.as_ref();
    let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(results)
        .map_err(|e| ExtractError::Internal(format!("Failed to serialise results: {}", e)))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&json).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("Wrote {} results to {}", results.len(), path.display());
    Ok(())
}
