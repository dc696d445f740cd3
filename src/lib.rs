//! # edgequake-docextract
//!
//! Extract structured fields from scanned identity and business documents
//! using Vision Language Models (VLMs), with per-page image quality scores.
//!
//! ## Why this crate?
//!
//! KYC and onboarding flows receive phone photos and scans of identity
//! cards, passports, bank slips, company forms, and utility bills. Template
//! OCR breaks on every new layout; a VLM reads the page as a human would and
//! returns the fields an instruction asks for. This crate wraps that call in
//! a deterministic pipeline: file-type dispatch, PDF rasterisation, blur and
//! glare scoring so callers can ask for a re-take, and mechanical repair of
//! the oracle's known quirks.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Type    validate the declared document type (fails before any I/O)
//!  ├─ 2. Split   %PDF → pdfium pages (spawn_blocking); else decode one image
//!  ├─ 3. Oracle  one VLM call per page, strictly in order
//!  ├─ 4. Score   blur (Laplacian variance) + glare (local outliers), 0–100
//!  ├─ 5. Repair  per-type normaliser (passport number, registration number)
//!  └─ 6. Output  [{ data, page, blurIntensity, glareIntensity }, …]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docextract::{process_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = process_file("passport.jpg", "passport", &config).await?;
//!     for r in &output.results {
//!         println!("{:?} blur={} glare={}", r.page, r.blur_intensity, r.glare_intensity);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! The oracle and rasteriser are traits. Inject deterministic stubs with
//! [`Extractor::with_parts`]:
//!
//! ```rust
//! use async_trait::async_trait;
//! use edgequake_docextract::{
//!     BoxError, ExtractionConfig, ExtractionOracle, Extractor, FieldMap, PdfiumRasterizer,
//! };
//! use image::DynamicImage;
//! use std::sync::Arc;
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl ExtractionOracle for Fixed {
//!     async fn infer(&self, _: &DynamicImage, _: &str) -> Result<FieldMap, BoxError> {
//!         Ok(serde_json::from_str(r#"{"name":"Jane"}"#)?)
//!     }
//! }
//!
//! let extractor = Extractor::with_parts(
//!     Arc::new(Fixed),
//!     Arc::new(PdfiumRasterizer::default()),
//!     ExtractionConfig::default(),
//! );
//! assert_eq!(extractor.config().dpi, 300);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docextract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docextract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, QualityConfig};
pub use document::DocumentType;
pub use error::{BoxError, ExtractError};
pub use extract::{process, process_file, process_sync, write_results, Extractor};
pub use output::{ExtractionOutput, ExtractionResult, ExtractionStats, FieldMap};
pub use pipeline::normalize::{normalize_passport_number, split_registration_numbers, NormalizerRegistry};
pub use pipeline::oracle::{BoundedOracle, ExtractionOracle, VlmOracle};
pub use pipeline::quality::{QualityScorer, QualityScores};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use pipeline::split::PageImage;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::InstructionRegistry;
