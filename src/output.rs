//! Result types produced by the extraction pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open field mapping returned by the oracle, keyed by field name.
///
/// The schema is defined by the instruction text, not by this crate, so it
/// is kept as semi-structured JSON rather than a fixed struct.
pub type FieldMap = Map<String, Value>;

/// Extraction result for one page.
///
/// Serialises to the shape downstream stores expect:
/// `{ "data": {…}, "page": 1 | null, "blurIntensity": 0–100, "glareIntensity": 0–100 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Normalised fields for this page.
    pub data: FieldMap,
    /// 1-indexed page number, `None` when the source had a single page.
    pub page: Option<usize>,
    /// 0 = sharp, 100 = unusable.
    pub blur_intensity: u8,
    /// Percentage of pixels flagged as glare.
    pub glare_intensity: u8,
}

/// Timing and size statistics for one pipeline invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages produced by the splitter.
    pub page_count: usize,
    /// Wall-clock time for the whole invocation.
    pub total_duration_ms: u64,
    /// Time spent decoding or rasterising the input.
    pub split_duration_ms: u64,
    /// Time spent inside oracle calls (summed across pages).
    pub oracle_duration_ms: u64,
}

/// Ordered results plus statistics, as returned by [`crate::extract::process_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// One result per page, in page order.
    pub results: Vec<ExtractionResult>,
    pub stats: ExtractionStats,
}
