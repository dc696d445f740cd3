//! Pipeline integration tests with deterministic collaborators.
//!
//! The oracle and rasteriser are stubs that count calls, so these tests run
//! without pdfium or an API key.

use async_trait::async_trait;
use edgequake_docextract::{
    BoundedOracle, BoxError, DocumentType, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, ExtractionOracle, Extractor, FieldMap, InstructionRegistry,
    NormalizerRegistry, QualityScorer, Rasterizer,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Stubs ────────────────────────────────────────────────────────────────

/// Returns scripted responses in call order; records instructions.
struct ScriptedOracle {
    responses: Vec<Result<Value, String>>,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn new(responses: Vec<Result<Value, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        })
    }

    fn always(value: Value) -> Arc<Self> {
        Self::new(vec![Ok(value); 8])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionOracle for ScriptedOracle {
    async fn infer(&self, _image: &DynamicImage, instruction: &str) -> Result<FieldMap, BoxError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions.lock().unwrap().push(instruction.to_string());
        match self.responses.get(n) {
            Some(Ok(Value::Object(map))) => Ok(map.clone()),
            Some(Ok(other)) => Err(format!("scripted non-object: {other}").into()),
            Some(Err(msg)) => Err(msg.clone().into()),
            None => Err("oracle script exhausted".into()),
        }
    }
}

/// Produces `pages` distinct images for any PDF.
struct StubRasterizer {
    pages: usize,
    calls: AtomicUsize,
    last_dpi: AtomicUsize,
}

impl StubRasterizer {
    fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
            last_dpi: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(&self, _pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_dpi.store(dpi as usize, Ordering::SeqCst);
        Ok((0..self.pages).map(|i| textured_page(i as u8)).collect())
    }
}

/// Stripes whose spacing depends on `seed`, so pages score differently.
fn textured_page(seed: u8) -> DynamicImage {
    let period = 2 + seed as u32;
    DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, _| {
        if (x / period) % 2 == 0 {
            Rgb([30, 30, 30])
        } else {
            Rgb([220, 220, 220])
        }
    }))
}

fn jpeg_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(80, 60, |x, y| {
        let v = ((x * 7 + y * 13) % 256) as u8;
        Rgb([v, v / 2, 255 - v])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

const PDF_BYTES: &[u8] = b"%PDF-1.7\n%stub\n";

fn extractor(oracle: &Arc<ScriptedOracle>, rasterizer: &Arc<StubRasterizer>) -> Extractor {
    extractor_with(oracle, rasterizer, ExtractionConfig::default())
}

fn extractor_with(
    oracle: &Arc<ScriptedOracle>,
    rasterizer: &Arc<StubRasterizer>,
    config: ExtractionConfig,
) -> Extractor {
    Extractor::with_parts(oracle.clone(), rasterizer.clone(), config)
}

// ── Pipeline entry ───────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_type_fails_before_any_collaborator_runs() {
    let oracle = ScriptedOracle::always(json!({"name": "Jane"}));
    let rasterizer = StubRasterizer::new(2);
    let ex = extractor(&oracle, &rasterizer);

    let err = ex.process(PDF_BYTES, "driving_licence").await.unwrap_err();
    assert!(matches!(err, ExtractError::UnsupportedType { ref value } if value == "driving_licence"));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(rasterizer.calls(), 0);
}

#[tokio::test]
async fn type_matching_is_exact() {
    let oracle = ScriptedOracle::always(json!({}));
    let rasterizer = StubRasterizer::new(1);
    let ex = extractor(&oracle, &rasterizer);

    for bad in ["IC", "Passport", " ic", "ssm-form-d"] {
        let err = ex.process(PDF_BYTES, bad).await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType { .. }), "{bad:?}");
    }
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn single_jpeg_identity_card() {
    let oracle = ScriptedOracle::always(json!({"name": "Jane"}));
    let rasterizer = StubRasterizer::new(3);
    let ex = extractor(&oracle, &rasterizer);
    let bytes = jpeg_bytes();

    let results = ex.process(&bytes, "ic").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(rasterizer.calls(), 0, "a JPEG must not be rasterised");
    assert_eq!(oracle.calls(), 1);

    let decoded = image::load_from_memory(&bytes).unwrap();
    let expected = QualityScorer::new(ExtractionConfig::default().quality).score(&decoded);

    let v = serde_json::to_value(&results).unwrap();
    assert_eq!(
        v,
        json!([{
            "data": {"name": "Jane"},
            "page": null,
            "blurIntensity": expected.blur,
            "glareIntensity": expected.glare
        }])
    );
}

#[tokio::test]
async fn passport_pages_are_normalised_independently() {
    let page1 = json!({"passportNumber": "A7654321", "countryCode": "MYS"});
    let page2 = json!({"passportNumber": "P1234567<<GBR", "countryCode": "GBR"});
    let page3 = json!({"passportNumber": "K9876543", "countryCode": "SGP"});
    let oracle = ScriptedOracle::new(vec![Ok(page1.clone()), Ok(page2), Ok(page3.clone())]);
    let rasterizer = StubRasterizer::new(3);
    let ex = extractor(&oracle, &rasterizer);

    let results = ex.process(PDF_BYTES, "passport").await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(rasterizer.calls(), 1);
    assert_eq!(rasterizer.last_dpi.load(Ordering::SeqCst), 300);

    assert_eq!(results[1].data["passportNumber"], json!("P1234567"));
    assert_eq!(results[1].data["countryCode"], json!("GBR"));
    assert_eq!(Value::Object(results[0].data.clone()), page1);
    assert_eq!(Value::Object(results[2].data.clone()), page3);

    let pages: Vec<_> = results.iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
}

#[tokio::test]
async fn results_follow_page_order() {
    let oracle = ScriptedOracle::new((1..=5).map(|i| Ok(json!({ "seq": i }))).collect());
    let rasterizer = StubRasterizer::new(5);
    let ex = extractor(&oracle, &rasterizer);

    let results = ex
        .process_document(PDF_BYTES, DocumentType::BankTransfer)
        .await
        .unwrap();

    let seqs: Vec<_> = results.iter().map(|r| r.data["seq"].clone()).collect();
    assert_eq!(seqs, (1..=5).map(|i| json!(i)).collect::<Vec<_>>());

    let scorer = QualityScorer::new(ExtractionConfig::default().quality);
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.page, Some(i + 1));
        let s = scorer.score(&textured_page(i as u8));
        assert_eq!((r.blur_intensity, r.glare_intensity), (s.blur, s.glare));
    }
}

#[tokio::test]
async fn registration_numbers_split_in_pipeline() {
    let oracle = ScriptedOracle::always(json!({
        "companyName": "ACME SDN BHD",
        "registrationNumber": "201934234321 (RT0069300-M)"
    }));
    let rasterizer = StubRasterizer::new(1);
    let ex = extractor(&oracle, &rasterizer);

    let results = ex.process(PDF_BYTES, "ssm_form_d").await.unwrap();
    assert_eq!(results[0].page, None, "single-page PDF has no page number");
    assert_eq!(
        Value::Object(results[0].data.clone()),
        json!({
            "companyName": "ACME SDN BHD",
            "registrationNumber": "201934234321",
            "oldRegistrationNumber": "RT0069300-M"
        })
    );
}

#[tokio::test]
async fn types_without_normaliser_pass_through() {
    let raw = json!({"passportNumber": "P1234567<<GBR", "amount": "RM 1,000.00"});
    let oracle = ScriptedOracle::always(raw.clone());
    let rasterizer = StubRasterizer::new(1);
    let ex = extractor(&oracle, &rasterizer);

    let results = ex.process(PDF_BYTES, "cash_deposit").await.unwrap();
    assert_eq!(Value::Object(results[0].data.clone()), raw);
}

#[tokio::test]
async fn normaliser_table_can_be_replaced() {
    let raw = json!({"passportNumber": "P1234567<<GBR"});
    let oracle = ScriptedOracle::always(raw.clone());
    let rasterizer = StubRasterizer::new(1);
    let ex = extractor(&oracle, &rasterizer).with_normalizers(NormalizerRegistry::empty());

    let results = ex.process(PDF_BYTES, "passport").await.unwrap();
    assert_eq!(Value::Object(results[0].data.clone()), raw);
}

// ── Failure modes ────────────────────────────────────────────────────────

#[tokio::test]
async fn oracle_failure_aborts_without_retry() {
    let oracle = ScriptedOracle::new(vec![
        Ok(json!({"a": 1})),
        Err("model overloaded".to_string()),
        Ok(json!({"a": 3})),
    ]);
    let rasterizer = StubRasterizer::new(3);
    let ex = extractor(&oracle, &rasterizer);

    let err = ex.process(PDF_BYTES, "utility_bill").await.unwrap_err();
    match &err {
        ExtractError::OracleInvocation { page, source } => {
            assert_eq!(*page, 2);
            assert_eq!(source.to_string(), "model overloaded");
        }
        other => panic!("expected OracleInvocation, got {other:?}"),
    }
    assert_eq!(oracle.calls(), 2, "no retry and no later pages");
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn missing_instruction_is_a_configuration_error() {
    let oracle = ScriptedOracle::always(json!({}));
    let rasterizer = StubRasterizer::new(1);
    let config = ExtractionConfig::builder()
        .instructions(InstructionRegistry::default().without(DocumentType::UtilityBill))
        .build()
        .unwrap();
    let ex = extractor_with(&oracle, &rasterizer, config);

    let err = ex.process(PDF_BYTES, "utility_bill").await.unwrap_err();
    assert!(matches!(err, ExtractError::Configuration(_)));
    assert_eq!(oracle.calls(), 0);

    // Other types are still served.
    assert!(ex.process(PDF_BYTES, "ic").await.is_ok());
}

#[tokio::test]
async fn corrupt_bytes_fail_to_decode() {
    let oracle = ScriptedOracle::always(json!({}));
    let rasterizer = StubRasterizer::new(1);
    let ex = extractor(&oracle, &rasterizer);

    let err = ex.process(b"\xff\xd8\xff\xe0 truncated", "ic").await.unwrap_err();
    assert!(matches!(err, ExtractError::FileDecode { .. }));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn rasteriser_failure_is_a_decode_error() {
    struct Broken;

    #[async_trait]
    impl Rasterizer for Broken {
        async fn rasterize(&self, _pdf: &[u8], _dpi: u32) -> Result<Vec<DynamicImage>, BoxError> {
            Err("xref table corrupt".into())
        }
    }

    let oracle = ScriptedOracle::always(json!({}));
    let ex = Extractor::with_parts(oracle.clone(), Arc::new(Broken), ExtractionConfig::default());

    let err = ex.process(PDF_BYTES, "ssm_form_d").await.unwrap_err();
    assert!(matches!(err, ExtractError::FileDecode { .. }));
    assert!(std::error::Error::source(&err)
        .map(|s| s.to_string().contains("xref"))
        .unwrap_or(false));
    assert_eq!(oracle.calls(), 0);
}

// ── Collaborator wiring ──────────────────────────────────────────────────

#[tokio::test]
async fn oracle_receives_registered_instruction() {
    let oracle = ScriptedOracle::always(json!({}));
    let rasterizer = StubRasterizer::new(2);
    let config = ExtractionConfig::builder()
        .instructions(InstructionRegistry::default().with_instruction(DocumentType::Ic, "READ THE CARD"))
        .dpi(150)
        .build()
        .unwrap();
    let ex = extractor_with(&oracle, &rasterizer, config);

    ex.process(PDF_BYTES, "ic").await.unwrap();
    assert_eq!(
        *oracle.instructions.lock().unwrap(),
        vec!["READ THE CARD".to_string(), "READ THE CARD".to_string()]
    );
    assert_eq!(rasterizer.last_dpi.load(Ordering::SeqCst), 150);
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }
    fn on_page_start(&self, page: usize, _total_pages: usize) {
        self.events.lock().unwrap().push(format!("page {page}"));
    }
    fn on_page_complete(&self, page: usize, _total_pages: usize, field_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {page} ({field_count})"));
    }
    fn on_page_error(&self, page: usize, _total_pages: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {page}"));
    }
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_fire_in_page_order() {
    let recorder = Arc::new(RecordingCallback::default());
    let oracle = ScriptedOracle::new(vec![Ok(json!({"a": 1, "b": 2})), Err("boom".into())]);
    let rasterizer = StubRasterizer::new(2);
    let config = ExtractionConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let ex = extractor_with(&oracle, &rasterizer, config);

    assert!(ex.process(PDF_BYTES, "ic").await.is_err());
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "start 2",
            "page 1",
            "done 1 (2)",
            "page 2",
            "error 2",
            "complete 1/2"
        ]
    );
}

#[tokio::test]
async fn run_reports_stats() {
    let oracle = ScriptedOracle::always(json!({"x": 1}));
    let rasterizer = StubRasterizer::new(4);
    let ex = extractor(&oracle, &rasterizer);

    let out = ex.run(PDF_BYTES, DocumentType::Ic).await.unwrap();
    assert_eq!(out.stats.page_count, 4);
    assert_eq!(out.results.len(), 4);
    assert!(out.stats.total_duration_ms >= out.stats.oracle_duration_ms);
}

#[tokio::test]
async fn bounded_oracle_is_transparent_to_the_pipeline() {
    let inner = ScriptedOracle::always(json!({"name": "Jane"}));
    let bounded = Arc::new(BoundedOracle::new(inner.clone(), 1));
    let ex = Extractor::with_parts(bounded, StubRasterizer::new(2), ExtractionConfig::default());

    let results = ex.process(PDF_BYTES, "ic").await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(inner.calls(), 2);
}
