//! Field normalisation: deterministic repair of malformed oracle output.
//!
//! The oracle is probabilistic. It occasionally returns values that are
//! *readable* but *syntactically wrong* for the field they fill: a passport
//! number with MRZ filler and the nationality glued on, or two company
//! registration numbers packed into one string. Those can be repaired
//! mechanically, so they are, here, after extraction.
//!
//! Normalisers are keyed by [`DocumentType`] in a [`NormalizerRegistry`].
//! Types with no entry pass through unchanged. Each normaliser takes the
//! field map by reference and returns a new one; the oracle's original map
//! is never modified in place. Only the keys a normaliser needs are
//! inspected; everything else is carried through untouched.

use crate::document::DocumentType;
use crate::output::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A post-processor for one document type's field map.
pub type Normalizer = fn(&FieldMap) -> FieldMap;

/// Lookup table from document type to normaliser; identity when absent.
#[derive(Clone)]
pub struct NormalizerRegistry {
    entries: HashMap<DocumentType, Normalizer>,
}

impl fmt::Debug for NormalizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::empty()
            .with(DocumentType::Passport, normalize_passport_fields)
            .with(DocumentType::SsmFormD, split_registration_numbers)
    }
}

impl NormalizerRegistry {
    /// A registry with no normalisers: every type passes through.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register (or replace) the normaliser for `doc_type`.
    pub fn with(mut self, doc_type: DocumentType, normalizer: Normalizer) -> Self {
        self.entries.insert(doc_type, normalizer);
        self
    }

    pub fn has(&self, doc_type: DocumentType) -> bool {
        self.entries.contains_key(&doc_type)
    }

    /// Run the normaliser registered for `doc_type`, or clone `data` unchanged.
    pub fn apply(&self, doc_type: DocumentType, data: &FieldMap) -> FieldMap {
        match self.entries.get(&doc_type) {
            Some(normalize) => normalize(data),
            None => data.clone(),
        }
    }
}

// ── Passport number ──────────────────────────────────────────────────────

/// ICAO 9303 passport-number field width.
const PASSPORT_NUMBER_LEN: usize = 9;

/// MRZ filler character.
const MRZ_FILLER: char = '<';

/// Clean a passport number read by the oracle.
///
/// 1. Uppercase; keep only `A–Z`, `0–9` and the MRZ filler `<`.
/// 2. Drop the fillers.
/// 3. Strip a trailing `country_code`, matched exactly as given (the oracle
///    sometimes appends the nationality it read from the adjacent MRZ field).
/// 4. A 10-character result ending in a digit has a stray check digit; drop it.
/// 5. Keep the first 9 characters.
///
/// Returns `None` for empty input or when nothing survives cleaning.
pub fn normalize_passport_number(raw: &str, country_code: Option<&str>) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let mut s: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == MRZ_FILLER)
        .filter(|c| *c != MRZ_FILLER)
        .collect();

    if let Some(code) = country_code.filter(|c| !c.is_empty()) {
        if s.ends_with(code) {
            s.truncate(s.len() - code.len());
        }
    }

    if s.len() == PASSPORT_NUMBER_LEN + 1 && s.ends_with(|c: char| c.is_ascii_digit()) {
        s.pop();
    }

    s.truncate(PASSPORT_NUMBER_LEN);
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Passport normaliser: rewrites `passportNumber` using `countryCode`.
///
/// Runs only when `passportNumber` is present and non-empty. A value that
/// cleans to nothing is stored as `null`.
pub fn normalize_passport_fields(data: &FieldMap) -> FieldMap {
    let mut out = data.clone();
    let Some(raw) = data.get("passportNumber").filter(|v| is_truthy(v)) else {
        return out;
    };

    let country = data.get("countryCode").and_then(Value::as_str);
    let cleaned = normalize_passport_number(&value_as_text(raw), country);
    out.insert(
        "passportNumber".to_string(),
        cleaned.map(Value::String).unwrap_or(Value::Null),
    );
    out
}

// ── Company registration number ──────────────────────────────────────────

/// `"201934234321 (RT0069300-M)"` → new 12-digit number + old-format number.
static RE_COMBINED_REGISTRATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{12})\s*\(([^)]+)\)$").unwrap());

/// SSM Form D normaliser: split a combined registration number.
///
/// Checks `registrationNumber` first, then `oldRegistrationNumber`. On a
/// match both fields are overwritten with the two halves; otherwise the map
/// is returned as-is.
pub fn split_registration_numbers(data: &FieldMap) -> FieldMap {
    let mut out = data.clone();

    let split = ["registrationNumber", "oldRegistrationNumber"]
        .iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .find_map(split_combined_registration);

    if let Some((new_number, old_number)) = split {
        out.insert("registrationNumber".to_string(), Value::String(new_number));
        out.insert("oldRegistrationNumber".to_string(), Value::String(old_number));
    }
    out
}

fn split_combined_registration(value: &str) -> Option<(String, String)> {
    RE_COMBINED_REGISTRATION
        .captures(value.trim())
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

// ── Value helpers ────────────────────────────────────────────────────────

/// Whether a JSON value carries anything worth normalising.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a scalar as plain text; strings are not quoted.
fn value_as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
