//! Pipeline stages for document field extraction.
//!
//! Each submodule implements exactly one step, so every stage is testable on
//! its own and backends (rasteriser, oracle) can be swapped without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ oracle ──▶ quality ──▶ normalize
//! (bytes)  (pages)   (fields)   (scores)    (repair)
//!            │          │
//!          render   encode + parse
//!          (pdfium) (PNG/base64, JSON)
//! ```
//!
//! 1. [`input`]    : read a path or download a URL; extension and size gate
//! 2. [`split`]    : `%PDF` dispatch; PDFs go through [`render`], images are
//!    decoded directly; every page ends up RGB
//! 3. [`oracle`]   : one VLM call per page; the only stage with network I/O
//! 4. [`quality`]  : blur and glare scores, 0–100, per page
//! 5. [`normalize`]: deterministic per-type fixes to known oracle quirks

pub mod encode;
pub mod input;
pub mod normalize;
pub mod oracle;
pub mod parse;
pub mod quality;
pub mod render;
pub mod split;
