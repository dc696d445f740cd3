//! Image encoding for the VLM request: `DynamicImage` → base64 PNG `ImageData`.
//!
//! PNG keeps MRZ glyphs and fine print crisp; JPEG artefacts around small
//! high-contrast characters are a common source of misread passport numbers.
//! Alpha is dropped first because scanned documents never need it and some
//! providers reject RGBA payloads.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page image as a base64 PNG with `detail: "high"`.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        rgb.width(),
        rgb.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
