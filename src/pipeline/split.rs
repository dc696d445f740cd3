//! File-type dispatch: turn raw upload bytes into page images.
//!
//! A PDF (detected by its `%PDF` signature, never by file name) is
//! rasterised; anything else is decoded as a single raster image. Every
//! output page is normalised to 8-bit RGB so the quality scorer and the
//! oracle see one pixel format.

use crate::error::ExtractError;
use crate::pipeline::render::Rasterizer;
use image::DynamicImage;
use tracing::debug;

/// Magic bytes at offset 0 of every PDF.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// One page ready for scoring and extraction.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    /// 1-based page number for multi-page inputs; `None` for a single page.
    pub page: Option<usize>,
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

/// Split `bytes` into RGB page images, in document order.
///
/// Errors with [`ExtractError::FileDecode`] when the bytes are neither a
/// renderable PDF nor a decodable image, or when a PDF yields no pages.
pub async fn split_pages(
    bytes: &[u8],
    rasterizer: &dyn Rasterizer,
    dpi: u32,
) -> Result<Vec<PageImage>, ExtractError> {
    let images = if is_pdf(bytes) {
        debug!("Input is a PDF ({} bytes); rasterising at {} DPI", bytes.len(), dpi);
        rasterizer
            .rasterize(bytes, dpi)
            .await
            .map_err(|e| ExtractError::decode("could not rasterise PDF", e))?
    } else {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ExtractError::decode("could not decode image", e))?;
        vec![img]
    };

    if images.is_empty() {
        return Err(ExtractError::FileDecode {
            detail: "document contains no pages".to_string(),
            source: None,
        });
    }

    let multi_page = images.len() > 1;
    Ok(images
        .into_iter()
        .enumerate()
        .map(|(idx, img)| PageImage {
            image: DynamicImage::ImageRgb8(img.to_rgb8()),
            page: multi_page.then_some(idx + 1),
        })
        .collect())
}
