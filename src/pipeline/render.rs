//! PDF rasterisation: render every page of a PDF byte buffer via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and does CPU-heavy work. [`PdfiumRasterizer`] moves each document
//! onto tokio's blocking pool so async workers never stall mid-render.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Pages are rendered at `dpi / 72` scale (PDF user space is 72 units per
//! inch), so an A4 page at 300 DPI is about 2480 × 3508 px. An oversized
//! page (a scanned A0 drawing, say) would explode at that scale, so the
//! longest edge is also capped at `max_rendered_pixels`.
//!
//! ## Binding
//!
//! `PDFIUM_LIB_PATH` may point at the pdfium shared library or at the
//! directory holding it; otherwise the system library is used.

use crate::error::BoxError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Turns PDF bytes into one image per page, in document order.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, BoxError>;
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to bind pdfium library: {0}")]
    Bind(String),

    #[error("failed to open PDF: {0}")]
    Load(String),

    #[error("failed to render page {page}: {detail}")]
    Render { page: usize, detail: String },

    #[error("render task panicked: {0}")]
    Task(String),
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels,
        }
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(4000)
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, BoxError> {
        let bytes = pdf.to_vec();
        let max_pixels = self.max_rendered_pixels;

        let pages = tokio::task::spawn_blocking(move || render_all_blocking(&bytes, dpi, max_pixels))
            .await
            .map_err(|e| RasterError::Task(e.to_string()))??;
        Ok(pages)
    }
}

fn bind_pdfium() -> Result<Pdfium, RasterError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| RasterError::Bind(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation: load once, render each page at `dpi`.
fn render_all_blocking(
    pdf: &[u8],
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, RasterError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| RasterError::Load(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RasterError::Render {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    info!("PDF rasterised: {} pages at {} DPI", images.len(), dpi);
    Ok(images)
}
