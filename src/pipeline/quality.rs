//! Image quality scoring: blur and glare intensity on a 0–100 scale.
//!
//! Both scores share a polarity: **0 is clean, 100 is unusable**, so callers
//! can threshold them the same way when deciding whether to ask for a re-take.
//!
//! ## Blur
//!
//! Variance of the Laplacian (the classic focus measure). Sharp text produces
//! strong second-derivative responses in both directions, so its Laplacian has
//! high variance; defocus smooths edges and collapses the variance. The
//! variance is mapped linearly onto `[min_var, max_var]`, clamped, and
//! inverted. A solid-colour image has zero variance and scores 100.
//!
//! ## Glare
//!
//! Percentage of pixels that are *local* brightness outliers. Each pixel must
//! clear an absolute threshold and also sit well above the mean of its
//! surrounding window. A uniformly bright background (white paper, a pale
//! card face) has a high local mean and is not flagged; a specular hotspot on
//! a laminated card is. A 3×3 morphological opening (`imageproc`) then
//! removes specks narrower than three pixels before counting.

use crate::config::QualityConfig;
use crate::pipeline::split::PageImage;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Blur and glare intensity for one image, both in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScores {
    pub blur: u8,
    pub glare: u8,
}

/// Stateless scorer bound to a [`QualityConfig`].
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Score every page in order, without touching the oracle.
    pub fn score_pages(&self, pages: &[PageImage]) -> Vec<QualityScores> {
        pages.iter().map(|page| self.score(&page.image)).collect()
    }

    /// Score an image. Pure and deterministic; never fails.
    pub fn score(&self, image: &DynamicImage) -> QualityScores {
        let gray = luminance(image);
        let variance = laplacian_variance(&gray);
        let blur = blur_from_variance(variance, &self.config);
        let glare = glare_intensity(&gray, &self.config);
        debug!(
            "Quality {}x{}: laplacian var {:.1} → blur {}, glare {}",
            gray.width(),
            gray.height(),
            variance,
            blur,
            glare
        );
        QualityScores { blur, glare }
    }
}

/// Single-channel luminance using ITU-R BT.601 weights, rounded.
pub fn luminance(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (x, y, p) in rgb.enumerate_pixels() {
        let [r, g, b] = p.0;
        let l = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        gray.put_pixel(x, y, Luma([l as u8]));
    }
    gray
}

// ── Blur ─────────────────────────────────────────────────────────────────

/// Mirror an out-of-range index back into `0..n`, excluding the edge pixel
/// itself (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(i: i64, n: i64) -> i64 {
    if n == 1 {
        return 0;
    }
    if i < 0 {
        -i
    } else if i >= n {
        2 * (n - 1) - i
    } else {
        i
    }
}

/// Variance of the 4-neighbour Laplacian `[0,1,0; 1,-4,1; 0,1,0]` over every
/// pixel, with reflect-101 borders. Returns 0 for an empty image.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let at = |x: i64, y: i64| -> f64 {
        gray.get_pixel(reflect101(x, w) as u32, reflect101(y, h) as u32).0[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let lap = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }
    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Map a Laplacian variance onto the inverted 0–100 blur scale.
///
/// Monotonically non-increasing in `variance`.
pub fn blur_from_variance(variance: f64, config: &QualityConfig) -> u8 {
    let norm = ((variance - config.min_var) / (config.max_var - config.min_var)).clamp(0.0, 1.0);
    ((1.0 - norm) * 100.0) as u8
}

// ── Glare ────────────────────────────────────────────────────────────────

/// Window placements `(start, len)` along one axis.
///
/// Windows step by `stride`; a final window flush with the far edge is added
/// when the stride does not land there, so the border strip is always
/// covered. An axis shorter than one window is a single full-length window.
fn window_starts(dim: u32, window: u32, stride: u32) -> Vec<(u32, u32)> {
    if dim <= window {
        return vec![(0, dim)];
    }
    let last = dim - window;
    let mut starts: Vec<(u32, u32)> = (0..=last)
        .step_by(stride as usize)
        .map(|s| (s, window))
        .collect();
    if starts.last().map(|&(s, _)| s) != Some(last) {
        starts.push((last, window));
    }
    starts
}

/// Percentage of pixels that are local brightness outliers after opening.
pub fn glare_intensity(gray: &GrayImage, config: &QualityConfig) -> u8 {
    let (w, h) = gray.dimensions();
    let total = w as usize * h as usize;
    if total == 0 {
        return 0;
    }

    let stride = config.stride();
    let threshold = config.glare_threshold as f64;
    let margin = config.border_margin;
    let (right, bottom) = (w.saturating_sub(margin), h.saturating_sub(margin));
    let in_margin = |x: u32, y: u32| x < margin || y < margin || x >= right || y >= bottom;

    let mut mask = GrayImage::new(w, h);
    let rows = window_starts(h, config.glare_window, stride);
    let cols = window_starts(w, config.glare_window, stride);

    for &(y0, wh) in &rows {
        for &(x0, ww) in &cols {
            let mut sum = 0u64;
            for y in y0..y0 + wh {
                for x in x0..x0 + ww {
                    sum += gray.get_pixel(x, y).0[0] as u64;
                }
            }
            let mean = sum as f64 / (wh as u64 * ww as u64) as f64;
            let cutoff = mean + config.glare_local_offset;

            for y in y0..y0 + wh {
                for x in x0..x0 + ww {
                    let v = gray.get_pixel(x, y).0[0] as f64;
                    if v > threshold && v > cutoff && !in_margin(x, y) {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
            }
        }
    }

    let opened = morphology::open(&mask, Norm::LInf, 1);
    let flagged = opened.pixels().filter(|p| p.0[0] > 0).count();
    (100 * flagged / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(w: u32, h: u32, v: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([v, v, v])))
    }

    /// Dark background with a bright square at (x0, y0).
    fn spot(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([50, 50, 50]));
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn luminance_weights() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
        assert_eq!(luminance(&img).get_pixel(0, 0).0[0], 76);
        assert_eq!(luminance(&solid(1, 1, 200)).get_pixel(0, 0).0[0], 200);
    }

    #[test]
    fn solid_colour_is_fully_blurred_and_glare_free() {
        let scorer = QualityScorer::default();
        for v in [0u8, 128, 250, 255] {
            let s = scorer.score(&solid(40, 30, v));
            assert_eq!(s.blur, 100, "value {v}");
            assert_eq!(s.glare, 0, "value {v}");
        }
    }

    #[test]
    fn checkerboard_is_sharp() {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let s = QualityScorer::default().score(&DynamicImage::ImageRgb8(img));
        assert_eq!(s.blur, 0);
    }

    #[test]
    fn laplacian_variance_zero_on_flat_and_tiny_images() {
        assert_eq!(laplacian_variance(&luminance(&solid(5, 5, 77))), 0.0);
        assert_eq!(laplacian_variance(&luminance(&solid(1, 1, 77))), 0.0);
        assert_eq!(laplacian_variance(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn blur_is_monotone_in_variance() {
        let cfg = QualityConfig::default();
        let mut prev = u8::MAX;
        for step in 0..=120 {
            let var = step as f64 * 10.0;
            let b = blur_from_variance(var, &cfg);
            assert!(b <= prev, "blur rose at variance {var}");
            assert!(b <= 100);
            prev = b;
        }
        assert_eq!(blur_from_variance(0.0, &cfg), 100);
        assert_eq!(blur_from_variance(100.0, &cfg), 100);
        assert_eq!(blur_from_variance(550.0, &cfg), 50);
        assert_eq!(blur_from_variance(1000.0, &cfg), 0);
        assert_eq!(blur_from_variance(1e9, &cfg), 0);
    }

    #[test]
    fn bright_spot_counts_as_glare() {
        let s = QualityScorer::default().score(&spot(100, 100, 40, 40, 10));
        assert_eq!(s.glare, 1);
    }

    #[test]
    fn isolated_speck_removed_by_opening() {
        let s = QualityScorer::default().score(&spot(100, 100, 40, 40, 1));
        assert_eq!(s.glare, 0);
    }

    #[test]
    fn image_smaller_than_window_uses_single_window() {
        // 36 bright pixels of 400.
        let s = QualityScorer::default().score(&spot(20, 20, 7, 7, 6));
        assert_eq!(s.glare, 9);
    }

    #[test]
    fn border_strip_is_evaluated() {
        // 100 px wide: stride windows start at 0 and 32; only the flush window
        // at 36 reaches columns 96..100.
        let img = RgbImage::from_fn(100, 10, |x, _| {
            if x >= 96 {
                Rgb([255, 255, 255])
            } else {
                Rgb([50, 50, 50])
            }
        });
        let s = QualityScorer::default().score(&DynamicImage::ImageRgb8(img));
        assert_eq!(s.glare, 4);
        assert_eq!(window_starts(100, 64, 32), vec![(0, 64), (32, 64), (36, 64)]);
        assert_eq!(window_starts(128, 64, 32), vec![(0, 64), (32, 64), (64, 64)]);
        assert_eq!(window_starts(10, 64, 32), vec![(0, 10)]);
    }

    #[test]
    fn border_margin_excludes_edge_glare() {
        let cfg = QualityConfig {
            border_margin: 12,
            ..Default::default()
        };
        let s = QualityScorer::new(cfg).score(&spot(100, 100, 0, 0, 10));
        assert_eq!(s.glare, 0);
    }

    #[test]
    fn opening_drops_blobs_narrower_than_three_pixels() {
        let scorer = QualityScorer::default();
        assert_eq!(scorer.score(&spot(20, 20, 8, 8, 2)).glare, 0);
        // 9 bright pixels of 400.
        assert_eq!(scorer.score(&spot(20, 20, 8, 8, 3)).glare, 2);
    }

    #[test]
    fn huge_border_margin_masks_everything() {
        for margin in [20, u32::MAX - 1, u32::MAX] {
            let cfg = QualityConfig {
                border_margin: margin,
                ..Default::default()
            };
            let s = QualityScorer::new(cfg).score(&spot(20, 20, 7, 7, 6));
            assert_eq!(s.glare, 0, "margin {margin}");
        }
    }

    #[test]
    fn score_pages_keeps_page_order() {
        let pages = vec![
            PageImage {
                image: spot(20, 20, 7, 7, 6),
                page: Some(1),
            },
            PageImage {
                image: solid(20, 20, 128),
                page: Some(2),
            },
        ];
        let scorer = QualityScorer::default();
        let scores = scorer.score_pages(&pages);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], scorer.score(&pages[0].image));
        assert_eq!(scores[0].glare, 9);
        assert_eq!(scores[1], QualityScores { blur: 100, glare: 0 });
        assert!(scorer.score_pages(&[]).is_empty());
    }

    #[test]
    fn scores_stay_in_range() {
        let scorer = QualityScorer::default();
        let img = RgbImage::from_fn(90, 70, |x, y| {
            let v = ((x * 37 + y * 91) % 256) as u8;
            Rgb([v, v.wrapping_mul(3), 255 - v])
        });
        let s = scorer.score(&DynamicImage::ImageRgb8(img));
        assert!(s.blur <= 100);
        assert!(s.glare <= 100);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = QualityScorer::default();
        let img = spot(64, 48, 10, 10, 8);
        assert_eq!(scorer.score(&img), scorer.score(&img));
    }
}
