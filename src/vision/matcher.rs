use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{GrayImage, RgbaImage, imageops};
use tracing::{debug, warn};

/// Result of locating a reference template inside a captured region.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Whether the comparison could be carried out at all. A reference
    /// larger than the capture, or any decode failure, is "not
    /// comparable" rather than an error. The threshold decision stays
    /// with the caller.
    pub comparable: bool,
    /// Best normalized correlation score in [0, 1].
    pub score: f64,
    /// Top-left pixel offset of the best match within the capture.
    pub top_left: Option<(u32, u32)>,
    /// True template width, reported even when not comparable.
    pub template_w: u32,
    /// True template height, reported even when not comparable.
    pub template_h: u32,
}

impl MatchOutcome {
    fn not_comparable(template_w: u32, template_h: u32) -> Self {
        Self {
            comparable: false,
            score: 0.0,
            top_left: None,
            template_w,
            template_h,
        }
    }
}

/// Locates reference templates inside captured screen regions using
/// normalized cross-correlation on grayscale pixels.
///
/// Reference images are decoded from disk once per distinct path for the
/// lifetime of the matcher and cached. The cache is never invalidated; a
/// file changed on disk is not picked up without `clear_cache()`.
pub struct TemplateMatcher {
    cache: Mutex<HashMap<PathBuf, Arc<GrayImage>>>,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateMatcher {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all cached reference decodes.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Locate `reference_path` inside `capture`. Never fails: every
    /// decode or comparison problem maps to a not-comparable outcome.
    pub fn locate(&self, reference_path: &Path, capture: &RgbaImage) -> MatchOutcome {
        let Some(reference) = self.reference(reference_path) else {
            return MatchOutcome::not_comparable(0, 0);
        };

        let capture_gray = imageops::grayscale(capture);
        let (tw, th) = reference.dimensions();
        let (cw, ch) = capture_gray.dimensions();

        if tw > cw || th > ch || tw == 0 || th == 0 {
            return MatchOutcome::not_comparable(tw, th);
        }

        let (score, top_left) = best_correlation(&reference, &capture_gray);
        MatchOutcome {
            comparable: true,
            score,
            top_left: Some(top_left),
            template_w: tw,
            template_h: th,
        }
    }

    fn reference(&self, path: &Path) -> Option<Arc<GrayImage>> {
        let Ok(mut cache) = self.cache.lock() else {
            return None;
        };
        if let Some(found) = cache.get(path) {
            return Some(Arc::clone(found));
        }
        match image::open(path) {
            Ok(img) => {
                let gray = Arc::new(img.to_luma8());
                debug!(
                    target: "macrobot::vision",
                    path = %path.display(),
                    width = gray.width(),
                    height = gray.height(),
                    "Decoded reference template"
                );
                cache.insert(path.to_path_buf(), Arc::clone(&gray));
                Some(gray)
            }
            Err(err) => {
                warn!(
                    target: "macrobot::vision",
                    path = %path.display(),
                    error = %err,
                    "Failed to decode reference template"
                );
                None
            }
        }
    }
}

/// Normalized cross-correlation (mean-subtracted) of `template` over
/// every offset of `capture`, returning the global maximum score and its
/// top-left offset.
fn best_correlation(template: &GrayImage, capture: &GrayImage) -> (f64, (u32, u32)) {
    let (tw, th) = template.dimensions();
    let (cw, ch) = capture.dimensions();
    let n = f64::from(tw) * f64::from(th);

    let template_px: Vec<f64> = template.pixels().map(|p| f64::from(p[0])).collect();
    let template_mean = template_px.iter().sum::<f64>() / n;
    let template_dev: Vec<f64> = template_px.iter().map(|v| v - template_mean).collect();
    let template_energy: f64 = template_dev.iter().map(|d| d * d).sum();

    let mut best_score = 0.0_f64;
    let mut best_at = (0u32, 0u32);

    for oy in 0..=(ch - th) {
        for ox in 0..=(cw - tw) {
            let mut window_sum = 0.0;
            for y in 0..th {
                for x in 0..tw {
                    window_sum += f64::from(capture.get_pixel(ox + x, oy + y)[0]);
                }
            }
            let window_mean = window_sum / n;

            let mut numerator = 0.0;
            let mut window_energy = 0.0;
            let mut i = 0usize;
            for y in 0..th {
                for x in 0..tw {
                    let w = f64::from(capture.get_pixel(ox + x, oy + y)[0]) - window_mean;
                    numerator += template_dev[i] * w;
                    window_energy += w * w;
                    i += 1;
                }
            }

            let denom = (template_energy * window_energy).sqrt();
            // A flat template or flat window has no correlation signal.
            let score = if denom > f64::EPSILON {
                numerator / denom
            } else {
                0.0
            };
            if score > best_score {
                best_score = score;
                best_at = (ox, oy);
            }
        }
    }

    (best_score.clamp(0.0, 1.0), best_at)
}
