//! OS automation contracts consumed by the playback runner.
//!
//! The runner only ever talks to the [`Automation`] trait; the real
//! implementation lives in [`system`] (enigo + arboard + xcap + the
//! tesseract CLI), and tests substitute a scripted in-memory one.

pub mod keys;
pub mod system;

use anyhow::Result;
use image::RgbaImage;

pub use system::SystemBackend;

/// Recognizer configuration preset for one OCR pass.
///
/// Maps onto tesseract page-segmentation modes; passes are tried in the
/// order of [`RecognizerPreset::PASSES`], stopping at the first
/// non-empty result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecognizerPreset {
    /// Assume a uniform block of text (psm 6).
    UniformBlock,
    /// Treat the image as a single text line (psm 7).
    SingleLine,
    /// Treat the image as a single word (psm 8).
    SingleWord,
    /// Raw line, bypassing most layout analysis (psm 13).
    RawLine,
}

impl RecognizerPreset {
    /// Recognition passes in fallback order.
    pub const PASSES: [RecognizerPreset; 4] = [
        RecognizerPreset::UniformBlock,
        RecognizerPreset::SingleLine,
        RecognizerPreset::SingleWord,
        RecognizerPreset::RawLine,
    ];

    /// Tesseract page-segmentation mode number.
    pub fn psm(self) -> u32 {
        match self {
            Self::UniformBlock => 6,
            Self::SingleLine => 7,
            Self::SingleWord => 8,
            Self::RawLine => 13,
        }
    }
}

/// Input-simulation, clipboard, capture and recognition primitives.
///
/// Every method is a thin contract over one OS-level operation; all of
/// them run on the playback thread and are never interrupted mid-call.
pub trait Automation: Send {
    /// Simulate a left click at an absolute screen coordinate.
    fn click(&mut self, x: i32, y: i32) -> Result<()>;

    /// Press at (x1, y1), move to (x2, y2), release.
    fn drag(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()>;

    /// Simulate a simultaneous key combination.
    fn hotkey(&mut self, keys: &[String]) -> Result<()>;

    /// Press one key `count` times, `interval` seconds apart.
    fn key_press(&mut self, name: &str, count: u32, interval: f64) -> Result<()>;

    /// Whether `name` is part of the known-key vocabulary.
    fn supports_key(&self, name: &str) -> bool;

    /// Read the current clipboard text.
    fn clipboard_read(&mut self) -> Result<String>;

    /// Replace the clipboard text.
    fn clipboard_write(&mut self, text: &str) -> Result<()>;

    /// Capture a screen region as a bitmap.
    fn capture_region(&mut self, left: i32, top: i32, width: u32, height: u32)
    -> Result<RgbaImage>;

    /// Recognize text in a bitmap. `None` runs the engine's default
    /// configuration (the final fallback pass).
    fn recognize_text(
        &mut self,
        image: &RgbaImage,
        preset: Option<RecognizerPreset>,
    ) -> Result<String>;
}
