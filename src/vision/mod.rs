//! Screen-inspection helpers: template matching and OCR text
//! post-processing. Both are pure with respect to playback state; the
//! runner calls into them for the two conditional action kinds.

pub mod matcher;
pub mod text;

pub use matcher::{MatchOutcome, TemplateMatcher};
pub use text::{Extraction, extract};
