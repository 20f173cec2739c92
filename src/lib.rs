#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Macrobot — a desktop macro playback engine with OCR and on-screen
//! image matching.
//!
//! The crate plays back recorded macro documents: mouse clicks and
//! drags, keyboard input, clipboard operations, text recognition over
//! screen regions and conditional branches gated on a template image
//! being visible. Most implementation details live under the internal
//! modules:
//! - `document`: Macro document model, JSON loader, and display formatting.
//! - `engine`: The playback runner, its notification sink, and errors.
//! - `backend`: The OS automation boundary (input, clipboard, capture, OCR).
//! - `vision`: Template matching and recognized-text post-processing.
//!
//! Use `macrobot::prelude::*` to bring commonly used items into scope
//! quickly.

/// Public module: the OS automation boundary.
pub mod backend;
/// Public module: macro documents (model, loader, formatting).
pub mod document;
/// Public module: playback engine (runner, sink, errors).
pub mod engine;
/// Public module: vision helpers (template matcher, text extraction).
pub mod vision;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::fmt;

    // Parse RUST_LOG as a simple level (trace|debug|info|warn|error)
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        })
        .unwrap_or(Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use macrobot::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;

    // External crates (namespaced) if callers want direct access
    pub use crate as macrobot;
    pub use enigo;

    // Frequently used internal modules
    pub use crate::{backend, document, engine, vision};

    // Core types most embedders need
    pub use crate::backend::{Automation, SystemBackend};
    pub use crate::document::{Action, MacroDocument, format_action};
    pub use crate::engine::{EventSink, MacroRunner, RunnerHandle, TracingSink};
    pub use crate::vision::TemplateMatcher;
}
