//! Macro document module.
//!
//! Data models for recorded actions, the persisted JSON document, loading
//! and validation helpers, and display formatting. Import from here for a
//! convenient, stable API.
//!
//! Example:
//! use macrobot::document::{MacroDocument, load_from_path};
//!
//! let doc = load_from_path("macros/login.json")?;

pub mod format;
pub mod loader;
pub mod models;

// Re-export core data models
pub use models::{
    Action, ImageCheckConfig, MacroDocument, OcrMode, OcrProcessing, Region,
};

// Re-export loader utilities
pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    save_to_path, validate_document, write_schema_to_writer,
};

// Re-export display formatting
pub use format::format_action;
