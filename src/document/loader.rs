use anyhow::{Context, Result};
use schemars::{Schema, schema_for};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use super::models::{Action, MacroDocument};

/// Load a macro document from a string slice.
pub fn load_from_str(s: &str) -> Result<MacroDocument> {
    let doc: MacroDocument =
        serde_json::from_str(s).context("Failed to parse JSON macro document")?;
    validate_document(&doc)?;
    Ok(doc)
}

/// Load a macro document from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<MacroDocument> {
    let doc: MacroDocument =
        serde_json::from_reader(reader).context("Failed to parse JSON macro document")?;
    validate_document(&doc)?;
    Ok(doc)
}

/// Load a macro document from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<MacroDocument> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open macro file {}", path_ref.display()))?;
    let doc = load_from_reader(file)?;
    debug!("Loaded macro document from {}", path_ref.display());
    Ok(doc)
}

/// Load a macro document from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<MacroDocument> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read macro file {}", path_ref.display()))?;
    let doc: MacroDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON macro document {}", path_ref.display()))?;
    validate_document(&doc)?;
    debug!("Loaded macro document from {}", path_ref.display());
    Ok(doc)
}

/// Save a macro document to a file path (pretty-printed JSON).
pub fn save_to_path<P: AsRef<Path>>(doc: &MacroDocument, path: P) -> Result<()> {
    let path_ref = path.as_ref();
    let json = serde_json::to_string_pretty(doc).context("Failed to serialize macro document")?;
    std::fs::write(path_ref, json)
        .with_context(|| format!("Failed to write macro file {}", path_ref.display()))?;
    debug!("Saved macro document to {}", path_ref.display());
    Ok(())
}

/// Generate the JSON Schema for the MacroDocument model.
pub fn generate_schema() -> Schema {
    schema_for!(MacroDocument)
}

/// Write the JSON Schema for the MacroDocument model to any writer.
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Perform basic sanity checks on a loaded document.
///
/// Structural problems the runner can handle softly are only warned
/// about here; nothing in this pass rejects a document that an older
/// release would have accepted.
pub fn validate_document(doc: &MacroDocument) -> Result<()> {
    if doc.loop_count == 0 {
        warn!("loop_count is 0; playback coerces it to 1");
    }
    for (idx, action) in doc.actions.iter().enumerate() {
        match action {
            Action::ClickFound => {
                warn!(
                    index = idx,
                    "click_found outside an img_check block will be skipped during playback"
                );
            }
            Action::ImgCheck { sub_actions, .. } => {
                for sub in sub_actions {
                    if matches!(sub, Action::ImgCheck { .. }) {
                        warn!(
                            index = idx,
                            "nested img_check inside sub-actions is not dispatched during playback"
                        );
                    }
                }
            }
            Action::PasteList { items } if items.is_empty() => {
                warn!(
                    index = idx,
                    "empty paste_list; playback will refuse to start"
                );
            }
            Action::Unknown { .. } => {
                warn!(
                    index = idx,
                    tag = action.tag(),
                    "unknown action tag will be skipped during playback"
                );
            }
            _ => {}
        }
    }
    Ok(())
}
