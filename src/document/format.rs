use std::path::Path;

use super::models::{Action, OcrMode};

/// Produce a one-line human-readable summary of an action.
///
/// Display only; never fails and has no effect on playback semantics.
pub fn format_action(action: &Action) -> String {
    match action {
        Action::Click { x, y } => format!("🖱️ Click at ({x}, {y})"),
        Action::Drag { start, end } => format!(
            "↗️ Drag from ({}, {}) to ({}, {})",
            start.0, start.1, end.0, end.1
        ),
        Action::Delay { seconds } => format!("⏱️ Delay {seconds:.2}s"),
        Action::Copy => "📋 Copy (Ctrl+C)".to_string(),
        Action::Paste => "📄 Paste (Ctrl+V)".to_string(),
        Action::PasteList { items } => format!("🧾 Paste List ({} items)", items.len()),
        Action::Hotkey { keys } => {
            let label = if keys.is_empty() {
                "<no keys>".to_string()
            } else {
                keys.join(" + ")
            };
            format!("⌨️ Hotkey: {label}")
        }
        Action::Key {
            name,
            count,
            interval,
        } => format!("⌨️ Key: {name} ×{count} (interval {interval:.2}s)"),
        Action::WaitKey { name } => format!("⏸️ Wait for key: {name}"),
        Action::Ocr { mode, pattern, processing, .. } => {
            let mode_desc = match mode {
                OcrMode::AllText => "All text".to_string(),
                OcrMode::Numbers => "Numbers only".to_string(),
                OcrMode::Email => "Email addresses".to_string(),
                OcrMode::Custom => format!("Custom: {pattern}"),
                OcrMode::Legacy => "Legacy number grab".to_string(),
                OcrMode::Other(s) => s.clone(),
            };
            format!("👁️ OCR ({mode_desc}) → {}", processing.as_str())
        }
        Action::ImgCheck {
            image_path,
            sub_actions,
            config,
            ..
        } => {
            let name = Path::new(image_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| image_path.clone());
            let extra = if config.wait { " (wait until found)" } else { "" };
            format!(
                "🔍 Image Check: {name}{extra} ({} sub-actions)",
                sub_actions.len()
            )
        }
        Action::ClickFound => "🖱️ Click Found Image (center)".to_string(),
        Action::Unknown { .. } => format!("❓ Unknown action: {}", action.tag()),
    }
}
