use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Button, Coordinate, Direction, Enigo, Settings};
use image::{RgbaImage, imageops};
use tracing::{info, trace, warn};

use super::{Automation, RecognizerPreset, keys};

/// Real OS backend: enigo for input, arboard for the clipboard, xcap for
/// screen capture and the tesseract CLI for text recognition.
///
/// In dry-run mode every primitive is logged instead of simulated; the
/// clipboard becomes an in-memory string and captures return blank
/// bitmaps so playback can still be exercised end to end.
pub struct SystemBackend {
    dry_run: bool,
    enigo: Option<Enigo>,
    clipboard: Option<arboard::Clipboard>,
    dry_clipboard: String,
}

impl SystemBackend {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            enigo: None,
            clipboard: None,
            dry_clipboard: String::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn ensure_enigo(&mut self) -> Result<&mut Enigo> {
        if self.enigo.is_none() {
            trace!(target: "macrobot::backend", "Initializing Enigo");
            self.enigo =
                Some(Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?);
        }
        Ok(self.enigo.as_mut().expect("Enigo must be initialized"))
    }

    fn ensure_clipboard(&mut self) -> Result<&mut arboard::Clipboard> {
        if self.clipboard.is_none() {
            trace!(target: "macrobot::backend", "Initializing clipboard");
            self.clipboard =
                Some(arboard::Clipboard::new().context("Failed to initialize clipboard")?);
        }
        Ok(self
            .clipboard
            .as_mut()
            .expect("Clipboard must be initialized"))
    }
}

impl Automation for SystemBackend {
    fn click(&mut self, x: i32, y: i32) -> Result<()> {
        if self.dry_run {
            info!(target: "macrobot::backend", x, y, "DRY-RUN click");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "macrobot::backend", x, y, "click");
        enigo.move_mouse(x, y, Coordinate::Abs)?;
        enigo.button(Button::Left, Direction::Click)?;
        Ok(())
    }

    fn drag(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        if self.dry_run {
            info!(target: "macrobot::backend", x1, y1, x2, y2, "DRY-RUN drag");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "macrobot::backend", x1, y1, x2, y2, "drag");
        enigo.move_mouse(x1, y1, Coordinate::Abs)?;
        enigo.button(Button::Left, Direction::Press)?;
        thread::sleep(Duration::from_millis(100));
        enigo.move_mouse(x2, y2, Coordinate::Abs)?;
        thread::sleep(Duration::from_millis(50));
        enigo.button(Button::Left, Direction::Release)?;
        Ok(())
    }

    fn hotkey(&mut self, key_names: &[String]) -> Result<()> {
        if key_names.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            info!(target: "macrobot::backend", keys = %key_names.join("+"), "DRY-RUN hotkey");
            return Ok(());
        }
        let mut resolved = Vec::with_capacity(key_names.len());
        for name in key_names {
            let key = keys::lookup(name)
                .with_context(|| format!("Unsupported key '{name}' in hotkey"))?;
            resolved.push(key);
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "macrobot::backend", keys = %key_names.join("+"), "hotkey");
        for key in &resolved {
            enigo.key(*key, Direction::Press)?;
        }
        for key in resolved.iter().rev() {
            enigo.key(*key, Direction::Release)?;
        }
        Ok(())
    }

    fn key_press(&mut self, name: &str, count: u32, interval: f64) -> Result<()> {
        let Some(key) = keys::lookup(name) else {
            bail!("Unsupported key: {name}");
        };
        if self.dry_run {
            info!(target: "macrobot::backend", name, count, interval, "DRY-RUN key_press");
            return Ok(());
        }
        let enigo = self.ensure_enigo()?;
        trace!(target: "macrobot::backend", name, count, interval, "key_press");
        for i in 0..count.max(1) {
            enigo.key(key, Direction::Click)?;
            if i + 1 < count && interval > 0.0 {
                thread::sleep(Duration::from_secs_f64(interval));
            }
        }
        Ok(())
    }

    fn supports_key(&self, name: &str) -> bool {
        keys::is_known(name)
    }

    fn clipboard_read(&mut self) -> Result<String> {
        if self.dry_run {
            return Ok(self.dry_clipboard.clone());
        }
        let clipboard = self.ensure_clipboard()?;
        clipboard.get_text().context("Failed to read clipboard")
    }

    fn clipboard_write(&mut self, text: &str) -> Result<()> {
        if self.dry_run {
            info!(target: "macrobot::backend", %text, "DRY-RUN clipboard_write");
            self.dry_clipboard = text.to_string();
            return Ok(());
        }
        let clipboard = self.ensure_clipboard()?;
        clipboard
            .set_text(text.to_string())
            .context("Failed to write clipboard")
    }

    fn capture_region(
        &mut self,
        left: i32,
        top: i32,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage> {
        if width == 0 || height == 0 {
            bail!("Capture region has zero size ({width}x{height})");
        }
        if self.dry_run {
            info!(target: "macrobot::backend", left, top, width, height, "DRY-RUN capture_region");
            return Ok(RgbaImage::new(width, height));
        }

        let monitors = xcap::Monitor::all().context("Failed to enumerate monitors")?;
        let monitor = monitors
            .into_iter()
            .find(|m| {
                let (Ok(mx), Ok(my), Ok(mw), Ok(mh)) = (m.x(), m.y(), m.width(), m.height())
                else {
                    return false;
                };
                left >= mx
                    && top >= my
                    && left < mx + mw as i32
                    && top < my + mh as i32
            })
            .context("No monitor contains the capture region origin")?;

        let shot = monitor
            .capture_image()
            .context("Failed to capture monitor")?;
        let mx = monitor.x().context("Failed to query monitor position")?;
        let my = monitor.y().context("Failed to query monitor position")?;

        let rx = (left - mx).max(0) as u32;
        let ry = (top - my).max(0) as u32;
        let rw = width.min(shot.width().saturating_sub(rx));
        let rh = height.min(shot.height().saturating_sub(ry));
        if rw == 0 || rh == 0 {
            bail!("Capture region lies outside the monitor bounds");
        }
        if rw < width || rh < height {
            warn!(
                target: "macrobot::backend",
                requested = format!("{width}x{height}"),
                actual = format!("{rw}x{rh}"),
                "Capture region clipped to monitor bounds"
            );
        }

        Ok(imageops::crop_imm(&shot, rx, ry, rw, rh).to_image())
    }

    fn recognize_text(
        &mut self,
        image: &RgbaImage,
        preset: Option<RecognizerPreset>,
    ) -> Result<String> {
        if self.dry_run {
            info!(target: "macrobot::backend", ?preset, "DRY-RUN recognize_text");
            return Ok(String::new());
        }

        let file = tempfile::Builder::new()
            .prefix("macrobot-ocr-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temporary image for OCR")?;
        image
            .save(file.path())
            .context("Failed to write temporary image for OCR")?;

        let mut cmd = Command::new("tesseract");
        cmd.arg(file.path()).arg("stdout");
        if let Some(preset) = preset {
            cmd.args(["--psm", &preset.psm().to_string()]);
        }
        trace!(target: "macrobot::backend", ?preset, "Running tesseract");

        let output = cmd
            .output()
            .context("Failed to run tesseract (is it installed and on PATH?)")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
