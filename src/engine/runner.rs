use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{Automation, RecognizerPreset};
use crate::document::{Action, ImageCheckConfig, OcrProcessing, Region};
use crate::engine::error::FatalError;
use crate::engine::sink::EventSink;
use crate::vision::{Extraction, MatchOutcome, TemplateMatcher, extract};

/// Increment of every interruptible sleep; a stop request is honored
/// within this latency instead of blocking for the full delay.
const SLEEP_STEP: Duration = Duration::from_millis(50);

/// Control handle for a running macro, cloneable across threads.
///
/// Obtained from [`MacroRunner::handle`] before moving the runner onto
/// its worker thread.
#[derive(Clone)]
pub struct RunnerHandle {
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl RunnerHandle {
    /// Request that the macro stop as soon as possible. Safe to call at
    /// any time; before `run()` it cancels the countdown, afterwards it
    /// is a no-op.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether a run is currently in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Executes a macro action list synchronously on the caller's thread.
///
/// One instance performs at most one run; construct a new runner to
/// replay again. All results are reported through the injected
/// [`EventSink`]; `run()` itself returns nothing.
///
/// Typical embedding:
///
/// ```ignore
/// let mut runner = MacroRunner::new(actions, loops, backend, matcher, sink);
/// let handle = runner.handle();
/// std::thread::spawn(move || runner.run());
/// // ... later, from any thread:
/// handle.stop();
/// ```
pub struct MacroRunner {
    actions: Vec<Action>,
    loop_count: u32,
    backend: Box<dyn Automation>,
    matcher: Arc<TemplateMatcher>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    finished: bool,
    countdown_tick: Duration,
}

impl MacroRunner {
    /// Create a runner over a private copy of `actions`. A loop count of
    /// zero is coerced to one.
    pub fn new(
        actions: Vec<Action>,
        loop_count: u32,
        backend: Box<dyn Automation>,
        matcher: Arc<TemplateMatcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            actions,
            loop_count: loop_count.max(1),
            backend,
            matcher,
            sink,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            finished: false,
            countdown_tick: Duration::from_secs(1),
        }
    }

    /// Control handle usable from other threads.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            cancel: self.cancel.clone(),
            running: Arc::clone(&self.running),
        }
    }

    /// Request a stop from the owning side; equivalent to
    /// `handle().stop()`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Shorten the countdown tick. Intended for embedders that replay
    /// many short macros back to back and for tests.
    pub fn set_countdown_tick(&mut self, tick: Duration) {
        self.countdown_tick = tick;
    }

    /// Execute the macro synchronously in the current thread.
    ///
    /// The caller is expected to run this on a background thread when a
    /// GUI is involved. Invokes `done(success)` on the sink exactly once
    /// regardless of the path taken.
    pub fn run(&mut self) {
        if self.actions.is_empty() {
            self.status("No actions to execute.");
            self.sink.done(false);
            return;
        }

        if self.finished || self.running.swap(true, Ordering::SeqCst) {
            self.status("Macro is already running.");
            self.sink.done(false);
            return;
        }

        // Paste lists tie the loop count to the shortest list present.
        let loop_count = self.effective_loop_count();
        if loop_count == 0 {
            self.status("Paste list is empty; nothing to execute.");
            self.running.store(false, Ordering::SeqCst);
            self.finished = true;
            self.sink.done(false);
            return;
        }

        let completed_ok = match self.execute(loop_count) {
            Ok(ok) => ok,
            Err(err) => {
                let msg = format!("Fatal error during macro execution: {err}");
                self.status(&msg);
                self.sink.error(&msg);
                false
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.finished = true;
        self.sink.done(completed_ok);
    }

    fn execute(&mut self, loop_count: usize) -> Result<bool, FatalError> {
        for i in (1..=3).rev() {
            if self.cancel.is_cancelled() {
                self.status("Macro start cancelled.");
                return Ok(false);
            }
            self.status(&format!("Starting in {i}..."));
            self.sleep_with_checks(self.countdown_tick.as_secs_f64());
        }

        let actions = self.actions.clone();
        let total = actions.len() * loop_count;
        let mut action_count = 0usize;

        'outer: for loop_index in 0..loop_count {
            if self.cancel.is_cancelled() {
                break;
            }
            self.status(&format!("Executing loop {}/{loop_count}", loop_index + 1));

            for action in &actions {
                if self.cancel.is_cancelled() {
                    break 'outer;
                }
                action_count += 1;
                self.status(&format!("Action {action_count}/{total}"));
                self.dispatch(action, loop_index)?;
            }
        }

        if self.cancel.is_cancelled() {
            Ok(false)
        } else {
            self.status("Macro completed successfully!");
            Ok(true)
        }
    }

    /// Loop count after accounting for paste lists: when any are
    /// present, playback runs once per item of the shortest list.
    fn effective_loop_count(&self) -> usize {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::PasteList { items } => Some(items.len()),
                _ => None,
            })
            .min()
            .unwrap_or(self.loop_count as usize)
    }

    // ------------------------------------------------------------------
    // Per-action handlers
    // ------------------------------------------------------------------

    fn dispatch(&mut self, action: &Action, loop_index: usize) -> Result<(), FatalError> {
        match action {
            Action::Click { x, y } => self.backend.click(*x, *y).map_err(|e| FatalError::Action {
                action: "click",
                source: e,
            }),

            Action::Drag { start, end } => self
                .backend
                .drag(start.0, start.1, end.0, end.1)
                .map_err(|e| FatalError::Action {
                    action: "drag",
                    source: e,
                }),

            Action::Delay { seconds } => {
                self.sleep_with_checks(seconds.max(0.0));
                Ok(())
            }

            Action::Copy => self.send_hotkey(&["ctrl", "c"], "copy"),
            Action::Paste => self.send_hotkey(&["ctrl", "v"], "paste"),

            Action::PasteList { items } => {
                let Some(item) = items.get(loop_index) else {
                    // Cannot happen when the loop count came from
                    // effective_loop_count, but stay lenient.
                    self.status("Paste list exhausted; skipping.");
                    return Ok(());
                };
                let item = item.clone();
                self.backend
                    .clipboard_write(&item)
                    .map_err(|e| FatalError::Action {
                        action: "paste_list",
                        source: e,
                    })?;
                self.send_hotkey(&["ctrl", "v"], "paste_list")
            }

            Action::Hotkey { keys } => {
                if keys.is_empty() {
                    return Ok(());
                }
                self.backend
                    .hotkey(keys)
                    .map_err(|e| FatalError::Action {
                        action: "hotkey",
                        source: e,
                    })
            }

            Action::Key {
                name,
                count,
                interval,
            } => {
                // Unsupported or failing key presses are logged and
                // skipped; they never abort the run.
                if !self.backend.supports_key(name) {
                    warn!(target: "macrobot::engine", key = %name, "Unsupported key; skipping");
                    self.status(&format!("Key press error: unsupported key '{name}'"));
                    return Ok(());
                }
                if let Err(err) = self.backend.key_press(name, *count, *interval) {
                    warn!(target: "macrobot::engine", key = %name, error = %err, "Key press error");
                }
                Ok(())
            }

            Action::WaitKey { name } => {
                self.status(&format!(
                    "wait_key '{name}' is not supported during unattended playback; skipping"
                ));
                Ok(())
            }

            Action::Ocr {
                region,
                mode,
                pattern,
                processing,
            } => {
                let mode = mode.clone();
                let pattern = pattern.clone();
                let processing = processing.clone();
                self.handle_ocr(*region, &mode, &pattern, &processing)
            }

            Action::ImgCheck {
                image_path,
                region,
                sub_actions,
                config,
            } => {
                let image_path = image_path.clone();
                let sub_actions = sub_actions.clone();
                self.handle_img_check(&image_path, *region, &sub_actions, *config)
            }

            Action::ClickFound => {
                self.status("click_found is only valid inside an image check; skipping.");
                Ok(())
            }

            Action::Unknown { .. } => {
                self.status(&format!("Unknown action type: {}", action.tag()));
                Ok(())
            }
        }
    }

    fn send_hotkey(&mut self, keys: &[&str], action: &'static str) -> Result<(), FatalError> {
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.backend
            .hotkey(&owned)
            .map_err(|e| FatalError::Action { action, source: e })
    }

    // ------------------------------------------------------------------
    // OCR
    // ------------------------------------------------------------------

    fn handle_ocr(
        &mut self,
        region: Region,
        mode: &crate::document::OcrMode,
        pattern: &str,
        processing: &OcrProcessing,
    ) -> Result<(), FatalError> {
        let (left, top, width, height) = region.normalized();
        let img = self
            .backend
            .capture_region(left, top, width, height)
            .map_err(FatalError::Capture)?;

        // Preset passes in fallback order, stopping at the first
        // non-empty result; individual pass failures only disqualify
        // that pass.
        let mut text = String::new();
        for preset in RecognizerPreset::PASSES {
            match self.backend.recognize_text(&img, Some(preset)) {
                Ok(recognized) => {
                    let recognized = recognized.trim().to_string();
                    if !recognized.is_empty() {
                        text = recognized;
                        break;
                    }
                }
                Err(err) => {
                    debug!(
                        target: "macrobot::engine",
                        ?preset, error = %err,
                        "Recognition pass failed; trying next preset"
                    );
                }
            }
        }
        if text.is_empty() {
            text = self
                .backend
                .recognize_text(&img, None)
                .map(|t| t.trim().to_string())
                .map_err(FatalError::Recognition)?;
        }

        let Some(result) = extract(&text, mode, pattern) else {
            self.status(&format!(
                "OCR: No matches found for mode '{}'",
                mode.as_str()
            ));
            return Ok(());
        };

        match processing {
            OcrProcessing::Copy | OcrProcessing::First => {
                let value = result.first().to_string();
                self.copy_to_clipboard(&value)?;
                self.status(&format!("OCR: Copied '{value}'"));
            }
            OcrProcessing::All => {
                let combined = result.joined();
                self.copy_to_clipboard(&combined)?;
                match &result {
                    Extraction::Matches(m) => {
                        self.status(&format!("OCR: Copied {} matches", m.len()));
                    }
                    Extraction::Text(_) => {
                        self.status(&format!("OCR: Copied '{combined}'"));
                    }
                }
            }
            OcrProcessing::Show => {
                self.status(&format!("OCR Result: '{result}'"));
            }
            OcrProcessing::Other(unknown) => {
                // Defensive fallback for documents from newer versions.
                self.status(&format!("OCR (mode={unknown}): '{result}'"));
            }
        }
        Ok(())
    }

    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), FatalError> {
        self.backend
            .clipboard_write(text)
            .map_err(|e| FatalError::Action {
                action: "ocr",
                source: e,
            })
    }

    // ------------------------------------------------------------------
    // Image check
    // ------------------------------------------------------------------

    fn handle_img_check(
        &mut self,
        image_path: &str,
        region: Region,
        sub_actions: &[Action],
        config: ImageCheckConfig,
    ) -> Result<(), FatalError> {
        let path = Path::new(image_path);
        if !path.exists() {
            self.status(&format!(
                "Image check skipped: file not found ({image_path})"
            ));
            return Ok(());
        }

        let (left, top, width, height) = region.normalized();
        let img_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.to_string());

        let outcome;
        let found;

        if config.wait {
            self.status(&format!("Waiting for image: {img_name}..."));
            let started = Instant::now();
            let mut last = MatchOutcome {
                comparable: false,
                score: 0.0,
                top_left: None,
                template_w: 0,
                template_h: 0,
            };
            let mut matched = false;

            while !self.cancel.is_cancelled() {
                last = self.capture_and_match(path, left, top, width, height)?;
                if last.comparable && last.score >= config.threshold {
                    matched = true;
                    break;
                }
                if !last.comparable {
                    // Cannot compare; avoid spinning forever against an
                    // incomparable template.
                    break;
                }
                if config.timeout > 0.0 && started.elapsed().as_secs_f64() >= config.timeout {
                    break;
                }
                self.sleep_with_checks(config.interval.max(0.05));
            }

            outcome = last;
            found = matched;
        } else {
            outcome = self.capture_and_match(path, left, top, width, height)?;
            found = outcome.comparable && outcome.score >= config.threshold;
        }

        if self.cancel.is_cancelled() {
            // Stopped during the wait; the cancellation is the terminal
            // status, not found/not-found.
            return Ok(());
        }

        if found && let Some((match_x, match_y)) = outcome.top_left {
            self.status(&format!(
                "Image found: {img_name} (score {:.3}) - executing {} sub-actions",
                outcome.score,
                sub_actions.len()
            ));
            let center_x = left + match_x as i32 + (outcome.template_w / 2) as i32;
            let center_y = top + match_y as i32 + (outcome.template_h / 2) as i32;
            self.run_sub_actions(sub_actions, center_x, center_y);
        } else {
            self.status(&format!(
                "Image not found: {img_name} (score {:.3}) - continuing main flow",
                outcome.score
            ));
        }
        Ok(())
    }

    fn capture_and_match(
        &mut self,
        reference: &Path,
        left: i32,
        top: i32,
        width: u32,
        height: u32,
    ) -> Result<MatchOutcome, FatalError> {
        let capture = self
            .backend
            .capture_region(left, top, width, height)
            .map_err(FatalError::Capture)?;
        Ok(self.matcher.locate(reference, &capture))
    }

    /// Execute the sub-action list of a matched image check.
    ///
    /// Failure policy here is deliberately more lenient than the outer
    /// loop: a failing sub-action is logged and the next one runs.
    fn run_sub_actions(&mut self, sub_actions: &[Action], found_x: i32, found_y: i32) {
        for sub in sub_actions {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = match sub {
                Action::Click { x, y } => self.backend.click(*x, *y),
                Action::Drag { start, end } => {
                    self.backend.drag(start.0, start.1, end.0, end.1)
                }
                Action::Delay { seconds } => {
                    self.sleep_with_checks(seconds.max(0.0));
                    Ok(())
                }
                Action::Copy => {
                    let keys = vec!["ctrl".to_string(), "c".to_string()];
                    self.backend.hotkey(&keys)
                }
                Action::Paste => {
                    let keys = vec!["ctrl".to_string(), "v".to_string()];
                    self.backend.hotkey(&keys)
                }
                Action::ClickFound => self.backend.click(found_x, found_y),
                other => {
                    self.status(&format!("Unknown sub-action type: {}", other.tag()));
                    Ok(())
                }
            };

            if let Err(err) = result {
                warn!(
                    target: "macrobot::engine",
                    sub_action = sub.tag(), error = %err,
                    "Error executing sub-action"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    fn status(&self, message: &str) {
        debug!(target: "macrobot::engine", "{message}");
        self.sink.status(message);
    }

    /// Sleep in small increments, honoring stop requests within one
    /// increment's latency.
    fn sleep_with_checks(&self, seconds: f64) {
        let mut remaining = seconds.max(0.0);
        let step = SLEEP_STEP.as_secs_f64();
        while remaining > 0.0 && !self.cancel.is_cancelled() {
            let dt = remaining.min(step);
            thread::sleep(Duration::from_secs_f64(dt));
            remaining -= dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{OcrMode, OcrProcessing};
    use anyhow::{Result, anyhow};
    use image::{GrayImage, Luma, RgbaImage};
    use std::sync::Mutex;

    /// Scripted in-memory backend recording every primitive call.
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Arc<Mutex<Vec<String>>>,
        clipboard: Arc<Mutex<String>>,
        ocr_text: String,
        fail_click_at: Option<(i32, i32)>,
        fail_recognition: bool,
        capture_size: Option<(u32, u32)>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self::default()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Automation for ScriptedBackend {
        fn click(&mut self, x: i32, y: i32) -> Result<()> {
            if self.fail_click_at == Some((x, y)) {
                return Err(anyhow!("scripted click failure"));
            }
            self.record(format!("click {x},{y}"));
            Ok(())
        }

        fn drag(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
            self.record(format!("drag {x1},{y1}->{x2},{y2}"));
            Ok(())
        }

        fn hotkey(&mut self, keys: &[String]) -> Result<()> {
            self.record(format!("hotkey {}", keys.join("+")));
            Ok(())
        }

        fn key_press(&mut self, name: &str, count: u32, _interval: f64) -> Result<()> {
            self.record(format!("key {name} x{count}"));
            Ok(())
        }

        fn supports_key(&self, name: &str) -> bool {
            crate::backend::keys::is_known(name)
        }

        fn clipboard_read(&mut self) -> Result<String> {
            Ok(self.clipboard.lock().unwrap().clone())
        }

        fn clipboard_write(&mut self, text: &str) -> Result<()> {
            self.record(format!("clipboard {text}"));
            *self.clipboard.lock().unwrap() = text.to_string();
            Ok(())
        }

        fn capture_region(
            &mut self,
            _left: i32,
            _top: i32,
            width: u32,
            height: u32,
        ) -> Result<RgbaImage> {
            let (w, h) = self.capture_size.unwrap_or((width, height));
            Ok(RgbaImage::new(w, h))
        }

        fn recognize_text(
            &mut self,
            _image: &RgbaImage,
            _preset: Option<RecognizerPreset>,
        ) -> Result<String> {
            if self.fail_recognition {
                return Err(anyhow!("scripted recognizer failure"));
            }
            Ok(self.ocr_text.clone())
        }
    }

    /// Sink collecting every notification for assertions.
    #[derive(Default)]
    struct CollectingSink {
        statuses: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
        done: Mutex<Vec<bool>>,
    }

    impl EventSink for CollectingSink {
        fn status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }

        fn done(&self, success: bool) {
            self.done.lock().unwrap().push(success);
        }
    }

    fn runner_with(
        actions: Vec<Action>,
        loop_count: u32,
        backend: ScriptedBackend,
    ) -> (MacroRunner, Arc<Mutex<Vec<String>>>, Arc<CollectingSink>) {
        let calls = Arc::clone(&backend.calls);
        let sink = Arc::new(CollectingSink::default());
        let mut runner = MacroRunner::new(
            actions,
            loop_count,
            Box::new(backend),
            Arc::new(TemplateMatcher::new()),
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        runner.set_countdown_tick(Duration::from_millis(1));
        (runner, calls, sink)
    }

    fn flat_template_png(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        GrayImage::from_pixel(2, 2, Luma([255]))
            .save(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_dispatch_count_is_loops_times_actions() {
        let actions = vec![
            Action::Click { x: 1, y: 2 },
            Action::Click { x: 3, y: 4 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 3, ScriptedBackend::new());
        runner.run();

        assert_eq!(calls.lock().unwrap().len(), 6);
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
        let statuses = sink.statuses.lock().unwrap();
        assert!(statuses.iter().any(|s| s == "Action 6/6"));
        assert!(statuses.iter().any(|s| s == "Executing loop 3/3"));
        assert!(statuses.iter().any(|s| s == "Macro completed successfully!"));
    }

    #[test]
    fn test_empty_action_list_reports_done_false() {
        let (mut runner, calls, sink) = runner_with(vec![], 1, ScriptedBackend::new());
        runner.run();
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "No actions to execute.")
        );
    }

    #[test]
    fn test_stop_before_run_cancels_countdown() {
        let actions = vec![Action::Click { x: 1, y: 1 }];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.handle().stop();
        runner.run();

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "Macro start cancelled.")
        );
        // Cancelled, not an error.
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let actions = vec![Action::Delay { seconds: 0.0 }];
        let (mut runner, _calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();
        runner.run();
        assert_eq!(*sink.done.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_stop_during_delay_interrupts_promptly() {
        let actions = vec![
            Action::Delay { seconds: 30.0 },
            Action::Click { x: 1, y: 1 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        let handle = runner.handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            handle.stop();
        });
        let started = Instant::now();
        runner.run();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_unsupported_key_is_soft_and_run_continues() {
        let actions = vec![
            Action::Key {
                name: "warpspeed".into(),
                count: 1,
                interval: 0.0,
            },
            Action::Click { x: 9, y: 9 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert_eq!(*calls.lock().unwrap(), vec!["click 9,9".to_string()]);
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_click_failure_is_fatal() {
        let mut backend = ScriptedBackend::new();
        backend.fail_click_at = Some((5, 5));
        let actions = vec![
            Action::Click { x: 5, y: 5 },
            Action::Click { x: 6, y: 6 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        // The second click never ran.
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Fatal error during macro execution"));
        assert!(errors[0].contains("click"));
    }

    #[test]
    fn test_paste_list_overrides_loop_count() {
        let actions = vec![Action::PasteList {
            items: vec!["alpha".into(), "beta".into()],
        }];
        let (mut runner, calls, sink) = runner_with(actions, 10, ScriptedBackend::new());
        runner.run();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "clipboard alpha".to_string(),
                "hotkey ctrl+v".to_string(),
                "clipboard beta".to_string(),
                "hotkey ctrl+v".to_string(),
            ]
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_empty_paste_list_refuses_to_start() {
        let actions = vec![Action::PasteList { items: vec![] }];
        let (mut runner, calls, sink) = runner_with(actions, 3, ScriptedBackend::new());
        runner.run();
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_wait_key_and_top_level_click_found_are_skipped() {
        let actions = vec![
            Action::WaitKey { name: "f9".into() },
            Action::ClickFound,
            Action::Click { x: 2, y: 2 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();
        assert_eq!(*calls.lock().unwrap(), vec!["click 2,2".to_string()]);
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_unknown_action_tag_loads_and_is_skipped() {
        // A document written by a newer recorder must still play; the
        // unrecognized step is reported and the rest runs.
        let actions: Vec<Action> =
            serde_json::from_str(r#"[["teleport", 1, 2], ["click", 4, 4]]"#).unwrap();
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert_eq!(*calls.lock().unwrap(), vec!["click 4,4".to_string()]);
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "Unknown action type: teleport")
        );
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ocr_numbers_copy_first_match() {
        let mut backend = ScriptedBackend::new();
        backend.ocr_text = "order #4821 qty 3".into();
        let actions = vec![Action::Ocr {
            region: Region::new(0, 0, 100, 20),
            mode: OcrMode::Numbers,
            pattern: String::new(),
            processing: OcrProcessing::Copy,
        }];
        let (mut runner, calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert!(
            calls
                .lock()
                .unwrap()
                .contains(&"clipboard 4821".to_string())
        );
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "OCR: Copied '4821'")
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_ocr_all_copies_joined_matches() {
        let mut backend = ScriptedBackend::new();
        backend.ocr_text = "codes 12 and 34".into();
        let actions = vec![Action::Ocr {
            region: Region::new(0, 0, 100, 20),
            mode: OcrMode::Numbers,
            pattern: String::new(),
            processing: OcrProcessing::All,
        }];
        let (mut runner, calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert!(
            calls
                .lock()
                .unwrap()
                .contains(&"clipboard 12 34".to_string())
        );
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "OCR: Copied 2 matches")
        );
    }

    #[test]
    fn test_ocr_no_match_is_soft() {
        let mut backend = ScriptedBackend::new();
        backend.ocr_text = "no digits here".into();
        let actions = vec![
            Action::Ocr {
                region: Region::new(0, 0, 100, 20),
                mode: OcrMode::Numbers,
                pattern: String::new(),
                processing: OcrProcessing::Copy,
            },
            Action::Click { x: 1, y: 1 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "OCR: No matches found for mode 'numbers'")
        );
        assert!(calls.lock().unwrap().contains(&"click 1,1".to_string()));
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_ocr_recognition_total_failure_is_fatal() {
        let mut backend = ScriptedBackend::new();
        backend.fail_recognition = true;
        let actions = vec![Action::Ocr {
            region: Region::new(0, 0, 100, 20),
            mode: OcrMode::AllText,
            pattern: String::new(),
            processing: OcrProcessing::Show,
        }];
        let (mut runner, _calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert_eq!(*sink.done.lock().unwrap(), vec![false]);
        assert!(sink.errors.lock().unwrap()[0].contains("OCR error"));
    }

    #[test]
    fn test_ocr_unknown_processing_reports_with_marker() {
        let mut backend = ScriptedBackend::new();
        backend.ocr_text = "hello".into();
        let actions = vec![Action::Ocr {
            region: Region::new(0, 0, 100, 20),
            mode: OcrMode::AllText,
            pattern: String::new(),
            processing: OcrProcessing::Other("announce".into()),
        }];
        let (mut runner, _calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "OCR (mode=announce): 'hello'")
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_img_check_missing_file_is_skipped() {
        let actions = vec![
            Action::ImgCheck {
                image_path: "/nonexistent/ref.png".into(),
                region: Region::new(0, 0, 10, 10),
                sub_actions: vec![Action::ClickFound],
                config: ImageCheckConfig::default(),
            },
            Action::Click { x: 7, y: 7 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert_eq!(*calls.lock().unwrap(), vec!["click 7,7".to_string()]);
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.starts_with("Image check skipped: file not found"))
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_img_check_found_runs_sub_actions_and_click_found_center() {
        let dir = tempfile::tempdir().unwrap();
        let template = flat_template_png(dir.path(), "ref.png");

        // Threshold 0 accepts the flat-on-flat zero score; the 2x2
        // template matches at (0, 0), so with the region at (10, 20)
        // the center lands on (11, 21).
        let actions = vec![Action::ImgCheck {
            image_path: template,
            region: Region::new(10, 20, 30, 40),
            sub_actions: vec![Action::ClickFound, Action::Click { x: 50, y: 60 }],
            config: ImageCheckConfig {
                threshold: 0.0,
                ..ImageCheckConfig::default()
            },
        }];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["click 11,21".to_string(), "click 50,60".to_string()]
        );
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.starts_with("Image found: ref.png"))
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_img_check_not_found_continues_main_flow() {
        let dir = tempfile::tempdir().unwrap();
        let template = flat_template_png(dir.path(), "ref.png");

        let actions = vec![
            Action::ImgCheck {
                image_path: template,
                region: Region::new(0, 0, 10, 10),
                sub_actions: vec![Action::ClickFound],
                config: ImageCheckConfig::default(),
            },
            Action::Click { x: 3, y: 3 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert_eq!(*calls.lock().unwrap(), vec!["click 3,3".to_string()]);
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.contains("continuing main flow"))
        );
    }

    #[test]
    fn test_img_check_wait_terminates_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let template = flat_template_png(dir.path(), "ref.png");

        let actions = vec![Action::ImgCheck {
            image_path: template,
            region: Region::new(0, 0, 10, 10),
            sub_actions: vec![],
            config: ImageCheckConfig {
                threshold: 0.9,
                wait: true,
                interval: 0.1,
                timeout: 1.0,
            },
        }];
        let (mut runner, _calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        let started = Instant::now();
        runner.run();

        // Bounded by the timeout, not spinning indefinitely.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.contains("continuing main flow"))
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_sub_action_failure_is_lenient_while_top_level_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let template = flat_template_png(dir.path(), "ref.png");

        // The same coordinate fails in both positions; inside the
        // sub-list the run must survive it. This asymmetry between the
        // two failure policies is long-standing observed behavior.
        let mut backend = ScriptedBackend::new();
        backend.fail_click_at = Some((5, 5));
        let actions = vec![
            Action::ImgCheck {
                image_path: template,
                region: Region::new(0, 0, 10, 10),
                sub_actions: vec![Action::Click { x: 5, y: 5 }, Action::Click { x: 6, y: 6 }],
                config: ImageCheckConfig {
                    threshold: 0.0,
                    ..ImageCheckConfig::default()
                },
            },
            Action::Click { x: 7, y: 7 },
        ];
        let (mut runner, calls, sink) = runner_with(actions, 1, backend);
        runner.run();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["click 6,6".to_string(), "click 7,7".to_string()]
        );
        assert_eq!(*sink.done.lock().unwrap(), vec![true]);
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nested_img_check_in_sub_actions_is_not_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let template = flat_template_png(dir.path(), "ref.png");

        let actions = vec![Action::ImgCheck {
            image_path: template.clone(),
            region: Region::new(0, 0, 10, 10),
            sub_actions: vec![Action::ImgCheck {
                image_path: template,
                region: Region::new(0, 0, 10, 10),
                sub_actions: vec![Action::Click { x: 1, y: 1 }],
                config: ImageCheckConfig {
                    threshold: 0.0,
                    ..ImageCheckConfig::default()
                },
            }],
            config: ImageCheckConfig {
                threshold: 0.0,
                ..ImageCheckConfig::default()
            },
        }];
        let (mut runner, calls, sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert!(calls.lock().unwrap().is_empty());
        assert!(
            sink.statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s == "Unknown sub-action type: img_check")
        );
    }

    #[test]
    fn test_copy_paste_and_hotkey_dispatch() {
        let actions = vec![
            Action::Copy,
            Action::Paste,
            Action::Hotkey {
                keys: vec!["ctrl".into(), "shift".into(), "s".into()],
            },
        ];
        let (mut runner, calls, _sink) = runner_with(actions, 1, ScriptedBackend::new());
        runner.run();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "hotkey ctrl+c".to_string(),
                "hotkey ctrl+v".to_string(),
                "hotkey ctrl+shift+s".to_string(),
            ]
        );
    }
}
