use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{debug, info, warn};

use macrobot::backend::SystemBackend;
use macrobot::document;
use macrobot::engine::{EventSink, MacroRunner, TracingSink};
use macrobot::vision::TemplateMatcher;

/// Macrobot CLI
#[derive(Debug, Parser)]
#[command(
    name = macrobot::PKG_NAME,
    version = macrobot::PKG_VERSION,
    about = "Plays back recorded desktop macros with OCR and image matching"
)]
struct Args {
    /// Path to the macro JSON document
    #[arg(default_value = "macro.json")]
    macro_file: PathBuf,

    /// Print the formatted action list and exit without executing
    #[arg(long = "preview")]
    preview: bool,

    /// Override the document's loop count
    #[arg(long = "loops")]
    loops: Option<u32>,

    /// Enable dry-run mode (log actions instead of simulating input)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for macro documents and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

/// Tracing sink that additionally remembers the final outcome so the
/// process can exit non-zero on failure.
struct CliSink {
    inner: TracingSink,
    success: AtomicBool,
}

impl EventSink for CliSink {
    fn status(&self, message: &str) {
        self.inner.status(message);
    }

    fn error(&self, message: &str) {
        self.inner.error(message);
    }

    fn done(&self, success: bool) {
        self.success.store(success, Ordering::SeqCst);
        self.inner.done(success);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Honor --log-level by setting the subscriber before init_tracing.
    if let Some(level) = &args.log_level {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        };
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    if args.log_level.is_none() {
        macrobot::init_tracing();
    }
    info!(
        version = macrobot::PKG_VERSION,
        macro_file = %args.macro_file.display(),
        dry_run = args.dry_run,
        "Starting Macrobot"
    );

    if args.print_schema {
        let schema = document::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let doc = document::load_from_path_async(&args.macro_file).await?;
    debug!(target: "macrobot", actions = doc.actions.len(), "Macro document loaded");

    if args.preview {
        for (i, action) in doc.actions.iter().enumerate() {
            println!("{:>3}. {}", i + 1, document::format_action(action));
        }
        println!("Loops: {}", args.loops.unwrap_or(doc.loop_count));
        return Ok(());
    }

    let loops = args.loops.unwrap_or(doc.loop_count);
    if args.loops.is_some_and(|n| n != doc.loop_count) {
        warn!(target: "macrobot", loops, "Loop count overridden from the command line");
    }

    let sink = Arc::new(CliSink {
        inner: TracingSink,
        success: AtomicBool::new(false),
    });
    let mut runner = MacroRunner::new(
        doc.actions,
        loops,
        Box::new(SystemBackend::new(args.dry_run)),
        Arc::new(TemplateMatcher::new()),
        Arc::clone(&sink) as Arc<dyn EventSink>,
    );
    let handle = runner.handle();

    let worker = tokio::task::spawn_blocking(move || runner.run());

    tokio::select! {
        result = worker => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping macro");
            handle.stop();
            // The runner notices the cancellation within one sleep step.
            while handle.is_running() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }
    }

    info!("Macrobot exited");
    if !sink.success.load(Ordering::SeqCst) {
        std::process::exit(1);
    }
    Ok(())
}
