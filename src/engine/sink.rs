use tracing::{error, info};

/// Notification contract between the playback runner and its embedder.
///
/// The runner invokes every method from the thread that called `run()`;
/// implementations are responsible for marshaling onto whatever thread
/// their presentation layer requires (a GUI would typically forward
/// these into its event loop).
pub trait EventSink: Send + Sync {
    /// Human-readable progress message.
    fn status(&self, message: &str);

    /// Fatal error description; always followed by `done(false)`.
    fn error(&self, message: &str);

    /// Called exactly once when the run stops. `true` only for a run
    /// that completed every loop without cancellation. A user stop, an
    /// empty action list and a fatal error all report `false`; the
    /// error channel distinguishes the last case.
    fn done(&self, success: bool);
}

/// Sink that forwards everything to the tracing subscriber. Useful for
/// headless runs and as the CLI default.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn status(&self, message: &str) {
        info!(target: "macrobot::engine", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "macrobot::engine", "{message}");
    }

    fn done(&self, success: bool) {
        info!(target: "macrobot::engine", success, "Macro run finished");
    }
}
