use thiserror::Error;

/// Fatal, run-aborting failures.
///
/// Exactly one of these can terminate a run; it is caught once at the
/// top of `run()`, rendered to a human-readable message and delivered
/// through both the status and error channels before `done(false)`.
/// Soft failures (unsupported key names, empty extractions, missing
/// reference images, sub-action errors) never construct these.
#[derive(Debug, Error)]
pub enum FatalError {
    /// An input-simulation or clipboard primitive failed while executing
    /// a top-level action.
    #[error("Error executing {action}: {source}")]
    Action {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A screen region could not be captured.
    #[error("Screen capture error: {0}")]
    Capture(#[source] anyhow::Error),

    /// Text recognition could not run at all (every preset pass and the
    /// default fallback failed).
    #[error("OCR error: {0}")]
    Recognition(#[source] anyhow::Error),
}
