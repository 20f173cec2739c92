//! Macro playback: the runner, its notification sink and the fatal
//! error taxonomy.

pub mod error;
pub mod runner;
pub mod sink;

pub use error::FatalError;
pub use runner::{MacroRunner, RunnerHandle};
pub use sink::{EventSink, TracingSink};
