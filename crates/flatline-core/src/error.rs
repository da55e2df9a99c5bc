//! Error type for pipeline construction and execution

use std::io;

/// Error from building or running a pipeline.
///
/// Bad input lines never surface here: they are skipped inside the transform
/// stage. Everything in this enum is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("input discovery: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("projection emitted unregistered stream '{0}'")]
    UnknownStream(String),

    #[error("{0} channel closed")]
    ChannelClosed(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{unit} failed: {reason}")]
    UnitFailed { unit: String, reason: String },

    #[error("coordinator: {0}")]
    Coordinator(String),

    #[error("{0} panicked")]
    Panicked(String),
}

impl PipelineError {
    /// Wrap an I/O error with the path or operation it came from.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
