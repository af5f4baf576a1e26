//! Worker error types.

/// Errors that stop the worker process.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// No port in the probed range could be bound.
    #[error("No free port in {start}..{end}: {source}")]
    Bind {
        start: u16,
        end: u32,
        #[source]
        source: std::io::Error,
    },

    /// The transport's stream failed.
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}
