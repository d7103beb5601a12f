//! Error types for dump stream processing

/// Result type for dump stream operations
pub type Result<T> = std::result::Result<T, DumpError>;

/// Errors that can occur while reading or writing dump streams
///
/// Structural validation findings are not errors; see
/// [`Finding`](crate::history::Finding).
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Malformed or structurally impossible stream content. Always fatal.
    #[error("format error: {0}")]
    Format(String),

    /// Operation invoked while the session is not in the required state.
    /// Indicates caller misuse.
    #[error("state error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DumpError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DumpError::Format(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        DumpError::State(msg.into())
    }
}
