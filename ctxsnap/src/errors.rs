use thiserror::Error;

/// Failures that can escape the capture pipeline.
///
/// Extraction and serialization faults never show up here: they are replaced
/// by safe defaults where they happen. Delivery faults are turned into a
/// local delivery outcome. What remains are caller faults plus the plumbing
/// errors used internally by the transport and history store.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Invalid state adapter: {0}")]
    InvalidAdapter(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote endpoint rejected request: {status}")]
    RemoteStatus { status: u16 },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContextError {
    /// Caller faults indicate misconfiguration rather than a transient condition
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            ContextError::InvalidAdapter(_) | ContextError::InvalidArgument(_)
        )
    }
}
