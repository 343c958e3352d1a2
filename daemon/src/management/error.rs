use thiserror::Error;

/// Failures surfaced by the slot lifecycle operations.
///
/// Query-protocol failures never appear here: they are downgraded to a
/// [`RuntimeStatus`](mcws_protocol::management::world::RuntimeStatus) at the
/// manager boundary.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Bad user input; the message is shown to the caller verbatim.
    #[error("{0}")]
    Validation(String),
    /// The requested slot/world combination is not legal right now.
    #[error("{0}")]
    Conflict(String),
    /// An external command (service unit, renderer, browser) failed.
    #[error("command `{command}` exited with status {code:?}")]
    ExternalTool {
        command: String,
        code: Option<i32>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ManagerError {
    pub fn validation(message: impl Into<String>) -> Self {
        ManagerError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ManagerError::Conflict(message.into())
    }
}
