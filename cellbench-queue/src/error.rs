//! Error types for the device command queue

use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the scheduler and by device adapters
///
/// The scheduler passes adapter errors through to the caller's completion
/// path unchanged; `CommunicationFailed` and `Timeout` additionally demote
/// the device link and arm a reconnect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A caller-supplied value was rejected
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation is not legal in the current lifecycle phase
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The scheduler has not been started
    #[error("scheduler not initialized")]
    NotInitialized,

    /// The target priority queue is full and no wait budget was supplied
    #[error("queue full")]
    QueueFull,

    /// A wait budget elapsed before the operation completed
    #[error("operation timed out")]
    Timeout,

    /// The command was removed from the queue before execution
    #[error("command cancelled")]
    Cancelled,

    /// The adapter could not allocate a device-side resource
    #[error("device out of memory")]
    OutOfMemory,

    /// The operation ran but the device rejected it
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The wire is broken; the link will be demoted
    #[error("communication failed: {0}")]
    CommunicationFailed(String),

    /// The device link is down and the command cannot run
    #[error("device not connected")]
    NotConnected,

    /// The scheduler is shutting down or already shut down
    #[error("scheduler shut down")]
    Shutdown,

    /// Opaque device-reported error passed through from the adapter
    #[error("device error {code}: {message}")]
    Device { code: i32, message: String },
}

impl QueueError {
    /// True for errors that demote the device link to disconnected
    pub fn is_link_failure(&self) -> bool {
        matches!(self, QueueError::CommunicationFailed(_) | QueueError::Timeout)
    }
}
