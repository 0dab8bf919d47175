//! Error types for the BioLogic technique engine
//!
//! Device-reported conditions pass through the scheduler unchanged; the
//! numeric codes are this library's stable diagnostics codes, not raw
//! vendor values (the vendor code rides in [`BlError::Vendor`]).

use cellbench_queue::QueueError;
use thiserror::Error;

/// Result type for BioLogic operations
pub type BlResult<T> = Result<T, BlError>;

/// Errors raised by the port, the technique state machine and the decoders
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlError {
    /// A connect is already running on this device
    #[error("connection already in progress")]
    ConnectionInProgress,

    /// The addressed channel has no board plugged
    #[error("channel not plugged")]
    ChannelNotPlugged,

    /// Another vendor call is running on this channel
    #[error("function already in progress on channel")]
    FunctionInProgress,

    /// Device-side sample memory is full
    #[error("device sample memory full")]
    DeviceMemoryFull,

    /// Channel firmware is incompatible with this library
    #[error("channel firmware incompatible")]
    FirmwareIncompatible,

    /// The ECC technique file was not found
    #[error("technique file missing: {0}")]
    TechniqueFileMissing(String),

    /// The ECC technique file failed the device's integrity check
    #[error("technique file corrupted: {0}")]
    TechniqueFileCorrupted(String),

    /// The device reported a corrupted sample buffer
    #[error("sample buffer corrupted")]
    DataCorrupted,

    /// Transport failure on the device link
    #[error("communication failed: {0}")]
    Comm(String),

    /// The device did not answer in time
    #[error("device timed out")]
    Timeout,

    /// The channel stopped without delivering any data
    #[error("no data retrieved from channel")]
    NoData,

    /// A buffer arrived for the wrong sub-stream
    #[error("wrong process index: expected {expected}, got {actual}")]
    WrongProcessIndex { expected: u8, actual: u8 },

    /// The device reported a technique id this library does not know
    #[error("unknown technique id {0}")]
    UnknownTechnique(u16),

    /// A sample row was narrower than the technique's layout requires
    #[error("invalid variable count: expected at least {expected}, got {actual}")]
    InvalidVariableCount { expected: usize, actual: usize },

    /// Raw-to-columnar conversion failed
    #[error("data conversion failed: {0}")]
    ConversionFailed(String),

    /// Technique settings failed validation before loading
    #[error("invalid technique settings: {0}")]
    InvalidSettings(String),

    /// The technique ended in error but produced usable data
    #[error("technique produced partial data")]
    PartialData,

    /// Opaque vendor error code
    #[error("vendor error {0}")]
    Vendor(i32),
}

impl BlError {
    /// Stable numeric code for diagnostics and log correlation
    pub fn code(&self) -> i32 {
        match self {
            BlError::ConnectionInProgress => -10,
            BlError::ChannelNotPlugged => -11,
            BlError::FunctionInProgress => -12,
            BlError::DeviceMemoryFull => -13,
            BlError::FirmwareIncompatible => -14,
            BlError::TechniqueFileMissing(_) => -20,
            BlError::TechniqueFileCorrupted(_) => -21,
            BlError::DataCorrupted => -22,
            BlError::NoData => -30,
            BlError::WrongProcessIndex { .. } => -31,
            BlError::UnknownTechnique(_) => -32,
            BlError::InvalidVariableCount { .. } => -33,
            BlError::ConversionFailed(_) => -34,
            BlError::PartialData => -35,
            BlError::InvalidSettings(_) => -40,
            BlError::Comm(_) => -200,
            BlError::Timeout => -201,
            BlError::Vendor(code) => *code,
        }
    }

    /// Whether a data retrieval is worth retrying after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlError::Comm(_) | BlError::Timeout | BlError::NoData | BlError::FunctionInProgress
        )
    }
}

impl From<BlError> for QueueError {
    fn from(error: BlError) -> Self {
        match error {
            BlError::Comm(message) => QueueError::CommunicationFailed(message),
            BlError::Timeout => QueueError::Timeout,
            BlError::InvalidSettings(message) => QueueError::InvalidParameter(message),
            other => QueueError::Device {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}
