//! Shadow Engine Error Hierarchy
//!
//! Defines the error types for the device shadow synchronization engine,
//! categorized by domain (reconciliation) and operational concerns
//! (storage, network, serialization).

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Shadow reconciliation failures (validation, version conflicts)
    #[error(transparent)]
    Shadow(#[from] ShadowError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    /// Malformed or out-of-range attribute values; never retried
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Version race exhausted its retry budget; caller may resubmit
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Write targeted a device id with no registry entry
    #[error("Unknown device: {device_id}")]
    DeviceUnknown { device_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Delta must contain at least one attribute")]
    EmptyDelta,

    #[error("Unknown attribute: {name}")]
    UnknownAttribute { name: String },

    #[error("Attribute {name} expects a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Attribute {name} value {value} outside range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Attribute {name} value {value:?} not in the allowed set")]
    NotAllowed { name: String, value: String },

    #[error("Attribute {name} exceeds maximum length of {max_len}")]
    TooLong { name: String, max_len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// Caller-supplied expected version did not match the stored one.
    /// Not retried: the caller asked for "apply only if still version N".
    #[error("Version precondition failed for {device_id} (expected {expected}, actual {actual})")]
    VersionPrecondition {
        device_id: String,
        expected: u64,
        actual: u64,
    },

    /// Concurrent writers kept winning the conditional write
    #[error("Write conflict on {device_id} after {attempts} attempts")]
    RetriesExhausted { device_id: String, attempts: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during shadow persistence
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Serialization failures for persisted documents
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Transient backend failure; retried with backoff at the call site
    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Decode failures on stored documents
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Invalid or missing credential at connection establishment
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Delivery targeted a connection that is no longer registered
    #[error("Connection {connection_id} is gone")]
    ConnectionGone { connection_id: String },

    /// Malformed control frame from a subscriber
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// WebSocket transport failures
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Retry policy exhaustion
    #[error("Retry timeout after {0:?}")]
    RetryTimeoutError(Duration),

    /// Malformed endpoint addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Network layer
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    // Storage layer
    #[error("Storage operation failed")]
    Storage(#[from] StorageError),

    //Serialization
    #[error("Serialization error")]
    Serialization(#[from] SerializationError),

    // Basic engine operations
    #[error("Engine failed to start: {0}")]
    EngineStartFailed(String),

    #[error("General server error: {0}")]
    GeneralServer(String),

    #[error("Internal server error")]
    ServerUnavailable,
}

// Serialization is classified separately (crosses the wire and the disk)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

// ===== Shadow error conversions =====

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Shadow(ShadowError::Validation(e))
    }
}

impl From<ConflictError> for Error {
    fn from(e: ConflictError) -> Self {
        Error::Shadow(ShadowError::Conflict(e))
    }
}

// ===== External error conversions =====

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::Json(err).into()
    }
}

impl Error {
    /// True for failures a caller may safely resubmit after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Shadow(ShadowError::Conflict(ConflictError::RetriesExhausted { .. }))
                | Error::System(SystemError::Storage(StorageError::Unavailable(_)))
        )
    }
}
