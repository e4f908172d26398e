//! Unified error handling for the Modbus slave workspace
//!
//! Protocol exceptions are *not* errors here: they travel to the client inside
//! a response frame. This type covers the failures that escape a request:
//! configuration, transport I/O, frame decoding, and checkpoint persistence.

use thiserror::Error;

// ============================================================================
// SlaveError - Main error type
// ============================================================================

/// Main error type for the engine, its adapters and the service binary
#[derive(Debug, Error)]
pub enum SlaveError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Configuration load failed: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    // ======================================
    // Frame Errors
    // ======================================
    #[error("Frame too short: {kind} frame needs at least {min} bytes, got {actual}")]
    FrameTooShort {
        kind: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("Invalid protocol ID: expected 0, got {0}")]
    InvalidProtocolId(u16),

    #[error("Length mismatch: header declares {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("LRC mismatch: expected {expected:#04x}, received {received:#04x}")]
    LrcMismatch { expected: u8, received: u8 },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    // ======================================
    // Transport Errors
    // ======================================
    #[error("Bind failed: {endpoint}: {reason}")]
    BindFailed { endpoint: String, reason: String },

    #[error("Serial port error: {port}: {reason}")]
    SerialPort { port: String, reason: String },

    #[error("Response write failed: {0}")]
    WriteFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // ======================================
    // Engine Errors
    // ======================================
    #[error("Request serializer is not running")]
    SerializerStopped,

    // ======================================
    // Checkpoint Errors (fatal)
    // ======================================
    #[error("Checkpoint I/O error: {path}: {source}")]
    CheckpointIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint encode failed: {0}")]
    CheckpointEncode(String),

    #[error("Checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ======================================
    // Catch-all for other errors
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SlaveError
pub type SlaveResult<T> = Result<T, SlaveError>;

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Protocol,
    Connection,
    Timeout,
    DataCorruption,
    Internal,
}

impl SlaveError {
    /// Stable error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::ConfigLoad(_) => "CONFIG_LOAD_FAILED",

            Self::FrameTooShort { .. } => "FRAME_TOO_SHORT",
            Self::InvalidProtocolId(_) => "INVALID_PROTOCOL_ID",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::CrcMismatch { .. } => "CRC_MISMATCH",
            Self::LrcMismatch { .. } => "LRC_MISMATCH",
            Self::MalformedFrame(_) => "MALFORMED_FRAME",

            Self::BindFailed { .. } => "BIND_FAILED",
            Self::SerialPort { .. } => "SERIAL_PORT_ERROR",
            Self::WriteFailed(_) => "WRITE_FAILED",
            Self::Timeout(_) => "TIMEOUT",

            Self::SerializerStopped => "SERIALIZER_STOPPED",

            Self::CheckpointIo { .. } => "CHECKPOINT_IO",
            Self::CheckpointEncode(_) => "CHECKPOINT_ENCODE",
            Self::CheckpointCorrupt(_) => "CHECKPOINT_CORRUPT",

            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } | Self::ConfigLoad(_) => {
                ErrorCategory::Configuration
            },

            Self::FrameTooShort { .. }
            | Self::InvalidProtocolId(_)
            | Self::LengthMismatch { .. }
            | Self::CrcMismatch { .. }
            | Self::LrcMismatch { .. }
            | Self::MalformedFrame(_) => ErrorCategory::Protocol,

            Self::BindFailed { .. }
            | Self::SerialPort { .. }
            | Self::WriteFailed(_)
            | Self::Io(_) => ErrorCategory::Connection,

            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::CheckpointIo { .. } | Self::CheckpointEncode(_) | Self::CheckpointCorrupt(_) => {
                ErrorCategory::DataCorruption
            },

            Self::SerializerStopped | Self::Internal(_) | Self::Other(_) => {
                ErrorCategory::Internal
            },
        }
    }

    /// Fatal errors leave register memory integrity unknown; the process must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::DataCorruption)
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::DataCorruption | ErrorCategory::Internal => Level::ERROR,
            ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Protocol | ErrorCategory::Connection | ErrorCategory::Timeout => {
                Level::WARN
            },
        }
    }
}

impl From<figment::Error> for SlaveError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<bincode::Error> for SlaveError {
    fn from(err: bincode::Error) -> Self {
        Self::CheckpointCorrupt(err.to_string())
    }
}

// Helper macro for frame decoding errors
#[macro_export]
macro_rules! frame_error {
    ($msg:expr) => {
        $crate::SlaveError::MalformedFrame($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::SlaveError::MalformedFrame(format!($fmt, $($arg)*))
    };
}
