use std::fmt;

use crate::node::NodeId;

/// Main error type for a plover broadcast node
#[derive(Debug)]
pub enum PloverError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Inbound envelope was understood but cannot be served
    Protocol(String),

    /// Inbound body is missing fields every request must carry
    Malformed(String),

    /// Node has not completed the init handshake yet
    NotInitialized,

    /// System I/O errors
    Io(std::io::Error),

    /// Transport layer errors
    Transport(TransportError),

    /// Serialization/deserialization errors
    Serialization(SerializationError),
}

/// Failures reported by a transport's send primitive
#[derive(Debug)]
pub enum TransportError {
    /// Destination could not be reached right now (e.g. network partition)
    Delivery { dest: NodeId, reason: String },

    /// Envelope could not be encoded for the wire
    Encoding(String),

    /// Transport has shut down
    Closed,
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// JSON serialization/deserialization errors
    Json(serde_json::Error),
}

impl fmt::Display for PloverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PloverError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PloverError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PloverError::Malformed(msg) => write!(f, "Malformed request: {}", msg),
            PloverError::NotInitialized => write!(f, "Node has not been initialized"),
            PloverError::Io(err) => write!(f, "I/O error: {}", err),
            PloverError::Transport(err) => write!(f, "Transport error: {}", err),
            PloverError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Delivery { dest, reason } => {
                write!(f, "Delivery to {} failed: {}", dest, reason)
            }
            TransportError::Encoding(msg) => write!(f, "Encoding: {}", msg),
            TransportError::Closed => write!(f, "Transport closed"),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Json(err) => write!(f, "JSON: {}", err),
        }
    }
}

impl std::error::Error for PloverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PloverError::Io(err) => Some(err),
            PloverError::Transport(err) => Some(err),
            PloverError::Serialization(SerializationError::Json(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for TransportError {}
impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, PloverError>;

impl PloverError {
    /// Protocol error code reported back to the requester in an `error` body
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PloverError::Serialization(_) | PloverError::Malformed(_) => {
                ErrorCode::MalformedRequest
            }
            PloverError::Protocol(_) => ErrorCode::NotSupported,
            PloverError::NotInitialized => ErrorCode::TemporarilyUnavailable,
            PloverError::Transport(TransportError::Delivery { .. }) => {
                ErrorCode::TemporarilyUnavailable
            }
            PloverError::Config(_) | PloverError::Io(_) | PloverError::Transport(_) => {
                ErrorCode::Crash
            }
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            PloverError::Config(_) => "configuration_error",
            PloverError::Protocol(_) => "protocol_error",
            PloverError::Malformed(_) => "malformed_request",
            PloverError::NotInitialized => "not_initialized",
            PloverError::Io(_) => "io_error",
            PloverError::Transport(_) => "transport_error",
            PloverError::Serialization(_) => "serialization_error",
        }
    }
}

/// Numeric error codes carried by `error` reply bodies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    NotSupported = 10,
    TemporarilyUnavailable = 11,
    MalformedRequest = 12,
    Crash = 13,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

// Conversions from common error types
impl From<std::io::Error> for PloverError {
    fn from(err: std::io::Error) -> Self {
        PloverError::Io(err)
    }
}

impl From<serde_json::Error> for PloverError {
    fn from(err: serde_json::Error) -> Self {
        PloverError::Serialization(SerializationError::Json(err))
    }
}

impl From<TransportError> for PloverError {
    fn from(err: TransportError) -> Self {
        PloverError::Transport(err)
    }
}

impl From<SerializationError> for PloverError {
    fn from(err: SerializationError) -> Self {
        PloverError::Serialization(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::PloverError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PloverError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($msg:expr) => {
        $crate::error::PloverError::Protocol($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PloverError::Protocol(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! malformed_error {
    ($msg:expr) => {
        $crate::error::PloverError::Malformed($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PloverError::Malformed(format!($fmt, $($arg)*))
    };
}
