//! Error types for SmartCardBus driver operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, ScrError>;

/// Errors that can occur while driving the controller
#[derive(Debug, Error)]
pub enum ScrError {
    /// A polled hardware condition never became true
    #[error("Operation timeout after {polls} polls")]
    Timeout {
        /// Number of polls performed before giving up
        polls: u32,
    },

    /// The inserted card is a synchronous (memory) card
    #[error("Unsupported card: exchange status {status:#06x}")]
    UnsupportedCard {
        /// Exchange status observed after power-on
        status: u16,
    },

    /// The card was still powered after the power-off command
    #[error("Power-off failed: exchange status {status:#06x}")]
    PowerOffFailed {
        /// Exchange status observed after power-off
        status: u16,
    },

    /// A byte count does not fit the destination buffer
    #[error("Buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes that would have to be stored
        needed: usize,
        /// Capacity of the destination
        capacity: usize,
    },

    /// The control channel is already held by another session
    #[error("Device busy")]
    Busy,

    /// Unknown control command code
    #[error("Unsupported operation: command {code:#06x}")]
    UnsupportedOperation {
        /// Command code received
        code: u32,
    },

    /// Identifier or memory allocation failed during attach
    #[error("Resource exhausted: {reason}")]
    ResourceExhausted {
        /// What ran out
        reason: String,
    },

    /// Device node or sysfs entry not found
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Mapping a register window failed
    #[error("Failed to map register window: {reason}")]
    MappingFailed {
        /// Reason for failure
        reason: String,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ScrError {
    /// Create a resource exhausted error
    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            reason: reason.into(),
        }
    }

    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create a mapping failed error
    pub fn mapping_failed(reason: impl Into<String>) -> Self {
        Self::MappingFailed {
            reason: reason.into(),
        }
    }

    /// errno the character device surface reports for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Timeout { .. } => libc::ETIMEDOUT,
            Self::UnsupportedCard { .. } => libc::EOPNOTSUPP,
            Self::PowerOffFailed { .. } | Self::MappingFailed { .. } => libc::EIO,
            Self::BufferTooSmall { .. } => libc::ENOBUFS,
            Self::Busy => libc::EBUSY,
            Self::UnsupportedOperation { .. } => libc::ENOTTY,
            Self::ResourceExhausted { .. } => libc::ENOMEM,
            Self::DeviceNotFound { .. } => libc::ENODEV,
            Self::Io { source } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
