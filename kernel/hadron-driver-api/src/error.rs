//! Driver and configuration-space error types.

use core::fmt;

/// Errors reported by a configuration-space transport or accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciError {
    /// The offset is not aligned to the access width. No access was made.
    Misaligned {
        /// Requested register offset.
        offset: u8,
        /// Access width in bytes.
        width: u8,
    },
    /// The controller reported a transport failure with this status code.
    Transport(i32),
}

impl fmt::Display for PciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { offset, width } => {
                write!(f, "offset {offset:#04x} misaligned for {width}-byte access")
            }
            Self::Transport(code) => write!(f, "config transport failed ({code})"),
        }
    }
}

/// Errors that can occur during driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The requested operation is not supported by this driver.
    Unsupported,
    /// An I/O error occurred during a hardware operation.
    IoError,
    /// The driver or device is already registered.
    AlreadyRegistered,
    /// The driver or device is not registered.
    NotRegistered,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("operation not supported"),
            Self::IoError => f.write_str("I/O error"),
            Self::AlreadyRegistered => f.write_str("already registered"),
            Self::NotRegistered => f.write_str("not registered"),
        }
    }
}

impl From<PciError> for DriverError {
    fn from(err: PciError) -> Self {
        match err {
            PciError::Misaligned { .. } | PciError::Transport(_) => Self::IoError,
        }
    }
}
