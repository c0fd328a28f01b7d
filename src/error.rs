//! Error types for the graph runtime shim.
//!
//! Driver backends raise `AieError` for everything that goes wrong below
//! the shim; the shim itself only adds the handle-lookup and argument
//! validation failures. The C API layer flattens these into errno-style
//! codes, so every variant has a stable mapping in [`AieError::to_errno`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AieError>;

/// Errors raised by the shim or forwarded from a driver backend.
#[derive(Debug, Error)]
pub enum AieError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A handle was used outside its open/close window.
    #[error("no such {0} handle")]
    NoSuchHandle(&'static str),

    /// A wait ran out of time.
    #[error("operation timed out")]
    Timeout,

    /// The device or a context on it is held by someone else.
    #[error("device busy")]
    Busy,

    /// The operation is not available on this device or backend.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// An I/O error talking to the device node.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error reported by the driver with its own errno-style code.
    #[error("driver error {code}: {message}")]
    Driver {
        /// Negative errno-style code as reported by the driver.
        code: i32,
        /// Driver-supplied description.
        message: String,
    },
}

impl AieError {
    /// Convert to an errno-style error code.
    ///
    /// Codes are negative, matching the convention of the C API this
    /// crate exposes. Driver-originated codes pass through unchanged.
    pub fn to_errno(&self) -> i32 {
        match self {
            AieError::InvalidArgument(_) => -22, // EINVAL
            AieError::NoSuchHandle(_) => -22,    // EINVAL
            AieError::Timeout => -110,           // ETIMEDOUT
            AieError::Busy => -16,               // EBUSY
            AieError::NotSupported(_) => -38,    // ENOSYS
            AieError::Io(_) => -5,               // EIO
            AieError::Driver { code, .. } => *code,
        }
    }

    /// Shorthand for the invalid-argument case.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        AieError::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(AieError::invalid("bad port").to_errno(), -22);
        assert_eq!(AieError::NoSuchHandle("graph").to_errno(), -22);
        assert_eq!(AieError::Timeout.to_errno(), -110);
        assert_eq!(AieError::Busy.to_errno(), -16);
        assert_eq!(AieError::NotSupported("tracing".into()).to_errno(), -38);
    }

    #[test]
    fn test_driver_code_passthrough() {
        let e = AieError::Driver { code: -61, message: "no data".into() };
        assert_eq!(e.to_errno(), -61);
        assert!(e.to_string().contains("no data"));
    }

    #[test]
    fn test_display_names_handle_kind() {
        let e = AieError::NoSuchHandle("profiling");
        assert_eq!(e.to_string(), "no such profiling handle");
    }
}
