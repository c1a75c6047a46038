//! Error types
//!
//! Every fallible call returns [`Result`]. Foreign bindings that need a flat
//! status code use [`Error::status`], which collapses the error onto the closed
//! [`Status`] set.

use crate::registry::Handle;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of status codes reported across the handle-based surface
///
/// The integer values are stable and are what a foreign binding sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    PropertyWriteFailed = 2000,
    InvalidHandle = -2000,
    WrongHandleSubtype = -2001,
    InvalidParameter = -2002,
    ValueOutOfRange = -2003,
    ValueNotSupported = -2004,
    PropertyExists = -2005,
    PropertyNotFound = -2006,
    WrongPropertyType = -2007,
    EmptyValue = -2008,
    ReadFailed = -2009,
    ResourceNotAvailable = -2010,
    BadUrl = -2011,
    SinkNotBound = -2012,
    NotifierShutdown = -2013,
}

impl Status {
    /// Integer code for this status
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Status for a `Result`, `Ok` on success
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Error type for all operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Handle is unknown, expired, or of the wrong type tag
    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    /// Handle is live but refers to the wrong kind of source or sink
    #[error("operation not supported by {kind} handle {handle}")]
    WrongHandleSubtype { handle: Handle, kind: &'static str },

    /// A parameter failed validation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numeric value outside the property's range
    #[error("value {value} out of range [{min}, {max}]")]
    ValueOutOfRange { value: i32, min: i32, max: i32 },

    /// Numeric value not aligned to the property's step
    #[error("value {value} not aligned to step {step} from {min}")]
    ValueMisaligned { value: i32, min: i32, step: i32 },

    /// Requested value (typically a video mode) is not in the supported set
    #[error("value not supported: {0}")]
    ValueNotSupported(String),

    /// A property with this name already exists on the source
    #[error("property already exists: {0}")]
    PropertyExists(String),

    /// No property with this name exists on the source
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// Operation does not apply to this property type
    #[error("wrong property type for {name}: {kind}")]
    WrongPropertyType { name: String, kind: &'static str },

    /// A required string was empty
    #[error("empty value: {0}")]
    EmptyValue(&'static str),

    /// The device or stream could not be read
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The device, socket or network resource is unavailable
    #[error("resource not available: {0}")]
    ResourceNotAvailable(String),

    /// Camera URL could not be accepted
    #[error("bad url: {0}")]
    BadUrl(String),

    /// Sink has no source bound
    #[error("sink {0} has no source bound")]
    SinkNotBound(Handle),

    /// The capture device rejected a property write
    #[error("property write failed: {0}")]
    PropertyWriteFailed(String),

    /// The notifier has been torn down
    #[error("notifier has shut down")]
    NotifierShutdown,
}

impl Error {
    /// Collapse this error onto the status code set
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidHandle(_) => Status::InvalidHandle,
            Error::WrongHandleSubtype { .. } => Status::WrongHandleSubtype,
            Error::InvalidParameter(_) => Status::InvalidParameter,
            Error::ValueOutOfRange { .. } | Error::ValueMisaligned { .. } => {
                Status::ValueOutOfRange
            }
            Error::ValueNotSupported(_) => Status::ValueNotSupported,
            Error::PropertyExists(_) => Status::PropertyExists,
            Error::PropertyNotFound(_) => Status::PropertyNotFound,
            Error::WrongPropertyType { .. } => Status::WrongPropertyType,
            Error::EmptyValue(_) => Status::EmptyValue,
            Error::ReadFailed(_) => Status::ReadFailed,
            Error::ResourceNotAvailable(_) => Status::ResourceNotAvailable,
            Error::BadUrl(_) => Status::BadUrl,
            Error::SinkNotBound(_) => Status::SinkNotBound,
            Error::PropertyWriteFailed(_) => Status::PropertyWriteFailed,
            Error::NotifierShutdown => Status::NotifierShutdown,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ResourceNotAvailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::InvalidHandle.code(), -2000);
        assert_eq!(Status::PropertyWriteFailed.code(), 2000);
        assert_eq!(Status::NotifierShutdown.code(), -2013);
    }

    #[test]
    fn test_misaligned_reports_out_of_range() {
        let err = Error::ValueMisaligned {
            value: 3,
            min: 0,
            step: 2,
        };
        assert_eq!(err.status(), Status::ValueOutOfRange);
    }

    #[test]
    fn test_status_of_result() {
        let ok: Result<u32> = Ok(1);
        let err: Result<u32> = Err(Error::InvalidHandle(Handle::INVALID));

        assert_eq!(Status::of(&ok), Status::Ok);
        assert_eq!(Status::of(&err), Status::InvalidHandle);
    }

    #[test]
    fn test_io_error_maps_to_resource() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        assert_eq!(Error::from(io).status(), Status::ResourceNotAvailable);
    }
}
