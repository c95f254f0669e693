//! Unified error type for the ctlprobe-lib crate.
//!
//! [`CtlprobeError`] wraps module-specific errors (`DeviceError`,
//! `DriverError`, `DiscoveryError`) and the string-carrying `Config` and
//! `Parse` kinds. `From` impls allow `?` to propagate across module
//! boundaries.

use std::fmt;

use crate::device::DeviceError;
use crate::discovery::DiscoveryError;
use crate::driver::DriverError;

#[derive(Debug)]
pub enum CtlprobeError {
    /// Opening or talking to a device failed.
    Device(DeviceError),
    /// Service control manager error.
    Driver(DriverError),
    /// A scan was aborted by a fatal device error.
    Discovery(DiscoveryError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// User-supplied code or field could not be parsed.
    Parse(String),
}

impl fmt::Display for CtlprobeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtlprobeError::Device(e) => write!(f, "{e}"),
            CtlprobeError::Driver(e) => write!(f, "{e}"),
            CtlprobeError::Discovery(e) => write!(f, "{e}"),
            CtlprobeError::Io(e) => write!(f, "I/O error: {e}"),
            CtlprobeError::Config(e) => write!(f, "Config error: {e}"),
            CtlprobeError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for CtlprobeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CtlprobeError::Device(e) => Some(e),
            CtlprobeError::Driver(e) => Some(e),
            CtlprobeError::Discovery(e) => Some(e),
            CtlprobeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for CtlprobeError {
    fn from(e: DeviceError) -> Self {
        CtlprobeError::Device(e)
    }
}

impl From<DriverError> for CtlprobeError {
    fn from(e: DriverError) -> Self {
        CtlprobeError::Driver(e)
    }
}

impl From<DiscoveryError> for CtlprobeError {
    fn from(e: DiscoveryError) -> Self {
        CtlprobeError::Discovery(e)
    }
}

impl From<std::io::Error> for CtlprobeError {
    fn from(e: std::io::Error) -> Self {
        CtlprobeError::Io(e)
    }
}

/// Crate-level Result alias using [`CtlprobeError`].
pub type Result<T> = std::result::Result<T, CtlprobeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryResult;

    #[test]
    fn from_device_error() {
        let e: CtlprobeError = DeviceError::InvalidHandle.into();
        assert!(matches!(e, CtlprobeError::Device(DeviceError::InvalidHandle)));
    }

    #[test]
    fn from_driver_error() {
        let e: CtlprobeError = DriverError::NotInstalled("beep".into()).into();
        assert!(matches!(e, CtlprobeError::Driver(DriverError::NotInstalled(_))));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: CtlprobeError = io_err.into();
        assert!(matches!(e, CtlprobeError::Io(_)));
    }

    #[test]
    fn display_device_error_is_transparent() {
        let e = CtlprobeError::Device(DeviceError::NotFound(r"\\.\Foo".into()));
        assert_eq!(e.to_string(), r"Device not found: \\.\Foo");
    }

    #[test]
    fn display_string_variants() {
        assert_eq!(
            CtlprobeError::Config("bad range".into()).to_string(),
            "Config error: bad range"
        );
        assert_eq!(
            CtlprobeError::Parse("invalid number 'zz'".into()).to_string(),
            "Parse error: invalid number 'zz'"
        );
    }

    #[test]
    fn source_chains_through_discovery() {
        let e: CtlprobeError = DiscoveryError::Aborted {
            source: DeviceError::InvalidHandle,
            partial: DiscoveryResult::default(),
        }
        .into();
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().starts_with("Scan aborted"));
        let inner = source.source().unwrap();
        assert_eq!(inner.to_string(), "Device handle is invalid");
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = CtlprobeError::Parse("x".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_device_to_ctlprobe() {
        fn inner() -> crate::device::Result<()> {
            Err(DeviceError::InvalidHandle)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, CtlprobeError::Device(DeviceError::InvalidHandle)));
    }
}
