//! Probe outcome classification.
//!
//! `DeviceIoControl` reports every failure through one flat error number, so
//! "the driver rejected my buffer" and "the driver has no idea what this code
//! is" look alike at the call site. [`classify`] resolves that with a fixed
//! policy over two named signal sets:
//!
//! - success → `Recognized`
//! - insufficient buffer, more data, invalid parameter, bad length,
//!   invalid user buffer, access denied → `Recognized`
//! - invalid function, not supported, not implemented → `Unrecognized`
//! - anything else → `Ambiguous`
//!
//! `Ambiguous` is accumulated like `Recognized`: a false positive costs one
//! line of output, a false negative hides a live code.

use std::fmt;

use serde::Serialize;

use crate::code::ControlCode;

// ── Win32 error numbers ──

pub const ERROR_INVALID_FUNCTION: u32 = 1;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_BAD_LENGTH: u32 = 24;
pub const ERROR_NOT_SUPPORTED: u32 = 50;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_MORE_DATA: u32 = 234;
pub const ERROR_INVALID_USER_BUFFER: u32 = 1784;

/// Failure signal surfaced by the device control primitive.
///
/// The nine named variants are the vocabulary the classifier understands;
/// every other native error number is carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorSignal {
    InsufficientBuffer,
    MoreData,
    InvalidParameter,
    BadLength,
    InvalidUserBuffer,
    AccessDenied,
    InvalidFunction,
    NotSupported,
    NotImplemented,
    Other(u32),
}

impl ErrorSignal {
    /// Map a native Win32 error number onto the signal vocabulary.
    pub fn from_win32(code: u32) -> Self {
        match code {
            ERROR_INSUFFICIENT_BUFFER => ErrorSignal::InsufficientBuffer,
            ERROR_MORE_DATA => ErrorSignal::MoreData,
            ERROR_INVALID_PARAMETER => ErrorSignal::InvalidParameter,
            ERROR_BAD_LENGTH => ErrorSignal::BadLength,
            ERROR_INVALID_USER_BUFFER => ErrorSignal::InvalidUserBuffer,
            ERROR_ACCESS_DENIED => ErrorSignal::AccessDenied,
            ERROR_INVALID_FUNCTION => ErrorSignal::InvalidFunction,
            ERROR_NOT_SUPPORTED => ErrorSignal::NotSupported,
            ERROR_CALL_NOT_IMPLEMENTED => ErrorSignal::NotImplemented,
            other => ErrorSignal::Other(other),
        }
    }

    /// Native Win32 error number for this signal.
    pub fn win32_code(self) -> u32 {
        match self {
            ErrorSignal::InsufficientBuffer => ERROR_INSUFFICIENT_BUFFER,
            ErrorSignal::MoreData => ERROR_MORE_DATA,
            ErrorSignal::InvalidParameter => ERROR_INVALID_PARAMETER,
            ErrorSignal::BadLength => ERROR_BAD_LENGTH,
            ErrorSignal::InvalidUserBuffer => ERROR_INVALID_USER_BUFFER,
            ErrorSignal::AccessDenied => ERROR_ACCESS_DENIED,
            ErrorSignal::InvalidFunction => ERROR_INVALID_FUNCTION,
            ErrorSignal::NotSupported => ERROR_NOT_SUPPORTED,
            ErrorSignal::NotImplemented => ERROR_CALL_NOT_IMPLEMENTED,
            ErrorSignal::Other(code) => code,
        }
    }

    /// Symbolic Win32 name, when the signal is one of the named nine.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            ErrorSignal::InsufficientBuffer => "ERROR_INSUFFICIENT_BUFFER",
            ErrorSignal::MoreData => "ERROR_MORE_DATA",
            ErrorSignal::InvalidParameter => "ERROR_INVALID_PARAMETER",
            ErrorSignal::BadLength => "ERROR_BAD_LENGTH",
            ErrorSignal::InvalidUserBuffer => "ERROR_INVALID_USER_BUFFER",
            ErrorSignal::AccessDenied => "ERROR_ACCESS_DENIED",
            ErrorSignal::InvalidFunction => "ERROR_INVALID_FUNCTION",
            ErrorSignal::NotSupported => "ERROR_NOT_SUPPORTED",
            ErrorSignal::NotImplemented => "ERROR_CALL_NOT_IMPLEMENTED",
            ErrorSignal::Other(_) => return None,
        })
    }
}

impl fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.win32_code()),
            None => write!(f, "error {}", self.win32_code()),
        }
    }
}

// ── Probe outcome ──

/// Result of submitting one control code to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub code: ControlCode,
    /// `None` when the call succeeded.
    pub signal: Option<ErrorSignal>,
    pub bytes_returned: u32,
}

impl ProbeOutcome {
    pub fn success(&self) -> bool {
        self.signal.is_none()
    }

    pub fn verdict(&self) -> Verdict {
        classify(self)
    }
}

// ── Verdict ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Recognized,
    Unrecognized,
    Ambiguous,
}

impl Verdict {
    /// Accumulation policy: everything but `Unrecognized` is kept.
    pub fn is_hit(self) -> bool {
        !matches!(self, Verdict::Unrecognized)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Recognized => write!(f, "recognized"),
            Verdict::Unrecognized => write!(f, "unrecognized"),
            Verdict::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Decide whether the driver recognized the probed code.
pub fn classify(outcome: &ProbeOutcome) -> Verdict {
    let Some(signal) = outcome.signal else {
        return Verdict::Recognized;
    };
    match signal {
        // The driver looked at the request and rejected something specific to it.
        ErrorSignal::InsufficientBuffer
        | ErrorSignal::MoreData
        | ErrorSignal::InvalidParameter
        | ErrorSignal::BadLength
        | ErrorSignal::InvalidUserBuffer
        | ErrorSignal::AccessDenied => Verdict::Recognized,
        ErrorSignal::InvalidFunction | ErrorSignal::NotSupported | ErrorSignal::NotImplemented => {
            Verdict::Unrecognized
        }
        ErrorSignal::Other(_) => Verdict::Ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(signal: ErrorSignal) -> ProbeOutcome {
        ProbeOutcome {
            code: ControlCode(0x0022_2000),
            signal: Some(signal),
            bytes_returned: 0,
        }
    }

    #[test]
    fn success_is_recognized() {
        let outcome = ProbeOutcome {
            code: ControlCode(0x0022_2000),
            signal: None,
            bytes_returned: 12,
        };
        assert!(outcome.success());
        assert_eq!(classify(&outcome), Verdict::Recognized);
    }

    #[test]
    fn rejected_set_is_recognized() {
        for code in [122, 234, 87, 24, 1784, 5] {
            let outcome = failed(ErrorSignal::from_win32(code));
            assert_eq!(classify(&outcome), Verdict::Recognized, "win32 error {code}");
        }
    }

    #[test]
    fn unrecognized_set() {
        for code in [1, 50, 120] {
            let outcome = failed(ErrorSignal::from_win32(code));
            assert_eq!(
                classify(&outcome),
                Verdict::Unrecognized,
                "win32 error {code}"
            );
        }
    }

    #[test]
    fn other_signals_are_ambiguous_and_kept() {
        for code in [0, 2, 6, 21, 31, 1117, 0xFFFF_FFFF] {
            let outcome = failed(ErrorSignal::from_win32(code));
            let verdict = classify(&outcome);
            assert_eq!(verdict, Verdict::Ambiguous, "win32 error {code}");
            assert!(verdict.is_hit());
        }
    }

    #[test]
    fn unrecognized_is_not_a_hit() {
        assert!(!Verdict::Unrecognized.is_hit());
        assert!(Verdict::Recognized.is_hit());
    }

    #[test]
    fn win32_mapping_round_trips() {
        for code in [1, 5, 24, 50, 87, 120, 122, 234, 1784, 31] {
            assert_eq!(ErrorSignal::from_win32(code).win32_code(), code);
        }
    }

    #[test]
    fn named_signals_are_not_other() {
        for code in [1, 5, 24, 50, 87, 120, 122, 234, 1784] {
            assert!(
                !matches!(ErrorSignal::from_win32(code), ErrorSignal::Other(_)),
                "win32 error {code} should map to a named signal"
            );
        }
    }

    #[test]
    fn signal_display() {
        assert_eq!(
            ErrorSignal::AccessDenied.to_string(),
            "ERROR_ACCESS_DENIED (5)"
        );
        assert_eq!(ErrorSignal::Other(31).to_string(), "error 31");
    }

    #[test]
    fn outcome_serializes() {
        let json = serde_json::to_value(failed(ErrorSignal::NotSupported)).unwrap();
        assert_eq!(json["code"], 0x0022_2000);
        assert_eq!(json["signal"], "NotSupported");
        assert_eq!(json["bytes_returned"], 0);
    }
}
