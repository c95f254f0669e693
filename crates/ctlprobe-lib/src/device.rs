//! Device control trait and the Windows backend.

use std::fmt;

use crate::classify::{ERROR_INVALID_HANDLE, ErrorSignal};
use crate::code::ControlCode;

// ── Error type ──

/// Fatal device errors.
///
/// These abort any scan in progress. Per-code rejections reported by the
/// driver are never a `DeviceError`; they travel as [`ErrorSignal`]s inside a
/// [`Completion`] so the classifier can interpret them.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the failing call (e.g. `"CreateFileW"`).
#[derive(Debug)]
pub enum DeviceError {
    NotFound(String),
    OpenFailed(String),
    InvalidHandle,
    SubmitFailed(String),
    Unsupported(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound(path) => write!(f, "Device not found: {path}"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::InvalidHandle => write!(f, "Device handle is invalid"),
            DeviceError::SubmitFailed(e) => write!(f, "Device control failed: {e}"),
            DeviceError::Unsupported(e) => write!(f, "Unsupported: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Completion ──

/// What the device control primitive reported for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub bytes_returned: u32,
    /// `None` on success; otherwise the native error, unmodified.
    pub signal: Option<ErrorSignal>,
}

impl Completion {
    pub fn succeeded(bytes_returned: u32) -> Self {
        Completion {
            bytes_returned,
            signal: None,
        }
    }

    pub fn failed(signal: ErrorSignal) -> Self {
        Completion {
            bytes_returned: 0,
            signal: Some(signal),
        }
    }
}

// ── Open mode ──

/// Access requested when opening a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    ReadWrite,
    Read,
    /// No data access; enough for `FILE_ANY_ACCESS` codes on locked-down devices.
    QueryOnly,
}

impl std::str::FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rw" | "read-write" | "readwrite" => Ok(OpenMode::ReadWrite),
            "r" | "read" => Ok(OpenMode::Read),
            "query" | "none" => Ok(OpenMode::QueryOnly),
            other => Err(format!("unknown open mode '{other}' (rw, read, query)")),
        }
    }
}

// ── Trait ──

/// The device control primitive: one request in, one completion out.
///
/// Implementations must surface the native error number unmodified (via
/// [`ErrorSignal::from_win32`] or an equivalent mapping onto the nine named
/// signals). `Err` is reserved for conditions where the primitive itself is
/// unusable, such as a dead handle.
pub trait DeviceControl {
    /// Path the handle was opened from, for diagnostics.
    fn path(&self) -> &str;

    fn submit(&self, code: ControlCode, input: &[u8], output: &mut [u8]) -> Result<Completion>;
}

/// Expand a bare device name (`"PhysicalDrive0"`) to a Win32 device path
/// (`"\\.\PhysicalDrive0"`). Paths that already start with `\\` are kept.
pub fn device_path(name: &str) -> String {
    let name = name.trim();
    if name.starts_with(r"\\") {
        name.to_string()
    } else {
        format!(r"\\.\{name}")
    }
}

/// Extract the Win32 error number from an `HRESULT_FROM_WIN32` value.
/// Non-Win32 HRESULTs are returned unchanged.
pub fn win32_from_hresult(hr: u32) -> u32 {
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}

/// Turn a native error number into either a fatal error or a signal.
pub(crate) fn completion_from_win32(code: u32) -> Result<Completion> {
    if code == ERROR_INVALID_HANDLE {
        return Err(DeviceError::InvalidHandle);
    }
    Ok(Completion::failed(ErrorSignal::from_win32(code)))
}

// ── Windows implementation ──

#[cfg(windows)]
mod windows_impl {
    use super::*;

    use windows::Win32::Foundation::*;
    use windows::Win32::Storage::FileSystem::*;
    use windows::Win32::System::IO::DeviceIoControl;
    use windows::core::PCWSTR;

    pub struct WindowsDevice {
        handle: HANDLE,
        path: String,
    }

    impl WindowsDevice {
        pub fn open(path: &str, mode: OpenMode) -> Result<Self> {
            let path = device_path(path);
            let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
            let access = match mode {
                OpenMode::ReadWrite => (GENERIC_READ | GENERIC_WRITE).0,
                OpenMode::Read => GENERIC_READ.0,
                OpenMode::QueryOnly => 0,
            };
            let handle = unsafe {
                CreateFileW(
                    PCWSTR(wide.as_ptr()),
                    access,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    None,
                    OPEN_EXISTING,
                    FILE_FLAGS_AND_ATTRIBUTES(0),
                    None,
                )
            }
            .map_err(|e| {
                let code = win32_from_hresult(e.code().0 as u32);
                if code == ERROR_FILE_NOT_FOUND.0 || code == ERROR_PATH_NOT_FOUND.0 {
                    DeviceError::NotFound(path.clone())
                } else {
                    DeviceError::OpenFailed(format!("CreateFileW: {e}"))
                }
            })?;
            log::debug!("opened {path} ({mode:?})");
            Ok(WindowsDevice { handle, path })
        }
    }

    impl DeviceControl for WindowsDevice {
        fn path(&self) -> &str {
            &self.path
        }

        fn submit(&self, code: ControlCode, input: &[u8], output: &mut [u8]) -> Result<Completion> {
            let mut ret: u32 = 0;
            let in_ptr = if input.is_empty() {
                None
            } else {
                Some(input.as_ptr() as *const _)
            };
            let out_len = output.len();
            let out_ptr = if output.is_empty() {
                None
            } else {
                Some(output.as_mut_ptr() as *mut _)
            };
            // SAFETY: both buffers outlive the synchronous call and their
            // lengths are passed alongside the pointers.
            let r = unsafe {
                DeviceIoControl(
                    self.handle,
                    code.raw(),
                    in_ptr,
                    input.len() as u32,
                    out_ptr,
                    out_len as u32,
                    Some(&mut ret),
                    None,
                )
            };
            match r {
                Ok(()) => Ok(Completion::succeeded(ret)),
                Err(e) => {
                    let mut completion = completion_from_win32(win32_from_hresult(e.code().0 as u32))?;
                    completion.bytes_returned = ret;
                    Ok(completion)
                }
            }
        }
    }

    impl Drop for WindowsDevice {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(windows)]
pub use windows_impl::WindowsDevice;

// ── Stub device for unsupported platforms ──

/// Placeholder device that always fails to open.
/// Enables compilation and `cargo test` on non-Windows hosts.
#[cfg(not(windows))]
pub struct StubDevice {
    path: String,
}

#[cfg(not(windows))]
impl StubDevice {
    pub fn open(path: &str, _mode: OpenMode) -> Result<Self> {
        Err(DeviceError::Unsupported(format!(
            "cannot open {}: device control requires Windows",
            device_path(path)
        )))
    }
}

#[cfg(not(windows))]
impl DeviceControl for StubDevice {
    fn path(&self) -> &str {
        &self.path
    }

    fn submit(&self, _code: ControlCode, _input: &[u8], _output: &mut [u8]) -> Result<Completion> {
        Err(DeviceError::InvalidHandle)
    }
}

/// Concrete device type for the current platform.
#[cfg(windows)]
pub type PlatformDevice = WindowsDevice;
#[cfg(not(windows))]
pub type PlatformDevice = StubDevice;

/// Open a device by path or bare name.
pub fn open_device(path: &str, mode: OpenMode) -> Result<PlatformDevice> {
    PlatformDevice::open(path, mode)
}

// ── Mock device for testing ──

/// In-memory mock device for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Scripted reply for one submitted code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockReply {
        Success(u32),
        Signal(ErrorSignal),
        /// Behave like a dead handle.
        Fatal,
    }

    pub type Responder = Arc<dyn Fn(ControlCode) -> MockReply + Send + Sync>;

    /// Device whose replies come from a responder closure. Every submission
    /// is recorded in `calls`.
    pub struct MockDevice {
        path: String,
        responder: Responder,
        /// Recorded submissions, in order.
        pub calls: RefCell<Vec<ControlCode>>,
        /// Recorded (input, output) buffer lengths.
        pub buffer_lens: RefCell<Vec<(usize, usize)>>,
        /// If set, every submission after this many calls fails fatally.
        pub fail_after: Cell<Option<usize>>,
    }

    impl Default for MockDevice {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockDevice {
        /// A device that recognizes nothing.
        pub fn new() -> Self {
            Self::from_responder(Arc::new(|_| MockReply::Signal(ErrorSignal::InvalidFunction)))
        }

        pub fn with_responder(f: impl Fn(ControlCode) -> MockReply + Send + Sync + 'static) -> Self {
            Self::from_responder(Arc::new(f))
        }

        /// Share one responder between several devices (one per worker).
        pub fn from_responder(responder: Responder) -> Self {
            MockDevice {
                path: r"\\.\MockDevice".into(),
                responder,
                calls: RefCell::new(Vec::new()),
                buffer_lens: RefCell::new(Vec::new()),
                fail_after: Cell::new(None),
            }
        }

        /// A device that succeeds for `codes` and reports `ERROR_INVALID_FUNCTION` otherwise.
        pub fn recognizing(codes: &[ControlCode]) -> Self {
            let set: HashSet<ControlCode> = codes.iter().copied().collect();
            Self::with_responder(move |code| {
                if set.contains(&code) {
                    MockReply::Success(0)
                } else {
                    MockReply::Signal(ErrorSignal::InvalidFunction)
                }
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl DeviceControl for MockDevice {
        fn path(&self) -> &str {
            &self.path
        }

        fn submit(&self, code: ControlCode, input: &[u8], output: &mut [u8]) -> Result<Completion> {
            let made = self.call_count();
            if self.fail_after.get().is_some_and(|limit| made >= limit) {
                return Err(DeviceError::InvalidHandle);
            }
            self.calls.borrow_mut().push(code);
            self.buffer_lens
                .borrow_mut()
                .push((input.len(), output.len()));
            match (self.responder)(code) {
                MockReply::Success(bytes) => {
                    let n = (bytes as usize).min(output.len());
                    output[..n].fill(0xA5);
                    Ok(Completion::succeeded(n as u32))
                }
                MockReply::Signal(signal) => Ok(Completion::failed(signal)),
                MockReply::Fatal => Err(DeviceError::InvalidHandle),
            }
        }
    }
}
