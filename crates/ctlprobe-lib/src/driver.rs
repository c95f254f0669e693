//! Kernel driver lifecycle through the service control manager.
//!
//! A driver has to be installed and running before its device can be opened
//! for probing.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ── Error type ──

#[derive(Debug)]
pub enum DriverError {
    /// Could not talk to the service control manager.
    ServiceManager(String),
    /// A service call failed: "context: details".
    ServiceFailed(String),
    /// No service with this name is installed.
    NotInstalled(String),
    Unsupported(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::ServiceManager(e) => write!(f, "Service manager error: {e}"),
            DriverError::ServiceFailed(e) => write!(f, "Driver service error: {e}"),
            DriverError::NotInstalled(name) => write!(f, "Driver service not installed: {name}"),
            DriverError::Unsupported(e) => write!(f, "Unsupported: {e}"),
        }
    }
}

impl std::error::Error for DriverError {}

pub type Result<T> = std::result::Result<T, DriverError>;

// ── Options ──

/// `SERVICE_*_START` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartType {
    Boot,
    System,
    Auto,
    #[default]
    Demand,
    Disabled,
}

impl StartType {
    pub fn raw(self) -> u32 {
        self as u32
    }
}

/// `SERVICE_ERROR_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorControl {
    Ignore,
    #[default]
    Normal,
    Severe,
    Critical,
}

impl ErrorControl {
    pub fn raw(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverLoadOptions {
    pub start_type: StartType,
    pub error_control: ErrorControl,
    /// Start the service right after creating or opening it.
    pub start_immediately: bool,
    /// Stop and delete an existing service of the same name first.
    pub recreate_if_exists: bool,
}

impl Default for DriverLoadOptions {
    fn default() -> Self {
        DriverLoadOptions {
            start_type: StartType::Demand,
            error_control: ErrorControl::Normal,
            start_immediately: true,
            recreate_if_exists: false,
        }
    }
}

// ── State ──

/// `SERVICE_STATUS::dwCurrentState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Unknown(u32),
}

impl DriverState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => DriverState::Stopped,
            2 => DriverState::StartPending,
            3 => DriverState::StopPending,
            4 => DriverState::Running,
            5 => DriverState::ContinuePending,
            6 => DriverState::PausePending,
            7 => DriverState::Paused,
            other => DriverState::Unknown(other),
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Stopped => write!(f, "stopped"),
            DriverState::StartPending => write!(f, "start pending"),
            DriverState::StopPending => write!(f, "stop pending"),
            DriverState::Running => write!(f, "running"),
            DriverState::ContinuePending => write!(f, "continue pending"),
            DriverState::PausePending => write!(f, "pause pending"),
            DriverState::Paused => write!(f, "paused"),
            DriverState::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

// ── Windows implementation ──

#[cfg(windows)]
mod windows_impl {
    use super::*;

    use windows::Win32::System::Services::*;
    use windows::core::PCWSTR;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Owned SC_HANDLE, closed on drop.
    struct ScHandle(SC_HANDLE);

    impl Drop for ScHandle {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseServiceHandle(self.0);
            }
        }
    }

    fn open_manager(access: u32) -> Result<ScHandle> {
        unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), access) }
            .map(ScHandle)
            .map_err(|e| DriverError::ServiceManager(format!("OpenSCManagerW: {e}")))
    }

    /// An open handle to a kernel driver service.
    pub struct DriverService {
        handle: ScHandle,
        name: String,
    }

    impl DriverService {
        pub fn open(name: &str) -> Result<Self> {
            let scm = open_manager(SC_MANAGER_CONNECT)?;
            let wname = wide(name);
            let handle = unsafe { OpenServiceW(scm.0, PCWSTR(wname.as_ptr()), SERVICE_ALL_ACCESS) }
                .map_err(|_| DriverError::NotInstalled(name.to_string()))?;
            Ok(DriverService {
                handle: ScHandle(handle),
                name: name.to_string(),
            })
        }

        pub fn load(image: &Path, name: &str, options: &DriverLoadOptions) -> Result<Self> {
            let scm = open_manager(SC_MANAGER_ALL_ACCESS)?;
            let wname = wide(name);

            let existing =
                unsafe { OpenServiceW(scm.0, PCWSTR(wname.as_ptr()), SERVICE_ALL_ACCESS) }
                    .ok()
                    .map(ScHandle);

            let handle = match existing {
                Some(svc) if !options.recreate_if_exists => svc,
                existing => {
                    if let Some(svc) = existing {
                        log::info!("recreating driver service {name}");
                        let mut status = SERVICE_STATUS::default();
                        unsafe {
                            let _ = ControlService(svc.0, SERVICE_CONTROL_STOP, &mut status);
                            let _ = DeleteService(svc.0);
                        }
                    }
                    let wpath = wide(&image.to_string_lossy());
                    let created = unsafe {
                        CreateServiceW(
                            scm.0,
                            PCWSTR(wname.as_ptr()),
                            PCWSTR(wname.as_ptr()),
                            SERVICE_ALL_ACCESS,
                            SERVICE_KERNEL_DRIVER,
                            SERVICE_START_TYPE(options.start_type.raw()),
                            SERVICE_ERROR(options.error_control.raw()),
                            PCWSTR(wpath.as_ptr()),
                            PCWSTR::null(),
                            None,
                            PCWSTR::null(),
                            PCWSTR::null(),
                            PCWSTR::null(),
                        )
                    }
                    .map_err(|e| DriverError::ServiceFailed(format!("CreateServiceW: {e}")))?;
                    log::info!("created driver service {name} -> {}", image.display());
                    ScHandle(created)
                }
            };

            let service = DriverService {
                handle,
                name: name.to_string(),
            };
            if options.start_immediately {
                service.start()?;
            }
            Ok(service)
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        /// Start the service. Already running is not an error.
        pub fn start(&self) -> Result<()> {
            if let Err(e) = unsafe { StartServiceW(self.handle.0, None) } {
                if self.state()? == DriverState::Running {
                    return Ok(());
                }
                return Err(DriverError::ServiceFailed(format!("StartServiceW: {e}")));
            }
            log::info!("started driver service {}", self.name);
            Ok(())
        }

        pub fn stop(&self) -> Result<()> {
            let mut status = SERVICE_STATUS::default();
            unsafe { ControlService(self.handle.0, SERVICE_CONTROL_STOP, &mut status) }
                .map_err(|e| DriverError::ServiceFailed(format!("ControlService(STOP): {e}")))?;
            log::info!("stopped driver service {}", self.name);
            Ok(())
        }

        pub fn state(&self) -> Result<DriverState> {
            let mut status = SERVICE_STATUS::default();
            unsafe { QueryServiceStatus(self.handle.0, &mut status) }
                .map_err(|e| DriverError::ServiceFailed(format!("QueryServiceStatus: {e}")))?;
            Ok(DriverState::from_raw(status.dwCurrentState.0))
        }

        /// Stop the service, then delete it if `delete` is set.
        pub fn unload(self, delete: bool) -> Result<()> {
            self.stop()?;
            if delete {
                unsafe { DeleteService(self.handle.0) }
                    .map_err(|e| DriverError::ServiceFailed(format!("DeleteService: {e}")))?;
                log::info!("deleted driver service {}", self.name);
            }
            Ok(())
        }
    }
}

#[cfg(windows)]
pub use windows_impl::DriverService;

// ── Stub for unsupported platforms ──

#[cfg(not(windows))]
pub struct DriverService {
    name: String,
}

#[cfg(not(windows))]
impl DriverService {
    fn unsupported() -> DriverError {
        DriverError::Unsupported("driver services require Windows".into())
    }

    pub fn open(_name: &str) -> Result<Self> {
        Err(Self::unsupported())
    }

    pub fn load(_image: &Path, _name: &str, _options: &DriverLoadOptions) -> Result<Self> {
        Err(Self::unsupported())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Result<()> {
        Err(Self::unsupported())
    }

    pub fn stop(&self) -> Result<()> {
        Err(Self::unsupported())
    }

    pub fn state(&self) -> Result<DriverState> {
        Err(Self::unsupported())
    }

    pub fn unload(self, _delete: bool) -> Result<()> {
        Err(Self::unsupported())
    }
}

/// Install (if needed) and start a kernel driver with default options.
pub fn load_driver(image: &Path, name: &str) -> Result<DriverService> {
    DriverService::load(image, name, &DriverLoadOptions::default())
}

pub fn start_driver(name: &str) -> Result<()> {
    DriverService::open(name)?.start()
}

pub fn stop_driver(name: &str) -> Result<()> {
    DriverService::open(name)?.stop()
}

/// Stop the service and delete it.
pub fn unload_driver(name: &str) -> Result<()> {
    DriverService::open(name)?.unload(true)
}

pub fn query_driver_state(name: &str) -> Result<DriverState> {
    DriverService::open(name)?.state()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let o = DriverLoadOptions::default();
        assert_eq!(o.start_type, StartType::Demand);
        assert_eq!(o.error_control, ErrorControl::Normal);
        assert!(o.start_immediately);
        assert!(!o.recreate_if_exists);
    }

    #[test]
    fn raw_values_match_winsvc() {
        assert_eq!(StartType::Boot.raw(), 0);
        assert_eq!(StartType::Demand.raw(), 3);
        assert_eq!(StartType::Disabled.raw(), 4);
        assert_eq!(ErrorControl::Ignore.raw(), 0);
        assert_eq!(ErrorControl::Critical.raw(), 3);
    }

    #[test]
    fn state_from_raw() {
        assert_eq!(DriverState::from_raw(1), DriverState::Stopped);
        assert_eq!(DriverState::from_raw(4), DriverState::Running);
        assert_eq!(DriverState::from_raw(0), DriverState::Unknown(0));
        assert_eq!(DriverState::from_raw(4).to_string(), "running");
    }

    #[test]
    fn start_type_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            start: StartType,
        }
        let w: Wrap = toml::from_str("start = \"auto\"").unwrap();
        assert_eq!(w.start, StartType::Auto);
    }

    #[cfg(not(windows))]
    #[test]
    fn non_windows_is_unsupported() {
        let err = DriverService::open("null").err().unwrap();
        assert!(matches!(err, DriverError::Unsupported(_)));
        let err = load_driver(Path::new("C:/drv.sys"), "drv").err().unwrap();
        assert!(err.to_string().contains("require Windows"));
        assert!(matches!(
            query_driver_state("drv"),
            Err(DriverError::Unsupported(_))
        ));
    }
}
