//! Probe configuration: TOML file in the platform config directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::{self, DEFAULT_WORKERS, PROBE_INPUT_LEN, PROBE_OUTPUT_LEN, SearchRange};
use crate::driver::{DriverLoadOptions, ErrorControl, StartType};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# ctlprobe configuration; `ctlprobe config` shows the values in effect.\n\n";

/// Largest probe buffer accepted from the config file.
pub const MAX_BUFFER_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Device opened when no `--device` is given. Empty = must be passed explicitly.
    #[serde(default)]
    pub device: String,

    /// Input buffer length for every probe. Default: 16.
    #[serde(default = "default_input_len")]
    pub input_len: usize,

    /// Output buffer length for every probe. Default: 256.
    #[serde(default = "default_output_len")]
    pub output_len: usize,

    /// Worker threads for `discover --parallel`.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Stop a scan after this many seconds. 0 = no limit.
    #[serde(default)]
    pub time_budget_secs: u64,

    #[serde(default)]
    pub driver_start_type: StartType,

    #[serde(default)]
    pub driver_error_control: ErrorControl,

    /// Function ranges probed by `discover`.
    /// Example in TOML: `[[ranges]]` / `start = 0x800` / `end = 0x8FF`
    #[serde(default = "discovery::default_ranges")]
    pub ranges: Vec<SearchRange>,
}

fn default_input_len() -> usize {
    PROBE_INPUT_LEN
}
fn default_output_len() -> usize {
    PROBE_OUTPUT_LEN
}
fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: String::new(),
            input_len: PROBE_INPUT_LEN,
            output_len: PROBE_OUTPUT_LEN,
            workers: DEFAULT_WORKERS,
            time_budget_secs: 0,
            driver_start_type: StartType::default(),
            driver_error_control: ErrorControl::default(),
            ranges: discovery::default_ranges(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A buffer length is outside `0..=MAX_BUFFER_LEN` (`field` names which one).
    BufferTooLarge { field: &'static str, len: usize },
    ZeroWorkers,
    NoRanges,
    InvalidRange(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::BufferTooLarge { field, len } => {
                write!(f, "Invalid {field}: {len} bytes (max {MAX_BUFFER_LEN})")
            }
            ValidationError::ZeroWorkers => write!(f, "workers must be at least 1"),
            ValidationError::NoRanges => write!(f, "ranges cannot be empty"),
            ValidationError::InvalidRange(e) => write!(f, "Invalid range: {e}"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("Ctlprobe"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("ctlprobe"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Options used by `driver load`.
    pub fn driver_options(&self) -> DriverLoadOptions {
        DriverLoadOptions {
            start_type: self.driver_start_type,
            error_control: self.driver_error_control,
            ..DriverLoadOptions::default()
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.input_len > MAX_BUFFER_LEN {
            errors.push(ValidationError::BufferTooLarge {
                field: "input_len",
                len: self.input_len,
            });
        }
        if self.output_len > MAX_BUFFER_LEN {
            errors.push(ValidationError::BufferTooLarge {
                field: "output_len",
                len: self.output_len,
            });
        }
        if self.workers == 0 {
            errors.push(ValidationError::ZeroWorkers);
        }
        if self.ranges.is_empty() {
            errors.push(ValidationError::NoRanges);
        } else if let Err(e) = discovery::validate_ranges(&self.ranges) {
            errors.push(ValidationError::InvalidRange(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
