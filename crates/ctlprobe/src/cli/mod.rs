//! CLI subcommands: codec helpers, device probing, driver control.

mod config_cmd;
mod decode;
mod discover;
mod driver;
mod encode;
mod known;
mod probe;
mod scan;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use ctlprobe_lib::classify::{ErrorSignal, ProbeOutcome, Verdict};
pub(super) use ctlprobe_lib::code::{self, ControlCode, DecodedCode};
pub(super) use ctlprobe_lib::config::Config;
pub(super) use ctlprobe_lib::device::{DeviceControl, OpenMode, open_device};
pub(super) use ctlprobe_lib::discovery::{
    DiscoveryError, DiscoveryResult, Scanner, SearchRange, StopReason,
};
pub(super) use ctlprobe_lib::error::{CtlprobeError, Result};
pub(super) use ctlprobe_lib::format;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CtlprobeError::Io(std::io::Error::other(e)))?;
    println!("{text}");
    Ok(())
}

// ── Shared argument handling ──

pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

pub(super) fn parse_code(s: &str) -> Result<ControlCode> {
    code::parse_u32(s)
        .map(ControlCode)
        .map_err(CtlprobeError::Parse)
}

pub(super) fn parse_device_type(s: &str) -> Result<u16> {
    code::parse_device_type(s).map_err(CtlprobeError::Parse)
}

/// Parse `START-END` (either bound hex or decimal) into a function range.
pub(super) fn parse_range(s: &str) -> Result<SearchRange> {
    let Some((start, end)) = s.split_once('-') else {
        return Err(CtlprobeError::Parse(format!(
            "range '{s}' must look like START-END"
        )));
    };
    let bound = |v: &str| -> Result<u16> {
        let n = code::parse_u32(v).map_err(CtlprobeError::Parse)?;
        u16::try_from(n).map_err(|_| CtlprobeError::Parse(format!("function 0x{n:X} out of range")))
    };
    let range = SearchRange::new(bound(start)?, bound(end)?);
    range.validate().map_err(CtlprobeError::Parse)?;
    Ok(range)
}

/// Device named on the command line, else the one in the config file.
pub(super) fn resolve_device(arg: Option<String>, config: &Config) -> Result<String> {
    match arg {
        Some(path) => Ok(path),
        None if !config.device.trim().is_empty() => Ok(config.device.clone()),
        None => Err(CtlprobeError::Config(
            "no device given; pass --device or set `device` in the config file".into(),
        )),
    }
}

/// Scanner built from config, with command-line overrides and Ctrl+C wired in.
/// A budget of `Some(0)` removes any limit set in the config file.
pub(super) fn build_scanner(config: &Config, budget_secs: Option<u64>) -> Result<Scanner<'static>> {
    if let Err(errors) = config.validate() {
        let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(CtlprobeError::Config(msgs.join("; ")));
    }
    let mut scanner = Scanner::from_config(config).with_running_flag(&RUNNING);
    match budget_secs {
        None => {}
        Some(0) => scanner = scanner.without_budget(),
        Some(secs) => scanner = scanner.with_budget(std::time::Duration::from_secs(secs)),
    }
    Ok(scanner)
}

#[derive(clap::Args)]
pub struct DeviceArgs {
    /// Device path or bare name (e.g. `PhysicalDrive0`, `\\.\C:`)
    #[arg(short, long)]
    device: Option<String>,

    /// Handle access: rw, read, or query
    #[arg(long, default_value = "rw")]
    mode: OpenMode,
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct OutcomeJson {
    pub code: String,
    pub verdict: Verdict,
    pub signal: Option<String>,
    pub win32_error: Option<u32>,
    pub bytes_returned: u32,
    pub decoded: String,
}

impl From<&ProbeOutcome> for OutcomeJson {
    fn from(o: &ProbeOutcome) -> Self {
        OutcomeJson {
            code: o.code.to_string(),
            verdict: o.verdict(),
            signal: o.signal.map(|s| s.to_string()),
            win32_error: o.signal.map(ErrorSignal::win32_code),
            bytes_returned: o.bytes_returned,
            decoded: format::format_compact(o.code),
        }
    }
}

#[derive(Serialize)]
pub(super) struct ScanOutput {
    pub device: String,
    pub probes_issued: usize,
    pub complete: bool,
    pub stopped: Option<StopReason>,
    pub found: Vec<OutcomeJson>,
}

impl ScanOutput {
    pub fn new(device: &str, result: &DiscoveryResult) -> Self {
        ScanOutput {
            device: device.to_string(),
            probes_issued: result.probes_issued,
            complete: result.is_complete(),
            stopped: result.stopped,
            found: result.found.iter().map(OutcomeJson::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

/// Text status for one outcome: `success (N bytes)` or the signal.
pub(super) fn outcome_status(o: &ProbeOutcome) -> String {
    match o.signal {
        None => format!("success ({} bytes)", o.bytes_returned),
        Some(signal) => signal.to_string(),
    }
}

/// Print a scan result as text or JSON. Shared by `scan` and `discover`.
pub(super) fn print_result(device: &str, result: &DiscoveryResult, json: bool) -> Result<()> {
    if json {
        return print_json(&ScanOutput::new(device, result));
    }
    println!(
        "{} recognized of {} probes on {device}",
        result.found.len(),
        result.probes_issued
    );
    for o in &result.found {
        println!(
            "  {}  {:<34}{:<14}{}",
            o.code,
            outcome_status(o),
            o.verdict().to_string(),
            format::format_compact(o.code)
        );
    }
    if let Some(reason) = result.stopped {
        println!("Stopped early ({reason}); results are partial.");
    }
    Ok(())
}

/// Report a scan outcome; an aborted scan still prints what it found.
pub(super) fn finish_scan(
    device: &str,
    outcome: std::result::Result<DiscoveryResult, DiscoveryError>,
    json: bool,
) -> Result<()> {
    match outcome {
        Ok(result) => print_result(device, &result, json),
        Err(e) => {
            if let Some(partial) = e.partial() {
                print_result(device, partial, json)?;
            }
            Err(e.into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DecodeStyle {
    Verbose,
    Compact,
    Hex,
}

#[derive(Subcommand)]
pub enum DriverAction {
    /// Install a kernel driver service (if needed) and start it
    Load {
        /// Path to the driver image (.sys)
        image: PathBuf,
        /// Service name
        name: String,
        /// Delete and recreate an existing service of the same name
        #[arg(long)]
        recreate: bool,
        /// Install without starting
        #[arg(long)]
        no_start: bool,
    },
    /// Start an installed driver service
    Start { name: String },
    /// Stop a running driver service
    Stop { name: String },
    /// Stop and delete a driver service
    Unload { name: String },
    /// Show the state of a driver service
    Status { name: String },
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode control codes into their fields
    Decode {
        /// Codes as hex (0x...) or decimal
        #[arg(required = true)]
        codes: Vec<String>,
        /// Output style: verbose, compact, or hex
        #[arg(long, default_value = "verbose")]
        style: DecodeStyle,
    },

    /// Build a control code from its fields
    Encode {
        /// Device type as a number or name (e.g. DISK, 0x22)
        device_type: String,
        /// Function code (0-0xFFF)
        function: String,
        /// Transfer method: BUFFERED, IN_DIRECT, OUT_DIRECT, NEITHER or 0-3
        #[arg(long, default_value = "BUFFERED")]
        method: String,
        /// Required access: ANY, READ, WRITE, READ_WRITE or 0-3
        #[arg(long, default_value = "ANY")]
        access: String,
    },

    /// List the standard control codes known by name
    Known,

    /// Send specific control codes to a device and classify the replies
    Probe {
        #[arg(required = true)]
        codes: Vec<String>,
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Probe every code in an inclusive range of raw values
    Scan {
        /// First code
        start: String,
        /// Last code (inclusive)
        end: String,
        #[command(flatten)]
        device: DeviceArgs,
        /// Stop after this many seconds; 0 = no limit (overrides the config file)
        #[arg(long)]
        budget: Option<u64>,
    },

    /// Find the function codes a driver recognizes for one device type
    Discover {
        /// Device type as a number or name
        device_type: String,
        #[command(flatten)]
        device: DeviceArgs,
        /// Function range START-END; repeat to probe several (overrides the config file)
        #[arg(long = "range", value_name = "START-END")]
        ranges: Vec<String>,
        /// Probe on several worker threads
        #[arg(long)]
        parallel: bool,
        /// Worker count for --parallel (overrides the config file)
        #[arg(long)]
        workers: Option<usize>,
        /// Stop after this many seconds; 0 = no limit (overrides the config file)
        #[arg(long)]
        budget: Option<u64>,
    },

    /// Install, start, stop, or remove a kernel driver service
    Driver {
        #[command(subcommand)]
        action: DriverAction,
    },

    /// Show current configuration and file path
    Config {
        /// Write a default config file first (fails if one exists)
        #[arg(long)]
        init: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Decode { codes, style } => decode::cmd_decode(&codes, style, json),
        Command::Encode {
            device_type,
            function,
            method,
            access,
        } => encode::cmd_encode(&device_type, &function, &method, &access, json),
        Command::Known => known::cmd_known(json),
        Command::Probe { codes, device } => {
            let config = load_config(config_path);
            probe::cmd_probe(&codes, device, &config, json)
        }
        Command::Scan {
            start,
            end,
            device,
            budget,
        } => {
            let config = load_config(config_path);
            scan::cmd_scan(&start, &end, device, budget, &config, json)
        }
        Command::Discover {
            device_type,
            device,
            ranges,
            parallel,
            workers,
            budget,
        } => {
            let mut config = load_config(config_path);
            if !ranges.is_empty() {
                config.ranges = ranges
                    .iter()
                    .map(|r| parse_range(r))
                    .collect::<Result<Vec<_>>>()?;
            }
            if let Some(n) = workers {
                config.workers = n;
            }
            discover::cmd_discover(&device_type, device, parallel, budget, &config, json)
        }
        Command::Driver { action } => {
            if json && !matches!(action, DriverAction::Status { .. }) {
                warn_json_unsupported("driver");
            }
            let config = load_config(config_path);
            driver::cmd_driver(action, &config, json)
        }
        Command::Config { init } => config_cmd::cmd_config(init, json, config_path),
    }
}
