//! `scan` subcommand: probe every raw code in an inclusive range.

use super::{
    Config, ControlCode, DeviceArgs, DeviceControl, Result, Scanner, finish_scan, open_device,
    parse_code, resolve_device,
};

pub(super) fn cmd_scan(
    start: &str,
    end: &str,
    args: DeviceArgs,
    budget: Option<u64>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let start = parse_code(start)?;
    let end = parse_code(end)?;
    if start > end {
        log::warn!("start {start} is after end {end}; nothing to scan");
    }
    let scanner = super::build_scanner(config, budget)?;
    let path = resolve_device(args.device, config)?;
    let device = open_device(&path, args.mode)?;
    cmd_scan_inner(&device, &scanner, start, end, json)
}

fn cmd_scan_inner(
    device: &impl DeviceControl,
    scanner: &Scanner,
    start: ControlCode,
    end: ControlCode,
    json: bool,
) -> Result<()> {
    let count = u64::from(end.raw().saturating_sub(start.raw())) + 1;
    if !json && start <= end {
        eprintln!("Scanning {count} codes {start}..={end} (Ctrl+C to stop)...");
    }
    finish_scan(device.path(), scanner.scan_range(device, start, end), json)
}
