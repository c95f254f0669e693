//! `discover` subcommand: find the functions a driver recognizes for one device type.

use super::{
    Config, DeviceArgs, DeviceControl, Result, Scanner, finish_scan, open_device,
    parse_device_type, resolve_device,
};
use ctlprobe_lib::device;

pub(super) fn cmd_discover(
    device_type: &str,
    args: DeviceArgs,
    parallel: bool,
    budget: Option<u64>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let device_type = parse_device_type(device_type)?;
    let scanner = super::build_scanner(config, budget)?;
    let path = resolve_device(args.device, config)?;
    let mode = args.mode;

    if parallel {
        // Open once up front so a bad path fails before any worker starts.
        let first = open_device(&path, mode)?;
        let shown = first.path().to_string();
        drop(first);
        return cmd_discover_parallel_inner(
            &shown,
            || open_device(&path, mode),
            &scanner,
            device_type,
            json,
        );
    }
    let device = open_device(&path, mode)?;
    cmd_discover_inner(&device, &scanner, device_type, json)
}

fn print_plan(scanner: &Scanner, device_type: u16) {
    let functions: usize = scanner.ranges().iter().map(|r| r.len()).sum();
    eprintln!(
        "Discovering device type 0x{device_type:04X}: {functions} functions in {} ranges (Ctrl+C to stop)...",
        scanner.ranges().len()
    );
}

fn cmd_discover_inner(
    device: &impl DeviceControl,
    scanner: &Scanner,
    device_type: u16,
    json: bool,
) -> Result<()> {
    if !json {
        print_plan(scanner, device_type);
    }
    finish_scan(device.path(), scanner.discover(device, device_type), json)
}

fn cmd_discover_parallel_inner<D, F>(
    shown_path: &str,
    open: F,
    scanner: &Scanner,
    device_type: u16,
    json: bool,
) -> Result<()>
where
    D: DeviceControl,
    F: Fn() -> device::Result<D> + Sync,
{
    if !json {
        print_plan(scanner, device_type);
    }
    finish_scan(
        shown_path,
        scanner.discover_parallel(open, device_type),
        json,
    )
}
