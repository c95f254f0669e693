//! `probe` subcommand: send specific codes and classify each reply.

use super::{
    Config, ControlCode, DeviceArgs, DeviceControl, OutcomeJson, Result, Scanner, format, kv,
    kv_width, open_device, outcome_status, parse_code, print_json, resolve_device,
};

pub(super) fn cmd_probe(codes: &[String], args: DeviceArgs, config: &Config, json: bool) -> Result<()> {
    let codes = codes
        .iter()
        .map(|s| parse_code(s))
        .collect::<Result<Vec<_>>>()?;
    let path = resolve_device(args.device, config)?;
    let scanner = super::build_scanner(config, None)?;
    let device = open_device(&path, args.mode)?;
    cmd_probe_inner(&device, &scanner, &codes, json)
}

fn cmd_probe_inner(
    device: &impl DeviceControl,
    scanner: &Scanner,
    codes: &[ControlCode],
    json: bool,
) -> Result<()> {
    let mut outcomes = Vec::with_capacity(codes.len());
    for &code in codes {
        outcomes.push(scanner.probe(device, code)?);
    }

    if json {
        let list: Vec<OutcomeJson> = outcomes.iter().map(OutcomeJson::from).collect();
        return print_json(&list);
    }

    let w = kv_width(&["Device:", "Buffers:"], &[]);
    kv("Device:", device.path(), w);
    let buffers = scanner.buffers();
    kv(
        "Buffers:",
        format_args!("{} in / {} out", buffers.input_len, buffers.output_len),
        w,
    );
    println!();
    for o in &outcomes {
        println!("{}", format::format_compact(o.code));
        println!("  {}  {} -> {}", o.code, outcome_status(o), o.verdict());
    }
    Ok(())
}
