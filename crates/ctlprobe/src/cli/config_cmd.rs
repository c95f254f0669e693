//! `config` subcommand: show current configuration and file path, optionally
//! writing a default file first.

use std::path::Path;

use super::{Config, ConfigOutput, CtlprobeError, Result, kv, kv_indent, kv_width, print_json};

/// Write the default config to `path`. Never overwrites an existing file.
fn write_default(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Err(CtlprobeError::Config(
            "no config directory; pass --config PATH".into(),
        ));
    };
    if path.exists() {
        return Err(CtlprobeError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    Config::default().save_to(path)?;
    log::info!("wrote default config to {}", path.display());
    Ok(())
}

pub(super) fn cmd_config(init: bool, json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    if init {
        write_default(config_path.as_deref())?;
    }
    let config = super::load_config(custom_path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        };
        return print_json(&output);
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "device:",
            "input_len:",
            "output_len:",
            "workers:",
            "time_budget_secs:",
            "driver_start_type:",
            "driver_error_control:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let device = if config.device.is_empty() {
        "(none, pass --device)"
    } else {
        config.device.as_str()
    };
    kv_indent("device:", device, w);
    kv_indent("input_len:", config.input_len, w);
    kv_indent("output_len:", config.output_len, w);
    kv_indent("workers:", config.workers, w);
    let budget = if config.time_budget_secs == 0 {
        "unlimited".to_string()
    } else {
        format!("{}s", config.time_budget_secs)
    };
    kv_indent("time_budget_secs:", budget, w);
    kv_indent("driver_start_type:", format_args!("{:?}", config.driver_start_type), w);
    kv_indent(
        "driver_error_control:",
        format_args!("{:?}", config.driver_error_control),
        w,
    );
    println!();

    println!("Function ranges:");
    for r in &config.ranges {
        println!(
            "  0x{:03X}-0x{:03X}  {} methods x {} access levels",
            r.start,
            r.end,
            r.methods.len(),
            r.access.len()
        );
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
