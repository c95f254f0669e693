//! `known` subcommand: list the standard codes in the name table.

use serde::Serialize;

use super::{Result, format, print_json};
use ctlprobe_lib::tables::KNOWN_CODES;

#[derive(Serialize)]
struct KnownJson {
    name: &'static str,
    code: String,
    device_type: u16,
    function: u16,
}

pub(super) fn cmd_known(json: bool) -> Result<()> {
    if json {
        let list: Vec<KnownJson> = KNOWN_CODES
            .iter()
            .map(|&(code, name)| KnownJson {
                name,
                code: code.to_string(),
                device_type: code.device_type(),
                function: code.function(),
            })
            .collect();
        return print_json(&list);
    }
    for &(code, _) in KNOWN_CODES.iter() {
        println!("{code}  {}", format::format_compact(code));
    }
    Ok(())
}
