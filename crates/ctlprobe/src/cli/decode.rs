//! `decode` subcommand: split control codes into their fields.

use super::{DecodeStyle as Style, DecodedCode, Result, code, format, parse_code, print_json};

pub(super) fn cmd_decode(codes: &[String], style: Style, json: bool) -> Result<()> {
    let codes = codes
        .iter()
        .map(|s| parse_code(s))
        .collect::<Result<Vec<_>>>()?;

    if json {
        let decoded: Vec<DecodedCode> = codes.into_iter().map(code::decode).collect();
        return print_json(&decoded);
    }

    for (i, c) in codes.iter().enumerate() {
        match style {
            Style::Verbose => {
                if i > 0 {
                    println!();
                }
                print!("{}", format::format_verbose(*c));
            }
            Style::Compact => println!("{c}  {}", format::format_compact(*c)),
            Style::Hex => println!("{}", format::format_hex(*c)),
        }
    }
    Ok(())
}
