//! `encode` subcommand: build a control code from its fields.

use super::{ControlCode, CtlprobeError, Result, code, format, print_json};

/// Parse the four textual fields and pack them.
///
/// Field widths are enforced here so the user hears about a typo instead of
/// getting a silently masked value.
fn build_code(device_type: &str, function: &str, method: &str, access: &str) -> Result<ControlCode> {
    let device_type = code::parse_device_type(device_type).map_err(CtlprobeError::Parse)?;
    let function = code::parse_u32(function).map_err(CtlprobeError::Parse)?;
    if function > code::MAX_FUNCTION as u32 {
        return Err(CtlprobeError::Parse(format!(
            "function 0x{function:X} exceeds 0x{:03X}",
            code::MAX_FUNCTION
        )));
    }
    let method = code::parse_method(method).map_err(CtlprobeError::Parse)?;
    let access = code::parse_access(access).map_err(CtlprobeError::Parse)?;
    Ok(code::encode(
        device_type as u32,
        function,
        method.bits(),
        access.bits(),
    ))
}

pub(super) fn cmd_encode(
    device_type: &str,
    function: &str,
    method: &str,
    access: &str,
    json: bool,
) -> Result<()> {
    let c = build_code(device_type, function, method, access)?;
    if json {
        return print_json(&code::decode(c));
    }
    println!("{}", format::format_hex(c));
    println!("{}", format::format_compact(c));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_by_name() {
        let c = build_code("DISK", "0", "BUFFERED", "ANY").unwrap();
        assert_eq!(c, ControlCode(0x0007_0000));
    }

    #[test]
    fn build_by_number() {
        let c = build_code("0x2D", "0x500", "0", "0").unwrap();
        assert_eq!(c, ControlCode(0x002D_1400));
        let c = build_code("0x22", "0x800", "neither", "read_write").unwrap();
        assert_eq!(c, ControlCode(0x0022_E003));
    }

    #[test]
    fn build_rejects_wide_function() {
        assert!(matches!(
            build_code("DISK", "0x1000", "0", "0"),
            Err(CtlprobeError::Parse(_))
        ));
    }

    #[test]
    fn build_rejects_bad_method() {
        assert!(build_code("DISK", "1", "4", "0").is_err());
        assert!(build_code("DISK", "1", "DIRECT", "0").is_err());
    }
}
