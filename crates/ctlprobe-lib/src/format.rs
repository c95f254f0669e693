//! Text renderings of a control code.

use std::fmt::Write;

use crate::code::{ControlCode, decode};

/// One line: `[KNOWN: ]DEVICE(function:0xHEX, method:NAME, access:NAME)`.
pub fn format_compact(code: ControlCode) -> String {
    let d = decode(code);
    let mut out = String::new();
    if let Some(known) = d.known_name {
        out.push_str(known);
        out.push_str(": ");
    }
    let _ = write!(
        out,
        "{}(function:0x{:X}, method:{}, access:{})",
        d.device_type_name, d.function, d.method_name, d.access_name
    );
    out
}

/// Labeled multi-line block followed by the bit layout.
pub fn format_verbose(code: ControlCode) -> String {
    let d = decode(code);
    let mut out = String::new();
    let _ = writeln!(out, "IOCTL Code: {code}");
    if let Some(known) = d.known_name {
        let _ = writeln!(out, "Known Name: {known}");
    }
    let _ = writeln!(
        out,
        "Device Type: {} (0x{:04X})",
        d.device_type_name, d.device_type
    );
    let _ = writeln!(out, "Function: 0x{:03X} ({})", d.function, d.function);
    let _ = writeln!(out, "Method: {} ({})", d.method_name, d.method.bits());
    let _ = writeln!(out, "Access: {} ({})", d.access_name, d.access.bits());
    out.push('\n');
    out.push_str("Bit Layout:\n");
    let _ = writeln!(
        out,
        "  [31:16] Device Type: 0x{:04X} ({})",
        d.device_type, d.device_type_name
    );
    let _ = writeln!(
        out,
        "  [15:14] Access:      0x{:X} ({})",
        d.access.bits(),
        d.access_name
    );
    let _ = writeln!(out, "  [13:2]  Function:    0x{:03X}", d.function);
    let _ = writeln!(
        out,
        "  [1:0]   Method:      0x{:X} ({})",
        d.method.bits(),
        d.method_name
    );
    out
}

/// Raw value followed by each field in hex.
pub fn format_hex(code: ControlCode) -> String {
    format!(
        "{code} [Device:0x{:04X} Access:0x{:X} Func:0x{:03X} Method:0x{:X}]",
        code.device_type(),
        code.access().bits(),
        code.function(),
        code.method().bits()
    )
}
