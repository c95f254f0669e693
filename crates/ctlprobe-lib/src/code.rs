//! Control code codec: bit packing and field decoding for Windows IOCTLs.
//!
//! Layout of a 32-bit control code (fixed by `CTL_CODE` in the WDK headers):
//!
//! ```text
//!  31            16 15  14 13                2 1   0
//! +----------------+------+-------------------+-----+
//! |  device type   |access|     function      |meth.|
//! +----------------+------+-------------------+-----+
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tables;

// ── Field masks ──

pub const DEVICE_TYPE_MASK: u32 = 0xFFFF;
pub const ACCESS_MASK: u32 = 0x3;
pub const FUNCTION_MASK: u32 = 0xFFF;
pub const METHOD_MASK: u32 = 0x3;

const DEVICE_TYPE_SHIFT: u32 = 16;
const ACCESS_SHIFT: u32 = 14;
const FUNCTION_SHIFT: u32 = 2;

/// First device type value reserved for vendor drivers.
pub const CUSTOM_DEVICE_TYPE_BASE: u32 = 0x8000;

/// Largest function code that fits in the 12-bit field.
pub const MAX_FUNCTION: u16 = 0xFFF;

// ── Transfer method ──

/// Data transfer strategy (bits 1–0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Buffered,
    InDirect,
    OutDirect,
    Neither,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Buffered,
        Method::InDirect,
        Method::OutDirect,
        Method::Neither,
    ];

    /// Method from the low two bits of `bits` (higher bits are ignored).
    pub const fn from_bits(bits: u32) -> Self {
        match bits & METHOD_MASK {
            0 => Method::Buffered,
            1 => Method::InDirect,
            2 => Method::OutDirect,
            _ => Method::Neither,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        method_name(self.bits())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Required access ──

/// Access rights the caller's handle must hold (bits 15–14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Access {
    Any,
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub const ALL: [Access; 4] = [Access::Any, Access::Read, Access::Write, Access::ReadWrite];

    /// Access from the low two bits of `bits` (higher bits are ignored).
    pub const fn from_bits(bits: u32) -> Self {
        match bits & ACCESS_MASK {
            0 => Access::Any,
            1 => Access::Read,
            2 => Access::Write,
            _ => Access::ReadWrite,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        access_name(self.bits())
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Control code ──

/// A raw 32-bit device control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlCode(pub u32);

impl ControlCode {
    /// Typed constructor, usable in `const` context.
    pub const fn new(device_type: u16, function: u16, method: Method, access: Access) -> Self {
        ControlCode(
            ((device_type as u32) << DEVICE_TYPE_SHIFT)
                | (access.bits() << ACCESS_SHIFT)
                | (((function as u32) & FUNCTION_MASK) << FUNCTION_SHIFT)
                | method.bits(),
        )
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn device_type(self) -> u16 {
        ((self.0 >> DEVICE_TYPE_SHIFT) & DEVICE_TYPE_MASK) as u16
    }

    pub const fn function(self) -> u16 {
        ((self.0 >> FUNCTION_SHIFT) & FUNCTION_MASK) as u16
    }

    pub const fn method(self) -> Method {
        Method::from_bits(self.0)
    }

    pub const fn access(self) -> Access {
        Access::from_bits(self.0 >> ACCESS_SHIFT)
    }

    /// True if the device type lies in the vendor-defined range.
    pub const fn is_custom(self) -> bool {
        self.device_type() as u32 >= CUSTOM_DEVICE_TYPE_BASE
    }

    pub fn decode(self) -> DecodedCode {
        decode(self)
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for ControlCode {
    fn from(raw: u32) -> Self {
        ControlCode(raw)
    }
}

impl From<ControlCode> for u32 {
    fn from(code: ControlCode) -> Self {
        code.0
    }
}

/// Pack the four fields into a control code, like the `CTL_CODE` macro.
///
/// Out-of-range inputs are masked to their field width, not rejected:
/// `encode(7, 0x1000, 0, 0)` silently drops bit 12 of the function.
pub fn encode(device_type: u32, function: u32, method: u32, access: u32) -> ControlCode {
    ControlCode(
        ((device_type & DEVICE_TYPE_MASK) << DEVICE_TYPE_SHIFT)
            | ((access & ACCESS_MASK) << ACCESS_SHIFT)
            | ((function & FUNCTION_MASK) << FUNCTION_SHIFT)
            | (method & METHOD_MASK),
    )
}

// ── Decoded view ──

/// Field-by-field view of a control code with symbolic names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedCode {
    pub code: ControlCode,
    pub device_type: u16,
    pub device_type_name: &'static str,
    pub function: u16,
    pub method: Method,
    pub method_name: &'static str,
    pub access: Access,
    pub access_name: &'static str,
    /// Symbolic name when the code is one of the standard codes in [`tables::KNOWN_CODES`].
    pub known_name: Option<&'static str>,
}

/// Decode any 32-bit value. Never fails.
pub fn decode(code: ControlCode) -> DecodedCode {
    let device_type = code.device_type();
    let method = code.method();
    let access = code.access();
    DecodedCode {
        code,
        device_type,
        device_type_name: device_type_name(device_type as u32),
        function: code.function(),
        method,
        method_name: method.name(),
        access,
        access_name: access.name(),
        known_name: tables::lookup_known_code(code),
    }
}

// ── Name lookups (total) ──

/// Name of a device type; `"CUSTOM"` for unnamed vendor types, `"UNKNOWN"` otherwise.
pub fn device_type_name(device_type: u32) -> &'static str {
    if let Some(name) = tables::lookup_device_type(device_type) {
        return name;
    }
    if device_type >= CUSTOM_DEVICE_TYPE_BASE {
        "CUSTOM"
    } else {
        "UNKNOWN"
    }
}

pub fn method_name(method: u32) -> &'static str {
    match method {
        0 => "BUFFERED",
        1 => "IN_DIRECT",
        2 => "OUT_DIRECT",
        3 => "NEITHER",
        _ => "INVALID",
    }
}

pub fn access_name(access: u32) -> &'static str {
    match access {
        0 => "ANY",
        1 => "READ",
        2 => "WRITE",
        3 => "READ_WRITE",
        _ => "INVALID",
    }
}

// ── Text parsing ──

/// Parse an integer written as `0x`-prefixed hex or plain decimal.
/// Underscores are accepted as digit separators (`0x0007_0000`).
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Parse a device type given either as a number or as a table name (`"DISK"`).
pub fn parse_device_type(s: &str) -> Result<u16, String> {
    let trimmed = s.trim();
    if let Some(value) = tables::device_type_by_name(trimmed) {
        return Ok(value);
    }
    let value = parse_u32(trimmed)?;
    u16::try_from(value).map_err(|_| format!("device type 0x{value:X} exceeds 16 bits"))
}

/// Parse a method given as a number (0–3) or a name (`"BUFFERED"`, `"neither"`).
pub fn parse_method(s: &str) -> Result<Method, String> {
    let trimmed = s.trim();
    if let Some(m) = Method::ALL
        .iter()
        .find(|m| m.name().eq_ignore_ascii_case(trimmed))
    {
        return Ok(*m);
    }
    match parse_u32(trimmed)? {
        v @ 0..=3 => Ok(Method::from_bits(v)),
        v => Err(format!("method {v} out of range (0-3)")),
    }
}

/// Parse an access level given as a number (0–3) or a name (`"READ_WRITE"`).
pub fn parse_access(s: &str) -> Result<Access, String> {
    let trimmed = s.trim();
    if let Some(a) = Access::ALL
        .iter()
        .find(|a| a.name().eq_ignore_ascii_case(trimmed))
    {
        return Ok(*a);
    }
    match parse_u32(trimmed)? {
        v @ 0..=3 => Ok(Access::from_bits(v)),
        v => Err(format!("access {v} out of range (0-3)")),
    }
}
