//! Static name tables: standard device types and well-known control codes.
//!
//! Values come from `devioctl.h` / `winioctl.h`. Both tables are sorted by
//! key so lookups can binary-search; the tests enforce the ordering.

use crate::code::{Access, ControlCode, Method};

/// `FILE_DEVICE_*` values and their short names, sorted by value.
pub static DEVICE_TYPES: [(u16, &str); 59] = [
    (0x01, "BEEP"),
    (0x02, "CD_ROM"),
    (0x03, "CD_ROM_FILE_SYSTEM"),
    (0x04, "CONTROLLER"),
    (0x05, "DATALINK"),
    (0x06, "DFS"),
    (0x07, "DISK"),
    (0x08, "DISK_FILE_SYSTEM"),
    (0x09, "FILE_SYSTEM"),
    (0x0A, "INPORT_PORT"),
    (0x0B, "KEYBOARD"),
    (0x0C, "MAILSLOT"),
    (0x0D, "MIDI_IN"),
    (0x0E, "MIDI_OUT"),
    (0x0F, "MOUSE"),
    (0x10, "MULTI_UNC_PROVIDER"),
    (0x11, "NAMED_PIPE"),
    (0x12, "NETWORK"),
    (0x13, "NETWORK_BROWSER"),
    (0x14, "NETWORK_FILE_SYSTEM"),
    (0x15, "NULL"),
    (0x16, "PARALLEL_PORT"),
    (0x17, "PHYSICAL_NETCARD"),
    (0x18, "PRINTER"),
    (0x19, "SCANNER"),
    (0x1A, "SERIAL_MOUSE_PORT"),
    (0x1B, "SERIAL_PORT"),
    (0x1C, "SCREEN"),
    (0x1D, "SOUND"),
    (0x1E, "STREAMS"),
    (0x1F, "TAPE"),
    (0x20, "TAPE_FILE_SYSTEM"),
    (0x21, "TRANSPORT"),
    (0x22, "UNKNOWN"),
    (0x23, "VIDEO"),
    (0x24, "VIRTUAL_DISK"),
    (0x25, "WAVE_IN"),
    (0x26, "WAVE_OUT"),
    (0x27, "8042_PORT"),
    (0x28, "NETWORK_REDIRECTOR"),
    (0x29, "BATTERY"),
    (0x2A, "BUS_EXTENDER"),
    (0x2B, "MODEM"),
    (0x2C, "VDM"),
    (0x2D, "MASS_STORAGE"),
    (0x2E, "SMB"),
    (0x2F, "KS"),
    (0x30, "CHANGER"),
    (0x31, "SMARTCARD"),
    (0x32, "ACPI"),
    (0x33, "DVD"),
    (0x34, "FULLSCREEN_VIDEO"),
    (0x35, "DFS_FILE_SYSTEM"),
    (0x36, "DFS_VOLUME"),
    (0x37, "SERENUM"),
    (0x38, "TERMSRV"),
    (0x39, "KSEC"),
    (0x3A, "FIPS"),
    (0x3B, "INFINIBAND"),
];

// ── Well-known codes ──

pub const FILE_DEVICE_DISK: u16 = 0x07;
pub const FILE_DEVICE_FILE_SYSTEM: u16 = 0x09;
pub const FILE_DEVICE_MASS_STORAGE: u16 = 0x2D;
/// `IOCTL_VOLUME_BASE` is `'V'`, outside the named device type range.
pub const IOCTL_VOLUME_BASE: u16 = 0x56;

pub const IOCTL_DISK_GET_DRIVE_GEOMETRY: ControlCode =
    ControlCode::new(FILE_DEVICE_DISK, 0x000, Method::Buffered, Access::Any);
pub const IOCTL_DISK_GET_PARTITION_INFO: ControlCode =
    ControlCode::new(FILE_DEVICE_DISK, 0x001, Method::Buffered, Access::Read);
pub const IOCTL_DISK_GET_DRIVE_LAYOUT: ControlCode =
    ControlCode::new(FILE_DEVICE_DISK, 0x003, Method::Buffered, Access::Read);
pub const IOCTL_DISK_GET_LENGTH_INFO: ControlCode =
    ControlCode::new(FILE_DEVICE_DISK, 0x017, Method::Buffered, Access::Read);
pub const IOCTL_DISK_GET_DRIVE_GEOMETRY_EX: ControlCode =
    ControlCode::new(FILE_DEVICE_DISK, 0x028, Method::Buffered, Access::Any);
pub const FSCTL_GET_NTFS_VOLUME_DATA: ControlCode =
    ControlCode::new(FILE_DEVICE_FILE_SYSTEM, 25, Method::Buffered, Access::Any);
pub const IOCTL_STORAGE_GET_DEVICE_NUMBER: ControlCode =
    ControlCode::new(FILE_DEVICE_MASS_STORAGE, 0x420, Method::Buffered, Access::Any);
pub const IOCTL_STORAGE_QUERY_PROPERTY: ControlCode =
    ControlCode::new(FILE_DEVICE_MASS_STORAGE, 0x500, Method::Buffered, Access::Any);
pub const IOCTL_STORAGE_CHECK_VERIFY: ControlCode =
    ControlCode::new(FILE_DEVICE_MASS_STORAGE, 0x200, Method::Buffered, Access::Read);
pub const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: ControlCode =
    ControlCode::new(IOCTL_VOLUME_BASE, 0, Method::Buffered, Access::Any);

/// Standard codes with OS-assigned names, sorted by raw value.
pub static KNOWN_CODES: [(ControlCode, &str); 10] = [
    (IOCTL_DISK_GET_DRIVE_GEOMETRY, "IOCTL_DISK_GET_DRIVE_GEOMETRY"),
    (IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, "IOCTL_DISK_GET_DRIVE_GEOMETRY_EX"),
    (IOCTL_DISK_GET_PARTITION_INFO, "IOCTL_DISK_GET_PARTITION_INFO"),
    (IOCTL_DISK_GET_DRIVE_LAYOUT, "IOCTL_DISK_GET_DRIVE_LAYOUT"),
    (IOCTL_DISK_GET_LENGTH_INFO, "IOCTL_DISK_GET_LENGTH_INFO"),
    (FSCTL_GET_NTFS_VOLUME_DATA, "FSCTL_GET_NTFS_VOLUME_DATA"),
    (IOCTL_STORAGE_GET_DEVICE_NUMBER, "IOCTL_STORAGE_GET_DEVICE_NUMBER"),
    (IOCTL_STORAGE_QUERY_PROPERTY, "IOCTL_STORAGE_QUERY_PROPERTY"),
    (IOCTL_STORAGE_CHECK_VERIFY, "IOCTL_STORAGE_CHECK_VERIFY"),
    (IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, "IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS"),
];

pub fn lookup_device_type(device_type: u32) -> Option<&'static str> {
    let key = u16::try_from(device_type).ok()?;
    DEVICE_TYPES
        .binary_search_by_key(&key, |&(value, _)| value)
        .ok()
        .map(|i| DEVICE_TYPES[i].1)
}

/// Reverse lookup, case-insensitive. Accepts an optional `FILE_DEVICE_` prefix.
pub fn device_type_by_name(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    let short = upper.strip_prefix("FILE_DEVICE_").unwrap_or(&upper);
    DEVICE_TYPES
        .iter()
        .find(|&&(_, n)| n == short)
        .map(|&(value, _)| value)
}

pub fn lookup_known_code(code: ControlCode) -> Option<&'static str> {
    KNOWN_CODES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| KNOWN_CODES[i].1)
}
