//! ctlprobe: encode, decode, and discover Windows device I/O control codes.

pub mod classify;
pub mod code;
pub mod config;
pub mod device;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod format;
pub mod tables;

pub use classify::{ErrorSignal, ProbeOutcome, Verdict, classify};
pub use code::{Access, ControlCode, DecodedCode, Method, decode, encode};
pub use discovery::{DiscoveryResult, Scanner, SearchRange, StopReason};
pub use error::CtlprobeError;
pub use format::{format_compact, format_hex, format_verbose};
