use displaydoc::Display;
use std::io;
use thiserror::Error;

/// line {line}: {kind}
///
/// Error in one of the input files, always tied to the offending line.
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
#[ignore_extra_doc_attributes]
pub struct FormatError {
    /// 1-based line number
    pub line: usize,
    pub kind: FormatErrorKind,
}

impl FormatError {
    #[must_use]
    pub const fn new(line: usize, kind: FormatErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// missing header `{0}`
    MissingHeader(&'static str),
    /// invalid header: {0}
    InvalidHeader(String),
    /// data width {width} is not supported, expected {minimum}..={maximum} bits
    UnsupportedWidth { width: u32, minimum: u32, maximum: u32 },
    /// malformed record: {0}
    MalformedRecord(String),
    /// `{text}` is not a valid {radix} number
    InvalidNumber { text: String, radix: &'static str },
    /// value {value:#x} does not fit into {width} bits
    ValueTooWide { value: i64, width: u32 },
    /// address {address:#06x} is outside of the declared depth {depth}
    AddressOutOfRange { address: u64, depth: usize },
    /// address {address:#06x} already holds {previous:#x}, refusing {value:#x}
    ConflictingValue { address: usize, previous: u32, value: u32 },
    /// code {code} was already mapped on line {first_line}
    DuplicateCode { code: u32, first_line: usize },
    /// `CONTENT BEGIN` section is missing
    MissingContent,
    /// `CONTENT` section is not terminated by `END;`
    UnterminatedContent,
    /// unexpected text after `END;`
    TrailingContent,
}

/// Failure to turn a file into a loaded session.
#[derive(Display, Error, Debug)]
pub enum LoadError {
    /// could not read `{path}`: {source}
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// `{path}`, {source}
    Format {
        path: String,
        #[source]
        source: FormatError,
    },
}

/// Signal returned by the executor instead of an effect.
#[derive(Display, Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// program halted
    Halted,
    /// invalid opcode {opcode:#04x} at address {address:#06x}
    InvalidOpcode { opcode: u8, address: usize },
    /// address {address:#06x} is out of range, valid range: 0..{limit:#06x}
    AddressOutOfRange { address: u64, limit: usize },
}

/// Errors reported by the simulation controller.
#[derive(Display, Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationError {
    /// simulation faulted: {0}
    Fault(#[source] Fault),
    /// session is faulted, reset is required before stepping again
    SessionFaulted,
    /// simulation owner thread is gone
    Disconnected,
}
