//! Decoder for the pickled records shipped in the dataset archive.

mod machine;
pub mod numpy;
mod value;

use std::{fmt, fs, path::Path};

pub use machine::loads;
pub use numpy::NdArray;
pub use value::Value;

use crate::error::{PrepErr, Result};

/// Reads and decodes a pickle file.
///
/// # Errors
/// Returns `PrepErr::Io` if the file cannot be read and
/// `PrepErr::Deserialize` if its contents do not decode.
pub fn load_file(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    loads(&bytes).map_err(|e| PrepErr::pickle(path, e))
}

/// Pickle decoding failures.
#[derive(Debug, Clone, PartialEq)]
pub enum PickleErr {
    UnsupportedProtocol(u8),
    UnexpectedEof {
        at: usize,
    },
    UnknownOpcode {
        opcode: u8,
        at: usize,
    },
    StackUnderflow {
        opcode: u8,
    },
    MissingMark {
        opcode: u8,
    },
    MissingMemo(u64),
    TypeMismatch {
        opcode: u8,
        expected: &'static str,
        got: &'static str,
    },
    NegativeLength {
        at: usize,
    },
    IntegerOverflow {
        at: usize,
    },
    InvalidUtf8 {
        at: usize,
    },
    OddSetItems {
        at: usize,
    },
    Malformed {
        at: usize,
        what: &'static str,
    },
    /// The decoded value is not the numpy array it was expected to be.
    NotAnArray(String),
}

impl fmt::Display for PickleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedProtocol(p) => write!(f, "unsupported pickle protocol {p}"),
            Self::UnexpectedEof { at } => write!(f, "unexpected end of stream at byte {at}"),
            Self::UnknownOpcode { opcode, at } => {
                write!(f, "unknown opcode 0x{opcode:02x} at byte {at}")
            }
            Self::StackUnderflow { opcode } => {
                write!(f, "stack underflow on opcode 0x{opcode:02x}")
            }
            Self::MissingMark { opcode } => write!(f, "opcode 0x{opcode:02x} without a mark"),
            Self::MissingMemo(idx) => write!(f, "memo entry {idx} was never stored"),
            Self::TypeMismatch {
                opcode,
                expected,
                got,
            } => write!(
                f,
                "opcode 0x{opcode:02x} expected a {expected} on the stack, got {got}"
            ),
            Self::NegativeLength { at } => write!(f, "negative length at byte {at}"),
            Self::IntegerOverflow { at } => write!(f, "integer at byte {at} does not fit 64 bits"),
            Self::InvalidUtf8 { at } => write!(f, "invalid utf-8 string at byte {at}"),
            Self::OddSetItems { at } => write!(f, "odd number of dict items at byte {at}"),
            Self::Malformed { at, what } => write!(f, "malformed {what} at byte {at}"),
            Self::NotAnArray(msg) => write!(f, "not a numpy array: {msg}"),
        }
    }
}

impl std::error::Error for PickleErr {}
