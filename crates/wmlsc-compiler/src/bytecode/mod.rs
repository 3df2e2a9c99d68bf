//! The binary module format.
//!
//! # Module Structure
//!
//! - `varint`: multi-byte integers and the big-endian reader/writer
//! - `ieee754`: single-precision float encoding
//! - `module`: the in-memory module (constant, pragma and function pools)
//! - `encode`: serialization to and from bytes

pub mod encode;
pub mod ieee754;
pub mod module;
pub mod varint;

use thiserror::Error;

pub use encode::{decode, encode};
pub use ieee754::{EncodedFloat, Float32, FloatClass, decode_single, encode_single};
pub use module::{BytecodeModule, Constant, Function, Pragma, StringEncoding};
pub use varint::{ByteReader, ByteWriter, varint_len, write_varint};

/// Errors produced while reading a binary module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended in the middle of a field.
    #[error("unexpected end of input at offset {offset}")]
    Truncated {
        /// Offset of the read that failed
        offset: usize,
    },

    /// A multi-byte integer did not terminate or does not fit 32 bits.
    #[error("malformed multi-byte integer at offset {offset}")]
    VarintTooLong {
        /// Offset of the first byte
        offset: usize,
    },

    /// A value does not fit the field it was read for.
    #[error("value {value} out of range at offset {offset}")]
    ValueOutOfRange {
        /// Offset of the field
        offset: usize,
        /// The decoded value
        value: u32,
    },

    /// The version byte is not WMLScript 1.1.
    #[error("unsupported bytecode version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// The declared module length does not match the input.
    #[error("declared length {declared} does not match {actual} remaining bytes")]
    LengthMismatch {
        /// Length stored in the header
        declared: u32,
        /// Bytes actually present
        actual: usize,
    },

    /// The constant pool names a character set we do not know.
    #[error("unknown character set (MIBenum {0})")]
    UnknownCharacterSet(u32),

    /// Externally encoded strings cannot be turned back into text.
    #[error("constant {0} uses an external character encoding, which is not supported")]
    UnsupportedCharacterSet(u16),

    /// Unknown constant type byte.
    #[error("unknown constant type {kind} at offset {offset}")]
    UnknownConstantType {
        /// The type byte
        kind: u8,
        /// Its offset
        offset: usize,
    },

    /// Unknown pragma type byte.
    #[error("unknown pragma type {kind} at offset {offset}")]
    UnknownPragmaType {
        /// The type byte
        kind: u8,
        /// Its offset
        offset: usize,
    },

    /// A string constant is not valid UTF-8.
    #[error("constant {0} is not valid UTF-8")]
    InvalidUtf8(u16),

    /// A pragma references a constant past the end of the pool.
    #[error("pragma {pragma} references missing constant {constant}")]
    ConstantIndexOutOfRange {
        /// Pragma index
        pragma: u16,
        /// Referenced constant
        constant: u32,
    },

    /// A pragma references a constant that is not a string.
    #[error("pragma {pragma} references constant {constant}, which is not a string")]
    NotAString {
        /// Pragma index
        pragma: u16,
        /// Referenced constant
        constant: u16,
    },

    /// A function name entry names a function that does not exist.
    #[error("function name refers to function {index}, but only {count} exist")]
    FunctionIndexOutOfRange {
        /// Named function index
        index: u8,
        /// Number of functions
        count: u8,
    },

    /// A function name is empty or contains illegal characters.
    #[error("invalid function name {0:?}")]
    InvalidFunctionName(String),

    /// Two name entries for the same function, or two functions sharing a name.
    #[error("duplicate function name entry for function {0}")]
    DuplicateFunctionName(u8),

    /// A byte in function code is not an opcode.
    #[error("invalid opcode 0x{opcode:02x} at code offset {offset}")]
    InvalidOpcode {
        /// The byte
        opcode: u8,
        /// Offset within the function code
        offset: usize,
    },

    /// Bytes left over after the function pool.
    #[error("{0} trailing bytes after the function pool")]
    TrailingBytes(usize),
}
