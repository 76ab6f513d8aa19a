//! Errors returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing a DEX container or decoding bytecode.
#[derive(Error, Debug)]
pub enum DexError {
    #[error("got unknown dex version: {0:#06x}")]
    UnknownVersion(u16),

    #[error("invalid header")]
    InvalidHeader,

    #[error("got error while parsing string_ids")]
    StringError,

    #[error("got error while parsing type_ids")]
    TypeError,

    #[error("got error while parsing proto_ids")]
    ProtoError,

    #[error("got error while parsing field_ids")]
    FieldError,

    #[error("got error while parsing method_ids")]
    MethodError,

    #[error("got error while parsing class_defs")]
    ClassError,

    #[error("got error while parsing class_data at {0:#x}")]
    ClassDataError(u32),

    #[error("got error while parsing code_item at {0:#x}")]
    CodeError(u32),

    #[error("unknown opcode {0:#04x} at pc {1:#06x}")]
    UnknownOpcode(u8, usize),

    #[error("pc {0:#06x} out of range (method is {1} code units)")]
    PcOutOfRange(usize, usize),

    #[error("truncated instruction at pc {0:#06x}: needed {1} code units")]
    Truncated(usize, usize),

    #[error("malformed payload at pc {0:#06x}")]
    MalformedPayload(usize),

    #[error("string index {0} out of range")]
    BadStringIndex(u32),

    #[error("type index {0} out of range")]
    BadTypeIndex(u32),

    #[error("field index {0} out of range")]
    BadFieldIndex(u32),

    #[error("method index {0} out of range")]
    BadMethodIndex(u32),
}
