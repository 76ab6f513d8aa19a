use std::fmt;

use thiserror::Error;

/// Coarse classification of fatal emulation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Method/class/field could not be resolved.
    Resolution,
    /// Unknown opcode, malformed payload, pc out of range.
    Decode,
    /// Division by zero, array bounds, null receiver, `throw`, ...
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Resolution => write!(f, "resolution"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Runtime => write!(f, "runtime"),
        }
    }
}

/// A fatal error, annotated with where execution stood when it happened.
/// This is what an emulation returns to the host instead of a value.
#[derive(Error, Debug)]
#[error("{kind} error in {method} at pc {pc:#06x} (`{disassembly}`): {message}")]
pub struct EmuError {
    pub kind: ErrorKind,
    pub pc: usize,
    pub method: String,
    pub disassembly: String,
    pub message: String,
}

impl EmuError {
    pub fn new(
        kind: ErrorKind,
        pc: usize,
        method: impl Into<String>,
        disassembly: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            pc,
            method: method.into(),
            disassembly: disassembly.into(),
            message: message.into(),
        }
    }
}
