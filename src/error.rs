//! Error types for every failure mode the simulator, assembler, and loader
//! can produce.

use thiserror::Error;

/// Errors raised anywhere in the crate.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed assembly or binary-row input.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A memory or program-counter access fell outside `[0, 65536)`.
    #[error("address out of range: {0}")]
    AddressOutOfRange(u32),

    /// A register index fell outside `[0, 32)`.
    #[error("register out of range: {0}")]
    RegisterOutOfRange(u8),

    /// Division or modulus by zero.
    #[error("arithmetic fault: {0}")]
    ArithmeticFault(&'static str),

    /// The run loop exceeded its configured safety ceiling without halting.
    #[error("cycle limit of {0} exceeded without a HALT")]
    CycleLimitExceeded(u32),

    /// I/O failure reading or writing a source, object, or log file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
