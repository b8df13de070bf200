//! Runtime error kinds for the Z-Machine core
//!
//! Every failure the core can produce is one of these variants. Fatal kinds
//! halt the machine; recoverable kinds are translated into opcode results
//! (save/restore report failure, a cancelled read completes empty).

use thiserror::Error;

pub type ZResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("unsupported story version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed instruction at 0x{pc:05x}: {reason}")]
    Decode { pc: u32, reason: String },

    #[error("memory access out of range at 0x{0:05x}")]
    BadAddress(u32),

    #[error("write to read-only memory at 0x{0:05x}")]
    ReadOnly(u32),

    #[error("invalid object number {0}")]
    BadObject(u16),

    #[error("variable {0:#04x} does not exist in the current frame")]
    BadVariable(u8),

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("call stack overflow")]
    StackOverflow,

    #[error("division by zero")]
    DivideByZero,

    #[error("save failed: {0}")]
    SaveFailure(String),

    #[error("restore failed: {0}")]
    RestoreFailure(String),

    #[error("input cancelled by host")]
    InputCancelled,
}

impl RuntimeError {
    /// Fatal errors halt the machine; the rest map to opcode results.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RuntimeError::SaveFailure(_)
                | RuntimeError::RestoreFailure(_)
                | RuntimeError::InputCancelled
        )
    }

    pub fn decode(pc: u32, reason: impl Into<String>) -> Self {
        RuntimeError::Decode {
            pc,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(RuntimeError::BadAddress(0x1234).is_fatal());
        assert!(RuntimeError::DivideByZero.is_fatal());
        assert!(!RuntimeError::SaveFailure("disk full".into()).is_fatal());
        assert!(!RuntimeError::InputCancelled.is_fatal());
    }
}
