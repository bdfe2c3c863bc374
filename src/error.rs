//! Assembler error implementation

use crate::operand::OperandType;
use crate::operation::{BinaryOperation, Operation, TernaryOperation, UnaryOperation};

use thiserror::Error;

/// Assembler error variants.
///
/// The taxonomy is deliberately thin: every error is fatal for the
/// compilation that produced it, there is no retry or recovery.
#[derive(Debug, Error)]
pub enum AssemblerError {
    /// Dispatch landed on an unpopulated nullary cell. The planner is
    /// responsible for never requesting such a combination.
    #[error("no encoding for {0:?}")]
    UnsupportedOperation(Operation),
    /// Dispatch landed on an unpopulated unary cell.
    #[error("no encoding for {0:?} with a {1:?} operand")]
    UnsupportedUnaryOperation(UnaryOperation, OperandType),
    /// Dispatch landed on an unpopulated binary cell.
    #[error("no encoding for {0:?} with {1:?}, {2:?} operands")]
    UnsupportedBinaryOperation(BinaryOperation, OperandType, OperandType),
    /// Dispatch landed on an unpopulated ternary cell.
    #[error("no encoding for {0:?} with {1:?}, {2:?} operands")]
    UnsupportedTernaryOperation(TernaryOperation, OperandType, OperandType),
    /// A pc-relative branch target does not fit in a 32-bit displacement.
    /// This reflects an ISA limit; the caller must emit a long-form variant.
    #[error("pc-relative displacement {0} does not fit in 32 bits")]
    DisplacementOverflow(i64),
    /// An immediate does not fit the only encodable form of its instruction.
    #[error("immediate {0} does not fit the encodable range")]
    ImmediateOverflow(i64),
    /// A promise value was requested before the promise resolved.
    #[error("promise value requested before resolution")]
    UnresolvedPromise,
    /// A code block was written out before its start address was assigned.
    #[error("code block written before resolution")]
    UnresolvedBlock,
    /// An encoder needed a scratch register but no client is attached.
    #[error("no register client attached")]
    ClientRequired,
    /// Tail calls were requested from an architecture built without them.
    #[error("tail calls are disabled for this architecture")]
    TailCallsDisabled,
}

impl AssemblerError {
    /// Flag whether the error reports a dispatch-table miss.
    pub const fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation(_)
                | Self::UnsupportedUnaryOperation(..)
                | Self::UnsupportedBinaryOperation(..)
                | Self::UnsupportedTernaryOperation(..)
        )
    }
}
