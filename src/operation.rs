//! Operation enums dispatched through the encoder tables
//!
//! The discriminants feed the packed dispatch keys, so variant order is part
//! of the contract between the tables and the planner.

/// Nullary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Operation {
    /// Return from the current frame.
    Return = 0,
    /// Load barrier; a no-op on x86's memory model.
    LoadBarrier = 1,
    /// Store-store barrier; a no-op on x86's memory model.
    StoreStoreBarrier = 2,
    /// Store-load barrier; a no-op on x86's memory model.
    StoreLoadBarrier = 3,
}

/// Unary operations: control transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum UnaryOperation {
    /// Near call.
    Call = 0,
    /// Near call whose displacement field is 4-byte aligned for atomic
    /// call-site patching.
    AlignedCall = 1,
    /// Call reaching any address: indirect through a scratch register on a
    /// 64-bit word, plain near call otherwise.
    LongCall = 2,
    /// Near jump.
    Jump = 3,
    /// Near jump with an aligned displacement field.
    AlignedJump = 4,
    /// Conditional jump on equality.
    JumpIfEqual = 5,
    /// Conditional jump on inequality.
    JumpIfNotEqual = 6,
    /// Conditional jump on signed greater.
    JumpIfGreater = 7,
    /// Conditional jump on signed greater-or-equal.
    JumpIfGreaterOrEqual = 8,
    /// Conditional jump on signed less.
    JumpIfLess = 9,
    /// Conditional jump on signed less-or-equal.
    JumpIfLessOrEqual = 10,
    /// Jump reaching any address, like [`Self::LongCall`].
    LongJump = 11,
}

/// Binary operations: data movement and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BinaryOperation {
    /// Sign-extending move.
    Move = 0,
    /// Zero-extending move.
    MoveZ = 1,
    /// Flag-setting comparison.
    Compare = 2,
    /// Two's-complement negation.
    Negate = 3,
}

/// Ternary operations, emitted through the binary table with the third
/// operand equal in size and type to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TernaryOperation {
    /// Addition.
    Add = 0,
    /// Subtraction.
    Subtract = 1,
    /// Bitwise and.
    And = 2,
    /// Bitwise or.
    Or = 3,
    /// Bitwise exclusive or.
    Xor = 4,
    /// Signed multiplication.
    Multiply = 5,
    /// Signed division.
    Divide = 6,
    /// Signed remainder.
    Remainder = 7,
    /// Three-way comparison of 64-bit values, producing -1/0/+1.
    LongCompare = 8,
    /// Arithmetic shift left.
    ShiftLeft = 9,
    /// Arithmetic shift right.
    ShiftRight = 10,
    /// Logical shift right.
    UnsignedShiftRight = 11,
}
