//! Operand model for the dispatch tables and encoders

use crate::promise::{Promise, PromiseRef, ResolvedPromise};

use std::fmt;
use std::rc::Rc;

/// Physical general-purpose register index, 0..=15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegId(u8);

impl RegId {
    /// Wrap a raw register index.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Raw register index.
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Low three bits, as encoded in ModR/M and SIB fields.
    pub const fn code(self) -> u8 {
        self.0 & 7
    }

    /// Whether the index needs a REX extension bit (r8..r15).
    pub const fn is_extended(self) -> bool {
        self.0 & 8 != 0
    }
}

/// A register operand: a low register plus the optional high half used for
/// 64-bit values on a 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterPair {
    /// Low (or only) register.
    pub low: RegId,
    /// High half of a 64-bit pair, when present.
    pub high: Option<RegId>,
}

impl RegisterPair {
    /// A single register with no high half.
    pub const fn new(low: RegId) -> Self {
        Self { low, high: None }
    }

    /// A full 64-bit pair.
    pub const fn pair(low: RegId, high: RegId) -> Self {
        Self {
            low,
            high: Some(high),
        }
    }

    /// The high half of a 64-bit pair.
    ///
    /// # Panics
    ///
    /// Panics when the pair was built without one; the planner guarantees
    /// 64-bit operands on a 32-bit word carry both halves.
    pub fn high(&self) -> RegId {
        self.high.expect("64-bit register pair is missing its high half")
    }

    pub(crate) fn high_pair(&self) -> RegisterPair {
        RegisterPair::new(self.high())
    }
}

impl From<RegId> for RegisterPair {
    fn from(low: RegId) -> Self {
        Self::new(low)
    }
}

/// A memory operand: `[base + disp + index * scale]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand {
    /// Base register.
    pub base: RegId,
    /// Signed byte displacement.
    pub disp: i32,
    /// Optional index register.
    pub index: Option<RegId>,
    /// Index scale factor: 1, 2, 4 or 8.
    pub scale: u8,
}

impl MemoryOperand {
    /// Base-plus-displacement addressing.
    pub const fn new(base: RegId, disp: i32) -> Self {
        Self {
            base,
            disp,
            index: None,
            scale: 1,
        }
    }

    /// Full base-displacement-index-scale addressing.
    pub const fn indexed(base: RegId, disp: i32, index: RegId, scale: u8) -> Self {
        Self {
            base,
            disp,
            index: Some(index),
            scale,
        }
    }

    /// The same location shifted by `bytes`; used for the high half of a
    /// 64-bit access on a 32-bit word.
    pub(crate) fn offset_by(&self, bytes: i32) -> Self {
        Self {
            disp: self.disp + bytes,
            ..*self
        }
    }
}

/// A constant operand carrying a possibly-unresolved integer value.
#[derive(Clone)]
pub struct Constant {
    /// Promise for the integer value.
    pub value: PromiseRef,
}

impl Constant {
    /// Constant backed by any promise.
    pub fn new(value: PromiseRef) -> Self {
        Self { value }
    }

    /// Constant with a known value.
    pub fn resolved(value: i64) -> Self {
        Self {
            value: Rc::new(ResolvedPromise::new(value)),
        }
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.value() {
            Ok(v) => write!(f, "Constant({v:#x})"),
            Err(_) => write!(f, "Constant(unresolved)"),
        }
    }
}

/// An absolute-address operand carrying a possibly-unresolved address.
#[derive(Clone)]
pub struct AddressOperand {
    /// Promise for the address.
    pub address: PromiseRef,
}

impl AddressOperand {
    /// Address backed by any promise.
    pub fn new(address: PromiseRef) -> Self {
        Self { address }
    }
}

impl fmt::Debug for AddressOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address.value() {
            Ok(v) => write!(f, "Address({v:#x})"),
            Err(_) => write!(f, "Address(unresolved)"),
        }
    }
}

/// Operand kinds accepted by the dispatch tables.
///
/// The discriminants index the packed dispatch keys and the planner's type
/// masks, so their order is part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperandType {
    /// Integer constant, possibly unresolved.
    Constant = 0,
    /// Absolute code or data address.
    Address = 1,
    /// Physical register (pair).
    Register = 2,
    /// Base-displacement-index-scale memory reference.
    Memory = 3,
}

impl OperandType {
    /// Bit used in the planner's operand-type masks.
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// A typed operand.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Integer constant.
    Constant(Constant),
    /// Absolute address.
    Address(AddressOperand),
    /// Register (pair).
    Register(RegisterPair),
    /// Memory reference.
    Memory(MemoryOperand),
}

impl Operand {
    /// A single-register operand.
    pub fn register(reg: RegId) -> Self {
        Self::Register(RegisterPair::new(reg))
    }

    /// A register-pair operand.
    pub fn register_pair(low: RegId, high: RegId) -> Self {
        Self::Register(RegisterPair::pair(low, high))
    }

    /// A memory operand at `[base + disp]`.
    pub fn memory(base: RegId, disp: i32) -> Self {
        Self::Memory(MemoryOperand::new(base, disp))
    }

    /// A constant operand with a known value.
    pub fn constant(value: i64) -> Self {
        Self::Constant(Constant::resolved(value))
    }

    /// A constant operand backed by a promise.
    pub fn promised_constant(value: PromiseRef) -> Self {
        Self::Constant(Constant::new(value))
    }

    /// An address operand backed by a promise.
    pub fn address(address: PromiseRef) -> Self {
        Self::Address(AddressOperand::new(address))
    }

    /// The operand's dispatch type.
    pub const fn ty(&self) -> OperandType {
        match self {
            Self::Constant(_) => OperandType::Constant,
            Self::Address(_) => OperandType::Address,
            Self::Register(_) => OperandType::Register,
            Self::Memory(_) => OperandType::Memory,
        }
    }
}
