//! Architecture façade: ABI constants, call-site patching, stack walking
//! and the planner entry points

use crate::consts::{
    is_int32, pad, FRAME_HEADER_SIZE, R8, R9, RAX, RBP, RBX, RCX, RDI, RDX, RSI, RSP,
    STACK_ALIGNMENT_IN_BYTES,
};
use crate::dispatch::DispatchTables;
use crate::operand::{OperandType, RegId};
use crate::operation::{BinaryOperation, Operation, TernaryOperation, UnaryOperation};
use crate::planner::{self, BinaryPlan, TernaryPlan, UnaryPlan};

use tracing::debug;

/// ISA pointer/register width, chosen at construction time rather than by
/// conditional compilation so one binary can host both targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WordSize {
    /// i386: 4-byte words, eight registers, 64-bit values in pairs.
    W32,
    /// x86-64: 8-byte words, sixteen registers.
    W64,
}

impl WordSize {
    /// Word width in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Whether this is the 64-bit target.
    pub const fn is_64(self) -> bool {
        matches!(self, Self::W64)
    }
}

/// Calling convention governing the argument-register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Abi {
    /// System V: rdi, rsi, rdx, rcx, r8, r9 on a 64-bit word.
    SystemV,
    /// Windows: rcx, rdx, r8, r9 on a 64-bit word.
    Windows,
}

/// Target description plus the populated dispatch tables.
pub struct Architecture {
    word: WordSize,
    abi: Abi,
    tail_calls: bool,
    tables: DispatchTables,
}

impl Architecture {
    /// Describe a target and populate its dispatch tables.
    pub fn new(word: WordSize, abi: Abi) -> Self {
        Self {
            word,
            abi,
            tail_calls: false,
            tables: DispatchTables::new(),
        }
    }

    /// Enable tail-call frame surgery in the assembler's frame helpers.
    pub fn with_tail_calls(mut self) -> Self {
        self.tail_calls = true;
        self
    }

    /// The target word size.
    pub const fn word(&self) -> WordSize {
        self.word
    }

    /// The target calling convention.
    pub const fn abi(&self) -> Abi {
        self.abi
    }

    /// Whether tail-call frame surgery is available.
    pub const fn tail_calls(&self) -> bool {
        self.tail_calls
    }

    pub(crate) fn tables(&self) -> &DispatchTables {
        &self.tables
    }

    /// Number of addressable general-purpose registers.
    pub const fn register_count(&self) -> usize {
        match self.word {
            WordSize::W32 => 8,
            WordSize::W64 => 16,
        }
    }

    /// Stack pointer register.
    pub const fn stack(&self) -> RegId {
        RSP
    }

    /// Thread register.
    pub const fn thread(&self) -> RegId {
        RBX
    }

    /// Return-value register (low half).
    pub const fn return_low(&self) -> RegId {
        RAX
    }

    /// High half of the return value on a 32-bit word.
    pub const fn return_high(&self) -> Option<RegId> {
        match self.word {
            WordSize::W32 => Some(RDX),
            WordSize::W64 => None,
        }
    }

    /// Register carrying the resolved target of a virtual call.
    pub const fn virtual_call_target(&self) -> RegId {
        RAX
    }

    /// Register carrying the method index of a virtual call.
    pub const fn virtual_call_index(&self) -> RegId {
        RDX
    }

    /// Memory operands may combine base, index and displacement freely.
    pub const fn condensed_addressing(&self) -> bool {
        true
    }

    /// x86 is little-endian.
    pub const fn big_endian(&self) -> bool {
        false
    }

    /// Whether `reg` is off-limits to the allocator.
    pub const fn reserved(&self, reg: RegId) -> bool {
        let index = reg.index();
        index == RBP.index() || index == RSP.index() || index == RBX.index()
    }

    /// Stack alignment at call boundaries, in words.
    pub const fn stack_alignment_in_words(&self) -> usize {
        STACK_ALIGNMENT_IN_BYTES / self.word.bytes()
    }

    /// Stack words a frame with `footprint` argument words must reserve.
    pub fn frame_footprint(&self, footprint: usize) -> usize {
        let alignment = self.stack_alignment_in_words();
        match self.abi {
            Abi::Windows => footprint.max(alignment),
            Abi::SystemV => footprint
                .saturating_sub(self.argument_register_count())
                .max(alignment),
        }
    }

    /// Stack words consumed by `footprint` argument words at a call site.
    pub fn argument_footprint(&self, footprint: usize) -> usize {
        let alignment = self.stack_alignment_in_words();
        pad(footprint, alignment).max(alignment)
    }

    /// Number of arguments passed in registers.
    pub const fn argument_register_count(&self) -> usize {
        match (self.word, self.abi) {
            (WordSize::W64, Abi::SystemV) => 6,
            (WordSize::W64, Abi::Windows) => 4,
            (WordSize::W32, _) => 0,
        }
    }

    /// The `index`th argument register, when the ABI has one.
    pub const fn argument_register(&self, index: usize) -> Option<RegId> {
        if !self.word.is_64() {
            return None;
        }

        match self.abi {
            Abi::Windows => match index {
                0 => Some(RCX),
                1 => Some(RDX),
                2 => Some(R8),
                3 => Some(R9),
                _ => None,
            },
            Abi::SystemV => match index {
                0 => Some(RDI),
                1 => Some(RSI),
                2 => Some(RDX),
                3 => Some(RCX),
                4 => Some(R8),
                5 => Some(R9),
                _ => None,
            },
        }
    }

    /// Frame words that, together with the two-word frame header, round the
    /// frame to the stack alignment.
    pub fn align_frame_size(&self, size_in_words: usize) -> usize {
        pad(
            size_in_words + FRAME_HEADER_SIZE,
            self.stack_alignment_in_words(),
        ) - FRAME_HEADER_SIZE
    }

    /// Saved frame pointer plus return address, in words.
    pub const fn frame_header_size(&self) -> usize {
        FRAME_HEADER_SIZE
    }

    /// Words the return address occupies.
    pub const fn frame_return_address_size(&self) -> usize {
        1
    }

    /// Words below the frame's argument area.
    pub const fn frame_footer_size(&self) -> usize {
        0
    }

    /// Return-address slot relative to a frame's stack pointer, in words.
    pub const fn return_address_offset(&self) -> isize {
        0
    }

    /// Frame-pointer slot relative to a frame's stack pointer, in words.
    pub const fn frame_pointer_offset(&self) -> isize {
        -1
    }

    unsafe fn read_word(&self, p: *const u8) -> u64 {
        match self.word {
            WordSize::W32 => (p as *const u32).read_unaligned() as u64,
            WordSize::W64 => (p as *const u64).read_unaligned(),
        }
    }

    /// Instruction pointer saved at the top of `stack`, or null.
    ///
    /// # Safety
    ///
    /// `stack` must be null or point at a readable word.
    pub unsafe fn frame_ip(&self, stack: *const u8) -> *const u8 {
        if stack.is_null() {
            std::ptr::null()
        } else {
            self.read_word(stack) as usize as *const u8
        }
    }

    /// Walk one frame up: `stack` becomes the slot above the saved frame
    /// pointer, `base` becomes the saved frame pointer.
    ///
    /// # Safety
    ///
    /// `*base` must point at a readable saved-frame-pointer slot of a live
    /// frame chain.
    pub unsafe fn next_frame(&self, stack: &mut *const u8, base: &mut *const u8) {
        let saved = self.read_word(*base) as usize as *const u8;
        debug_assert!(saved != *base);

        *stack = (*base).add(self.word.bytes());
        *base = saved;
    }

    /// Read a word-sized constant embedded in code or data.
    ///
    /// # Safety
    ///
    /// `src` must point at a readable word.
    pub unsafe fn get_constant(&self, src: *const u8) -> u64 {
        self.read_word(src)
    }

    /// Write a word-sized constant into code or data.
    ///
    /// # Safety
    ///
    /// `dst` must point at a writable word.
    pub unsafe fn set_constant(&self, dst: *mut u8, constant: u64) {
        match self.word {
            WordSize::W32 => (dst as *mut u32).write_unaligned(constant as u32),
            WordSize::W64 => (dst as *mut u64).write_unaligned(constant),
        }
    }

    /// Whether the instruction preceding `return_address` is a near call
    /// whose displacement reaches `target`.
    ///
    /// # Safety
    ///
    /// The five bytes before `return_address` must be readable.
    pub unsafe fn match_call(&self, return_address: *const u8, target: *const u8) -> bool {
        let instruction = return_address.sub(5);

        let mut displacement = [0u8; 4];
        std::ptr::copy_nonoverlapping(instruction.add(1), displacement.as_mut_ptr(), 4);
        let actual = return_address.offset(i32::from_le_bytes(displacement) as isize);

        *instruction == 0xe8 && actual == target
    }

    /// Re-point a patched call site at `new_target`: the imm32 of a 5-byte
    /// near call or jump, or the imm64 of the 13-byte long-call sequence
    /// (`49 ba imm64 41 ff d2|e2`).
    ///
    /// # Safety
    ///
    /// The patched instruction bytes before `return_address` must be live,
    /// writable memory containing the matching call or jump shape.
    pub unsafe fn update_call(
        &self,
        op: UnaryOperation,
        assert_alignment: bool,
        return_address: *mut u8,
        new_target: *const u8,
    ) {
        use UnaryOperation::{Call, Jump, LongCall, LongJump};

        if self.word == WordSize::W32 || op == Call || op == Jump {
            let instruction = return_address.sub(5);

            debug_assert!(
                ((op == Call || op == LongCall) && *instruction == 0xe8)
                    || ((op == Jump || op == LongJump) && *instruction == 0xe9)
            );
            debug_assert!(!assert_alignment || (instruction.add(1) as usize) % 4 == 0);

            let displacement = new_target as i64 - return_address as i64;
            debug_assert!(is_int32(displacement));

            let bytes = (displacement as i32).to_le_bytes();
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), instruction.add(1), 4);
        } else {
            let instruction = return_address.sub(13);

            debug_assert!(*instruction == 0x49 && *instruction.add(1) == 0xba);
            debug_assert!(*instruction.add(10) == 0x41 && *instruction.add(11) == 0xff);
            debug_assert!(
                (op == LongCall && *instruction.add(12) == 0xd2)
                    || (op == LongJump && *instruction.add(12) == 0xe2)
            );
            debug_assert!(!assert_alignment || (instruction.add(2) as usize) % 8 == 0);

            let bytes = (new_target as usize as u64).to_le_bytes();
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), instruction.add(2), 8);
        }

        debug!(?op, "patched call site at {:p}", return_address);
    }

    /// Admissible operands for a unary operation.
    pub fn plan_unary(&self, op: UnaryOperation) -> UnaryPlan {
        planner::plan_unary(self.word, op)
    }

    /// Admissible operands for a binary operation at the given sizes.
    pub fn plan_binary(&self, op: BinaryOperation, a_size: usize, b_size: usize) -> BinaryPlan {
        planner::plan_binary(self.word, op, a_size, b_size)
    }

    /// Admissible operands for a ternary operation at the given size.
    pub fn plan_ternary(&self, op: TernaryOperation, a_size: usize) -> TernaryPlan {
        planner::plan_ternary(self.word, op, a_size)
    }

    /// Whether the dispatch table has an encoder for the operation.
    pub fn supports_operation(&self, op: Operation) -> bool {
        self.tables.operation(op).is_some()
    }

    /// Whether the dispatch table has an encoder for the combination.
    pub fn supports_unary(&self, op: UnaryOperation, a: OperandType) -> bool {
        self.tables.unary(op, a).is_some()
    }

    /// Whether the dispatch table has an encoder for the combination.
    pub fn supports_binary(&self, op: BinaryOperation, a: OperandType, b: OperandType) -> bool {
        self.tables.binary(op, a, b).is_some()
    }

    /// Whether the dispatch table has an encoder for the combination.
    pub fn supports_ternary(&self, op: TernaryOperation, a: OperandType, b: OperandType) -> bool {
        self.tables.ternary(op, a, b).is_some()
    }
}
