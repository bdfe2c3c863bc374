//! Control-flow encoders: returns, branches, calls and stack operations

use crate::arch::WordSize;
use crate::consts::{R10, RDX, RSP};
use crate::context::Context;
use crate::encoder::{maybe_rex_m, maybe_rex_r, modrm_sib_imm, opcode, opcode2};
use crate::error::AssemblerError;
use crate::operand::{Constant, MemoryOperand, RegisterPair};

use super::data::{move_cr2, move_rr};

pub(crate) fn return_(c: &mut Context) -> Result<(), AssemblerError> {
    opcode(c, 0xc3);
    Ok(())
}

/// Memory barriers are no-ops on x86's ordering model.
pub(crate) fn ignore(_c: &mut Context) -> Result<(), AssemblerError> {
    Ok(())
}

/// Emit a 5-byte relative branch with a zero displacement and queue the
/// patch for when the target resolves.
pub(crate) fn unconditional(
    c: &mut Context,
    jump: u8,
    a: &Constant,
) -> Result<(), AssemblerError> {
    let instruction_offset = c.offset();
    c.append_offset_task(a.value.clone(), instruction_offset, 5);

    opcode(c, jump);
    c.code.append4(0);
    Ok(())
}

/// Emit a 6-byte `0f cc` conditional branch and queue the patch.
pub(crate) fn conditional(
    c: &mut Context,
    condition: u8,
    a: &Constant,
) -> Result<(), AssemblerError> {
    let instruction_offset = c.offset();
    c.append_offset_task(a.value.clone(), instruction_offset, 6);

    opcode2(c, 0x0f, condition);
    c.code.append4(0);
    Ok(())
}

pub(crate) fn call_c(c: &mut Context, size: usize, a: &Constant) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    unconditional(c, 0xe8, a)
}

pub(crate) fn call_r(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    // REX.W has no meaning for an indirect call, so request size 4.
    maybe_rex_r(c, 4, a);
    opcode2(c, 0xff, 0xd0 + a.low.code());
    Ok(())
}

pub(crate) fn call_m(
    c: &mut Context,
    size: usize,
    a: &MemoryOperand,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    maybe_rex_m(c, 4, a);
    opcode(c, 0xff);
    modrm_sib_imm(c, RDX.code(), a.scale, a.index, a.base, a.disp);
    Ok(())
}

/// Reach any 64-bit target: materialize the address into r10 with a 10-byte
/// `mov`, then call through it. On a 32-bit word the near call suffices.
pub(crate) fn long_call_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    if c.word == WordSize::W64 {
        let scratch = RegisterPair::new(R10);
        move_cr2(c, size, a, size, &scratch, 11)?;
        call_r(c, size, &scratch)
    } else {
        call_c(c, size, a)
    }
}

pub(crate) fn jump_c(c: &mut Context, size: usize, a: &Constant) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    unconditional(c, 0xe9, a)
}

pub(crate) fn jump_r(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    maybe_rex_r(c, 4, a);
    opcode2(c, 0xff, 0xe0 + a.low.code());
    Ok(())
}

pub(crate) fn jump_m(
    c: &mut Context,
    size: usize,
    a: &MemoryOperand,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    maybe_rex_m(c, 4, a);
    opcode(c, 0xff);
    modrm_sib_imm(c, RSP.code(), a.scale, a.index, a.base, a.disp);
    Ok(())
}

pub(crate) fn long_jump_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());

    if c.word == WordSize::W64 {
        let scratch = RegisterPair::new(R10);
        move_cr2(c, size, a, size, &scratch, 11)?;
        jump_r(c, size, &scratch)
    } else {
        jump_c(c, size, a)
    }
}

/// Record a padding point so the following call's displacement field is
/// 4-byte aligned in the final buffer, then emit the call.
pub(crate) fn aligned_call_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    c.add_padding_point();
    call_c(c, size, a)
}

pub(crate) fn aligned_jump_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    c.add_padding_point();
    jump_c(c, size, a)
}

pub(crate) fn jump_if_equal_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x84, a)
}

pub(crate) fn jump_if_not_equal_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x85, a)
}

pub(crate) fn jump_if_greater_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x8f, a)
}

pub(crate) fn jump_if_greater_or_equal_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x8d, a)
}

pub(crate) fn jump_if_less_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x8c, a)
}

pub(crate) fn jump_if_less_or_equal_c(
    c: &mut Context,
    size: usize,
    a: &Constant,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(size, c.word.bytes());
    conditional(c, 0x8e, a)
}

pub(crate) fn push_r(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && size == 8 {
        let ah = a.high_pair();
        push_r(c, 4, &ah)?;
        push_r(c, 4, a)
    } else {
        maybe_rex_r(c, 4, a);
        opcode(c, 0x50 + a.low.code());
        Ok(())
    }
}

pub(crate) fn pop_r(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && size == 8 {
        let ah = a.high_pair();
        pop_r(c, 4, a)?;
        pop_r(c, 4, &ah)
    } else {
        maybe_rex_r(c, 4, a);
        opcode(c, 0x58 + a.low.code());
        if c.word == WordSize::W64 && size == 4 {
            move_rr(c, 4, a, 8, a)?;
        }
        Ok(())
    }
}

pub(crate) fn pop_m(
    c: &mut Context,
    size: usize,
    a: &MemoryOperand,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && size == 8 {
        let ah = a.offset_by(4);
        pop_m(c, 4, a)?;
        pop_m(c, 4, &ah)
    } else {
        debug_assert!(c.word == WordSize::W32 || size == 8);

        // Pop defaults to a 64-bit operand, so size 4 here only asks
        // maybe_rex for the extension bits of the addressing registers.
        maybe_rex_m(c, 4, a);
        opcode(c, 0x8f);
        modrm_sib_imm(c, 0, a.scale, a.index, a.base, a.disp);
        Ok(())
    }
}
