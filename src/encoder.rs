//! Instruction-encoding primitives: REX, opcode, ModR/M and SIB emission
//!
//! Pure functions over the code buffer. The per-operation encoders live in
//! the [`alu`], [`data`] and [`flow`] submodules.

pub(crate) mod alu;
pub(crate) mod data;
pub(crate) mod flow;

use crate::arch::WordSize;
use crate::consts::{is_int8, RBP, RSP};
use crate::context::Context;
use crate::operand::{MemoryOperand, RegId, RegisterPair};

const REX_W: u8 = 0x48;
const REX_R: u8 = 0x44;
const REX_X: u8 = 0x42;
const REX_B: u8 = 0x41;
const REX_NONE: u8 = 0x40;

/// Compose and emit a REX prefix on a 64-bit word; a no-op on a 32-bit word.
///
/// The byte is emitted when any extension bit is set, when the operand size
/// is 8, or when `always` is requested (byte accesses to sil/dil/bpl/spl
/// and sign-extending moves from 8/16-bit registers).
pub(crate) fn maybe_rex(
    c: &mut Context,
    size: usize,
    a: Option<RegId>,
    index: Option<RegId>,
    base: Option<RegId>,
    always: bool,
) {
    if c.word != WordSize::W64 {
        return;
    }

    let mut byte = if size == 8 { REX_W } else { REX_NONE };
    if matches!(a, Some(r) if r.is_extended()) {
        byte |= REX_R;
    }
    if matches!(index, Some(r) if r.is_extended()) {
        byte |= REX_X;
    }
    if matches!(base, Some(r) if r.is_extended()) {
        byte |= REX_B;
    }
    if always || byte != REX_NONE {
        c.code.append(byte);
    }
}

pub(crate) fn maybe_rex_rr(c: &mut Context, size: usize, a: &RegisterPair, b: &RegisterPair) {
    maybe_rex(c, size, Some(a.low), None, Some(b.low), false);
}

pub(crate) fn always_rex_rr(c: &mut Context, size: usize, a: &RegisterPair, b: &RegisterPair) {
    maybe_rex(c, size, Some(a.low), None, Some(b.low), true);
}

pub(crate) fn maybe_rex_r(c: &mut Context, size: usize, a: &RegisterPair) {
    maybe_rex(c, size, None, None, Some(a.low), false);
}

pub(crate) fn maybe_rex_rm(c: &mut Context, size: usize, a: &RegisterPair, b: &MemoryOperand) {
    maybe_rex(c, size, Some(a.low), b.index, Some(b.base), false);
}

pub(crate) fn maybe_rex_m(c: &mut Context, size: usize, a: &MemoryOperand) {
    maybe_rex(c, size, None, a.index, Some(a.base), false);
}

/// `mod | reg << 3 | rm`, fields reduced to their low three bits.
pub(crate) fn modrm(c: &mut Context, mode: u8, rm: u8, reg: u8) {
    c.code.append(mode | ((reg & 7) << 3) | (rm & 7));
}

const fn scale_shift(scale: u8) -> u8 {
    match scale {
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    }
}

pub(crate) fn sib(c: &mut Context, scale: u8, index: u8, base: u8) {
    c.code
        .append((scale_shift(scale) << 6) | ((index & 7) << 3) | (base & 7));
}

/// ModR/M plus SIB when the addressing mode requires one: an explicit index
/// register, or rsp as base (the ISA reserves rm=rsp for the SIB escape).
pub(crate) fn modrm_sib(
    c: &mut Context,
    mode: u8,
    reg: u8,
    scale: u8,
    index: Option<RegId>,
    base: RegId,
) {
    match index {
        None => {
            modrm(c, mode, base.code(), reg);
            if base.code() == RSP.code() {
                sib(c, 1, RSP.code(), RSP.code());
            }
        }
        Some(index) => {
            modrm(c, mode, RSP.code(), reg);
            sib(c, scale, index.code(), base.code());
        }
    }
}

/// ModR/M + SIB + displacement, choosing the shortest displacement form:
/// none when zero (and base is not rbp, whose mod=00 form means rip/disp32),
/// one byte when it fits int8, four bytes otherwise.
pub(crate) fn modrm_sib_imm(
    c: &mut Context,
    reg: u8,
    scale: u8,
    index: Option<RegId>,
    base: RegId,
    disp: i32,
) {
    if disp == 0 && base.code() != RBP.code() {
        modrm_sib(c, 0x00, reg, scale, index, base);
    } else if is_int8(disp as i64) {
        modrm_sib(c, 0x40, reg, scale, index, base);
        c.code.append(disp as u8);
    } else {
        modrm_sib(c, 0x80, reg, scale, index, base);
        c.code.append4(disp as u32);
    }
}

pub(crate) fn modrm_sib_imm_rm(c: &mut Context, a: &RegisterPair, b: &MemoryOperand) {
    modrm_sib_imm(c, a.low.code(), b.scale, b.index, b.base, b.disp);
}

pub(crate) fn opcode(c: &mut Context, op: u8) {
    c.code.append(op);
}

pub(crate) fn opcode2(c: &mut Context, op1: u8, op2: u8) {
    c.code.append(op1);
    c.code.append(op2);
}
