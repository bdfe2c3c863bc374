//! Arithmetic and logic encoders
//!
//! Binary ALU operations follow a uniform pattern: a reg-reg form, a
//! const-reg form folding the immediate to its shortest encoding (imm8 via
//! `83 /…`, imm32 via `81 /…`, anything larger spilled through a scratch
//! register), and a 64-on-32 decomposition chaining the carry or borrow
//! companion on the high half.

use crate::arch::WordSize;
use crate::consts::{is_int32, is_int8, RAX, RCX, RDI, RDX};
use crate::context::Context;
use crate::encoder::{
    maybe_rex_m, maybe_rex_r, maybe_rex_rm, maybe_rex_rr, modrm, modrm_sib_imm, modrm_sib_imm_rm,
    opcode, opcode2,
};
use crate::error::AssemblerError;
use crate::operand::{Constant, MemoryOperand, Operand, RegisterPair};
use crate::planner::{register_bit, ANY_REGISTERS};
use crate::promise::Promise;

use super::data::{move_cr, move_rr};

pub(crate) fn negate_r(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && size == 8 {
        debug_assert!(a.low == RAX && a.high == Some(RDX));

        let zero = Constant::resolved(0);
        let ah = a.high_pair();

        negate_r(c, 4, a)?;
        add_carry_cr(c, 4, &zero, &ah)?;
        negate_r(c, 4, &ah)
    } else {
        maybe_rex_r(c, size, a);
        opcode2(c, 0xf7, 0xd8 + a.low.code());
        Ok(())
    }
}

pub(crate) fn negate_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    _b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    negate_r(c, a_size, a)
}

pub(crate) fn add_carry_rr(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert!(c.word == WordSize::W64 || size == 4);

    maybe_rex_rr(c, size, a, b);
    opcode(c, 0x11);
    modrm(c, 0xc0, b.low.code(), a.low.code());
    Ok(())
}

pub(crate) fn add_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        add_rr(c, 4, a, 4, b)?;
        add_carry_rr(c, 4, &ah, &bh)
    } else {
        maybe_rex_rr(c, a_size, a, b);
        opcode(c, 0x01);
        modrm(c, 0xc0, b.low.code(), a.low.code());
        Ok(())
    }
}

pub(crate) fn add_carry_cr(
    c: &mut Context,
    size: usize,
    a: &Constant,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    let v = a.value.value()?;
    if is_int8(v) {
        maybe_rex_r(c, size, b);
        opcode2(c, 0x83, 0xd0 + b.low.code());
        c.code.append(v as u8);
        Ok(())
    } else {
        Err(AssemblerError::ImmediateOverflow(v))
    }
}

pub(crate) fn add_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    let v = a.value.value()?;
    if v == 0 {
        return Ok(());
    }

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::resolved(v & 0xffff_ffff);
        let high = Constant::resolved((v >> 32) & 0xffff_ffff);
        let bh = b.high_pair();

        add_cr(c, 4, &low, 4, b)?;
        add_carry_cr(c, 4, &high, &bh)
    } else if is_int32(v) {
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xc0 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xc0 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result =
            move_cr(c, a_size, a, a_size, &tmp).and_then(|()| add_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn subtract_borrow_rr(
    c: &mut Context,
    size: usize,
    a: &RegisterPair,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert!(c.word == WordSize::W64 || size == 4);

    maybe_rex_rr(c, size, a, b);
    opcode(c, 0x19);
    modrm(c, 0xc0, b.low.code(), a.low.code());
    Ok(())
}

pub(crate) fn subtract_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        subtract_rr(c, 4, a, 4, b)?;
        subtract_borrow_rr(c, 4, &ah, &bh)
    } else {
        maybe_rex_rr(c, a_size, a, b);
        opcode(c, 0x29);
        modrm(c, 0xc0, b.low.code(), a.low.code());
        Ok(())
    }
}

/// Borrow companion of the high half; only reached on a 32-bit word, so no
/// prefix is ever emitted.
pub(crate) fn subtract_borrow_cr(
    c: &mut Context,
    size: usize,
    a: &Constant,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert!(c.word == WordSize::W64 || size == 4);

    let v = a.value.value()?;
    if is_int8(v) {
        opcode2(c, 0x83, 0xd8 + b.low.code());
        c.code.append(v as u8);
        Ok(())
    } else {
        Err(AssemblerError::ImmediateOverflow(v))
    }
}

pub(crate) fn subtract_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    let v = a.value.value()?;
    if v == 0 {
        return Ok(());
    }

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::resolved(v & 0xffff_ffff);
        let high = Constant::resolved((v >> 32) & 0xffff_ffff);
        let bh = b.high_pair();

        subtract_cr(c, 4, &low, 4, b)?;
        subtract_borrow_cr(c, 4, &high, &bh)
    } else if is_int32(v) {
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xe8 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xe8 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result = move_cr(c, a_size, a, a_size, &tmp)
            .and_then(|()| subtract_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn and_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        and_rr(c, 4, a, 4, b)?;
        and_rr(c, 4, &ah, 4, &bh)
    } else {
        maybe_rex_rr(c, a_size, a, b);
        opcode(c, 0x21);
        modrm(c, 0xc0, b.low.code(), a.low.code());
        Ok(())
    }
}

pub(crate) fn and_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    let v = a.value.value()?;

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::resolved(v & 0xffff_ffff);
        let high = Constant::resolved((v >> 32) & 0xffff_ffff);
        let bh = b.high_pair();

        and_cr(c, 4, &low, 4, b)?;
        and_cr(c, 4, &high, 4, &bh)
    } else if is_int32(v) {
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xe0 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xe0 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result =
            move_cr(c, a_size, a, a_size, &tmp).and_then(|()| and_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn or_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        or_rr(c, 4, a, 4, b)?;
        or_rr(c, 4, &ah, 4, &bh)
    } else {
        maybe_rex_rr(c, a_size, a, b);
        opcode(c, 0x09);
        modrm(c, 0xc0, b.low.code(), a.low.code());
        Ok(())
    }
}

pub(crate) fn or_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    let v = a.value.value()?;
    if v == 0 {
        return Ok(());
    }

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::resolved(v & 0xffff_ffff);
        let high = Constant::resolved((v >> 32) & 0xffff_ffff);
        let bh = b.high_pair();

        or_cr(c, 4, &low, 4, b)?;
        or_cr(c, 4, &high, 4, &bh)
    } else if is_int32(v) {
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xc8 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xc8 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result =
            move_cr(c, a_size, a, a_size, &tmp).and_then(|()| or_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn xor_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && a_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        xor_rr(c, 4, a, 4, b)?;
        xor_rr(c, 4, &ah, 4, &bh)
    } else {
        maybe_rex_rr(c, a_size, a, b);
        opcode(c, 0x31);
        modrm(c, 0xc0, b.low.code(), a.low.code());
        Ok(())
    }
}

pub(crate) fn xor_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    let v = a.value.value()?;
    if v == 0 {
        return Ok(());
    }

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::resolved(v & 0xffff_ffff);
        let high = Constant::resolved((v >> 32) & 0xffff_ffff);
        let bh = b.high_pair();

        xor_cr(c, 4, &low, 4, b)?;
        xor_cr(c, 4, &high, 4, &bh)
    } else if is_int32(v) {
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xf0 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xf0 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result =
            move_cr(c, a_size, a, a_size, &tmp).and_then(|()| xor_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn multiply_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        // Three-partial-product sequence through eax:edx. The planner keeps
        // both operands away from rax and forces b's high half into rdx.
        debug_assert_eq!(b.high, Some(RDX));
        debug_assert!(b.low != RAX);
        debug_assert!(a.low != RAX);
        debug_assert!(a.high() != RAX);

        c.save(RAX)?;

        let axdx = RegisterPair::pair(RAX, RDX);
        let ah = a.high_pair();
        let bh = b.high_pair();

        move_rr(c, 4, b, 4, &axdx)?;
        multiply_rr(c, 4, &ah, 4, b)?;
        multiply_rr(c, 4, a, 4, &bh)?;
        add_rr(c, 4, &bh, 4, b)?;

        // mul a.low, %eax:%edx
        opcode2(c, 0xf7, 0xe0 + a.low.code());

        add_rr(c, 4, b, 4, &bh)?;
        move_rr(c, 4, &axdx, 4, b)
    } else {
        maybe_rex_rr(c, a_size, b, a);
        opcode2(c, 0x0f, 0xaf);
        modrm(c, 0xc0, a.low.code(), b.low.code());
        Ok(())
    }
}

pub(crate) fn multiply_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    if c.word == WordSize::W32 && a_size == 8 {
        let mask = !(register_bit(RAX) | register_bit(RDX));
        let low = c.acquire_temporary(mask)?;
        let high = c.acquire_temporary(mask)?;
        let tmp = RegisterPair::pair(low.low, high.low);

        let result = move_cr(c, a_size, a, a_size, &tmp)
            .and_then(|()| multiply_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        c.release_temporary(tmp.high());
        result
    } else {
        let v = a.value.value()?;
        if v == 1 {
            return Ok(());
        }

        if is_int32(v) {
            maybe_rex_rr(c, b_size, b, b);
            if is_int8(v) {
                opcode(c, 0x6b);
                modrm(c, 0xc0, b.low.code(), b.low.code());
                c.code.append(v as u8);
            } else {
                opcode(c, 0x69);
                modrm(c, 0xc0, b.low.code(), b.low.code());
                c.code.append4(v as u32);
            }
            Ok(())
        } else {
            let tmp = c.acquire_temporary(ANY_REGISTERS)?;
            let result = move_cr(c, a_size, a, a_size, &tmp)
                .and_then(|()| multiply_rr(c, a_size, &tmp, b_size, b));
            c.release_temporary(tmp.low);
            result
        }
    }
}

pub(crate) fn compare_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    maybe_rex_rr(c, a_size, a, b);
    opcode(c, 0x39);
    modrm(c, 0xc0, b.low.code(), a.low.code());
    Ok(())
}

pub(crate) fn compare_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert!(c.word == WordSize::W64 || a_size == 4);

    if a.value.resolved() && is_int32(a.value.value()?) {
        let v = a.value.value()?;
        maybe_rex_r(c, a_size, b);
        if is_int8(v) {
            opcode2(c, 0x83, 0xf8 + b.low.code());
            c.code.append(v as u8);
        } else {
            opcode2(c, 0x81, 0xf8 + b.low.code());
            c.code.append4(v as u32);
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result = move_cr(c, a_size, a, a_size, &tmp)
            .and_then(|()| compare_rr(c, a_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn compare_rm(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &MemoryOperand,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert!(c.word == WordSize::W64 || a_size == 4);

    if c.word == WordSize::W64 && a_size == 4 {
        move_rr(c, 4, a, 8, a)?;
    }
    maybe_rex_rm(c, b_size, a, b);
    opcode(c, 0x39);
    modrm_sib_imm_rm(c, a, b);
    Ok(())
}

pub(crate) fn compare_cm(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &MemoryOperand,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert!(c.word == WordSize::W64 || a_size == 4);

    if a.value.resolved() {
        let v = a.value.value()?;
        maybe_rex_m(c, a_size, b);
        opcode(c, if is_int8(v) { 0x83 } else { 0x81 });
        modrm_sib_imm(c, RDI.code(), b.scale, b.index, b.base, b.disp);

        if is_int8(v) {
            c.code.append(v as u8);
        } else if is_int32(v) {
            c.code.append4(v as u32);
        } else {
            return Err(AssemblerError::ImmediateOverflow(v));
        }
        Ok(())
    } else {
        let tmp = c.acquire_temporary(ANY_REGISTERS)?;
        let result = move_cr(c, a_size, a, b_size, &tmp)
            .and_then(|()| compare_rm(c, b_size, &tmp, b_size, b));
        c.release_temporary(tmp.low);
        result
    }
}

pub(crate) fn divide_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert_eq!(b.low, RAX);
    debug_assert!(a.low != RDX);

    c.save(RDX)?;

    maybe_rex_rr(c, a_size, a, b);
    opcode(c, 0x99); // cdq
    maybe_rex_rr(c, a_size, b, a);
    opcode2(c, 0xf7, 0xf8 + a.low.code());
    Ok(())
}

pub(crate) fn remainder_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert_eq!(b.low, RAX);
    debug_assert!(a.low != RDX);

    c.save(RDX)?;

    maybe_rex_rr(c, a_size, a, b);
    opcode(c, 0x99); // cdq
    maybe_rex_rr(c, a_size, b, a);
    opcode2(c, 0xf7, 0xf8 + a.low.code());

    let word = c.word.bytes();
    let dx = RegisterPair::new(RDX);
    move_rr(c, word, &dx, word, b)
}

fn compare_operands(
    c: &mut Context,
    a_size: usize,
    a: &Operand,
    b_size: usize,
    b: &Operand,
) -> Result<(), AssemblerError> {
    match (a, b) {
        (Operand::Constant(a), Operand::Register(b)) => compare_cr(c, a_size, a, b_size, b),
        (Operand::Register(a), Operand::Register(b)) => compare_rr(c, a_size, a, b_size, b),
        _ => unreachable!("long compare only sees constant and register operands"),
    }
}

/// Materialize -1/0/+1 into `bl` from a 64-bit comparison: compare (halves,
/// high first, on a 32-bit word), branch signed on the high half and
/// unsigned on the low, and join the three moves with short jumps whose
/// displacements are back-patched in place.
fn long_compare(
    c: &mut Context,
    al: &Operand,
    ah: &Operand,
    bl: &RegisterPair,
) -> Result<(), AssemblerError> {
    let negative = Constant::resolved(-1);
    let zero = Constant::resolved(0);
    let positive = Constant::resolved(1);

    if c.word == WordSize::W64 {
        compare_operands(c, 8, al, 8, &Operand::Register(*bl))?;

        opcode2(c, 0x0f, 0x8c); // jl
        let less = c.code.len();
        c.code.append4(0);

        opcode2(c, 0x0f, 0x8f); // jg
        let greater = c.code.len();
        c.code.append4(0);

        move_cr(c, 4, &zero, 4, bl)?;

        opcode(c, 0xe9); // jmp
        let next_first = c.code.len();
        c.code.append4(0);

        let less_offset = (c.code.len() - less - 4) as i32;
        c.code.set(less, &less_offset.to_le_bytes());

        move_cr(c, 4, &negative, 4, bl)?;

        opcode(c, 0xe9); // jmp
        let next_second = c.code.len();
        c.code.append4(0);

        let greater_offset = (c.code.len() - greater - 4) as i32;
        c.code.set(greater, &greater_offset.to_le_bytes());

        move_cr(c, 4, &positive, 4, bl)?;

        let next_first_offset = (c.code.len() - next_first - 4) as i32;
        c.code.set(next_first, &next_first_offset.to_le_bytes());

        let next_second_offset = (c.code.len() - next_second - 4) as i32;
        c.code.set(next_second, &next_second_offset.to_le_bytes());

        Ok(())
    } else {
        let bh = Operand::Register(bl.high_pair());

        compare_operands(c, 4, ah, 4, &bh)?;

        opcode2(c, 0x0f, 0x8c); // jl
        let less = c.code.len();
        c.code.append4(0);

        opcode2(c, 0x0f, 0x8f); // jg
        let greater = c.code.len();
        c.code.append4(0);

        compare_operands(c, 4, al, 4, &Operand::Register(*bl))?;

        opcode2(c, 0x0f, 0x82); // jb
        let below = c.code.len();
        c.code.append4(0);

        opcode2(c, 0x0f, 0x87); // ja
        let above = c.code.len();
        c.code.append4(0);

        move_cr(c, 4, &zero, 4, bl)?;

        opcode(c, 0xe9); // jmp
        let next_first = c.code.len();
        c.code.append4(0);

        let less_offset = (c.code.len() - less - 4) as i32;
        c.code.set(less, &less_offset.to_le_bytes());

        let below_offset = (c.code.len() - below - 4) as i32;
        c.code.set(below, &below_offset.to_le_bytes());

        move_cr(c, 4, &negative, 4, bl)?;

        opcode(c, 0xe9); // jmp
        let next_second = c.code.len();
        c.code.append4(0);

        let greater_offset = (c.code.len() - greater - 4) as i32;
        c.code.set(greater, &greater_offset.to_le_bytes());

        let above_offset = (c.code.len() - above - 4) as i32;
        c.code.set(above, &above_offset.to_le_bytes());

        move_cr(c, 4, &positive, 4, bl)?;

        let next_first_offset = (c.code.len() - next_first - 4) as i32;
        c.code.set(next_first, &next_first_offset.to_le_bytes());

        let next_second_offset = (c.code.len() - next_second - 4) as i32;
        c.code.set(next_second, &next_second_offset.to_le_bytes());

        Ok(())
    }
}

pub(crate) fn long_compare_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, 8);
    debug_assert_eq!(b_size, 8);

    let v = a.value.value()?;
    let al = Operand::constant(v & 0xffff_ffff);
    let ah = Operand::constant((v >> 32) & 0xffff_ffff);

    long_compare(c, &al, &ah, b)
}

pub(crate) fn long_compare_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, 8);
    debug_assert_eq!(b_size, 8);

    let al = Operand::Register(*a);
    let ah = if c.word == WordSize::W32 {
        Operand::Register(a.high_pair())
    } else {
        al.clone()
    };

    long_compare(c, &al, &ah, b)
}

type ShiftRr = fn(
    &mut Context,
    usize,
    &RegisterPair,
    usize,
    &RegisterPair,
) -> Result<(), AssemblerError>;

/// Immediate-count shift: `d1 /…` for a count of one, `c1 /… imm8`
/// otherwise. On a 32-bit word with a 64-bit destination the count is
/// routed through rcx and the register form does the work.
fn do_shift(
    c: &mut Context,
    shift: ShiftRr,
    ty: u8,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    let v = a.value.value()?;

    if c.word == WordSize::W32 && b_size == 8 {
        c.save(RCX)?;

        let cx = RegisterPair::new(RCX);
        move_cr(c, 4, a, 4, &cx)?;
        shift(c, a_size, &cx, b_size, b)
    } else {
        maybe_rex_r(c, b_size, b);
        if v == 1 {
            opcode2(c, 0xd1, ty + b.low.code());
            Ok(())
        } else if is_int8(v) {
            opcode2(c, 0xc1, ty + b.low.code());
            c.code.append(v as u8);
            Ok(())
        } else {
            Err(AssemblerError::ImmediateOverflow(v))
        }
    }
}

pub(crate) fn shift_left_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a.low, RCX);

    if c.word == WordSize::W32 && b_size == 8 {
        // shld
        opcode2(c, 0x0f, 0xa5);
        modrm(c, 0xc0, b.high().code(), b.low.code());

        // shl
        opcode2(c, 0xd3, 0xe0 + b.low.code());

        let thirty_two = Constant::resolved(32);
        compare_cr(c, a_size, &thirty_two, a_size, a)?;

        opcode2(c, 0x0f, 0x8c); // jl
        c.code.append4(2 + 2);

        let bh = b.high_pair();
        move_rr(c, 4, b, 4, &bh)?; // 2 bytes
        xor_rr(c, 4, b, 4, b) // 2 bytes
    } else {
        maybe_rex_rr(c, b_size, a, b);
        opcode2(c, 0xd3, 0xe0 + b.low.code());
        Ok(())
    }
}

pub(crate) fn shift_left_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    do_shift(c, shift_left_rr, 0xe0, a_size, a, b_size, b)
}

pub(crate) fn shift_right_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a.low, RCX);

    if c.word == WordSize::W32 && b_size == 8 {
        // shrd
        opcode2(c, 0x0f, 0xad);
        modrm(c, 0xc0, b.low.code(), b.high().code());

        // sar
        opcode2(c, 0xd3, 0xf8 + b.high().code());

        let thirty_two = Constant::resolved(32);
        compare_cr(c, a_size, &thirty_two, a_size, a)?;

        opcode2(c, 0x0f, 0x8c); // jl
        c.code.append4(2 + 3);

        let bh = b.high_pair();
        move_rr(c, 4, &bh, 4, b)?; // 2 bytes

        // sar 31, high
        opcode2(c, 0xc1, 0xf8 + b.high().code());
        c.code.append(31);
        Ok(())
    } else {
        maybe_rex_rr(c, b_size, a, b);
        opcode2(c, 0xd3, 0xf8 + b.low.code());
        Ok(())
    }
}

pub(crate) fn shift_right_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    do_shift(c, shift_right_rr, 0xf8, a_size, a, b_size, b)
}

pub(crate) fn unsigned_shift_right_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a.low, RCX);

    if c.word == WordSize::W32 && b_size == 8 {
        // shrd
        opcode2(c, 0x0f, 0xad);
        modrm(c, 0xc0, b.low.code(), b.high().code());

        // shr
        opcode2(c, 0xd3, 0xe8 + b.high().code());

        let thirty_two = Constant::resolved(32);
        compare_cr(c, a_size, &thirty_two, a_size, a)?;

        opcode2(c, 0x0f, 0x8c); // jl
        c.code.append4(2 + 2);

        let bh = b.high_pair();
        move_rr(c, 4, &bh, 4, b)?; // 2 bytes
        xor_rr(c, 4, &bh, 4, &bh) // 2 bytes
    } else {
        maybe_rex_rr(c, b_size, a, b);
        opcode2(c, 0xd3, 0xe8 + b.low.code());
        Ok(())
    }
}

pub(crate) fn unsigned_shift_right_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    do_shift(c, unsigned_shift_right_rr, 0xe8, a_size, a, b_size, b)
}
