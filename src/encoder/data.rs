//! Data-movement encoders

use crate::arch::WordSize;
use crate::consts::{is_int32, RAX, RBX, RDX};
use crate::context::Context;
use crate::encoder::{
    always_rex_rr, maybe_rex_m, maybe_rex_r, maybe_rex_rm, maybe_rex_rr, modrm, modrm_sib_imm,
    modrm_sib_imm_rm, opcode, opcode2,
};
use crate::error::AssemblerError;
use crate::operand::{AddressOperand, Constant, MemoryOperand, RegisterPair};
use crate::planner::ANY_REGISTERS;
use crate::promise::{Promise, ShiftMaskPromise};

use std::rc::Rc;

pub(crate) fn swap_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);
    debug_assert_eq!(a_size, c.word.bytes());

    always_rex_rr(c, a_size, a, b);
    opcode(c, 0x87);
    modrm(c, 0xc0, b.low.code(), a.low.code());
    Ok(())
}

pub(crate) fn move_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    if c.word == WordSize::W32 && a_size == 8 && b_size == 8 {
        let ah = a.high_pair();
        let bh = b.high_pair();

        // Order the half moves so neither clobbers a source; a full cycle
        // becomes an exchange.
        if a.high() == b.low {
            if a.low == b.high() {
                swap_rr(c, 4, a, 4, b)
            } else {
                move_rr(c, 4, &ah, 4, &bh)?;
                move_rr(c, 4, a, 4, b)
            }
        } else {
            move_rr(c, 4, a, 4, b)?;
            move_rr(c, 4, &ah, 4, &bh)
        }
    } else {
        match a_size {
            1 => {
                if c.word == WordSize::W32 && a.low.index() > RBX.index() {
                    // esi/edi/ebp/esp are not byte addressable on i386;
                    // route through the destination.
                    debug_assert!(b.low.index() <= RBX.index());

                    let word = c.word.bytes();
                    move_rr(c, word, a, word, b)?;
                    move_rr(c, 1, b, word, b)
                } else {
                    always_rex_rr(c, a_size, b, a);
                    opcode2(c, 0x0f, 0xbe);
                    modrm(c, 0xc0, a.low.code(), b.low.code());
                    Ok(())
                }
            }

            2 => {
                always_rex_rr(c, a_size, b, a);
                opcode2(c, 0x0f, 0xbf);
                modrm(c, 0xc0, a.low.code(), b.low.code());
                Ok(())
            }

            4 => {
                if b_size == 8 {
                    if c.word == WordSize::W64 {
                        always_rex_rr(c, b_size, b, a);
                        opcode(c, 0x63);
                        modrm(c, 0xc0, a.low.code(), b.low.code());
                        Ok(())
                    } else if a.low == RAX && b.low == RAX && b.high == Some(RDX) {
                        opcode(c, 0x99); // cdq
                        Ok(())
                    } else {
                        debug_assert!(b.low == RAX && b.high == Some(RDX));

                        move_rr(c, 4, a, 4, b)?;
                        move_rr(c, 4, b, 8, b)
                    }
                } else {
                    if a.low != b.low {
                        always_rex_rr(c, a_size, a, b);
                        opcode(c, 0x89);
                        modrm(c, 0xc0, b.low.code(), a.low.code());
                    }
                    Ok(())
                }
            }

            8 => {
                if a.low != b.low {
                    maybe_rex_rr(c, a_size, a, b);
                    opcode(c, 0x89);
                    modrm(c, 0xc0, b.low.code(), a.low.code());
                }
                Ok(())
            }

            _ => panic!("unsupported move size {a_size}"),
        }
    }
}

pub(crate) fn move_mr(
    c: &mut Context,
    a_size: usize,
    a: &MemoryOperand,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    match a_size {
        1 => {
            maybe_rex_rm(c, b_size, b, a);
            opcode2(c, 0x0f, 0xbe);
            modrm_sib_imm_rm(c, b, a);
            Ok(())
        }

        2 => {
            maybe_rex_rm(c, b_size, b, a);
            opcode2(c, 0x0f, 0xbf);
            modrm_sib_imm_rm(c, b, a);
            Ok(())
        }

        4 => {
            if c.word == WordSize::W64 {
                maybe_rex_rm(c, b_size, b, a);
                opcode(c, 0x63);
                modrm_sib_imm_rm(c, b, a);
                Ok(())
            } else if b_size == 8 {
                debug_assert!(b.low == RAX && b.high == Some(RDX));

                move_mr(c, 4, a, 4, b)?;
                move_rr(c, 4, b, 8, b)
            } else {
                maybe_rex_rm(c, b_size, b, a);
                opcode(c, 0x8b);
                modrm_sib_imm_rm(c, b, a);
                Ok(())
            }
        }

        8 => {
            if c.word == WordSize::W32 && b_size == 8 {
                let ah = a.offset_by(4);
                let bh = b.high_pair();

                move_mr(c, 4, a, 4, b)?;
                move_mr(c, 4, &ah, 4, &bh)
            } else {
                maybe_rex_rm(c, b_size, b, a);
                opcode(c, 0x8b);
                modrm_sib_imm_rm(c, b, a);
                Ok(())
            }
        }

        _ => panic!("unsupported move size {a_size}"),
    }
}

pub(crate) fn move_rm(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &MemoryOperand,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(a_size, b_size);

    match a_size {
        1 => {
            maybe_rex_rm(c, b_size, a, b);
            opcode(c, 0x88);
            modrm_sib_imm_rm(c, a, b);
            Ok(())
        }

        2 => {
            opcode(c, 0x66);
            maybe_rex_rm(c, b_size, a, b);
            opcode(c, 0x89);
            modrm_sib_imm_rm(c, a, b);
            Ok(())
        }

        4 => {
            if c.word == WordSize::W64 {
                maybe_rex_rm(c, b_size, a, b);
            }
            opcode(c, 0x89);
            modrm_sib_imm_rm(c, a, b);
            Ok(())
        }

        8 => {
            if c.word == WordSize::W64 {
                maybe_rex_rm(c, b_size, a, b);
                opcode(c, 0x89);
                modrm_sib_imm_rm(c, a, b);
                Ok(())
            } else {
                let ah = a.high_pair();
                let bh = b.offset_by(4);

                move_rm(c, 4, a, 4, b)?;
                move_rm(c, 4, &ah, 4, &bh)
            }
        }

        _ => panic!("unsupported move size {a_size}"),
    }
}

/// `mov` of a constant into a register, emitting a word-sized immediate and
/// queueing a patch when the value is still unresolved. `promise_offset` is
/// the distance from the immediate field to the instruction the late-patch
/// listener should report.
pub(crate) fn move_cr2(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
    promise_offset: usize,
) -> Result<(), AssemblerError> {
    let _ = a_size;

    if c.word == WordSize::W32 && b_size == 8 {
        let low = Constant::new(Rc::new(ShiftMaskPromise::new(
            a.value.clone(),
            0,
            0xffff_ffff,
        )));
        let high = Constant::new(Rc::new(ShiftMaskPromise::new(
            a.value.clone(),
            32,
            0xffff_ffff,
        )));
        let bh = b.high_pair();

        move_cr(c, 4, &low, 4, b)?;
        move_cr(c, 4, &high, 4, &bh)
    } else {
        let word = c.word;
        maybe_rex_r(c, word.bytes(), b);
        opcode(c, 0xb8 + b.low.code());
        if a.value.resolved() {
            let v = a.value.value()?;
            c.code.append_address(v, word);
        } else {
            let offset = c.offset();
            c.append_immediate_task(a.value.clone(), offset, word.bytes(), promise_offset);
            c.code.append_address(0, word);
        }
        Ok(())
    }
}

pub(crate) fn move_cr(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    move_cr2(c, a_size, a, b_size, b, 0)
}

pub(crate) fn move_cm(
    c: &mut Context,
    a_size: usize,
    a: &Constant,
    b_size: usize,
    b: &MemoryOperand,
) -> Result<(), AssemblerError> {
    let _ = a_size;

    match b_size {
        1 => {
            maybe_rex_m(c, b_size, b);
            opcode(c, 0xc6);
            modrm_sib_imm(c, 0, b.scale, b.index, b.base, b.disp);
            let v = a.value.value()?;
            c.code.append(v as u8);
            Ok(())
        }

        2 => {
            opcode(c, 0x66);
            maybe_rex_m(c, b_size, b);
            opcode(c, 0xc7);
            modrm_sib_imm(c, 0, b.scale, b.index, b.base, b.disp);
            let v = a.value.value()?;
            c.code.append2(v as u16);
            Ok(())
        }

        4 => {
            maybe_rex_m(c, b_size, b);
            opcode(c, 0xc7);
            modrm_sib_imm(c, 0, b.scale, b.index, b.base, b.disp);
            if a.value.resolved() {
                let v = a.value.value()?;
                c.code.append4(v as u32);
            } else {
                let offset = c.offset();
                c.append_immediate_task(a.value.clone(), offset, 4, 0);
                c.code.append4(0);
            }
            Ok(())
        }

        8 => {
            if c.word == WordSize::W64 {
                if a.value.resolved() && is_int32(a.value.value()?) {
                    maybe_rex_m(c, b_size, b);
                    opcode(c, 0xc7);
                    modrm_sib_imm(c, 0, b.scale, b.index, b.base, b.disp);
                    let v = a.value.value()?;
                    c.code.append4(v as u32);
                    Ok(())
                } else {
                    let tmp = c.acquire_temporary(ANY_REGISTERS)?;
                    let result = move_cr(c, 8, a, 8, &tmp)
                        .and_then(|()| move_rm(c, 8, &tmp, 8, b));
                    c.release_temporary(tmp.low);
                    result
                }
            } else {
                let low = Constant::new(Rc::new(ShiftMaskPromise::new(
                    a.value.clone(),
                    0,
                    0xffff_ffff,
                )));
                let high = Constant::new(Rc::new(ShiftMaskPromise::new(
                    a.value.clone(),
                    32,
                    0xffff_ffff,
                )));
                let bh = b.offset_by(4);

                move_cm(c, 4, &low, 4, b)?;
                move_cm(c, 4, &high, 4, &bh)
            }
        }

        _ => panic!("unsupported move size {b_size}"),
    }
}

/// Absolute-address load: materialize the address, then load through it.
pub(crate) fn move_ar(
    c: &mut Context,
    a_size: usize,
    a: &AddressOperand,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert!(c.word == WordSize::W64 || (a_size == 4 && b_size == 4));

    let constant = Constant::new(a.address.clone());
    let memory = MemoryOperand::new(b.low, 0);

    move_cr(c, a_size, &constant, b_size, b)?;
    move_mr(c, b_size, &memory, b_size, b)
}

pub(crate) fn move_z_rr(
    c: &mut Context,
    a_size: usize,
    a: &RegisterPair,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    let _ = b_size;

    match a_size {
        2 => {
            always_rex_rr(c, a_size, b, a);
            opcode2(c, 0x0f, 0xb7);
            modrm(c, 0xc0, a.low.code(), b.low.code());
            Ok(())
        }

        _ => panic!("unsupported zero-extension size {a_size}"),
    }
}

pub(crate) fn move_z_mr(
    c: &mut Context,
    a_size: usize,
    a: &MemoryOperand,
    b_size: usize,
    b: &RegisterPair,
) -> Result<(), AssemblerError> {
    debug_assert_eq!(b_size, c.word.bytes());
    debug_assert_eq!(a_size, 2);

    maybe_rex_rm(c, b_size, b, a);
    opcode2(c, 0x0f, 0xb7);
    modrm_sib_imm_rm(c, b, a);
    Ok(())
}
