use molten_x86::prelude::*;

use quickcheck_macros::quickcheck;
use std::rc::Rc;

fn assembler(word: WordSize) -> Assembler {
    let mut asm = Assembler::new(Rc::new(Architecture::new(word, Abi::SystemV)));
    asm.set_client(Box::new(TemporaryPool::default()));
    asm
}

/// Close the single block, lay it out at zero and write the final bytes.
fn finish(mut asm: Assembler) -> Vec<u8> {
    let block = asm.end_block(false);
    let end = block.resolve(0);
    let mut out = vec![0u8; end];
    asm.write_to(&mut out).expect("failed to write code");
    out
}

fn encode(
    word: WordSize,
    emit: impl FnOnce(&mut Assembler) -> Result<(), AssemblerError>,
) -> Vec<u8> {
    let mut asm = assembler(word);
    emit(&mut asm).expect("failed to emit");
    finish(asm)
}

#[test]
fn return_and_barriers() {
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply(Operation::LoadBarrier)?;
        asm.apply(Operation::StoreStoreBarrier)?;
        asm.apply(Operation::StoreLoadBarrier)?;
        asm.apply(Operation::Return)
    });
    assert_eq!(bytes, vec![0xc3]);
}

#[test]
fn move_constant_to_register_64() {
    // mov rax, 0x1234
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::constant(0x1234),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(
        bytes,
        vec![0x48, 0xb8, 0x34, 0x12, 0, 0, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn add_small_constant_uses_imm8_form() {
    // add ecx, 1
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Add,
            4,
            &Operand::constant(1),
            4,
            &Operand::register(RCX),
            4,
            &Operand::register(RCX),
        )
    });
    assert_eq!(bytes, vec![0x83, 0xc1, 0x01]);
}

#[test]
fn jump_displacement_is_pc_relative() {
    // jmp to offset 0x10 emitted at offset 0: e9 with displacement 11.
    let mut asm = assembler(WordSize::W64);
    let target = asm.code_promise(0x10);
    asm.apply_unary(UnaryOperation::Jump, 8, &Operand::promised_constant(target))
        .unwrap();
    let bytes = finish(asm);
    assert_eq!(bytes, vec![0xe9, 0x0b, 0, 0, 0]);
}

#[test]
fn compare_registers_64() {
    // cmp rax, rbx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Compare,
            8,
            &Operand::register(RBX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x39, 0xd8]);
}

#[test]
fn aligned_call_pads_displacement_to_boundary() {
    let mut asm = assembler(WordSize::W64);
    let target = asm.code_promise(0x20);
    asm.apply_unary(
        UnaryOperation::AlignedCall,
        8,
        &Operand::promised_constant(target),
    )
    .unwrap();

    let block = asm.end_block(false);
    let end = block.resolve(1);
    assert_eq!(end, 8);

    let mut out = vec![0u8; end];
    asm.write_to(&mut out).unwrap();

    // Two NOPs push the call to offset 3; its displacement occupies
    // offsets 4..8, so the last byte sits at 7 ≡ 3 (mod 4).
    assert_eq!(&out[1..3], &[0x90, 0x90]);
    assert_eq!(out[3], 0xe8);
    assert_eq!(&out[4..8], &(0x20i32 - 8).to_le_bytes());
}

#[test]
fn move_64_bit_constant_on_32_bit_word_splits_halves() {
    // mov eax, 0 / mov edx, 1
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::constant(0x1_0000_0000),
            8,
            &Operand::register_pair(RAX, RDX),
        )
    });
    assert_eq!(
        bytes,
        vec![0xb8, 0, 0, 0, 0, 0xba, 0x01, 0, 0, 0]
    );
}

#[test]
fn move_between_registers() {
    // mov rax, rcx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x89, 0xc8]);
}

#[test]
fn move_to_same_register_is_elided() {
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert!(bytes.is_empty());
}

#[test]
fn move_extended_registers_sets_rex_bits() {
    // mov r8, r9
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::register(R9),
            8,
            &Operand::register(R8),
        )
    });
    assert_eq!(bytes, vec![0x4d, 0x89, 0xc8]);
}

#[test]
fn sign_extending_promotion_uses_movsxd() {
    // movsxd rax, ecx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            4,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x63, 0xc1]);
}

#[test]
fn byte_and_word_moves_sign_extend() {
    // movsx eax, cl (with the mandatory REX for uniform byte access)
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            1,
            &Operand::register(RCX),
            4,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x40, 0x0f, 0xbe, 0xc1]);

    // movsx eax, cx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            2,
            &Operand::register(RCX),
            4,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x40, 0x0f, 0xbf, 0xc1]);
}

#[test]
fn zero_extending_word_move() {
    // movzx eax, cx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::MoveZ,
            2,
            &Operand::register(RCX),
            4,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x40, 0x0f, 0xb7, 0xc1]);
}

#[test]
fn memory_loads() {
    // mov rax, [rbp + 16]
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::memory(RBP, 16),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x8b, 0x45, 0x10]);

    // rsp base requires the SIB escape: mov rcx, [rsp + 8]
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::memory(RSP, 8),
            8,
            &Operand::register(RCX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x8b, 0x4c, 0x24, 0x08]);

    // scaled index: mov rax, [rbx + rcx*4 + 8]
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::Memory(MemoryOperand::indexed(RBX, 8, RCX, 4)),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x8b, 0x44, 0x8b, 0x08]);

    // 32-bit displacement form: mov rax, [rbp + 0x1000]
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::memory(RBP, 0x1000),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x8b, 0x85, 0x00, 0x10, 0x00, 0x00]);
}

#[test]
fn memory_store() {
    // mov [rsp + 8], rcx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::register(RCX),
            8,
            &Operand::memory(RSP, 8),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x89, 0x4c, 0x24, 0x08]);
}

#[test]
fn constant_store_uses_imm32_when_it_fits() {
    // mov dword [rax], 7
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            4,
            &Operand::constant(7),
            4,
            &Operand::memory(RAX, 0),
        )
    });
    assert_eq!(bytes, vec![0xc7, 0x00, 0x07, 0, 0, 0]);

    // mov qword [rax], 7 still fits an imm32
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::constant(7),
            8,
            &Operand::memory(RAX, 0),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xc7, 0x00, 0x07, 0, 0, 0]);
}

#[test]
fn oversize_constant_store_spills_through_a_temporary() {
    // mov rsi, imm64 / mov [rax], rsi
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::constant(0x1_0000_0000),
            8,
            &Operand::memory(RAX, 0),
        )
    });
    assert_eq!(
        bytes,
        vec![0x48, 0xbe, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x48, 0x89, 0x30]
    );
}

#[test]
fn oversize_alu_constant_spills_through_a_temporary() {
    // mov rsi, imm64 / add rcx, rsi
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Add,
            8,
            &Operand::constant(0x1_0000_0000),
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RCX),
        )
    });
    assert_eq!(
        bytes,
        vec![0x48, 0xbe, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x48, 0x01, 0xf1]
    );
}

#[test]
fn add_zero_is_elided() {
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Add,
            8,
            &Operand::constant(0),
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RCX),
        )
    });
    assert!(bytes.is_empty());
}

#[quickcheck]
fn constant_add_folds_to_shortest_immediate(v: i32) -> bool {
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Add,
            8,
            &Operand::constant(v as i64),
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RCX),
        )
    });

    if v == 0 {
        bytes.is_empty()
    } else if (-128..128).contains(&v) {
        bytes == vec![0x48, 0x83, 0xc1, v as u8]
    } else {
        let mut expected = vec![0x48, 0x81, 0xc1];
        expected.extend_from_slice(&v.to_le_bytes());
        bytes == expected
    }
}

#[test]
fn alu_register_forms() {
    let cases: [(TernaryOperation, u8); 5] = [
        (TernaryOperation::Add, 0x01),
        (TernaryOperation::Subtract, 0x29),
        (TernaryOperation::And, 0x21),
        (TernaryOperation::Or, 0x09),
        (TernaryOperation::Xor, 0x31),
    ];

    for (op, opcode) in cases {
        let bytes = encode(WordSize::W64, |asm| {
            asm.apply_ternary(
                op,
                8,
                &Operand::register(RCX),
                8,
                &Operand::register(RAX),
                8,
                &Operand::register(RAX),
            )
        });
        assert_eq!(bytes, vec![0x48, opcode, 0xc8], "{op:?}");
    }
}

#[test]
fn alu_constant_forms() {
    let cases: [(TernaryOperation, u8); 5] = [
        (TernaryOperation::Add, 0xc1),
        (TernaryOperation::Subtract, 0xe9),
        (TernaryOperation::And, 0xe1),
        (TernaryOperation::Or, 0xc9),
        (TernaryOperation::Xor, 0xf1),
    ];

    for (op, modrm) in cases {
        let bytes = encode(WordSize::W64, |asm| {
            asm.apply_ternary(
                op,
                8,
                &Operand::constant(3),
                8,
                &Operand::register(RCX),
                8,
                &Operand::register(RCX),
            )
        });
        assert_eq!(bytes, vec![0x48, 0x83, modrm, 0x03], "{op:?}");
    }
}

#[test]
fn multiply_forms() {
    // imul rax, rcx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Multiply,
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x0f, 0xaf, 0xc1]);

    // imul rax, rax, 3
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Multiply,
            8,
            &Operand::constant(3),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x6b, 0xc0, 0x03]);

    // imul rax, rax, 0x1234
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Multiply,
            8,
            &Operand::constant(0x1234),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x69, 0xc0, 0x34, 0x12, 0, 0]);

    // multiply by one is a no-op
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Multiply,
            8,
            &Operand::constant(1),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert!(bytes.is_empty());
}

#[test]
fn divide_and_remainder_go_through_rax_rdx() {
    // cqo / idiv rsi
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Divide,
            8,
            &Operand::register(RSI),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x99, 0x48, 0xf7, 0xfe]);

    // cqo / idiv rsi / mov rax, rdx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::Remainder,
            8,
            &Operand::register(RSI),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x99, 0x48, 0xf7, 0xfe, 0x48, 0x89, 0xd0]);
}

#[test]
fn shift_forms() {
    // shl rax, 1
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::ShiftLeft,
            8,
            &Operand::constant(1),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xd1, 0xe0]);

    // shl rax, 5
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::ShiftLeft,
            8,
            &Operand::constant(5),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xc1, 0xe0, 0x05]);

    // sar rax, cl / shr rax, cl
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::ShiftRight,
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xd3, 0xf8]);

    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::UnsignedShiftRight,
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xd3, 0xe8]);
}

#[test]
fn compare_constant_and_memory_forms() {
    // cmp rcx, 0x1234
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Compare,
            8,
            &Operand::constant(0x1234),
            8,
            &Operand::register(RCX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x81, 0xf9, 0x34, 0x12, 0, 0]);

    // cmp qword [rbp + 8], 3 (the /7 extension)
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Compare,
            8,
            &Operand::constant(3),
            8,
            &Operand::memory(RBP, 8),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x83, 0x7d, 0x08, 0x03]);

    // cmp [rbp + 8], rcx
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Compare,
            8,
            &Operand::register(RCX),
            8,
            &Operand::memory(RBP, 8),
        )
    });
    assert_eq!(bytes, vec![0x48, 0x39, 0x4d, 0x08]);
}

#[test]
fn negate_register() {
    // neg rax
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_binary(
            BinaryOperation::Negate,
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });
    assert_eq!(bytes, vec![0x48, 0xf7, 0xd8]);
}

#[test]
fn conditional_jumps_use_two_byte_opcodes() {
    let cases: [(UnaryOperation, u8); 6] = [
        (UnaryOperation::JumpIfEqual, 0x84),
        (UnaryOperation::JumpIfNotEqual, 0x85),
        (UnaryOperation::JumpIfGreater, 0x8f),
        (UnaryOperation::JumpIfGreaterOrEqual, 0x8d),
        (UnaryOperation::JumpIfLess, 0x8c),
        (UnaryOperation::JumpIfLessOrEqual, 0x8e),
    ];

    for (op, condition) in cases {
        let mut asm = assembler(WordSize::W64);
        let target = asm.code_promise(0x40);
        asm.apply_unary(op, 8, &Operand::promised_constant(target))
            .unwrap();
        let bytes = finish(asm);

        let mut expected = vec![0x0f, condition];
        expected.extend_from_slice(&(0x40i32 - 6).to_le_bytes());
        assert_eq!(bytes, expected, "{op:?}");
    }
}

#[test]
fn indirect_calls_and_jumps() {
    // call rax / jmp rax / call [rbx + 8] / jmp [rbx + 8]
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_unary(UnaryOperation::Call, 8, &Operand::register(RAX))?;
        asm.apply_unary(UnaryOperation::Jump, 8, &Operand::register(RAX))?;
        asm.apply_unary(UnaryOperation::Call, 8, &Operand::memory(RBX, 8))?;
        asm.apply_unary(UnaryOperation::Jump, 8, &Operand::memory(RBX, 8))
    });
    assert_eq!(
        bytes,
        vec![
            0xff, 0xd0, // call rax
            0xff, 0xe0, // jmp rax
            0xff, 0x53, 0x08, // call [rbx + 8]
            0xff, 0x63, 0x08, // jmp [rbx + 8]
        ]
    );
}

#[test]
fn long_call_materializes_target_in_r10() {
    let mut asm = assembler(WordSize::W64);
    let target = asm.code_promise(0x40);
    asm.apply_unary(
        UnaryOperation::LongCall,
        8,
        &Operand::promised_constant(target),
    )
    .unwrap();

    let block = asm.end_block(false);
    let end = block.resolve(0);
    assert_eq!(end, 13);

    let mut out = vec![0u8; end];
    asm.write_to(&mut out).unwrap();

    assert_eq!(&out[0..2], &[0x49, 0xba]);
    assert_eq!(&out[10..13], &[0x41, 0xff, 0xd2]);

    let imm = u64::from_le_bytes(out[2..10].try_into().unwrap());
    assert_eq!(imm, out.as_ptr() as u64 + 0x40);
}

#[test]
fn long_jump_patches_late_through_a_listener() {
    let mut asm = assembler(WordSize::W64);
    let target = Rc::new(DeferredPromise::new());
    asm.apply_unary(
        UnaryOperation::LongJump,
        8,
        &Operand::promised_constant(target.clone()),
    )
    .unwrap();

    let block = asm.end_block(false);
    let end = block.resolve(0);
    let mut out = vec![0u8; end];
    asm.write_to(&mut out).unwrap();

    assert_eq!(&out[0..2], &[0x49, 0xba]);
    assert_eq!(&out[10..13], &[0x41, 0xff, 0xe2]);
    assert_eq!(&out[2..10], &[0u8; 8]);

    unsafe { target.resolve(0x7654_3210).unwrap() };
    let imm = u64::from_le_bytes(out[2..10].try_into().unwrap());
    assert_eq!(imm, 0x7654_3210);
}

#[test]
fn stack_operations() {
    // push rax / push r9 / pop rax / pop qword [rbx + 8]
    let bytes = encode(WordSize::W64, |asm| {
        asm.push_register(8, &RegisterPair::new(RAX))?;
        asm.push_register(8, &RegisterPair::new(R9))?;
        asm.pop_register(8, &RegisterPair::new(RAX))?;
        asm.pop_memory(8, &MemoryOperand::new(RBX, 8))
    });
    assert_eq!(
        bytes,
        vec![
            0x50, // push rax
            0x41, 0x51, // push r9
            0x58, // pop rax
            0x8f, 0x43, 0x08, // pop qword [rbx + 8]
        ]
    );

    // 32-bit pop into a register sign-extends on a 64-bit word.
    let bytes = encode(WordSize::W64, |asm| {
        asm.pop_register(4, &RegisterPair::new(RCX))
    });
    assert_eq!(bytes, vec![0x59, 0x48, 0x63, 0xc9]);

    // Pairs split on a 32-bit word, high half first on push.
    let bytes = encode(WordSize::W32, |asm| {
        asm.push_register(8, &RegisterPair::pair(RSI, RDI))?;
        asm.pop_register(8, &RegisterPair::pair(RSI, RDI))
    });
    assert_eq!(bytes, vec![0x57, 0x56, 0x5e, 0x5f]);
}

#[test]
fn frame_prologue_and_epilogue() {
    let bytes = encode(WordSize::W64, |asm| asm.allocate_frame(2));
    assert_eq!(
        bytes,
        vec![
            0x55, // push rbp
            0x48, 0x89, 0xe5, // mov rbp, rsp
            0x48, 0x83, 0xec, 0x10, // sub rsp, 16
        ]
    );

    let bytes = encode(WordSize::W64, |asm| asm.pop_frame());
    assert_eq!(
        bytes,
        vec![
            0x48, 0x89, 0xec, // mov rsp, rbp
            0x5d, // pop rbp
        ]
    );

    let bytes = encode(WordSize::W64, |asm| {
        asm.pop_frame_and_pop_arguments_and_return(2)
    });
    assert_eq!(
        bytes,
        vec![0x48, 0x89, 0xec, 0x5d, 0xc3] // epilogue + ret
    );
}

#[test]
fn save_frame_stores_pointers_into_thread() {
    let bytes = encode(WordSize::W64, |asm| asm.save_frame(0x10, 0x18));
    assert_eq!(
        bytes,
        vec![
            0x48, 0x89, 0x63, 0x10, // mov [rbx + 0x10], rsp
            0x48, 0x89, 0x6b, 0x18, // mov [rbx + 0x18], rbp
        ]
    );
}

#[test]
fn push_frame_fills_argument_registers() {
    let bytes = encode(WordSize::W64, |asm| {
        asm.push_frame(&[
            FrameArg {
                size: 8,
                operand: Operand::constant(42),
            },
            FrameArg {
                size: 8,
                operand: Operand::register(RAX),
            },
        ])
    });

    let mut expected = vec![
        0x55, // push rbp
        0x48, 0x89, 0xe5, // mov rbp, rsp
        0x48, 0x83, 0xec, 0x10, // sub rsp, 16
        0x48, 0xbf, // mov rdi, imm64
    ];
    expected.extend_from_slice(&42u64.to_le_bytes());
    expected.extend_from_slice(&[0x48, 0x89, 0xc6]); // mov rsi, rax
    assert_eq!(bytes, expected);
}

#[test]
fn unsupported_combinations_are_reported() {
    let mut asm = assembler(WordSize::W64);

    let err = asm
        .apply_ternary(
            TernaryOperation::Divide,
            8,
            &Operand::constant(3),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
        .unwrap_err();
    assert!(err.is_unsupported());

    let err = asm
        .apply_unary(UnaryOperation::Call, 8, &Operand::address(Rc::new(ResolvedPromise::new(0))))
        .unwrap_err();
    assert!(err.is_unsupported());
}

/* 32-bit word */

#[test]
fn pair_add_links_with_carry() {
    // add esi, ecx / adc edi, ebx
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_ternary(
            TernaryOperation::Add,
            8,
            &Operand::register_pair(RCX, RBX),
            8,
            &Operand::register_pair(RSI, RDI),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });
    assert_eq!(bytes, vec![0x01, 0xce, 0x11, 0xdf]);
}

#[test]
fn pair_subtract_links_with_borrow() {
    // sub esi, ecx / sbb edi, ebx
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_ternary(
            TernaryOperation::Subtract,
            8,
            &Operand::register_pair(RCX, RBX),
            8,
            &Operand::register_pair(RSI, RDI),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });
    assert_eq!(bytes, vec![0x29, 0xce, 0x19, 0xdf]);
}

#[test]
fn pair_constant_subtract_uses_borrow_immediate() {
    // sub esi, 5 / sbb edi, 1
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_ternary(
            TernaryOperation::Subtract,
            8,
            &Operand::constant(0x1_0000_0005),
            8,
            &Operand::register_pair(RSI, RDI),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });
    assert_eq!(bytes, vec![0x83, 0xee, 0x05, 0x83, 0xdf, 0x01]);
}

#[test]
fn pair_move_cycle_becomes_exchange() {
    // (eax, ecx) -> (ecx, eax) is a cycle: xchg ecx, eax
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::register_pair(RAX, RCX),
            8,
            &Operand::register_pair(RCX, RAX),
        )
    });
    assert_eq!(bytes, vec![0x87, 0xc1]);
}

#[test]
fn promotion_to_pair_uses_cdq() {
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            4,
            &Operand::register(RAX),
            8,
            &Operand::register_pair(RAX, RDX),
        )
    });
    assert_eq!(bytes, vec![0x99]);
}

#[test]
fn pair_shift_left_uses_shld_sequence() {
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_ternary(
            TernaryOperation::ShiftLeft,
            4,
            &Operand::register(RCX),
            8,
            &Operand::register_pair(RSI, RDI),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });
    assert_eq!(
        bytes,
        vec![
            0x0f, 0xa5, 0xf7, // shld edi, esi, cl
            0xd3, 0xe6, // shl esi, cl
            0x83, 0xf9, 0x20, // cmp ecx, 32
            0x0f, 0x8c, 0x04, 0, 0, 0, // jl past the fix-up
            0x89, 0xf7, // mov edi, esi
            0x31, 0xf6, // xor esi, esi
        ]
    );
}

#[test]
fn pair_constant_store_splits_memory_halves() {
    // mov [eax], low / mov [eax + 4], high
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::constant(0x1_1234_5678),
            8,
            &Operand::memory(RAX, 0),
        )
    });
    assert_eq!(
        bytes,
        vec![
            0xc7, 0x00, 0x78, 0x56, 0x34, 0x12, // mov dword [eax], 0x12345678
            0xc7, 0x40, 0x04, 0x01, 0, 0, 0, // mov dword [eax + 4], 1
        ]
    );
}

#[test]
fn pair_load_splits_memory_halves() {
    // mov esi, [eax + 8] / mov edi, [eax + 12]
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_binary(
            BinaryOperation::Move,
            8,
            &Operand::memory(RAX, 8),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });
    assert_eq!(
        bytes,
        vec![0x8b, 0x70, 0x08, 0x8b, 0x78, 0x0c]
    );
}

#[test]
fn long_compare_on_64_bit_word() {
    let bytes = encode(WordSize::W64, |asm| {
        asm.apply_ternary(
            TernaryOperation::LongCompare,
            8,
            &Operand::register(RCX),
            8,
            &Operand::register(RAX),
            8,
            &Operand::register(RAX),
        )
    });

    assert_eq!(bytes.len(), 55);
    assert_eq!(&bytes[0..3], &[0x48, 0x39, 0xc8]); // cmp rax, rcx
    assert_eq!(&bytes[3..5], &[0x0f, 0x8c]); // jl
    assert_eq!(&bytes[5..9], &21i32.to_le_bytes());
    assert_eq!(&bytes[9..11], &[0x0f, 0x8f]); // jg
    assert_eq!(&bytes[11..15], &30i32.to_le_bytes());
    // zero / minus-one / plus-one materializations
    assert_eq!(&bytes[15..17], &[0x48, 0xb8]);
    assert_eq!(&bytes[30..32], &[0x48, 0xb8]);
    assert_eq!(i64::from_le_bytes(bytes[32..40].try_into().unwrap()), -1);
    assert_eq!(&bytes[45..47], &[0x48, 0xb8]);
    assert_eq!(i64::from_le_bytes(bytes[47..55].try_into().unwrap()), 1);
}

#[test]
fn long_compare_on_32_bit_word() {
    let bytes = encode(WordSize::W32, |asm| {
        asm.apply_ternary(
            TernaryOperation::LongCompare,
            8,
            &Operand::register_pair(RCX, RBX),
            8,
            &Operand::register_pair(RSI, RDI),
            8,
            &Operand::register_pair(RSI, RDI),
        )
    });

    assert_eq!(bytes.len(), 53);
    assert_eq!(&bytes[0..2], &[0x39, 0xdf]); // cmp edi, ebx (high halves)
    assert_eq!(&bytes[2..4], &[0x0f, 0x8c]); // jl
    assert_eq!(&bytes[4..8], &30i32.to_le_bytes());
    assert_eq!(&bytes[8..10], &[0x0f, 0x8f]); // jg
    assert_eq!(&bytes[10..14], &34i32.to_le_bytes());
    assert_eq!(&bytes[14..16], &[0x39, 0xce]); // cmp esi, ecx (low halves)
    assert_eq!(&bytes[16..18], &[0x0f, 0x82]); // jb
    assert_eq!(&bytes[18..22], &16i32.to_le_bytes());
    assert_eq!(&bytes[22..24], &[0x0f, 0x87]); // ja
    assert_eq!(&bytes[24..28], &20i32.to_le_bytes());
    assert_eq!(bytes[28], 0xbe); // mov esi, 0
    assert_eq!(bytes[38], 0xbe); // mov esi, -1
    assert_eq!(
        i32::from_le_bytes(bytes[39..43].try_into().unwrap()),
        -1
    );
    assert_eq!(bytes[48], 0xbe); // mov esi, 1
    assert_eq!(i32::from_le_bytes(bytes[49..53].try_into().unwrap()), 1);
}
