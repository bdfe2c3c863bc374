//! Operation dispatch tables
//!
//! Three flat arrays of encoder pointers indexed by packed keys over
//! (operation, operand types). Binary and ternary operations share one
//! table; ternary opcodes occupy the indices past `BinaryOperation::COUNT`.
//! An unpopulated cell is a combination the planner never admits.

use crate::context::Context;
use crate::encoder::{alu, data, flow};
use crate::error::AssemblerError;
use crate::operand::{Operand, OperandType};
use crate::operation::{BinaryOperation, Operation, TernaryOperation, UnaryOperation};

use strum::EnumCount;

pub(crate) type OperationEncoder = fn(&mut Context) -> Result<(), AssemblerError>;
pub(crate) type UnaryEncoder = fn(&mut Context, usize, &Operand) -> Result<(), AssemblerError>;
pub(crate) type BinaryEncoder =
    fn(&mut Context, usize, &Operand, usize, &Operand) -> Result<(), AssemblerError>;

const OPERATION_TABLE_LEN: usize = Operation::COUNT;
const UNARY_TABLE_LEN: usize = UnaryOperation::COUNT * OperandType::COUNT;
const BINARY_SPAN: usize = BinaryOperation::COUNT + TernaryOperation::COUNT;
const BINARY_TABLE_LEN: usize = BINARY_SPAN * OperandType::COUNT * OperandType::COUNT;

const fn unary_index(op: UnaryOperation, a: OperandType) -> usize {
    op as usize + UnaryOperation::COUNT * a as usize
}

const fn binary_index(op: BinaryOperation, a: OperandType, b: OperandType) -> usize {
    op as usize + BINARY_SPAN * (a as usize + OperandType::COUNT * b as usize)
}

const fn ternary_index(op: TernaryOperation, a: OperandType, b: OperandType) -> usize {
    BinaryOperation::COUNT
        + op as usize
        + BINARY_SPAN * (a as usize + OperandType::COUNT * b as usize)
}

macro_rules! unary {
    ($table:expr, $op:ident, $ty:ident, $encoder:path) => {{
        let f: UnaryEncoder = |c, size, operand| match operand {
            Operand::$ty(a) => $encoder(c, size, a),
            _ => unreachable!(),
        };
        $table[unary_index(UnaryOperation::$op, OperandType::$ty)] = Some(f);
    }};
}

macro_rules! binary {
    ($table:expr, $op:ident, ($a:ident, $b:ident), $encoder:path) => {{
        let f: BinaryEncoder = |c, a_size, a, b_size, b| match (a, b) {
            (Operand::$a(a), Operand::$b(b)) => $encoder(c, a_size, a, b_size, b),
            _ => unreachable!(),
        };
        $table[binary_index(BinaryOperation::$op, OperandType::$a, OperandType::$b)] = Some(f);
    }};
}

macro_rules! ternary {
    ($table:expr, $op:ident, ($a:ident, $b:ident), $encoder:path) => {{
        let f: BinaryEncoder = |c, a_size, a, b_size, b| match (a, b) {
            (Operand::$a(a), Operand::$b(b)) => $encoder(c, a_size, a, b_size, b),
            _ => unreachable!(),
        };
        $table[ternary_index(TernaryOperation::$op, OperandType::$a, OperandType::$b)] = Some(f);
    }};
}

pub(crate) struct DispatchTables {
    operations: [Option<OperationEncoder>; OPERATION_TABLE_LEN],
    unary: [Option<UnaryEncoder>; UNARY_TABLE_LEN],
    binary: [Option<BinaryEncoder>; BINARY_TABLE_LEN],
}

impl DispatchTables {
    pub(crate) fn new() -> Self {
        let mut operations: [Option<OperationEncoder>; OPERATION_TABLE_LEN] =
            [None; OPERATION_TABLE_LEN];
        let mut unary: [Option<UnaryEncoder>; UNARY_TABLE_LEN] = [None; UNARY_TABLE_LEN];
        let mut binary: [Option<BinaryEncoder>; BINARY_TABLE_LEN] = [None; BINARY_TABLE_LEN];

        operations[Operation::Return as usize] = Some(flow::return_);
        operations[Operation::LoadBarrier as usize] = Some(flow::ignore);
        operations[Operation::StoreStoreBarrier as usize] = Some(flow::ignore);
        operations[Operation::StoreLoadBarrier as usize] = Some(flow::ignore);

        unary!(unary, Call, Constant, flow::call_c);
        unary!(unary, Call, Register, flow::call_r);
        unary!(unary, Call, Memory, flow::call_m);

        unary!(unary, AlignedCall, Constant, flow::aligned_call_c);

        unary!(unary, LongCall, Constant, flow::long_call_c);

        unary!(unary, Jump, Register, flow::jump_r);
        unary!(unary, Jump, Constant, flow::jump_c);
        unary!(unary, Jump, Memory, flow::jump_m);

        unary!(unary, AlignedJump, Constant, flow::aligned_jump_c);

        unary!(unary, JumpIfEqual, Constant, flow::jump_if_equal_c);
        unary!(unary, JumpIfNotEqual, Constant, flow::jump_if_not_equal_c);
        unary!(unary, JumpIfGreater, Constant, flow::jump_if_greater_c);
        unary!(
            unary,
            JumpIfGreaterOrEqual,
            Constant,
            flow::jump_if_greater_or_equal_c
        );
        unary!(unary, JumpIfLess, Constant, flow::jump_if_less_c);
        unary!(unary, JumpIfLessOrEqual, Constant, flow::jump_if_less_or_equal_c);

        unary!(unary, LongJump, Constant, flow::long_jump_c);

        binary!(binary, Negate, (Register, Register), alu::negate_rr);

        binary!(binary, Move, (Register, Register), data::move_rr);
        binary!(binary, Move, (Constant, Register), data::move_cr);
        binary!(binary, Move, (Memory, Register), data::move_mr);
        binary!(binary, Move, (Register, Memory), data::move_rm);
        binary!(binary, Move, (Constant, Memory), data::move_cm);
        binary!(binary, Move, (Address, Register), data::move_ar);

        binary!(binary, MoveZ, (Register, Register), data::move_z_rr);
        binary!(binary, MoveZ, (Memory, Register), data::move_z_mr);

        binary!(binary, Compare, (Register, Register), alu::compare_rr);
        binary!(binary, Compare, (Constant, Register), alu::compare_cr);
        binary!(binary, Compare, (Constant, Memory), alu::compare_cm);
        binary!(binary, Compare, (Register, Memory), alu::compare_rm);

        ternary!(binary, Add, (Register, Register), alu::add_rr);
        ternary!(binary, Add, (Constant, Register), alu::add_cr);

        ternary!(binary, Subtract, (Constant, Register), alu::subtract_cr);
        ternary!(binary, Subtract, (Register, Register), alu::subtract_rr);

        ternary!(binary, And, (Register, Register), alu::and_rr);
        ternary!(binary, And, (Constant, Register), alu::and_cr);

        ternary!(binary, Or, (Register, Register), alu::or_rr);
        ternary!(binary, Or, (Constant, Register), alu::or_cr);

        ternary!(binary, Xor, (Register, Register), alu::xor_rr);
        ternary!(binary, Xor, (Constant, Register), alu::xor_cr);

        ternary!(binary, Multiply, (Register, Register), alu::multiply_rr);
        ternary!(binary, Multiply, (Constant, Register), alu::multiply_cr);

        ternary!(binary, Divide, (Register, Register), alu::divide_rr);

        ternary!(binary, Remainder, (Register, Register), alu::remainder_rr);

        ternary!(binary, LongCompare, (Constant, Register), alu::long_compare_cr);
        ternary!(binary, LongCompare, (Register, Register), alu::long_compare_rr);

        ternary!(binary, ShiftLeft, (Register, Register), alu::shift_left_rr);
        ternary!(binary, ShiftLeft, (Constant, Register), alu::shift_left_cr);

        ternary!(binary, ShiftRight, (Register, Register), alu::shift_right_rr);
        ternary!(binary, ShiftRight, (Constant, Register), alu::shift_right_cr);

        ternary!(
            binary,
            UnsignedShiftRight,
            (Register, Register),
            alu::unsigned_shift_right_rr
        );
        ternary!(
            binary,
            UnsignedShiftRight,
            (Constant, Register),
            alu::unsigned_shift_right_cr
        );

        Self {
            operations,
            unary,
            binary,
        }
    }

    pub(crate) fn operation(&self, op: Operation) -> Option<OperationEncoder> {
        self.operations[op as usize]
    }

    pub(crate) fn unary(&self, op: UnaryOperation, a: OperandType) -> Option<UnaryEncoder> {
        self.unary[unary_index(op, a)]
    }

    pub(crate) fn binary(
        &self,
        op: BinaryOperation,
        a: OperandType,
        b: OperandType,
    ) -> Option<BinaryEncoder> {
        self.binary[binary_index(op, a, b)]
    }

    pub(crate) fn ternary(
        &self,
        op: TernaryOperation,
        a: OperandType,
        b: OperandType,
    ) -> Option<BinaryEncoder> {
        self.binary[ternary_index(op, a, b)]
    }
}
