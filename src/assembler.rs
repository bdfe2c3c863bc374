//! Assembler façade: operation dispatch, frame helpers, block layout and
//! the final byte copy

use crate::arch::Architecture;
use crate::block::Block;
use crate::client::Client;
use crate::consts::{pad, PAD_BYTE, RBP, RBX, RCX, RSP};
use crate::context::Context;
use crate::encoder::{alu, data, flow};
use crate::error::AssemblerError;
use crate::operand::{Constant, MemoryOperand, Operand, RegId, RegisterPair};
use crate::operation::{BinaryOperation, Operation, TernaryOperation, UnaryOperation};
use crate::planner::ANY_REGISTERS;
use crate::promise::PromiseRef;

use std::rc::Rc;

use tracing::trace;

/// One argument for [`Assembler::push_frame`].
#[derive(Debug, Clone)]
pub struct FrameArg {
    /// Value size in bytes.
    pub size: usize,
    /// Where the value currently lives.
    pub operand: Operand,
}

/// The assembler: receives abstract operations, emits native bytes into an
/// internal buffer, and copies them to their final destination with
/// alignment padding and relocation patching.
pub struct Assembler {
    arch: Rc<Architecture>,
    ctx: Context,
}

impl Assembler {
    /// A fresh assembler for the given architecture.
    pub fn new(arch: Rc<Architecture>) -> Self {
        let ctx = Context::new(arch.word());
        Self { arch, ctx }
    }

    /// The architecture this assembler emits for.
    pub fn arch(&self) -> &Rc<Architecture> {
        &self.arch
    }

    /// Attach the register-allocation client. May be done once.
    pub fn set_client(&mut self, client: Box<dyn Client>) {
        debug_assert!(self.ctx.client.is_none());
        self.ctx.client = Some(client);
    }

    /// Number of bytes emitted so far.
    pub fn len(&self) -> usize {
        self.ctx.code.len()
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.ctx.code.is_empty()
    }

    /// Capture the current emit position as a deferred-resolving offset.
    pub fn offset(&self) -> PromiseRef {
        self.ctx.offset()
    }

    /// Promise for the absolute address of `offset` once the final buffer
    /// is in place.
    pub fn code_promise(&self, offset: usize) -> PromiseRef {
        self.ctx.code_promise(offset)
    }

    /// Emit a nullary operation.
    pub fn apply(&mut self, op: Operation) -> Result<(), AssemblerError> {
        let encoder = self
            .arch
            .tables()
            .operation(op)
            .ok_or(AssemblerError::UnsupportedOperation(op))?;
        encoder(&mut self.ctx)
    }

    /// Emit a unary operation.
    pub fn apply_unary(
        &mut self,
        op: UnaryOperation,
        a_size: usize,
        a: &Operand,
    ) -> Result<(), AssemblerError> {
        let encoder = self
            .arch
            .tables()
            .unary(op, a.ty())
            .ok_or(AssemblerError::UnsupportedUnaryOperation(op, a.ty()))?;
        encoder(&mut self.ctx, a_size, a)
    }

    /// Emit a binary operation.
    pub fn apply_binary(
        &mut self,
        op: BinaryOperation,
        a_size: usize,
        a: &Operand,
        b_size: usize,
        b: &Operand,
    ) -> Result<(), AssemblerError> {
        let encoder = self
            .arch
            .tables()
            .binary(op, a.ty(), b.ty())
            .ok_or(AssemblerError::UnsupportedBinaryOperation(op, a.ty(), b.ty()))?;
        encoder(&mut self.ctx, a_size, a, b_size, b)
    }

    /// Emit a ternary operation. The third operand names the destination
    /// and must match the second in size and type; the two-address encoders
    /// write the result through operand b.
    pub fn apply_ternary(
        &mut self,
        op: TernaryOperation,
        a_size: usize,
        a: &Operand,
        b_size: usize,
        b: &Operand,
        c_size: usize,
        c: &Operand,
    ) -> Result<(), AssemblerError> {
        debug_assert_eq!(b_size, c_size);
        debug_assert_eq!(b.ty(), c.ty());

        let encoder = self
            .arch
            .tables()
            .ternary(op, a.ty(), b.ty())
            .ok_or(AssemblerError::UnsupportedTernaryOperation(op, a.ty(), b.ty()))?;
        encoder(&mut self.ctx, a_size, a, b_size, b)
    }

    /// Push a register (pair) onto the stack.
    pub fn push_register(
        &mut self,
        size: usize,
        reg: &RegisterPair,
    ) -> Result<(), AssemblerError> {
        flow::push_r(&mut self.ctx, size, reg)
    }

    /// Pop the top of the stack into a register (pair).
    pub fn pop_register(&mut self, size: usize, reg: &RegisterPair) -> Result<(), AssemblerError> {
        flow::pop_r(&mut self.ctx, size, reg)
    }

    /// Pop the top of the stack into memory.
    pub fn pop_memory(
        &mut self,
        size: usize,
        dst: &MemoryOperand,
    ) -> Result<(), AssemblerError> {
        flow::pop_m(&mut self.ctx, size, dst)
    }

    /// Store the stack and frame pointers into the thread structure.
    pub fn save_frame(
        &mut self,
        stack_offset: i32,
        base_offset: i32,
    ) -> Result<(), AssemblerError> {
        let word = self.arch.word().bytes();

        self.apply_binary(
            BinaryOperation::Move,
            word,
            &Operand::register(RSP),
            word,
            &Operand::memory(RBX, stack_offset),
        )?;

        self.apply_binary(
            BinaryOperation::Move,
            word,
            &Operand::register(RBP),
            word,
            &Operand::memory(RBX, base_offset),
        )
    }

    /// Open a frame sized for `arguments` and move each argument into its
    /// ABI position (argument registers first, stack slots after).
    pub fn push_frame(&mut self, arguments: &[FrameArg]) -> Result<(), AssemblerError> {
        let word = self.arch.word().bytes();
        let footprint: usize = arguments
            .iter()
            .map(|argument| argument.size.div_ceil(word))
            .sum();

        self.allocate_frame(self.arch.align_frame_size(footprint))?;

        let mut offset = 0;
        for (index, argument) in arguments.iter().enumerate() {
            let padded = pad(argument.size, word);
            match self.arch.argument_register(index) {
                Some(reg) => {
                    self.apply_binary(
                        BinaryOperation::Move,
                        argument.size,
                        &argument.operand,
                        padded,
                        &Operand::register(reg),
                    )?;
                }
                None => {
                    self.apply_binary(
                        BinaryOperation::Move,
                        argument.size,
                        &argument.operand,
                        padded,
                        &Operand::memory(RSP, (offset * word) as i32),
                    )?;
                    offset += argument.size.div_ceil(word);
                }
            }
        }

        Ok(())
    }

    /// Emit the frame prologue: save the caller's frame pointer, establish
    /// the new one and reserve `footprint` words.
    pub fn allocate_frame(&mut self, footprint: usize) -> Result<(), AssemblerError> {
        let word = self.arch.word().bytes();

        let base = RegisterPair::new(RBP);
        flow::push_r(&mut self.ctx, word, &base)?;

        self.apply_binary(
            BinaryOperation::Move,
            word,
            &Operand::register(RSP),
            word,
            &Operand::register(RBP),
        )?;

        let stack = Operand::register(RSP);
        self.apply_ternary(
            TernaryOperation::Subtract,
            word,
            &Operand::constant((footprint * word) as i64),
            word,
            &stack,
            word,
            &stack,
        )
    }

    /// Grow the current frame by `footprint` words.
    pub fn adjust_frame(&mut self, footprint: usize) -> Result<(), AssemblerError> {
        let word = self.arch.word().bytes();

        let stack = Operand::register(RSP);
        self.apply_ternary(
            TernaryOperation::Subtract,
            word,
            &Operand::constant((footprint * word) as i64),
            word,
            &stack,
            word,
            &stack,
        )
    }

    /// Emit the frame epilogue: restore the caller's stack and frame
    /// pointers.
    pub fn pop_frame(&mut self) -> Result<(), AssemblerError> {
        let word = self.arch.word().bytes();

        self.apply_binary(
            BinaryOperation::Move,
            word,
            &Operand::register(RBP),
            word,
            &Operand::register(RSP),
        )?;

        flow::pop_r(&mut self.ctx, word, &RegisterPair::new(RBP))
    }

    /// Tear down the frame for a tail call, relocating the return address
    /// (and optional surrogates) so the callee returns to this frame's
    /// caller. `offset` is the argument-footprint difference in words.
    pub fn pop_frame_for_tail_call(
        &mut self,
        footprint: usize,
        offset: i32,
        return_address_surrogate: Option<RegId>,
        frame_pointer_surrogate: Option<RegId>,
    ) -> Result<(), AssemblerError> {
        if !self.arch.tail_calls() {
            return Err(AssemblerError::TailCallsDisabled);
        }

        if offset == 0 {
            return self.pop_frame();
        }

        let word = self.arch.word().bytes();
        let footprint = footprint as i32;
        let word_bytes = word as i32;

        let tmp = self.ctx.acquire_temporary(ANY_REGISTERS)?;
        let return_address_src = MemoryOperand::new(RSP, (footprint + 1) * word_bytes);
        let return_address_dst = MemoryOperand::new(RSP, (footprint - offset + 1) * word_bytes);
        let result = data::move_mr(&mut self.ctx, word, &return_address_src, word, &tmp)
            .and_then(|()| data::move_rm(&mut self.ctx, word, &tmp, word, &return_address_dst));
        self.ctx.release_temporary(tmp.low);
        result?;

        let base_src = MemoryOperand::new(RSP, footprint * word_bytes);
        data::move_mr(
            &mut self.ctx,
            word,
            &base_src,
            word,
            &RegisterPair::new(RBP),
        )?;

        let adjustment = Constant::resolved(((footprint - offset + 1) * word_bytes) as i64);
        alu::add_cr(
            &mut self.ctx,
            word,
            &adjustment,
            word,
            &RegisterPair::new(RSP),
        )?;

        if let Some(surrogate) = return_address_surrogate {
            debug_assert!(offset > 0);

            let dst = MemoryOperand::new(RSP, offset * word_bytes);
            data::move_rm(
                &mut self.ctx,
                word,
                &RegisterPair::new(surrogate),
                word,
                &dst,
            )?;
        }

        if let Some(surrogate) = frame_pointer_surrogate {
            debug_assert!(offset > 0);

            let dst = MemoryOperand::new(RSP, (offset - 1) * word_bytes);
            data::move_rm(
                &mut self.ctx,
                word,
                &RegisterPair::new(surrogate),
                word,
                &dst,
            )?;
        }

        Ok(())
    }

    /// Pop the frame, drop `argument_footprint` words of arguments and
    /// return to the caller.
    pub fn pop_frame_and_pop_arguments_and_return(
        &mut self,
        argument_footprint: usize,
    ) -> Result<(), AssemblerError> {
        self.pop_frame()?;

        let alignment = self.arch.stack_alignment_in_words();
        debug_assert!(argument_footprint >= alignment);
        debug_assert_eq!(argument_footprint % alignment, 0);

        if self.arch.tail_calls() && argument_footprint > alignment {
            let word = self.arch.word().bytes();
            let return_address = RegisterPair::new(RCX);
            flow::pop_r(&mut self.ctx, word, &return_address)?;

            let adjustment =
                Constant::resolved(((argument_footprint - alignment) * word) as i64);
            alu::add_cr(
                &mut self.ctx,
                word,
                &adjustment,
                word,
                &RegisterPair::new(RSP),
            )?;

            flow::jump_r(&mut self.ctx, word, &return_address)
        } else {
            flow::return_(&mut self.ctx)
        }
    }

    /// Pop the frame, reload the stack pointer from the thread structure
    /// and return to the caller.
    pub fn pop_frame_and_update_stack_and_return(
        &mut self,
        stack_offset_from_thread: i32,
    ) -> Result<(), AssemblerError> {
        self.pop_frame()?;

        let word = self.arch.word().bytes();
        let return_address = RegisterPair::new(RCX);
        flow::pop_r(&mut self.ctx, word, &return_address)?;

        let stack_src = MemoryOperand::new(RBX, stack_offset_from_thread);
        data::move_mr(
            &mut self.ctx,
            word,
            &stack_src,
            word,
            &RegisterPair::new(RSP),
        )?;

        flow::jump_r(&mut self.ctx, word, &return_address)
    }

    /// Close the current block, optionally opening a new one for further
    /// emission, and return it for resolution.
    pub fn end_block(&mut self, start_new: bool) -> Rc<Block> {
        let len = self.ctx.code.len();
        let block = self.ctx.last_block().clone();
        block.close(len);

        if start_new {
            self.ctx.blocks.push(Rc::new(Block::new(len)));
        }

        trace!(
            offset = block.offset(),
            size = block.size(),
            "closed code block"
        );
        block
    }

    /// Copy every resolved block into `dst` — injecting NOPs at each
    /// alignment-padding point — then run the queued relocation tasks.
    ///
    /// All blocks must have been closed and resolved; `dst` must cover the
    /// resolved layout and, for pc-relative and code-address promises to be
    /// meaningful, stay at its address while the emitted code is live.
    pub fn write_to(&mut self, dst: &mut [u8]) -> Result<(), AssemblerError> {
        trace!(
            blocks = self.ctx.blocks.len(),
            tasks = self.ctx.tasks.len(),
            bytes = self.ctx.code.len(),
            "writing code to destination"
        );

        self.ctx.result.set(Some(dst.as_mut_ptr() as u64));

        for block in &self.ctx.blocks {
            let start = block.start().ok_or(AssemblerError::UnresolvedBlock)?;
            let offset = block.offset();
            let code = self.ctx.code.as_slice();

            let mut index = 0;
            let mut padding = 0;
            for &point in block.paddings().iter() {
                let size = point - offset - index;
                dst[start + index + padding..start + index + padding + size]
                    .copy_from_slice(&code[offset + index..offset + index + size]);
                index += size;

                while (start + index + padding + 1) % 4 != 0 {
                    dst[start + index + padding] = PAD_BYTE;
                    padding += 1;
                }
            }

            let rest = block.size() - index;
            dst[start + index + padding..start + index + padding + rest]
                .copy_from_slice(&code[offset + index..offset + index + rest]);
        }

        let base = dst.as_mut_ptr();
        for task in &self.ctx.tasks {
            // SAFETY: every recorded offset lies within the resolved layout,
            // which the caller sized `dst` to hold.
            unsafe { task.run(base)? };
        }

        Ok(())
    }
}
