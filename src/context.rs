//! Emission state shared by every encoder

use crate::arch::WordSize;
use crate::block::Block;
use crate::buffer::CodeBuffer;
use crate::client::Client;
use crate::error::AssemblerError;
use crate::operand::{RegId, RegisterPair};
use crate::planner::RegisterMask;
use crate::promise::{CodePromise, OffsetPromise, PromiseRef};
use crate::task::Task;

use std::cell::Cell;
use std::rc::Rc;

/// Mutable emission state: the code buffer, the pending relocation list,
/// the block list, and the handle to the register-allocation client.
pub(crate) struct Context {
    pub(crate) code: CodeBuffer,
    pub(crate) tasks: Vec<Task>,
    pub(crate) blocks: Vec<Rc<Block>>,
    pub(crate) result: Rc<Cell<Option<u64>>>,
    pub(crate) client: Option<Box<dyn Client>>,
    pub(crate) word: WordSize,
}

impl Context {
    pub(crate) fn new(word: WordSize) -> Self {
        Self {
            code: CodeBuffer::new(),
            tasks: Vec::new(),
            blocks: vec![Rc::new(Block::new(0))],
            result: Rc::new(Cell::new(None)),
            client: None,
            word,
        }
    }

    pub(crate) fn last_block(&self) -> &Rc<Block> {
        self.blocks.last().expect("the block list is never empty")
    }

    /// Capture the current emit position as a deferred-resolving offset.
    pub(crate) fn offset(&self) -> PromiseRef {
        let block = self.last_block();
        Rc::new(OffsetPromise::new(
            block.clone(),
            self.code.len(),
            block.padding_count(),
        ))
    }

    /// Promise for the absolute address of `offset` in the final buffer.
    pub(crate) fn code_promise(&self, offset: usize) -> PromiseRef {
        Rc::new(CodePromise::new(self.result.clone(), offset))
    }

    /// Record an alignment-padding point at the current emit position.
    pub(crate) fn add_padding_point(&mut self) {
        let offset = self.code.len();
        self.last_block().push_padding(offset);
    }

    pub(crate) fn append_offset_task(
        &mut self,
        promise: PromiseRef,
        instruction_offset: PromiseRef,
        instruction_size: usize,
    ) {
        self.tasks.push(Task::Offset {
            promise,
            instruction_offset,
            instruction_size,
        });
    }

    pub(crate) fn append_immediate_task(
        &mut self,
        promise: PromiseRef,
        offset: PromiseRef,
        size: usize,
        promise_offset: usize,
    ) {
        self.tasks.push(Task::Immediate {
            promise,
            offset,
            size,
            promise_offset,
        });
    }

    pub(crate) fn acquire_temporary(
        &mut self,
        mask: RegisterMask,
    ) -> Result<RegisterPair, AssemblerError> {
        let client = self
            .client
            .as_deref_mut()
            .ok_or(AssemblerError::ClientRequired)?;
        Ok(RegisterPair::new(client.acquire_temporary(mask)))
    }

    pub(crate) fn release_temporary(&mut self, reg: RegId) {
        if let Some(client) = self.client.as_deref_mut() {
            client.release_temporary(reg);
        }
    }

    pub(crate) fn save(&mut self, reg: RegId) -> Result<(), AssemblerError> {
        let client = self
            .client
            .as_deref_mut()
            .ok_or(AssemblerError::ClientRequired)?;
        client.save(reg);
        Ok(())
    }
}
