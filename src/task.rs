//! Queued relocations applied after the final byte copy

use crate::error::AssemblerError;
use crate::promise::{copy_value, patch_offset, Listener, Promise, PromiseRef};

/// A deferred byte patch queued during emission and applied once the final
/// buffer is in place.
///
/// Each task either patches immediately (its promise already resolved) or
/// attaches a [`Listener`] that patches when the promise resolves. Tasks
/// patch disjoint buffer regions, so their run order is irrelevant, and a
/// second run produces the same bytes.
pub enum Task {
    /// Patch a 32-bit pc-relative displacement:
    /// `target − (instruction_start + instruction_size)`.
    Offset {
        /// Promise for the absolute branch target.
        promise: PromiseRef,
        /// Promise for the instruction's final buffer offset.
        instruction_offset: PromiseRef,
        /// Instruction length; the displacement is its last four bytes.
        instruction_size: usize,
    },
    /// Copy the promise value verbatim as a 4- or 8-byte immediate.
    Immediate {
        /// Promise for the immediate value.
        promise: PromiseRef,
        /// Promise for the immediate field's final buffer offset.
        offset: PromiseRef,
        /// Immediate width in bytes.
        size: usize,
        /// Distance from the immediate field to the next instruction,
        /// reported by the late-patch listener.
        promise_offset: usize,
    },
}

impl Task {
    /// Apply the relocation against the final buffer based at `result`.
    ///
    /// # Safety
    ///
    /// `result` must be the base of the live output buffer that the
    /// recorded offset promises index into.
    pub(crate) unsafe fn run(&self, result: *mut u8) -> Result<(), AssemblerError> {
        match self {
            Self::Offset {
                promise,
                instruction_offset,
                instruction_size,
            } => {
                let instruction = result.add(instruction_offset.value()? as usize);
                if promise.resolved() {
                    patch_offset(instruction, *instruction_size, promise.value()?)?;
                    Ok(())
                } else if promise.listen(Listener::Offset {
                    instruction,
                    instruction_size: *instruction_size,
                }) {
                    Ok(())
                } else {
                    Err(AssemblerError::UnresolvedPromise)
                }
            }

            Self::Immediate {
                promise,
                offset,
                size,
                promise_offset,
            } => {
                let dst = result.add(offset.value()? as usize);
                if promise.resolved() {
                    copy_value(dst, promise.value()?, *size);
                    Ok(())
                } else if promise.listen(Listener::Immediate {
                    dst,
                    size: *size,
                    offset: *promise_offset,
                }) {
                    Ok(())
                } else {
                    Err(AssemblerError::UnresolvedPromise)
                }
            }
        }
    }
}
