//! Register-allocation client interface

use crate::operand::RegId;
use crate::planner::{register_bit, RegisterMask};

/// Services the external register allocator provides to the encoders.
///
/// Encoders treat these as opaque calls and pair every acquire with a
/// release on every exit path.
pub trait Client {
    /// Hand out a scratch register drawn from `mask`.
    fn acquire_temporary(&mut self, mask: RegisterMask) -> RegId;

    /// Return a scratch register obtained from
    /// [`Client::acquire_temporary`].
    fn release_temporary(&mut self, reg: RegId);

    /// Preserve `reg`'s current value before the following instruction
    /// clobbers it.
    fn save(&mut self, reg: RegId);
}

/// A minimal [`Client`] handing out registers from a fixed free set.
///
/// Suitable for tests and standalone use of the assembler; a real register
/// allocator implements [`Client`] itself.
#[derive(Debug, Clone)]
pub struct TemporaryPool {
    available: u32,
}

impl TemporaryPool {
    /// Pool drawing from the given registers.
    pub fn new(registers: &[RegId]) -> Self {
        let mut available = 0;
        for reg in registers {
            available |= 1 << reg.index();
        }
        Self { available }
    }
}

impl Client for TemporaryPool {
    /// # Panics
    ///
    /// Panics when the pool has no free register admitted by `mask`.
    fn acquire_temporary(&mut self, mask: RegisterMask) -> RegId {
        for index in 0u8..16 {
            let reg = RegId::new(index);
            if self.available & (1 << index) != 0 && mask & register_bit(reg) != 0 {
                self.available &= !(1 << index);
                return reg;
            }
        }
        panic!("temporary pool exhausted");
    }

    fn release_temporary(&mut self, reg: RegId) {
        self.available |= 1 << reg.index();
    }

    fn save(&mut self, _reg: RegId) {
        // Nothing to spill: the pool tracks no live values.
    }
}

impl Default for TemporaryPool {
    fn default() -> Self {
        Self::new(&[crate::consts::RSI, crate::consts::RDI, crate::consts::R11])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::planner::ANY_REGISTERS;

    #[test]
    fn acquire_respects_mask_and_release() {
        let mut pool = TemporaryPool::new(&[RSI, RDI]);
        let first = pool.acquire_temporary(ANY_REGISTERS);
        assert_eq!(first, RSI);

        let second = pool.acquire_temporary(register_bit(RDI));
        assert_eq!(second, RDI);

        pool.release_temporary(first);
        assert_eq!(pool.acquire_temporary(ANY_REGISTERS), RSI);
    }
}
