//! Processor state: program counter, instruction register, condition
//! flags, and the halt latch.

use bitflags::bitflags;

use crate::error::{Result, SimError};
use crate::memory::MEMORY_SIZE;

bitflags! {
    /// Condition flags updated by ALU-class instructions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const NEGATIVE = 0b0001;
        const ZERO     = 0b0010;
        const CARRY    = 0b0100;
        const OVERFLOW = 0b1000;
    }
}

/// `PC`, `IR`, condition flags, and the halt latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorState {
    pub pc: u32,
    pub ir: u32,
    pub flags: Flags,
    pub halted: bool,
}

impl ProcessorState {
    pub fn new() -> Self {
        Self {
            pc: 0,
            ir: 0,
            flags: Flags::empty(),
            halted: false,
        }
    }

    /// Set `PC`, required to stay within `[0, 65536)`.
    pub fn set_pc(&mut self, value: u32) -> Result<()> {
        if (value as usize) < MEMORY_SIZE {
            self.pc = value;
            Ok(())
        } else {
            Err(SimError::AddressOutOfRange(value))
        }
    }

    /// Advance `PC` by `step`, failing if the result leaves range.
    pub fn incr_pc(&mut self, step: u32) -> Result<()> {
        self.set_pc(self.pc + step)
    }

    /// Reset PC, IR, flags, and the halt latch to their power-on values.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pc_rejects_out_of_range() {
        let mut state = ProcessorState::new();
        assert!(state.set_pc(MEMORY_SIZE as u32).is_err());
    }

    #[test]
    fn incr_pc_rejects_overflow_past_top() {
        let mut state = ProcessorState::new();
        state.set_pc(MEMORY_SIZE as u32 - 1).unwrap();
        assert!(state.incr_pc(1).is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = ProcessorState::new();
        state.set_pc(5).unwrap();
        state.ir = 42;
        state.flags = Flags::ZERO;
        state.halted = true;
        state.reset();
        assert_eq!(state, ProcessorState::new());
    }
}
