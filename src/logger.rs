//! Per-cycle change logging, grounded in the teacher's golden-log harness
//! (`tests/nestest.rs` / `tests/util/logparse.rs`): each cycle is diffed
//! against a snapshot taken before it ran, and only what changed is kept.

use std::fmt;
use std::io::{self, Write};

use crate::decode::DecodedInstruction;
use crate::registers::RegisterFile;
use crate::state::{Flags, ProcessorState};

/// A single register change, `(index, new value)`.
pub type RegisterChange = (u8, u32);

/// A single memory change, `(address, new value)`.
pub type MemoryChange = (u32, u32);

/// Everything that changed during one fetch-decode-execute cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecord {
    pub cycle: u32,
    pub pc_before: u32,
    pub pc_after: u32,
    pub ir: u32,
    pub mnemonic: String,
    pub registers: Vec<RegisterChange>,
    pub flags_before: Flags,
    pub flags_after: Flags,
    pub memory: Vec<MemoryChange>,
}

impl fmt::Display for CycleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6}  pc={:04X}->{:04X}  ir={:08X}  {}",
            self.cycle, self.pc_before, self.pc_after, self.ir, self.mnemonic
        )?;
        for (r, v) in &self.registers {
            write!(f, "  r{}={:08X}", r, v)?;
        }
        if self.flags_before != self.flags_after {
            write!(f, "  flags={:?}", self.flags_after)?;
        }
        for (addr, v) in &self.memory {
            write!(f, "  mem[{:04X}]={:08X}", addr, v)?;
        }
        Ok(())
    }
}

/// Snapshot of the pieces of state a [`CycleRecord`] diffs against.
struct Snapshot {
    pc: u32,
    regs: [u32; crate::registers::REGISTER_COUNT],
    flags: Flags,
}

impl Snapshot {
    fn take(regs: &RegisterFile, state: &ProcessorState) -> Self {
        let mut values = [0u32; crate::registers::REGISTER_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = regs.read(i as u8).expect("index in range");
        }
        Self {
            pc: state.pc,
            regs: values,
            flags: state.flags,
        }
    }
}

/// Builds one [`CycleRecord`] per step, optionally streaming it to a sink.
pub struct CycleLogger {
    cycle: u32,
    before: Option<Snapshot>,
    records: Vec<CycleRecord>,
    sink: Option<Box<dyn Write>>,
}

impl CycleLogger {
    pub fn new() -> Self {
        Self {
            cycle: 0,
            before: None,
            records: Vec::new(),
            sink: None,
        }
    }

    /// Stream each finished record to `sink` as it is produced, in addition
    /// to collecting it.
    pub fn with_sink(sink: Box<dyn Write>) -> Self {
        Self {
            cycle: 0,
            before: None,
            records: Vec::new(),
            sink: Some(sink),
        }
    }

    /// Call immediately before executing a cycle.
    pub fn before_cycle(&mut self, regs: &RegisterFile, state: &ProcessorState) {
        self.before = Some(Snapshot::take(regs, state));
    }

    /// Call immediately after executing a cycle, with the fetched `IR` and
    /// decoded opcode. Returns the finished record and appends it to the
    /// collected history, writing it to the sink if one is set.
    pub fn after_cycle(
        &mut self,
        ir: u32,
        decoded: DecodedInstruction,
        regs: &RegisterFile,
        state: &ProcessorState,
    ) -> io::Result<CycleRecord> {
        let before = self.before.take().expect("before_cycle was called");
        let mut registers = Vec::new();
        for i in 0..crate::registers::REGISTER_COUNT as u8 {
            let after = regs.read(i).expect("index in range");
            if after != before.regs[i as usize] {
                registers.push((i, after));
            }
        }
        let record = CycleRecord {
            cycle: self.cycle,
            pc_before: before.pc,
            pc_after: state.pc,
            ir,
            mnemonic: decoded.format(),
            registers,
            flags_before: before.flags,
            flags_after: state.flags,
            memory: Vec::new(),
        };
        self.cycle += 1;
        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}", record)?;
        }
        self.records.push(record.clone());
        Ok(record)
    }

    /// Merge memory changes observed during the just-finished cycle into its
    /// record (memory writes are tracked globally, so the caller diffs the
    /// modification set before and after the cycle and passes the delta).
    pub fn attach_memory_changes(&mut self, changes: Vec<MemoryChange>) {
        if let Some(last) = self.records.last_mut() {
            last.memory = changes;
        }
    }

    /// All records collected so far.
    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }
}

impl Default for CycleLogger {
    fn default() -> Self {
        Self::new()
    }
}
