//! Per-opcode semantics: the execution unit (§4.G).
//!
//! Each arm is a small pure-ish function over the memory, register file,
//! and processor state, generalizing the teacher's `match_handler`/`op_fn!`
//! dispatch pattern into a `match` over a closed [`Opcode`] enum.

use crate::decode::{DecodedInstruction, Opcode};
use crate::error::{Result, SimError};
use crate::memory::Memory;
use crate::registers::RegisterFile;
use crate::state::{Flags, ProcessorState};

fn set_zn(flags: &mut Flags, result: u32) {
    flags.set(Flags::ZERO, result == 0);
    flags.set(Flags::NEGATIVE, result & 0x8000_0000 != 0);
}

fn clear_cv(flags: &mut Flags) {
    flags.remove(Flags::CARRY | Flags::OVERFLOW);
}

fn add_with_flags(flags: &mut Flags, a: u32, b: u32) -> u32 {
    let (result, carry) = a.overflowing_add(b);
    let overflow = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
    set_zn(flags, result);
    flags.set(Flags::CARRY, carry);
    flags.set(Flags::OVERFLOW, overflow);
    result
}

fn sub_with_flags(flags: &mut Flags, a: u32, b: u32) -> u32 {
    let result = a.wrapping_sub(b);
    let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    set_zn(flags, result);
    flags.set(Flags::CARRY, a < b);
    flags.set(Flags::OVERFLOW, overflow);
    result
}

/// Execute one decoded, non-HALT instruction. `pc_after_fetch` is `PC` as
/// it stands after the step-1 increment (§4.G); control transfers
/// overwrite it.
pub fn execute(
    mem: &mut Memory,
    regs: &mut RegisterFile,
    state: &mut ProcessorState,
    d: DecodedInstruction,
) -> Result<()> {
    // `ra`/`rb` are only genuine register indices for R_R_R/R_R/R/BRANCH
    // instructions; CONST and J instructions reuse those same bit
    // positions for immediate bytes, so each arm reads what it needs
    // rather than decoding both up front.
    match d.opcode {
        Opcode::Add => {
            let result = add_with_flags(&mut state.flags, regs.read(d.ra)?, regs.read(d.rb)?);
            regs.write(d.rc, result)?;
        }
        Opcode::Sub => {
            let result = sub_with_flags(&mut state.flags, regs.read(d.ra)?, regs.read(d.rb)?);
            regs.write(d.rc, result)?;
        }
        Opcode::Zeros => {
            regs.write(d.rc, 0)?;
            state.flags = Flags::ZERO;
        }
        Opcode::Xor => {
            let result = regs.read(d.ra)? ^ regs.read(d.rb)?;
            set_zn(&mut state.flags, result);
            clear_cv(&mut state.flags);
            regs.write(d.rc, result)?;
        }
        Opcode::Or => {
            let result = regs.read(d.ra)? | regs.read(d.rb)?;
            set_zn(&mut state.flags, result);
            clear_cv(&mut state.flags);
            regs.write(d.rc, result)?;
        }
        Opcode::And => {
            let result = regs.read(d.ra)? & regs.read(d.rb)?;
            set_zn(&mut state.flags, result);
            clear_cv(&mut state.flags);
            regs.write(d.rc, result)?;
        }
        Opcode::Not => {
            let result = !regs.read(d.ra)?;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Asl | Opcode::Lsl => {
            let shift = regs.read(d.rb)? & 0x1F;
            let result = regs.read(d.ra)? << shift;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Asr => {
            let shift = regs.read(d.rb)? & 0x1F;
            let result = ((regs.read(d.ra)? as i32) >> shift) as u32;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Lsr => {
            let shift = regs.read(d.rb)? & 0x1F;
            let result = regs.read(d.ra)? >> shift;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Copy => {
            let ra = regs.read(d.ra)?;
            set_zn(&mut state.flags, ra);
            regs.write(d.rc, ra)?;
        }
        Opcode::Mul => {
            let result = regs.read(d.ra)?.wrapping_mul(regs.read(d.rb)?);
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Div => {
            let (ra, rb) = (regs.read(d.ra)?, regs.read(d.rb)?);
            if rb == 0 {
                return Err(SimError::ArithmeticFault("division by zero"));
            }
            let result = ((ra as i32).wrapping_div(rb as i32)) as u32;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Mod => {
            let (ra, rb) = (regs.read(d.ra)?, regs.read(d.rb)?);
            if rb == 0 {
                return Err(SimError::ArithmeticFault("modulus by zero"));
            }
            let result = ((ra as i32).wrapping_rem(rb as i32)) as u32;
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Inc => {
            let result = regs.read(d.ra)?.wrapping_add(1);
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Dec => {
            let result = regs.read(d.ra)?.wrapping_sub(1);
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Notbit => {
            let result = !(regs.read(d.ra)? & regs.read(d.rb)?);
            set_zn(&mut state.flags, result);
            regs.write(d.rc, result)?;
        }
        Opcode::Lclh => {
            let current = regs.read(d.rc)?;
            let result = (u32::from(d.imm16) << 16) | (current & 0x0000_FFFF);
            regs.write(d.rc, result)?;
        }
        Opcode::Lcll => {
            let current = regs.read(d.rc)?;
            let result = (current & 0xFFFF_0000) | u32::from(d.imm16);
            regs.write(d.rc, result)?;
        }
        Opcode::Movi => {
            regs.write(d.rc, u32::from(d.imm16))?;
        }
        Opcode::Load => {
            let addr = regs.read(d.ra)?;
            let value = mem.read(addr)?;
            regs.write(d.rc, value)?;
        }
        Opcode::Store => {
            let value = regs.read(d.ra)?;
            let addr = regs.read(d.rc)?;
            mem.write(addr, value)?;
        }
        Opcode::J => {
            state.set_pc(d.imm24)?;
        }
        Opcode::Jal => {
            regs.write(crate::registers::LINK_REGISTER, state.pc)?;
            state.set_pc(d.imm24)?;
        }
        Opcode::Jr => {
            let target = regs.read(d.rc)? & 0xFFFF;
            state.set_pc(target)?;
        }
        Opcode::Beq => {
            if regs.read(d.ra)? == regs.read(d.rb)? {
                state.set_pc(u32::from(d.rc))?;
            }
        }
        Opcode::Bne => {
            if regs.read(d.ra)? != regs.read(d.rb)? {
                state.set_pc(u32::from(d.rc))?;
            }
        }
        Opcode::Nop | Opcode::Unknown(_) => {}
        Opcode::Halt => unreachable!("HALT is latched before decode"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Memory, RegisterFile, ProcessorState) {
        (Memory::new(), RegisterFile::new(), ProcessorState::new())
    }

    #[test]
    fn add_sets_zero_and_negative() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, 0).unwrap();
        regs.write(2, 0).unwrap();
        let d = DecodedInstruction {
            opcode: Opcode::Add,
            ra: 1,
            rb: 2,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, d).unwrap();
        assert_eq!(regs.read(3).unwrap(), 0);
        assert!(state.flags.contains(Flags::ZERO));
        assert!(!state.flags.contains(Flags::NEGATIVE));
    }

    #[test]
    fn add_overflow_sets_v_and_carry_sets_c() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, 0x7FFF_FFFF).unwrap();
        regs.write(2, 1).unwrap();
        let d = DecodedInstruction {
            opcode: Opcode::Add,
            ra: 1,
            rb: 2,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, d).unwrap();
        assert_eq!(regs.read(3).unwrap(), 0x8000_0000);
        assert!(state.flags.contains(Flags::OVERFLOW));
        assert!(!state.flags.contains(Flags::CARRY));

        regs.write(1, 0xFFFF_FFFF).unwrap();
        regs.write(2, 1).unwrap();
        execute(&mut mem, &mut regs, &mut state, d).unwrap();
        assert_eq!(regs.read(3).unwrap(), 0);
        assert!(state.flags.contains(Flags::CARRY));
    }

    #[test]
    fn sub_borrow_sets_carry() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, 3).unwrap();
        regs.write(2, 5).unwrap();
        let d = DecodedInstruction {
            opcode: Opcode::Sub,
            ra: 1,
            rb: 2,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, d).unwrap();
        assert!(state.flags.contains(Flags::CARRY));
        assert_eq!(regs.read(3).unwrap(), (3i32 - 5i32) as u32);
    }

    #[test]
    fn div_by_zero_faults() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, 10).unwrap();
        regs.write(2, 0).unwrap();
        let d = DecodedInstruction {
            opcode: Opcode::Div,
            ra: 1,
            rb: 2,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        assert!(matches!(
            execute(&mut mem, &mut regs, &mut state, d),
            Err(SimError::ArithmeticFault(_))
        ));
    }

    #[test]
    fn div_truncates_toward_zero_and_mod_matches_dividend_sign() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, (-7i32) as u32).unwrap();
        regs.write(2, 2).unwrap();
        let div = DecodedInstruction {
            opcode: Opcode::Div,
            ra: 1,
            rb: 2,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, div).unwrap();
        assert_eq!(regs.read(3).unwrap() as i32, -3);

        let rem = DecodedInstruction {
            opcode: Opcode::Mod,
            ra: 1,
            rb: 2,
            rc: 4,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, rem).unwrap();
        assert_eq!(regs.read(4).unwrap() as i32, -1);
    }

    #[test]
    fn lclh_and_lcll_commute_to_reconstruct_a_word() {
        let (mut mem, mut regs, mut state) = setup();
        let lclh = DecodedInstruction {
            opcode: Opcode::Lclh,
            ra: 0,
            rb: 0,
            rc: 1,
            imm16: 0xBEEF,
            imm24: 0,
        };
        let lcll = DecodedInstruction {
            opcode: Opcode::Lcll,
            ra: 0,
            rb: 0,
            rc: 1,
            imm16: 0xCAFE,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, lclh).unwrap();
        execute(&mut mem, &mut regs, &mut state, lcll).unwrap();
        assert_eq!(regs.read(1).unwrap(), 0xBEEF_CAFE);
    }

    #[test]
    fn store_then_load_round_trips_through_memory() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(3, 100).unwrap(); // address register
        regs.write(1, 999).unwrap(); // value register
        let store = DecodedInstruction {
            opcode: Opcode::Store,
            ra: 1,
            rb: 0,
            rc: 3,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, store).unwrap();
        assert_eq!(mem.read(100).unwrap(), 999);

        let load = DecodedInstruction {
            opcode: Opcode::Load,
            ra: 3,
            rb: 0,
            rc: 4,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, load).unwrap();
        assert_eq!(regs.read(4).unwrap(), 999);
    }

    #[test]
    fn writes_to_r0_are_discarded() {
        let (mut mem, mut regs, mut state) = setup();
        regs.write(1, 5).unwrap();
        let d = DecodedInstruction {
            opcode: Opcode::Copy,
            ra: 1,
            rb: 0,
            rc: 0,
            imm16: 0,
            imm24: 0,
        };
        execute(&mut mem, &mut regs, &mut state, d).unwrap();
        assert_eq!(regs.read(0).unwrap(), 0);
    }
}
