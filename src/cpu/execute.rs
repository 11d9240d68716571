//! CPU execution engine for the CHIP-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Fetching never advances the program counter: each handler owns its own PC
//! policy, because skips, jumps and calls override the default +2 step.

use crate::cpu::decode::{self, Instruction};
use crate::cpu::memory::{MemoryError, PROGRAM_START};
use crate::cpu::registers::RegisterError;
use crate::cpu::{Memory, Registers};
use crate::display::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The CHIP-8 CPU.
///
/// Exclusively owns all machine state for the lifetime of one run. The
/// attached display collaborator is optional: without one, the display
/// instructions still decode, bounds-check and advance normally, they just
/// have nowhere to send their requests.
#[derive(Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
    /// Display collaborator, if one is attached.
    #[serde(skip)]
    display: Option<Box<dyn Display>>,
}

impl Cpu {
    /// Create a new CPU with zeroed state and no display attached.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            cycles: 0,
            last_instr: None,
            display: None,
        }
    }

    /// Attach a display collaborator.
    pub fn attach_display(&mut self, display: Box<dyn Display>) {
        self.display = Some(display);
    }

    /// Reset the CPU to initial state. The display stays attached.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load a program into memory at the standard base address 0x200.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(PROGRAM_START, program)
    }

    /// Read the instruction word at the current PC.
    ///
    /// Does not advance the PC.
    pub fn fetch(&self) -> Result<u16, MemoryError> {
        self.mem.read_word(self.regs.pc)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        // Fetch
        let pc = self.regs.pc;
        let word = self.fetch()?;

        // Decode
        let instr = decode::decode(word)
            .map_err(|_| CpuError::UnrecognizedInstruction { word, pc })?;

        // Execute
        self.execute(instr)?;

        // Update state
        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Run for at most `max_cycles` instructions.
    ///
    /// CHIP-8 has no halt instruction, so the cycle budget is the normal way
    /// a run ends; errors propagate to the caller, which owns the policy of
    /// reporting and terminating.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        match instr {
            // ==================== Display ====================

            Instruction::Cls => {
                if let Some(display) = self.display.as_mut() {
                    display.clear().map_err(|e| CpuError::Display(e.to_string()))?;
                }
                self.regs.advance_pc();
            }

            Instruction::Draw { x, y, rows } => {
                let sx = self.regs.read_v(x)?;
                let sy = self.regs.read_v(y)?;

                // Sprite rows live at I..I+rows; read them bounds-checked
                // whether or not anything is listening.
                let base = self.regs.i;
                let mut sprite = Vec::with_capacity(rows as usize);
                for row in 0..rows as u16 {
                    sprite.push(self.mem.read(base.wrapping_add(row))?);
                }

                if let Some(display) = self.display.as_mut() {
                    let collision = display
                        .draw(sx, sy, &sprite)
                        .map_err(|e| CpuError::Display(e.to_string()))?;
                    self.regs.set_flag(collision);
                }
                self.regs.advance_pc();
            }

            // ==================== Control Flow ====================

            Instruction::Ret => {
                let ret = self.mem.read_word(self.regs.sp as u16)?;
                self.regs.jump(ret);
                self.regs.sp = self.regs.sp.wrapping_sub(2);
            }

            Instruction::Jump { addr } => {
                self.regs.jump(addr);
            }

            Instruction::Call { addr } => {
                // The save slot is main memory at address SP; the saved word
                // is the address of the CALL instruction itself.
                self.regs.sp = self.regs.sp.wrapping_add(2);
                self.mem.write_word(self.regs.sp as u16, self.regs.pc)?;
                self.regs.jump(addr);
            }

            Instruction::SkipEqByte { x, byte } => {
                self.regs.advance_pc();
                if self.regs.read_v(x)? == byte {
                    self.regs.advance_pc();
                }
            }

            Instruction::SkipNeByte { x, byte } => {
                self.regs.advance_pc();
                if self.regs.read_v(x)? != byte {
                    self.regs.advance_pc();
                }
            }

            Instruction::SkipEqReg { x, y } => {
                self.regs.advance_pc();
                if self.regs.read_v(x)? == self.regs.read_v(y)? {
                    self.regs.advance_pc();
                }
            }

            // ==================== Data Transfer ====================

            Instruction::LoadByte { x, byte } => {
                self.regs.write_v(x, byte)?;
                self.regs.advance_pc();
            }

            Instruction::LoadReg { x, y } => {
                let value = self.regs.read_v(y)?;
                self.regs.write_v(x, value)?;
                self.regs.advance_pc();
            }

            Instruction::LoadIndex { addr } => {
                self.regs.i = addr;
                self.regs.advance_pc();
            }

            Instruction::StoreRegisters { .. } => {
                // Moves the full register file, not just V0..Vx.
                let base = self.regs.i;
                for offset in 0..self.regs.v.len() as u16 {
                    self.mem
                        .write(base.wrapping_add(offset), self.regs.v[offset as usize])?;
                }
                self.regs.advance_pc();
            }

            Instruction::LoadRegisters { .. } => {
                // Moves the full register file, not just V0..Vx.
                let base = self.regs.i;
                for offset in 0..self.regs.v.len() as u16 {
                    self.regs.v[offset as usize] = self.mem.read(base.wrapping_add(offset))?;
                }
                self.regs.advance_pc();
            }

            // ==================== Arithmetic / Logic ====================

            Instruction::AddByte { x, byte } => {
                // 8-bit wraparound; this core never sets a carry in VF.
                let value = self.regs.read_v(x)?;
                self.regs.write_v(x, value.wrapping_add(byte))?;
                self.regs.advance_pc();
            }

            Instruction::OrReg { x, y } => {
                let value = self.regs.read_v(x)? | self.regs.read_v(y)?;
                self.regs.write_v(x, value)?;
                self.regs.advance_pc();
            }

            Instruction::StoreBcd { x } => {
                let value = self.regs.read_v(x)?;
                let base = self.regs.i;
                self.mem.write(base, value / 100)?;
                self.mem.write(base.wrapping_add(1), value / 10 % 10)?;
                self.mem.write(base.wrapping_add(2), value % 10)?;
                self.regs.advance_pc();
            }
        }

        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
///
/// Handlers never catch these; everything propagates to the run-loop
/// boundary, the single point responsible for reporting and halting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("register error: {0}")]
    Register(#[from] RegisterError),

    #[error("unrecognized instruction {word:#06X} at pc {pc:#06X}")]
    UnrecognizedInstruction { word: u16, pc: u16 },

    #[error("display error: {0}")]
    Display(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::memory::merge_word;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions
            .iter()
            .flat_map(|i| {
                let word = encode(i);
                [(word >> 8) as u8, (word & 0xFF) as u8]
            })
            .collect()
    }

    fn cpu_with(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(instructions)).unwrap();
        cpu
    }

    #[test]
    fn test_fetch_does_not_advance_pc() {
        let cpu = cpu_with(&[Instruction::LoadByte { x: 0x1, byte: 0x05 }]);

        assert_eq!(cpu.fetch().unwrap(), 0x6105);
        assert_eq!(cpu.fetch().unwrap(), 0x6105);
        assert_eq!(cpu.regs.pc, 0x200);
    }

    #[test]
    fn test_load_byte() {
        let mut cpu = cpu_with(&[Instruction::LoadByte { x: 0x1, byte: 0x05 }]);

        cpu.step().unwrap();

        assert_eq!(cpu.regs.read_v(0x1).unwrap(), 0x05);
        assert_eq!(cpu.regs.pc, 0x202);
    }

    #[test]
    fn test_add_byte_wraps_without_carry() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x0, byte: 0xFF },
            Instruction::AddByte { x: 0x0, byte: 0x02 },
        ]);

        cpu.run_limited(2).unwrap();

        assert_eq!(cpu.regs.read_v(0x0).unwrap(), 0x01);
        // No implicit carry into VF
        assert_eq!(cpu.regs.read_v(0xF).unwrap(), 0);
    }

    #[test]
    fn test_skip_taken() {
        let mut cpu = cpu_with(&[Instruction::SkipEqByte { x: 0x0, byte: 0x05 }]);
        cpu.regs.v[0x0] = 0x05;

        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x204);
    }

    #[test]
    fn test_skip_not_taken() {
        let mut cpu = cpu_with(&[Instruction::SkipEqByte { x: 0x0, byte: 0x06 }]);
        cpu.regs.v[0x0] = 0x05;

        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x202);
    }

    #[test]
    fn test_skip_ne_and_reg_variants() {
        let mut cpu = cpu_with(&[Instruction::SkipNeByte { x: 0x0, byte: 0x06 }]);
        cpu.regs.v[0x0] = 0x05;
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0x204);

        let mut cpu = cpu_with(&[Instruction::SkipEqReg { x: 0x0, y: 0x1 }]);
        cpu.regs.v[0x0] = 0x07;
        cpu.regs.v[0x1] = 0x07;
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0x204);
    }

    #[test]
    fn test_call_saves_pre_call_pc_in_low_memory() {
        let mut cpu = cpu_with(&[Instruction::Call { addr: 0x300 }]);

        cpu.step().unwrap();

        assert_eq!(cpu.regs.sp, 2);
        assert_eq!(cpu.regs.pc, 0x300);
        // The save slot is main memory at address SP, and the saved word is
        // the address of the CALL itself, not the instruction after it.
        assert_eq!(cpu.mem.read_word(2).unwrap(), 0x200);
    }

    #[test]
    fn test_call_then_ret_restores_saved_pc() {
        let mut cpu = cpu_with(&[Instruction::Call { addr: 0x300 }]);
        cpu.mem.write_word(0x300, encode(&Instruction::Ret)).unwrap();

        cpu.step().unwrap();
        let saved = cpu.mem.read_word(cpu.regs.sp as u16).unwrap();
        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, saved);
        assert_eq!(cpu.regs.pc, 0x200);
        assert_eq!(cpu.regs.sp, 0);
    }

    #[test]
    fn test_store_registers_moves_all_sixteen() {
        let mut cpu = cpu_with(&[
            Instruction::LoadIndex { addr: 0x300 },
            Instruction::StoreRegisters { x: 0x3 },
        ]);
        for (i, reg) in cpu.regs.v.iter_mut().enumerate() {
            *reg = i as u8 + 1;
        }

        cpu.run_limited(2).unwrap();

        // All 16 registers land in memory, regardless of x
        for offset in 0..16u16 {
            assert_eq!(cpu.mem.read(0x300 + offset).unwrap(), offset as u8 + 1);
        }
    }

    #[test]
    fn test_load_registers_moves_all_sixteen() {
        let mut cpu = cpu_with(&[
            Instruction::LoadIndex { addr: 0x300 },
            Instruction::LoadRegisters { x: 0x0 },
        ]);
        for offset in 0..16u16 {
            cpu.mem.write(0x300 + offset, 0xA0 + offset as u8).unwrap();
        }

        cpu.run_limited(2).unwrap();

        for (i, &reg) in cpu.regs.v.iter().enumerate() {
            assert_eq!(reg, 0xA0 + i as u8);
        }
    }

    #[test]
    fn test_bcd_digits() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x2, byte: 205 },
            Instruction::LoadIndex { addr: 0x300 },
            Instruction::StoreBcd { x: 0x2 },
        ]);

        cpu.run_limited(3).unwrap();

        assert_eq!(cpu.mem.read(0x300).unwrap(), 2);
        assert_eq!(cpu.mem.read(0x301).unwrap(), 0);
        assert_eq!(cpu.mem.read(0x302).unwrap(), 5);
    }

    #[test]
    fn test_bcd_zero_pads_small_values() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x0, byte: 7 },
            Instruction::LoadIndex { addr: 0x300 },
            Instruction::StoreBcd { x: 0x0 },
        ]);

        cpu.run_limited(3).unwrap();

        assert_eq!(cpu.mem.dump(0x300, 3), vec![(0x300, 0), (0x301, 0), (0x302, 7)]);
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0x90, 0x00]).unwrap();

        let err = cpu.step().unwrap_err();

        assert_eq!(
            err,
            CpuError::UnrecognizedInstruction { word: 0x9000, pc: 0x200 }
        );
        // Not silently skipped: the PC stays on the offending word
        assert_eq!(cpu.regs.pc, 0x200);
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_display_stubs_advance_without_collaborator() {
        let mut cpu = cpu_with(&[
            Instruction::Cls,
            Instruction::Draw { x: 0x0, y: 0x1, rows: 0x0 },
        ]);

        cpu.run_limited(2).unwrap();

        assert_eq!(cpu.regs.pc, 0x204);
        assert_eq!(cpu.regs.read_v(0xF).unwrap(), 0);
    }

    #[test]
    fn test_draw_sprite_read_is_bounds_checked() {
        let mut cpu = cpu_with(&[Instruction::Draw { x: 0x0, y: 0x0, rows: 0x2 }]);
        cpu.regs.i = 0xFFF;

        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::Memory(MemoryError::AddressOutOfRange(0x1000)));
    }

    struct RecordingDisplay {
        sprites: Rc<RefCell<Vec<(u8, u8, Vec<u8>)>>>,
    }

    impl Display for RecordingDisplay {
        fn clear(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn draw(&mut self, x: u8, y: u8, sprite: &[u8]) -> io::Result<bool> {
            self.sprites.borrow_mut().push((x, y, sprite.to_vec()));
            Ok(true)
        }
    }

    #[test]
    fn test_draw_forwards_to_display_and_sets_flag() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x0, byte: 12 },
            Instruction::LoadByte { x: 0x1, byte: 8 },
            Instruction::LoadIndex { addr: 0x202 },
            Instruction::Draw { x: 0x0, y: 0x1, rows: 0x2 },
        ]);
        let sprites = Rc::new(RefCell::new(Vec::new()));
        cpu.attach_display(Box::new(RecordingDisplay {
            sprites: Rc::clone(&sprites),
        }));

        cpu.run_limited(4).unwrap();

        // The request carries (Vx, Vy) and the rows read at I
        assert_eq!(
            sprites.borrow().as_slice(),
            &[(12, 8, vec![0x61, 0x08])]
        );
        // Collision flag from the collaborator lands in VF
        assert_eq!(cpu.regs.read_v(0xF).unwrap(), 1);
    }

    #[test]
    fn test_run_limited_counts_cycles() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x0, byte: 1 },
            Instruction::Jump { addr: 0x200 },
        ]);

        let executed = cpu.run_limited(10).unwrap();

        assert_eq!(executed, 10);
        assert_eq!(cpu.cycles, 10);
        assert_eq!(cpu.last_instruction(), Some(Instruction::Jump { addr: 0x200 }));
    }

    #[test]
    fn test_state_snapshot_roundtrip() {
        let mut cpu = cpu_with(&[
            Instruction::LoadByte { x: 0x3, byte: 0x42 },
            Instruction::LoadIndex { addr: 0x321 },
        ]);
        cpu.run_limited(2).unwrap();

        let snapshot = serde_json::to_string(&cpu).unwrap();
        let restored: Cpu = serde_json::from_str(&snapshot).unwrap();

        assert_eq!(restored.regs.v, cpu.regs.v);
        assert_eq!(restored.regs.i, 0x321);
        assert_eq!(restored.regs.pc, cpu.regs.pc);
        assert_eq!(restored.cycles, 2);
        assert_eq!(
            restored.mem.read_word(0x200).unwrap(),
            merge_word(0x63, 0x42)
        );
    }
}
