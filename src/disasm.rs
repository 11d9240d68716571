//! Disassembler for CHIP-8 programs.
//!
//! Converts raw instruction words back to readable mnemonics. This is the
//! source of the per-instruction trace line and the `disasm` command output;
//! it is observational only and never part of the execution contract.

use crate::cpu::decode::{decode, Instruction};
use crate::cpu::memory::{merge_word, PROGRAM_START};

/// Disassemble a single instruction word to text.
pub fn disassemble_instruction(word: u16) -> String {
    match decode(word) {
        Ok(decoded) => format_instruction(&decoded),
        Err(_) => format!("??? ; {:#06X}", word),
    }
}

/// Disassemble a whole ROM, listing addresses from 0x200.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; CHIP-8 Disassembly\n");
    output.push_str("; ------------------\n\n");

    for (i, pair) in bytes.chunks(2).enumerate() {
        let addr = PROGRAM_START + (i * 2) as u16;
        match pair {
            [high, low] => {
                let word = merge_word(*high, *low);
                output.push_str(&format!(
                    "{:#06X}: {:04X}  {}\n",
                    addr,
                    word,
                    disassemble_instruction(word)
                ));
            }
            // A ROM with an odd byte count ends mid-word
            [high] => {
                output.push_str(&format!("{:#06X}: {:02X}    ; trailing byte\n", addr, high));
            }
            _ => unreachable!(),
        }
    }

    output
}

/// Format a decoded instruction as assembly text.
fn format_instruction(instr: &Instruction) -> String {
    match *instr {
        // Display
        Instruction::Cls => "CLS".to_string(),
        Instruction::Draw { x, y, rows } => format!("DRW V{:X}, V{:X}, {}", x, y, rows),

        // Control flow
        Instruction::Ret => "RET".to_string(),
        Instruction::Jump { addr } => format!("JP {:#05X}", addr),
        Instruction::Call { addr } => format!("CALL {:#05X}", addr),
        Instruction::SkipEqByte { x, byte } => format!("SE V{:X}, {:#04X}", x, byte),
        Instruction::SkipNeByte { x, byte } => format!("SNE V{:X}, {:#04X}", x, byte),
        Instruction::SkipEqReg { x, y } => format!("SE V{:X}, V{:X}", x, y),

        // Transfer
        Instruction::LoadByte { x, byte } => format!("LD V{:X}, {:#04X}", x, byte),
        Instruction::LoadReg { x, y } => format!("LD V{:X}, V{:X}", x, y),
        Instruction::LoadIndex { addr } => format!("LD I, {:#05X}", addr),
        Instruction::StoreRegisters { x } => format!("LD [I], V{:X}", x),
        Instruction::LoadRegisters { x } => format!("LD V{:X}, [I]", x),

        // Arithmetic / logic
        Instruction::AddByte { x, byte } => format!("ADD V{:X}, {:#04X}", x, byte),
        Instruction::OrReg { x, y } => format!("OR V{:X}, V{:X}", x, y),
        Instruction::StoreBcd { x } => format!("LD B, V{:X}", x),
    }
}
