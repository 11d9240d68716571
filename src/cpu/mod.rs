//! CPU emulation for the CHIP-8 virtual machine.
//!
//! This module implements the interpreter core:
//! - 4096 bytes of memory
//! - 16 general-purpose byte registers plus the I, PC and SP pointers
//! - the fetch-decode-execute cycle over 16-bit instruction words

pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use decode::{DecodeError, Instruction};
pub use execute::{Cpu, CpuError};
pub use memory::Memory;
pub use registers::Registers;
