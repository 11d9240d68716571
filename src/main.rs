//! CHIP-8 Emulator - CLI Entry Point
//!
//! Commands:
//! - `chip8-emu run <rom>` - Run a ROM file
//! - `chip8-emu disasm <rom>` - Disassemble a ROM
//! - `chip8-emu test` - Run the built-in self-test

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chip8-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "An interpreter core for the CHIP-8 virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a ROM until the cycle budget runs out
    Run {
        /// Path to the ROM file to execute
        rom: String,
        /// Maximum number of cycles to run (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_cycles: u64,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
    },
    /// Disassemble a ROM to readable text
    Disasm {
        /// Path to the ROM file
        rom: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { rom, max_cycles, trace }) => {
            run_program(&rom, max_cycles, trace);
        }
        Some(Commands::Disasm { rom }) => {
            disassemble_file(&rom);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("CHIP-8 Emulator v0.1.0");
            println!("An interpreter core for the CHIP-8 virtual machine");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_interpreter_core();
        }
    }
}

fn run_program(path: &str, max_cycles: u64, trace: bool) {
    use chip8::cpu::decode::encode;
    use chip8::disasm::disassemble_instruction;
    use chip8::{load_rom, Cpu};

    println!("🔧 Running: {}", path);

    let rom = match load_rom(path) {
        Ok(rom) => {
            println!("📂 Loaded {} bytes", rom.len());
            rom
        }
        Err(e) => {
            eprintln!("❌ Failed to load ROM: {}", e);
            std::process::exit(1);
        }
    };

    if rom.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    // Create CPU and load program
    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(&rom.bytes) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("━━━ Execution ━━━");

    // Run with optional trace
    let mut cycles = 0u64;
    while cycles < max_cycles {
        let pc = cpu.regs.pc;

        match cpu.step() {
            Ok(instr) => {
                if trace {
                    let word = encode(&instr);
                    println!("{:#06X}: {:04X}  {}", pc, word, disassemble_instruction(word));
                }
                cycles += 1;
            }
            Err(e) => {
                eprintln!("❌ CPU error at PC={:#06X}: {}", pc, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cycles);
    for (i, value) in cpu.regs.v.iter().enumerate() {
        print!("V{:X}={:02X} ", i, value);
        if i == 7 {
            println!();
        }
    }
    println!();
    println!("I={:#06X} PC={:#06X} SP={:#04X}", cpu.regs.i, cpu.regs.pc, cpu.regs.sp);
    println!();
    println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to change it.", max_cycles);
}

fn disassemble_file(path: &str) {
    use chip8::disasm::disassemble;
    use chip8::load_rom;

    println!("📖 Disassembling: {}", path);
    println!();

    let rom = match load_rom(path) {
        Ok(rom) => rom,
        Err(e) => {
            eprintln!("❌ Failed to load ROM: {}", e);
            std::process::exit(1);
        }
    };

    let output = disassemble(&rom.bytes);
    println!("{}", output);
}

fn demo_interpreter_core() {
    use chip8::cpu::decode::encode;
    use chip8::{Cpu, Instruction};

    println!("━━━ Interpreter Core Demo ━━━");
    println!();

    // A tiny program: V0 := 205, I := 0x300, store the decimal digits of V0
    let program: Vec<u8> = [
        Instruction::LoadByte { x: 0x0, byte: 205 },
        Instruction::LoadIndex { addr: 0x300 },
        Instruction::StoreBcd { x: 0x0 },
    ]
    .iter()
    .flat_map(|i| {
        let word = encode(i);
        [(word >> 8) as u8, (word & 0xFF) as u8]
    })
    .collect();

    let mut cpu = Cpu::new();
    cpu.load_program(&program).expect("demo program fits in memory");
    cpu.run_limited(3).expect("demo program executes");

    println!("Program: LD V0, 205 / LD I, 0x300 / LD B, V0");
    println!("V0 = {}", cpu.regs.v[0]);
    print!("Digits at 0x300: ");
    for (addr, byte) in cpu.mem.dump(0x300, 3) {
        print!("[{:#06X}]={} ", addr, byte);
    }
    println!();
    println!();
    println!("✓ Core interpreter primitives working!");
}

fn run_self_test() {
    use chip8::cpu::decode::{decode, encode};
    use chip8::cpu::memory::{merge_word, split_word};
    use chip8::{Cpu, CpuError, Instruction};

    println!("━━━ CHIP-8 Emulator Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    // Test 1: Word split/merge roundtrip
    print!("Word split/merge roundtrip... ");
    let mut ok = true;
    for value in [0x0000u16, 0x00FF, 0xFF00, 0x1234, 0xFFFF] {
        let [high, low] = split_word(value);
        if merge_word(high, low) != value {
            ok = false;
            break;
        }
    }
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    // Test 2: Decode/encode roundtrip
    print!("Decode/encode roundtrip... ");
    ok = true;
    for word in [0x00E0u16, 0x00EE, 0x1300, 0x2ABC, 0x3501, 0x6105, 0x7FFF, 0x8120, 0xA300, 0xD125, 0xF233, 0xF055, 0xF065] {
        match decode(word) {
            Ok(instr) if encode(&instr) == word => {}
            _ => {
                ok = false;
                break;
            }
        }
    }
    if ok { println!("✓"); passed += 1; }
    else { println!("✗"); failed += 1; }

    // Test 3: Register load and wrapping add
    print!("Load and wrapping add... ");
    let mut cpu = Cpu::new();
    let program = make_program(&[
        Instruction::LoadByte { x: 0x0, byte: 0xFF },
        Instruction::AddByte { x: 0x0, byte: 0x02 },
    ]);
    cpu.load_program(&program).unwrap();
    cpu.run_limited(2).unwrap();
    if cpu.regs.v[0] == 0x01 && cpu.regs.v[0xF] == 0 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got V0={:#04X})", cpu.regs.v[0]);
        failed += 1;
    }

    // Test 4: Skip semantics
    print!("Conditional skip... ");
    let mut cpu = Cpu::new();
    let program = make_program(&[Instruction::SkipEqByte { x: 0x0, byte: 0x00 }]);
    cpu.load_program(&program).unwrap();
    cpu.step().unwrap();
    if cpu.regs.pc == 0x204 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got PC={:#06X}, expected 0x0204)", cpu.regs.pc);
        failed += 1;
    }

    // Test 5: Call/return pair
    print!("Call/return pair... ");
    let mut cpu = Cpu::new();
    let program = make_program(&[Instruction::Call { addr: 0x300 }]);
    cpu.load_program(&program).unwrap();
    cpu.mem.write_word(0x300, encode(&Instruction::Ret)).unwrap();
    cpu.step().unwrap();
    cpu.step().unwrap();
    if cpu.regs.pc == 0x200 && cpu.regs.sp == 0 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got PC={:#06X} SP={})", cpu.regs.pc, cpu.regs.sp);
        failed += 1;
    }

    // Test 6: Decimal digit store
    print!("Decimal digit store... ");
    let mut cpu = Cpu::new();
    let program = make_program(&[
        Instruction::LoadByte { x: 0x2, byte: 205 },
        Instruction::LoadIndex { addr: 0x300 },
        Instruction::StoreBcd { x: 0x2 },
    ]);
    cpu.load_program(&program).unwrap();
    cpu.run_limited(3).unwrap();
    let digits = (
        cpu.mem.read(0x300).unwrap(),
        cpu.mem.read(0x301).unwrap(),
        cpu.mem.read(0x302).unwrap(),
    );
    if digits == (2, 0, 5) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (got {:?}, expected (2, 0, 5))", digits);
        failed += 1;
    }

    // Test 7: Unknown instruction is fatal
    print!("Unknown instruction is fatal... ");
    let mut cpu = Cpu::new();
    cpu.load_program(&[0x90, 0x00]).unwrap();
    match cpu.step() {
        Err(CpuError::UnrecognizedInstruction { word: 0x9000, pc: 0x200 }) => {
            println!("✓");
            passed += 1;
        }
        other => {
            println!("✗ (got {:?})", other);
            failed += 1;
        }
    }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}

fn make_program(instructions: &[chip8::Instruction]) -> Vec<u8> {
    use chip8::cpu::decode::encode;

    instructions
        .iter()
        .flat_map(|i| {
            let word = encode(i);
            [(word >> 8) as u8, (word & 0xFF) as u8]
        })
        .collect()
}
