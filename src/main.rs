//! acc8 emulator - CLI Entry Point
//!
//! Commands:
//! - `acc8-emu run <programs...>` - Load programs and run them round robin
//! - `acc8-emu asm <source>` - Assemble to a hex program
//! - `acc8-emu disasm <program>` - Disassemble a hex program
//! - `acc8-emu test` - Built-in self test

use acc8::io::{ProcessTableObserver, StdoutSink, TrapLog};
use acc8::{Pcb, ProcessTableRow};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "acc8-emu")]
#[command(version = "0.1.0")]
#[command(about = "An 8-bit accumulator machine with a small multiprogramming kernel")]
struct Cli {
    /// Log every CPU cycle and dispatcher transition
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load programs and run them until every one has finished
    Run {
        /// Hex program or .asm source files, loaded in order
        #[arg(required = true)]
        programs: Vec<String>,
        /// Round-robin quantum in cycles
        #[arg(short, long)]
        quantum: Option<u32>,
        /// Maximum number of clock ticks
        #[arg(short, long)]
        max_ticks: Option<u64>,
        /// JSON machine configuration
        #[arg(short, long)]
        config: Option<String>,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble source to a hex program
    Asm {
        /// Path to the source file
        source: String,
        /// Output program file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a hex program to readable text
    Disasm {
        /// Path to the program file
        program: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.trace);

    match cli.command {
        Some(Commands::Run { programs, quantum, max_ticks, config, json }) => {
            run_programs(&programs, quantum, max_ticks, config, json);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("acc8 emulator v0.1.0");
            println!("An 8-bit accumulator machine with a small multiprogramming kernel");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn init_tracing(trace: bool) {
    let filter = if trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Logs the process table after each dispatcher transition.
struct TableLogger;

impl ProcessTableObserver for TableLogger {
    fn on_process_table_changed(&mut self, processes: &[Pcb]) {
        for pcb in processes {
            debug!(row = %pcb.row(), "process table");
        }
    }
}

fn read_program(path: &str) -> Vec<u8> {
    use acc8::asm::load_program;

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to read {}: {}", path, e);
                std::process::exit(1);
            }
        };
        match acc8::assemble(&source) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Assembly error in {}: {}", path, e);
                std::process::exit(1);
            }
        }
    } else {
        match load_program(path) {
            Ok(program) => {
                if let Some(c) = program.dangling {
                    eprintln!("Warning: dangling character '{}' in {} is not used", c, path);
                }
                program.bytes
            }
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }
}

fn run_programs(
    paths: &[String],
    quantum: Option<u32>,
    max_ticks: Option<u64>,
    config_path: Option<String>,
    json: bool,
) {
    use acc8::{Kernel, MachineConfig};

    let mut config = match config_path {
        Some(path) => match MachineConfig::from_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to read config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => MachineConfig::default(),
    };
    if let Some(q) = quantum {
        config.quantum = q;
    }
    if let Some(m) = max_ticks {
        config.max_ticks = m;
    }

    let mut trap = TrapLog::default();
    let mut kernel = match Kernel::new(&config, StdoutSink, Box::new(TableLogger), &mut trap) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Failed to boot: {}", e);
            std::process::exit(1);
        }
    };

    for path in paths {
        let bytes = read_program(path);
        match kernel.load(&bytes, 0) {
            Ok(pid) => eprintln!("Loaded {} as process {}", path, pid),
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }
    kernel.run_all();

    if let Err(e) = kernel.run_until_idle(config.max_ticks) {
        eprintln!("Kernel error: {}", e);
        std::process::exit(1);
    }

    if json {
        match serde_json::to_string_pretty(&kernel.snapshot()) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode machine state: {}", e),
        }
    } else {
        println!();
        println!("Ticks: {} (quantum {})", kernel.ticks(), kernel.quantum());
        println!("{}", ProcessTableRow::HEADER);
        for row in kernel.ps() {
            println!("{}", row);
        }
    }

    if !kernel.is_idle() {
        eprintln!("Reached max ticks limit ({}). Use --max-ticks to increase.", config.max_ticks);
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use acc8::asm::save_program;

    let out_path = output.unwrap_or_else(|| source_path.replace(".asm", ".hex"));
    println!("Assembling: {} -> {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let bytes = match acc8::assemble(&source) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = save_program(&out_path, &bytes) {
        eprintln!("Failed to save program: {}", e);
        std::process::exit(1);
    }
    println!("Assembled {} bytes", bytes.len());
}

fn disassemble_file(path: &str) {
    use acc8::asm::load_program;

    let program = match load_program(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to load program: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", acc8::disassemble(&program.bytes));
}

fn run_self_test() {
    use acc8::io::{BufferedOutput, NullObserver};
    use acc8::{Kernel, MachineConfig, ProcessState};

    println!("━━━ acc8 Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    let boot = || {
        Kernel::new(
            &MachineConfig::default(),
            BufferedOutput::new(),
            Box::new(NullObserver),
            &mut TrapLog::default(),
        )
    };

    // Test 1: store and reload through a window
    let ok = boot()
        .and_then(|mut k| {
            let pid = k.load(&[0xA9, 0x02, 0x8D, 0x10, 0x00, 0xAD, 0x10, 0x00, 0x00], 0)?;
            k.run(pid)?;
            k.run_until_idle(100)?;
            Ok(k.process(pid).map(|p| p.regs.acc) == Some(0x02)
                && k.memory().memory().read(0x10) == Some(0x02))
        })
        .unwrap_or(false);
    check("LDA/STA round trip", ok);

    // Test 2: unknown opcodes end the process
    let ok = boot()
        .and_then(|mut k| {
            let pid = k.load(&[0x02], 0)?;
            k.run(pid)?;
            k.run_until_idle(10)?;
            Ok(k.process(pid).map(|p| p.state) == Some(ProcessState::Done)
                && k.output().contains("Unknown instruction"))
        })
        .unwrap_or(false);
    check("Unknown instruction halts", ok);

    // Test 3: SYS string output
    let ok = boot()
        .and_then(|mut k| {
            let pid = k.load(&[0xA2, 0x02, 0xFF, b'o', b'k', 0x00, 0x00], 0)?;
            k.run(pid)?;
            k.run_until_idle(10)?;
            Ok(k.output().lines() == ["ok"])
        })
        .unwrap_or(false);
    check("SYS print string", ok);

    // Test 4: two processes share the CPU
    let ok = boot()
        .and_then(|mut k| {
            let a = k.load(&[0xA2, 0x05, 0xEA, 0xEA, 0x00], 0)?;
            let b = k.load(&[0xA2, 0x09, 0x00], 0)?;
            k.set_quantum(1)?;
            k.run_all();
            k.run_until_idle(100)?;
            Ok(k.process(a).map(|p| p.regs.x) == Some(0x05)
                && k.process(b).map(|p| p.regs.x) == Some(0x09))
        })
        .unwrap_or(false);
    check("Context switch keeps registers", ok);

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
