//! End-to-end runs through the kernel.

use acc8::io::{BufferedOutput, NullObserver, TrapLog};
use acc8::{assemble, parse_program, Kernel, KernelError, MachineConfig, ProcessState};

fn boot(quantum: u32) -> Kernel<BufferedOutput> {
    let config = MachineConfig {
        quantum,
        ..MachineConfig::default()
    };
    Kernel::new(&config, BufferedOutput::new(), Box::new(NullObserver), &mut TrapLog::default())
        .unwrap()
}

const GREETER: &str = r#"
    LDX #2
    SYS
    DB "hi", 0          ; printed inline
    BRK
"#;

const COUNTER: &str = r#"
    LDA #$07
    STA $0040
    INC $0040
    LDY $0040
    LDX #1
    SYS
    BRK
"#;

#[test]
fn test_assembled_programs_share_the_cpu() {
    let mut kernel = boot(2);
    let greeter = kernel.load(&assemble(GREETER).unwrap(), 0).unwrap();
    let counter = kernel.load(&assemble(COUNTER).unwrap(), 0).unwrap();
    assert_eq!(kernel.run_all(), vec![greeter, counter]);

    let ticks = kernel.run_until_idle(1000).unwrap();
    assert!(kernel.is_idle());
    assert!(ticks > 0);

    let mut lines = kernel.output().lines().to_vec();
    lines.sort();
    assert_eq!(lines, vec!["08".to_string(), "hi".to_string()]);

    for pid in [greeter, counter] {
        assert_eq!(kernel.process(pid).map(|p| p.state), Some(ProcessState::Done));
    }
    let counter_pcb = kernel.process(counter).unwrap();
    assert_eq!(counter_pcb.regs.y, 0x08);
    assert_eq!(kernel.memory().memory().read(counter_pcb.location + 0x40), Some(0x08));
}

#[test]
fn test_hex_program_and_json_table() {
    let program = parse_program("A9 01 A2 03 00").unwrap();
    let mut kernel = boot(6);
    let pid = kernel.load(&program.bytes, 3).unwrap();
    kernel.run(pid).unwrap();
    kernel.run_until_idle(100).unwrap();

    let rows = kernel.ps();
    assert_eq!(rows.len(), 1);
    let json = serde_json::to_value(&rows).unwrap();
    assert_eq!(json[0]["pid"], 0);
    assert_eq!(json[0]["priority"], 3);
    assert_eq!(json[0]["state"], "DONE");
}

#[test]
fn test_memory_fills_up_and_is_reused() {
    let mut kernel = boot(6);
    for _ in 0..3 {
        kernel.load(&[0x00], 0).unwrap();
    }
    assert_eq!(kernel.load(&[0x00], 0), Err(KernelError::OutOfMemory));

    kernel.run_all();
    kernel.run_until_idle(100).unwrap();
    // finished programs give their segments back
    let pid = kernel.load(&[0x00], 0).unwrap();
    assert_eq!(pid, 3);
}

#[test]
fn test_kill_waiting_process() {
    let mut kernel = boot(1);
    let a = kernel.load(&[0xEA, 0xEA, 0xEA, 0x00], 0).unwrap();
    let b = kernel.load(&[0xA2, 0x01, 0x00], 0).unwrap();
    kernel.run_all();
    kernel.tick().unwrap();
    kernel.kill(b).unwrap();
    kernel.run_until_idle(100).unwrap();

    assert_eq!(kernel.process(a).map(|p| p.state), Some(ProcessState::Done));
    assert_eq!(kernel.process(b).map(|p| p.state), Some(ProcessState::Stopped));
    assert_eq!(kernel.process(b).map(|p| p.regs.x), Some(0));
}
