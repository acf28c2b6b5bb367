mod cpu;
mod rom;

use std::env;
use std::process;

use cpu::Cpu;
use rom::Rom;

const DEFAULT_STEPS: u64 = 20;

/// Safety cap for --run: the engine has no execution bound of its own,
/// so the host imposes one.
const MAX_STEPS: u64 = 1_000_000;

struct Args {
    rom_path: String,
    trace: bool,
    run_until_halt: bool,
    dump_after: bool,
    steps: u64,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <romfile> [--trace] [--run] [--dump] [--steps N]",
        program
    );
    process::exit(1);
}

fn parse_args() -> Args {
    let argv: Vec<String> = env::args().collect();
    let program = argv.first().map_or("mr8c", String::as_str);

    let mut rom_path = None;
    let mut trace = false;
    let mut run_until_halt = false;
    let mut dump_after = false;
    let mut steps = DEFAULT_STEPS;

    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--trace" => trace = true,
            "--run" => run_until_halt = true,
            "--dump" => dump_after = true,
            "--steps" => {
                let value = iter.next().unwrap_or_else(|| usage(program));
                steps = value.parse().unwrap_or_else(|_| usage(program));
            }
            _ if arg.starts_with("--") => usage(program),
            _ => rom_path = Some(arg.clone()),
        }
    }

    let Some(rom_path) = rom_path else {
        eprintln!("Error: no ROM file specified");
        usage(program);
    };

    Args {
        rom_path,
        trace,
        run_until_halt,
        dump_after,
        steps,
    }
}

fn print_trace(cpu: &Cpu) {
    println!(
        "PC={:04X}  A={:02X}  X={:02X}  SP={:02X}  P={:02X}  DEBT={}",
        cpu.pc,
        cpu.a,
        cpu.x,
        cpu.sp,
        cpu.p.bits(),
        cpu.cycle_debt()
    );
}

fn dump_memory(cpu: &Cpu, start: u16, end: u16) {
    let mut addr = start;
    loop {
        print!("{:04X}: ", addr);
        for i in 0..16u16 {
            if addr + i > end {
                break;
            }
            print!("{:02X} ", cpu.read(addr + i));
        }
        println!();
        match addr.checked_add(16) {
            Some(next) if next <= end => addr = next,
            _ => break,
        }
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let rom = match Rom::load(&args.rom_path) {
        Ok(rom) => rom,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    let mut cpu = Cpu::new();
    cpu.load(&rom.data, rom.origin);
    cpu.reset(rom.origin);

    if args.run_until_halt {
        let mut steps = 0;
        while steps < MAX_STEPS {
            if cpu.halted {
                println!("HALT at PC={:04X}", cpu.pc.wrapping_sub(1));
                break;
            }
            cpu.step();
            if args.trace {
                print_trace(&cpu);
            }
            steps += 1;
        }
    } else {
        for _ in 0..args.steps {
            cpu.step();
            if args.trace {
                print_trace(&cpu);
            }
        }
    }

    if args.dump_after {
        dump_memory(&cpu, 0x0000, 0x00FF);
    }
}
