use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;

use ufla_risc::error::SimError;
use ufla_risc::simulator::DEFAULT_CYCLE_LIMIT;
use ufla_risc::{assembler::Assembler, loader, logger::CycleLogger, simulator::Simulator};

#[derive(Parser)]
#[command(name = "ufla-risc", about = "UFLA-RISC instruction set simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Shorthand for `RUST_LOG=debug`.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble source text into a binary-row file.
    Assemble { input: String, output: String },
    /// Load a binary-row file and run it to completion.
    Simulate {
        input: String,
        /// Stream the per-cycle change log to this file.
        #[arg(long)]
        log: Option<String>,
        /// Safety ceiling on cycles run without a HALT.
        #[arg(long, default_value_t = DEFAULT_CYCLE_LIMIT)]
        cycle_limit: u32,
        /// Print every non-zero register after the run.
        #[arg(long)]
        dump_registers: bool,
        /// Print memory words in the inclusive range `LO-HI`.
        #[arg(long, value_name = "LO-HI")]
        dump_memory: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    match cli.command {
        Command::Assemble { input, output } => run_assemble(&input, &output),
        Command::Simulate {
            input,
            log,
            cycle_limit,
            dump_registers,
            dump_memory,
        } => run_simulate(&input, log.as_deref(), cycle_limit, dump_registers, dump_memory.as_deref()),
    }
}

fn run_assemble(input: &str, output: &str) -> ExitCode {
    let result = (|| -> Result<(), SimError> {
        let source = fs::read_to_string(input)?;
        let binary = Assembler::new().assemble(&source)?;
        fs::write(output, binary)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            info!("assembled {} -> {}", input, output);
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run_simulate(
    input: &str,
    log_path: Option<&str>,
    cycle_limit: u32,
    dump_registers: bool,
    dump_memory: Option<&str>,
) -> ExitCode {
    let mut sim = Simulator::new();

    let text = match fs::read_to_string(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", SimError::from(e));
            return ExitCode::from(1);
        }
    };

    let (first, _last) = match loader::load(&mut sim.memory, &text) {
        Ok(extent) => extent,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };
    if first >= 0 {
        if let Err(e) = sim.state.set_pc(first as u32) {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    }

    let mut logger = match log_path {
        Some(path) => match fs::File::create(path) {
            Ok(f) => Some(CycleLogger::with_sink(Box::new(f))),
            Err(e) => {
                eprintln!("error: {}", SimError::from(e));
                return ExitCode::from(1);
            }
        },
        None => None,
    };

    match sim.run(cycle_limit, &mut logger) {
        Ok(cycles) => {
            info!("halted after {} cycles", cycles);
        }
        Err(SimError::CycleLimitExceeded(limit)) => {
            eprintln!("error: cycle limit of {} exceeded without a HALT", limit);
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    }

    if dump_registers {
        for (i, unsigned, signed) in sim.registers.dump() {
            if unsigned != 0 {
                println!("r{:<2} = {:#010x} ({})", i, unsigned, signed);
            }
        }
        println!("flags = {:?}", sim.state.flags);
    }

    if let Some(range) = dump_memory {
        if let Some((lo, hi)) = parse_range(range) {
            match sim.memory.dump(lo, hi) {
                Ok(rows) => {
                    for (addr, bits) in rows {
                        println!("mem[{:04x}] = {}", addr, bits);
                    }
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::from(1);
                }
            }
        } else {
            eprintln!("error: invalid --dump-memory range '{}'", range);
            return ExitCode::from(1);
        }
    }

    ExitCode::from(0)
}

fn parse_range(s: &str) -> Option<(u32, u32)> {
    let (lo, hi) = s.split_once('-')?;
    Some((lo.parse().ok()?, hi.parse().ok()?))
}
