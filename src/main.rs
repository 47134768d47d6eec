//! MMU simulator - Main Entry Point
//!
//! Usage: mmu-sim -f<frames> [-a<algo>] [-o<OPFS>] [-v] <inputfile> [randomfile]
//!
//! Arguments:
//!   inputfile   - Processes, their VMAs and the instruction stream
//!   randomfile  - Random numbers for the Random pager (`-ar`)
//!
//! Options:
//!   -f  Number of physical frames (1-128)
//!   -a  Replacement algorithm: f, r, c, e, a or w
//!   -o  Output options: O trace, P page tables, F frame table, S summary
//!   -v  Log faults and evictions to stderr (-vv for every instruction)

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::info;

use mmu_sim::constants::MAX_FRAMES;
use mmu_sim::io::{InputData, load_random_numbers};
use mmu_sim::logging;
use mmu_sim::report::{format_events, format_frame_table, format_page_table, format_summary};
use mmu_sim::{Algorithm, CostTable, OutputOptions, Pager, SimError, Simulator};

/// Command-line configuration
#[derive(Parser)]
#[command(name = "mmu-sim")]
#[command(about = "Virtual memory manager simulator with pluggable page replacement")]
#[command(version)]
struct Cli {
    /// Number of physical frames
    #[arg(short = 'f', long = "frames")]
    frames: usize,

    /// Replacement algorithm: f(ifo) r(andom) c(lock) e(nru) a(ging) w(orking set)
    #[arg(short = 'a', long = "algo", default_value = "f")]
    algorithm: String,

    /// Output options, any combination of O, P, F and S
    #[arg(short = 'o', long = "options", default_value = "")]
    options: String,

    /// Log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Input file with processes and instructions
    inputfile: PathBuf,

    /// Random number file
    randomfile: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(logging::level_for(cli.verbose)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    // Run the simulator and handle any errors
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main logic separated from main() for cleaner error handling
fn run(cli: &Cli) -> Result<(), SimError> {
    // Step 1: Validate configuration
    if cli.frames == 0 || cli.frames > MAX_FRAMES {
        return Err(SimError::InvalidFrameCount(cli.frames));
    }
    let algorithm: Algorithm = cli.algorithm.parse()?;
    let options: OutputOptions = cli.options.parse().unwrap_or_default();

    // Step 2: Load input and random numbers
    let input = InputData::from_file(&cli.inputfile)?;
    let numbers = load_random_numbers(algorithm, cli.randomfile.as_deref())?;
    let pager = Pager::new(algorithm, numbers)?;

    let spaces = input.address_spaces();
    info!(
        "{} frames, {} pager (-a{}), {} processes, {} mapped pages, {} instructions",
        cli.frames,
        algorithm,
        algorithm.letter(),
        spaces.len(),
        spaces.iter().map(|space| space.mapped_pages()).sum::<usize>(),
        input.instructions.len()
    );

    // Step 3: Simulate
    let mut sim = Simulator::new(spaces, cli.frames, pager);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut trace_error: Option<io::Error> = None;

    sim.run(input.instructions.iter().copied(), |idx, instr, events| {
        if trace_error.is_none() {
            if let Err(e) = out.write_all(format_events(idx, instr, events, options.trace).as_bytes()) {
                trace_error = Some(e);
            }
        }
    });
    if let Some(e) = trace_error {
        return Err(e.into());
    }

    // Step 4: Final reports
    if options.page_table {
        let show_pre_referenced = sim.policy() == Algorithm::WorkingSet;
        for space in sim.processes() {
            writeln!(out, "{}", format_page_table(space, show_pre_referenced))?;
        }
    }
    if options.frame_table {
        writeln!(out, "{}", format_frame_table(sim.frames(), sim.processes()))?;
    }
    if options.summary {
        writeln!(out, "{}", format_summary(&sim.summary(&CostTable::default())))?;
    }

    info!("simulation finished after {} ticks", sim.time().tick);
    Ok(())
}
