//! DRAM memory-controller timing simulator CLI.
//!
//! Loads a JSON configuration (or the built-in DDR4 defaults), drives the
//! controller with a synthetic traffic pattern, and reports statistics.

use clap::{Parser, ValueEnum};
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::{fs, process};

use dramspect::{Config, MemController, MemOp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Pattern {
    /// Sequential cachelines through the address space.
    Stream,
    /// Uniform random addresses.
    Random,
    /// Row-sized strides, walking every bank round-robin.
    Bankwalk,
}

#[derive(Parser, Debug)]
#[command(
    name = "dramspect",
    version,
    about = "DRAM memory-controller timing simulator",
    long_about = None,
)]
struct Cli {
    /// JSON configuration file; defaults are DDR4-2400-ish.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of transactions to play.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    txns: u64,

    /// Traffic pattern.
    #[arg(short, long, value_enum, default_value = "random")]
    pattern: Pattern,

    /// Fraction of writes in the mix.
    #[arg(short, long, default_value_t = 0.0)]
    write_frac: f64,

    /// Seed for the random pattern.
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Give up after this many cycles.
    #[arg(long, default_value_t = 10_000_000)]
    max_cycles: u64,

    /// Write a command trace to this file ("-" for stdout).
    #[arg(long)]
    trace: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                error!("failed to read {path}: {e}");
                process::exit(1);
            });
            Config::from_json(&text).unwrap_or_else(|e| {
                error!("failed to parse {path}: {e}");
                process::exit(1);
            })
        }
        None => Config::default(),
    };

    let mut ctrl = match MemController::new(&config) {
        Ok(ctrl) => ctrl,
        Err(e) => {
            error!("configuration rejected: {e}");
            process::exit(1);
        }
    };

    if let Some(trace) = &cli.trace {
        let sink: Box<dyn Write> = if trace == "-" {
            Box::new(std::io::stdout())
        } else {
            match fs::File::create(trace) {
                Ok(f) => Box::new(f),
                Err(e) => {
                    error!("failed to open trace file {trace}: {e}");
                    process::exit(1);
                }
            }
        };
        ctrl.set_cmd_trace(sink);
    }

    let mut traffic = TrafficGen::new(&cli, &config);
    let size = config.topology.num_bytes_per_transaction;

    let mut submitted = 0u64;
    let mut completed = 0u64;
    let mut next: Option<(MemOp, u64)> = None;

    while completed < cli.txns {
        if ctrl.cycle() >= cli.max_cycles {
            error!(
                "gave up at cycle {}: {completed}/{} transactions completed",
                ctrl.cycle(),
                cli.txns
            );
            process::exit(1);
        }

        // Keep offering traffic until the bridge pushes back.
        while submitted < cli.txns {
            let (op, addr) = next.take().unwrap_or_else(|| traffic.next());
            if ctrl.submit(op, addr, size).is_none() {
                next = Some((op, addr));
                break;
            }
            submitted += 1;
        }

        if let Err(e) = ctrl.tick() {
            error!("simulation failed: {e}");
            process::exit(1);
        }
        completed += ctrl.drain_completions().len() as u64;
    }

    info!(
        "{} transactions in {} cycles ({:.3} txns/cycle)",
        completed,
        ctrl.cycle(),
        completed as f64 / ctrl.cycle() as f64
    );
    ctrl.stats().report();
}

struct TrafficGen {
    pattern: Pattern,
    write_frac: f64,
    rng: StdRng,
    addr_mask: u64,
    align_mask: u64,
    stride: u64,
    cursor: u64,
}

impl TrafficGen {
    fn new(cli: &Cli, config: &Config) -> Self {
        let t = &config.topology;
        let addr_mask = t.capacity_bytes() - 1;
        let stride = match cli.pattern {
            Pattern::Stream => u64::from(t.num_bytes_per_transaction),
            // One full row per step lands each transaction in the next bank.
            Pattern::Bankwalk => {
                u64::from(t.num_cols_per_bank) * u64::from(t.num_bytes_per_transaction)
            }
            Pattern::Random => 0,
        };
        Self {
            pattern: cli.pattern,
            write_frac: cli.write_frac,
            rng: StdRng::seed_from_u64(cli.seed),
            addr_mask,
            align_mask: !u64::from(t.num_bytes_per_transaction - 1),
            stride,
            cursor: 0,
        }
    }

    fn next(&mut self) -> (MemOp, u64) {
        let addr = match self.pattern {
            Pattern::Random => self.rng.r#gen::<u64>() & self.addr_mask & self.align_mask,
            Pattern::Stream | Pattern::Bankwalk => {
                let addr = self.cursor & self.addr_mask;
                self.cursor += self.stride;
                addr
            }
        };
        let op = if self.rng.r#gen::<f64>() < self.write_frac {
            MemOp::Write
        } else {
            MemOp::Read
        };
        (op, addr)
    }
}
