// File: main.rs
//
// The purpose of this file is to parse startup configuration and run the
// line-oriented driver REPL over stdin/stdout.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use structopt::StructOpt;

use chorduss::dht::{Config, Dht};
use chorduss::driver::{self, Command};
use chorduss::select::{RandomContactSelector, RandomIdAllocator};

/// Holds data parsed from the command line to configure the simulated ring.
#[derive(StructOpt, Debug)]
#[structopt(name = "chorduss")]
pub struct Cli {
  /// Identifier-space bit-width (ring size is 2^m).
  #[structopt(short = "m", long = "bits", default_value = "5")]
  bits: u32,

  /// Replication factor.
  #[structopt(short = "r", long = "replicas", default_value = "3")]
  replicas: usize,

  /// Maintenance cadence, in milliseconds.
  #[structopt(long = "stabilize-ms", default_value = "1000")]
  stabilize_ms: u64,

  /// Verbosity: pass more than once for more detail.
  #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
  verbose: usize,
}

fn main() {
  let cli = Cli::from_args();

  stderrlog::new()
    .module(module_path!())
    .verbosity(cli.verbose + 2)
    .init()
    .expect("failed to initialize logging");

  let dht = Dht::new(Config {
    m: cli.bits,
    r: cli.replicas,
    stabilize_period: Duration::from_millis(cli.stabilize_ms),
  });

  let alloc = RandomIdAllocator;
  let selector = RandomContactSelector;

  let stdin = io::stdin();
  let mut stdout = io::stdout();
  for line in stdin.lock().lines() {
    let line = match line {
      Ok(l) => l,
      Err(_) => break,
    };
    if line.trim().is_empty() {
      continue;
    }
    let response = match driver::parse(&line) {
      Ok(command) => run(&dht, command, &alloc, &selector),
      Err(message) => message,
    };
    let _ = writeln!(stdout, "{}", response);
    let _ = stdout.flush();
  }
}

fn run(
  dht: &std::sync::Arc<Dht>,
  command: Command,
  alloc: &RandomIdAllocator,
  selector: &RandomContactSelector,
) -> String {
  driver::dispatch(dht, command, alloc, selector)
}
