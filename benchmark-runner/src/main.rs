#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate tracing;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use bench::{fmt_thousands_sep, BenchStats};
use clap::ArgMatches;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod benches;
use benches::{locked, lockfree};

pub const THREAD_SWEEP: [usize; 6] = [1, 2, 4, 8, 16, 32];
pub const DEFAULT_OPS: usize = 50_000;
pub const DEFAULT_PREFILL: usize = 100;
pub const DEFAULT_ROUNDS: usize = 5;

/// What every benchmark is run with.
#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub threads: usize,
    /// Operations per thread.
    pub ops: usize,
    /// Elements in the queue before `mixed` starts.
    pub prefill: usize,
    pub rounds: usize,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no benchmarks were left after matching with the pattern '{0}'")]
    NoBenchmarks(String),
    #[error("invalid value '{value}' for {arg}")]
    InvalidArgument { arg: &'static str, value: String },
    #[error("could not write samples to {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// We need this, as somehow `(fn, String)` is not okay, while `(F(fn), String)` is.
pub struct F(pub fn(&Params) -> BenchStats);

impl F {
    pub fn call(&self, p: &Params) -> BenchStats {
        (self.0)(p)
    }
}

macro_rules! S {
  ($($f:expr),*) => {
    vec![$(
        (F($f), stringify!($f).to_string()),
      )*
    ]
  }
}

fn parse_arg(
    matches: &ArgMatches,
    arg: &'static str,
    default: usize,
    min: usize,
) -> Result<usize, RunnerError> {
    match matches.value_of(arg) {
        None => Ok(default),
        Some(value) => match value.parse() {
            Ok(n) if n >= min => Ok(n),
            _ => Err(RunnerError::InvalidArgument {
                arg,
                value: value.to_string(),
            }),
        },
    }
}

fn write_samples(dir: &Path, stats: &[BenchStats]) -> Result<(), RunnerError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| RunnerError::Io { path, source }
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    for stat in stats {
        let output_filename = format!(
            "s:{}-b:{}-t:{}",
            stat.variant(),
            stat.name(),
            stat.threads()
        );
        let path = dir.join(output_filename);
        let mut file = File::create(&path).map_err(io_err(&path))?;
        for sample in stat.samples() {
            writeln!(&mut file, "{}", sample).map_err(io_err(&path))?;
        }
    }
    info!(files = stats.len(), dir = %dir.display(), "samples written");
    Ok(())
}

/// One row per workload and thread count that ran for both variants.
fn print_comparison(stats: &[BenchStats]) {
    println!();
    println!(
        "{:>8}  {:<16}  {:>14}  {:>14}  {:>8}",
        "threads", "benchmark", "locked (us)", "lockfree (us)", "speedup"
    );
    for lf in stats.iter().filter(|s| s.variant() == "lockfree") {
        let locked = stats
            .iter()
            .find(|s| s.variant() == "locked" && s.name() == lf.name() && s.threads() == lf.threads());
        let locked = match locked {
            Some(locked) => locked,
            None => continue,
        };
        let speedup = if lf.mean() == 0 {
            0.0
        } else {
            locked.mean() as f64 / lf.mean() as f64
        };
        println!(
            "{:>8}  {:<16}  {:>14}  {:>14}  {:>7.2}x",
            lf.threads(),
            lf.name(),
            fmt_thousands_sep(locked.mean()),
            fmt_thousands_sep(lf.mean()),
            speedup
        );
    }
}

fn run() -> Result<(), RunnerError> {
    let benches = S!(
        locked::mixed,
        locked::push,
        locked::pop,
        locked::transfer,
        lockfree::mixed,
        lockfree::push,
        lockfree::pop,
        lockfree::transfer
    );

    let matches = clap_app!(benchmark_runner =>
        (version: "1.0")
        (author: "Martin Hafskjold Thoresen <martinhath@gmail.com")
        (about: "Times the lock-free queue against the locked baseline")
        (@arg num_threads: -t +takes_value "Run with this many threads instead of the default sweep")
        (@arg ops: -o +takes_value "Sets the number of operations per thread")
        (@arg prefill: -p +takes_value "Sets the number of elements in the queue before `mixed` starts")
        (@arg rounds: -r +takes_value "Sets the number of timed rounds per benchmark")
        (@arg output_dir: -d +takes_value "Write the raw samples to this directory")
        (@arg name: +takes_value "The name of the benchmarks that is ran")
    )
    .get_matches();

    let sweep = match matches.value_of("num_threads") {
        None => THREAD_SWEEP.to_vec(),
        Some(_) => vec![parse_arg(&matches, "num_threads", 1, 1)?],
    };
    let ops = parse_arg(&matches, "ops", DEFAULT_OPS, 1)?;
    let prefill = parse_arg(&matches, "prefill", DEFAULT_PREFILL, 0)?;
    let rounds = parse_arg(&matches, "rounds", DEFAULT_ROUNDS, 1)?;
    let filter_name = matches.value_of("name").unwrap_or("");

    let selected: Vec<_> = benches
        .iter()
        .filter(|&&(_, ref name)| name.contains(filter_name))
        .collect();
    if selected.is_empty() {
        return Err(RunnerError::NoBenchmarks(filter_name.to_string()));
    }

    let mut stats = Vec::with_capacity(sweep.len() * selected.len());
    for &threads in &sweep {
        let params = Params {
            threads,
            ops,
            prefill,
            rounds,
        };
        for (f, name) in selected.iter() {
            info!(bench = %name, threads, ops, "running");
            let stat = f.call(&params);
            println!("{}", stat);
            stats.push(stat);
        }
    }

    if let Some(dir) = matches.value_of("output_dir") {
        write_samples(Path::new(dir), &stats)?;
    }
    print_comparison(&stats);
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
