use std::path::PathBuf;

use clap::Parser;

/// Host runtime for embarrassingly-parallel Monte-Carlo simulations.
///
/// Loads a dynamically-linked simulation plugin, fans its events out across
/// a fixed pool of worker threads, and persists or reduces each event's
/// result.
#[derive(Debug, Parser)]
#[command(name = "hpcsim", disable_help_subcommand = true)]
pub struct Cli {
    /// Path to the simulation plugin (a shared object exporting at least
    /// `EventRun`).
    #[arg(short = 's', long = "simulation")]
    pub simulation: PathBuf,

    /// Number of worker threads, or `a` to use all available cores.
    #[arg(short = 't', long = "threads", default_value = "1")]
    pub threads: ThreadCount,

    /// Total number of events to run.
    #[arg(short = 'e', long = "events", default_value_t = 100)]
    pub events: u64,

    /// Index of the first event in this run, for partitioned workloads.
    #[arg(short = 'f', long = "first", default_value_t = 0)]
    pub first: u64,

    /// Output file. In persist mode, results are written here (truncated
    /// unless `--checkpoint` is set, in which case they are appended). In
    /// reduce mode (a plugin exporting `ReduceResult`), this path is passed
    /// through to the plugin but never written by the host itself.
    #[arg(short = 'o', long = "output", default_value = "HPCsim.out")]
    pub output: PathBuf,

    /// Scan `--output` for previously completed events before running, and
    /// skip any whose digest is already present.
    #[arg(short = 'c', long = "checkpoint", default_value_t = false)]
    pub checkpoint: bool,

    /// Dispatch events in pilot batches (one `PilotInit`/`PilotClear` pair
    /// per chunk of events) instead of one worker per event.
    #[arg(short = 'p', long = "pilot", default_value_t = false)]
    pub pilot: bool,
}

impl Cli {
    /// Parses `std::env::args`, printing usage and exiting 0 on any parse
    /// failure (a missing `--simulation`, an unknown option, a malformed
    /// value) rather than clap's default "print error, exit 2" behavior.
    pub fn parse_checked() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(err) => {
                let _ = err.print();
                std::process::exit(0);
            }
        }
    }
}

/// A worker count: either a fixed number, or "auto" to use every available
/// core.
#[derive(Debug, Clone, Copy)]
pub enum ThreadCount {
    Fixed(usize),
    Auto,
}

impl ThreadCount {
    /// Resolves this count to a concrete, nonzero number of worker threads.
    pub fn resolve(self) -> usize {
        match self {
            ThreadCount::Fixed(n) => n,
            ThreadCount::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl std::str::FromStr for ThreadCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("a") {
            return Ok(ThreadCount::Auto);
        }
        s.parse::<usize>()
            .map_err(|_| format!("invalid thread count '{s}', expected a positive integer or 'a'"))
            .and_then(|n| {
                if n == 0 {
                    Err("thread count must be at least 1".to_string())
                } else {
                    Ok(ThreadCount::Fixed(n))
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_count() {
        let count: ThreadCount = "4".parse().unwrap();
        assert_eq!(count.resolve(), 4);
    }

    #[test]
    fn parses_auto_marker_case_insensitively() {
        assert!(matches!("a".parse::<ThreadCount>().unwrap(), ThreadCount::Auto));
        assert!(matches!("A".parse::<ThreadCount>().unwrap(), ThreadCount::Auto));
    }

    #[test]
    fn rejects_zero() {
        assert!("0".parse::<ThreadCount>().is_err());
    }

    #[test]
    fn events_and_output_default_when_omitted() {
        let cli = Cli::try_parse_from(["hpcsim", "-s", "plugin.so"]).unwrap();
        assert_eq!(cli.events, 100);
        assert_eq!(cli.output, PathBuf::from("HPCsim.out"));
        assert!(!cli.pilot);
    }

    #[test]
    fn missing_simulation_is_a_parse_error() {
        assert!(Cli::try_parse_from(["hpcsim"]).is_err());
    }

    #[test]
    fn unknown_option_is_a_parse_error() {
        assert!(Cli::try_parse_from(["hpcsim", "-s", "plugin.so", "--bogus"]).is_err());
    }
}
