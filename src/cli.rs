//! Command-line surface (C7, spec §6 CLI table), via `clap`'s derive API.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "incast-gen", version, about = "Partition/aggregate (incast) workload generator client")]
pub struct Cli {
    /// Configuration file path.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Prefix for the two output log files, `<prefix>_reqs.txt` and
    /// `<prefix>_flows.txt`.
    #[arg(short = 'l', long = "log-prefix", value_name = "PREFIX", default_value = "log")]
    pub log_prefix: String,

    /// RNG seed. Defaults to the current wall-clock microseconds, so two
    /// runs a microsecond apart still diverge.
    #[arg(short = 's', long = "seed")]
    pub seed: Option<u64>,

    /// Verbose stdout: forces the effective log level to debug regardless
    /// of `RUST_LOG`.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

impl Cli {
    pub fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock is before the Unix epoch")
                .as_micros() as u64
        })
    }
}
