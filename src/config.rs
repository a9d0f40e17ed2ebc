use std::path::PathBuf;

use clap::{ArgAction, Parser};
use serde::Serialize;

use crate::errors::{FqFilterError, Result};
use crate::filter::poly_x::{PolyXDetector, DEFAULT_POLY_X_LEN, DEFAULT_POLY_X_MISMATCHES};
use crate::threading::{SchedulerOptions, DEFAULT_PACK_SIZE};

#[derive(Parser, Debug, Clone, Serialize)]
#[command(
    name = "fqfilter",
    version,
    about = "Discard polyX- and adapter-contaminated reads from a FASTQ file"
)]
pub struct Cli {
    /// Input FASTQ, gzip-compressed or plain
    #[arg(short = 'i', long = "in1")]
    pub in1: PathBuf,
    /// Adapter list, one sequence per line
    #[arg(short = 'a', long = "adapters")]
    pub adapters: PathBuf,
    /// Output FASTQ of clean reads; gzip when the name ends in .gz
    #[arg(short = 'o', long = "out1")]
    pub out1: PathBuf,
    /// Stats output (key:value per line)
    #[arg(short = 's', long = "stats")]
    pub stats: PathBuf,
    #[arg(short = 'j', long = "json")]
    pub json: Option<PathBuf>,

    /// Fail when the adapter list holds no usable adapter
    #[arg(long = "require_adapters", action = ArgAction::SetTrue)]
    pub require_adapters: bool,

    // PolyX detection
    #[arg(long = "poly_x_len", default_value_t = DEFAULT_POLY_X_LEN)]
    pub poly_x_len: usize,
    /// Shortest window tested; defaults to --poly_x_len
    #[arg(long = "poly_x_min_len")]
    pub poly_x_min_len: Option<usize>,
    #[arg(long = "poly_x_mismatches", default_value_t = DEFAULT_POLY_X_MISMATCHES)]
    pub poly_x_mismatches: usize,

    // Threading
    /// Worker threads; defaults to the number of CPUs
    #[arg(short = 'w', long = "thread")]
    pub thread: Option<usize>,

    // Performance tuning
    #[arg(long = "pack_size", default_value_t = DEFAULT_PACK_SIZE)]
    pub pack_size: usize,
    #[arg(long = "queue_depth", default_value_t = 0)]
    pub queue_depth: usize,
    #[arg(short = 'z', long = "compression", default_value_t = 4)]
    pub compression: u32,
}

impl Cli {
    /// Checks parameters and input paths before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.thread == Some(0) {
            return Err(FqFilterError::invalid_parameter("thread", "must be >= 1"));
        }
        if self.pack_size == 0 {
            return Err(FqFilterError::invalid_parameter("pack_size", "must be >= 1"));
        }
        if self.compression > 9 {
            return Err(FqFilterError::invalid_parameter(
                "compression",
                format!("{} is outside 0..=9", self.compression),
            ));
        }
        self.poly_x_detector()?;

        for (name, path) in [("in1", &self.in1), ("adapters", &self.adapters)] {
            if !path.is_file() {
                return Err(FqFilterError::invalid_parameter(
                    name,
                    format!("'{}' does not exist or is not a file", path.display()),
                ));
            }
        }
        if self.out1 == self.in1 {
            return Err(FqFilterError::invalid_parameter("out1", "must differ from --in1"));
        }
        Ok(())
    }

    pub fn threads(&self) -> usize {
        self.thread.unwrap_or_else(num_cpus::get)
    }

    pub fn poly_x_detector(&self) -> Result<PolyXDetector> {
        if self.poly_x_len == 0 {
            return Err(FqFilterError::invalid_parameter("poly_x_len", "must be >= 1"));
        }
        let min_len = self.poly_x_min_len.unwrap_or(self.poly_x_len);
        PolyXDetector::new(min_len, self.poly_x_len, self.poly_x_mismatches)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            threads: self.threads(),
            pack_size: self.pack_size,
            queue_depth: self.queue_depth,
        }
    }
}
