use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::{FqFilterError, Result};
use crate::filter::Report;

/// Folds per-pack reports into the run total.
///
/// Owned by the single thread that sees every processed pack; `finalize`
/// consumes it, so the totals are produced once.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total: Report,
    packs: u64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, partial: &Report) {
        self.total.merge(partial);
        self.packs += 1;
    }

    /// Packs merged so far.
    pub fn packs(&self) -> u64 {
        self.packs
    }

    pub fn finalize(self) -> Report {
        debug_assert!(self.total.is_consistent());
        self.total
    }
}

/// Renders the stats file body, one `key:\tvalue` per line.
pub fn format_stats(report: &Report) -> String {
    format!(
        "filterByPolyX:\t{}\nfilterByAdapter:\t{}\ntotalReads:\t{}\ncleanReads:\t{}\n",
        report.discarded_poly_x, report.discarded_adapter, report.total_reads, report.clean_reads
    )
}

pub fn write_stats(path: &Path, report: &Report) -> Result<()> {
    std::fs::write(path, format_stats(report)).map_err(|e| FqFilterError::io(path, e))
}

pub fn write_json(path: &Path, report: &Report) -> Result<()> {
    let f = File::create(path).map_err(|e| FqFilterError::io(path, e))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, report)
        .map_err(|e| FqFilterError::io(path, e.into()))?;
    writeln!(w).and_then(|()| w.flush()).map_err(|e| FqFilterError::io(path, e))
}

/// Formats a fraction of `total` as a percentage with two decimals.
pub fn format_percent(count: u64, total: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let pct = count as f64 * 100.0 / total as f64;
    format!("{pct:.2}%")
}
