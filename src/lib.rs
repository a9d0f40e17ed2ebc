//! Discards FASTQ reads contaminated by homopolymer runs (polyX) or by
//! adapter sequences, writing the clean reads in their original order.
//!
//! The [`run`] entry point wires the pieces together:
//! [`fastq::Reader`] feeds records to [`threading::filter_stream`], whose
//! workers apply a shared [`filter::Filter`] (a [`filter::poly_x::PolyXDetector`]
//! followed by a [`filter::adapter_trie::AdapterTrie`]), and the resulting
//! [`filter::Report`] is written by [`report`].
#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod fastq;
pub mod filter;
pub mod report;
pub mod threading;

use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::Cli;
use crate::errors::{FqFilterError, Result};
use crate::fastq::{Reader, Writer};
use crate::filter::adapter_trie::{AdapterSet, AdapterTrie};
use crate::filter::{Filter, Report};
use crate::report::{format_percent, write_json, write_stats};
use crate::threading::filter_stream;

/// Runs one filtering job end to end.
///
/// On failure the partially written output FASTQ is removed and no stats are
/// written.
pub fn run(cli: &Cli) -> Result<Report> {
    cli.validate()?;
    if let Ok(json) = serde_json::to_string(cli) {
        debug!("Configuration: {json}");
    }
    let start = Instant::now();

    let poly_x = cli.poly_x_detector()?;
    let adapters = AdapterSet::from_path(&cli.adapters)?;
    if adapters.is_empty() {
        if cli.require_adapters {
            return Err(FqFilterError::EmptyAdapterList { path: cli.adapters.clone() });
        }
        warn!(
            "No adapters loaded from {}; only polyX filtering is active",
            cli.adapters.display()
        );
    }
    let filter = Filter::new(poly_x, AdapterTrie::new(&adapters));
    info!(
        "Loaded {} adapters ({} trie nodes) from {}",
        filter.adapters().adapter_count(),
        filter.adapters().node_count(),
        cli.adapters.display()
    );
    info!(
        "PolyX windows {}..={} bp with at most {} mismatch(es)",
        filter.poly_x().min_len(),
        filter.poly_x().max_len(),
        filter.poly_x().max_mismatches()
    );

    let options = cli.scheduler_options();
    info!("Filtering {} with {} worker threads", cli.in1.display(), options.threads);

    let mut reader = Reader::new(&cli.in1)?;
    let mut writer = Writer::new(&cli.out1, cli.compression)?;
    let result = filter_stream(&mut reader, &mut writer, &filter, &options)
        .and_then(|report| writer.finish().map(|()| report));
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            discard_output(&cli.out1);
            return Err(e);
        }
    };

    write_stats(&cli.stats, &report)?;
    if let Some(json) = &cli.json {
        write_json(json, &report)?;
    }
    log_summary(&report, start);
    Ok(report)
}

fn discard_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed incomplete output {}", path.display()),
        Err(e) => warn!("Could not remove incomplete output {}: {e}", path.display()),
    }
}

fn log_summary(report: &Report, start: Instant) {
    info!("Total reads:         {}", report.total_reads);
    info!(
        "Discarded by polyX:  {} ({})",
        report.discarded_poly_x,
        format_percent(report.discarded_poly_x, report.total_reads)
    );
    info!(
        "Discarded by adapter: {} ({})",
        report.discarded_adapter,
        format_percent(report.discarded_adapter, report.total_reads)
    );
    info!(
        "Clean reads written: {} ({})",
        report.clean_reads,
        format_percent(report.clean_reads, report.total_reads)
    );
    info!("Done in {:.2?}", start.elapsed());
}
