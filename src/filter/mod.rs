pub mod adapter_trie;
pub mod poly_x;

use serde::Serialize;

use crate::fastq::FastqRecord;
use self::adapter_trie::AdapterTrie;
use self::poly_x::PolyXDetector;

/// Read counts for one pack or a whole run.
#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub total_reads: u64,
    pub discarded_poly_x: u64,
    pub discarded_adapter: u64,
    pub clean_reads: u64,
}

impl Report {
    /// Counts one classified record.
    pub fn record(&mut self, class: &Classification) {
        self.total_reads += 1;
        match class {
            Classification::Clean(_) => self.clean_reads += 1,
            Classification::DiscardedPolyX => self.discarded_poly_x += 1,
            Classification::DiscardedAdapter => self.discarded_adapter += 1,
        }
    }

    pub fn merge(&mut self, other: &Report) {
        self.total_reads += other.total_reads;
        self.discarded_poly_x += other.discarded_poly_x;
        self.discarded_adapter += other.discarded_adapter;
        self.clean_reads += other.clean_reads;
    }

    pub fn discarded(&self) -> u64 {
        self.discarded_poly_x + self.discarded_adapter
    }

    /// Every read landed in exactly one outcome.
    pub fn is_consistent(&self) -> bool {
        self.discarded() + self.clean_reads == self.total_reads
    }
}

/// Outcome of running one record through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Clean(FastqRecord),
    DiscardedPolyX,
    DiscardedAdapter,
}

/// PolyX test followed by the adapter test.
///
/// Read-only after construction; workers share it by reference.
#[derive(Debug)]
pub struct Filter {
    poly_x: PolyXDetector,
    adapters: AdapterTrie,
}

impl Filter {
    pub fn new(poly_x: PolyXDetector, adapters: AdapterTrie) -> Self {
        Self { poly_x, adapters }
    }

    pub fn poly_x(&self) -> &PolyXDetector {
        &self.poly_x
    }

    pub fn adapters(&self) -> &AdapterTrie {
        &self.adapters
    }

    /// A read with both a polyX run and an adapter counts as polyX.
    pub fn classify(&self, rec: FastqRecord) -> Classification {
        let seq = rec.seq().as_bytes();
        if self.poly_x.is_contaminated(seq) {
            Classification::DiscardedPolyX
        } else if self.adapters.contains_adapter(seq) {
            Classification::DiscardedAdapter
        } else {
            Classification::Clean(rec)
        }
    }

    /// Classifies `rec`, counts the outcome and returns the record if clean.
    pub fn apply(&self, rec: FastqRecord, report: &mut Report) -> Option<FastqRecord> {
        let class = self.classify(rec);
        report.record(&class);
        match class {
            Classification::Clean(rec) => Some(rec),
            _ => None,
        }
    }
}
