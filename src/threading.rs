use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info};

use crate::errors::{FqFilterError, Result};
use crate::fastq::{FastqRecord, Reader, Writer};
use crate::filter::{Filter, Report};
use crate::report::StatsAggregator;

pub const DEFAULT_PACK_SIZE: usize = 1000;

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Contiguous run of input records; `id` is its position in the input.
pub struct Pack {
    pub id: u64,
    pub data: Vec<FastqRecord>,
}

/// Clean records of one pack, in input order, plus the pack's counts.
pub struct ProcessedPack {
    pub id: u64,
    pub data: Vec<FastqRecord>,
    pub report: Report,
}

// Helper for ordering ProcessedPack in BinaryHeap (MinHeap)
struct OrderedPack(ProcessedPack);

impl PartialEq for OrderedPack {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for OrderedPack {}
impl PartialOrd for OrderedPack {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedPack {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for MinHeap
        other.0.id.cmp(&self.0.id)
    }
}

/// Holds processed packs until every earlier pack has been released.
///
/// The buffer is unbounded: a slow pack holds back everything behind it, so
/// in the worst case it grows to the packs read while that one is in flight.
/// Channel capacity bounds only what is queued, not what waits here.
#[derive(Default)]
pub struct ReorderBuffer {
    next_id: u64,
    heap: BinaryHeap<OrderedPack>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pack: ProcessedPack) {
        debug_assert!(pack.id >= self.next_id, "pack {} already released", pack.id);
        self.heap.push(OrderedPack(pack));
    }

    /// Next pack in input order, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<ProcessedPack> {
        if self.heap.peek()?.0.id != self.next_id {
            return None;
        }
        let OrderedPack(pack) = self.heap.pop()?;
        self.next_id += 1;
        Some(pack)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub threads: usize,
    pub pack_size: usize,
    /// Channel capacity in packs; 0 selects `threads * 2`.
    pub queue_depth: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { threads: num_cpus::get(), pack_size: DEFAULT_PACK_SIZE, queue_depth: 0 }
    }
}

impl SchedulerOptions {
    fn effective_queue_depth(&self) -> usize {
        if self.queue_depth == 0 {
            self.threads.max(1) * 2
        } else {
            self.queue_depth
        }
    }
}

/// Filters every record from `reader` on a pool of worker threads and writes
/// the clean ones to `writer` in input order.
///
/// The calling thread reads and packs records, `options.threads` workers
/// filter packs, and one writer thread restores pack order and merges the
/// per-pack counts. The first decode or write error cancels the run and is
/// returned; output written up to that point is incomplete.
pub fn filter_stream(
    reader: &mut Reader,
    writer: &mut Writer,
    filter: &Filter,
    options: &SchedulerOptions,
) -> Result<Report> {
    let threads = options.threads.max(1);
    let pack_size = options.pack_size.max(1);
    let queue_depth = options.effective_queue_depth();
    debug!("Scheduling with {threads} workers, pack size {pack_size}, queue depth {queue_depth}");

    let (tx_pack, rx_pack): (Sender<Pack>, Receiver<Pack>) = bounded(queue_depth);
    let (tx_out, rx_out): (Sender<ProcessedPack>, Receiver<ProcessedPack>) = bounded(queue_depth);
    let cancelled = AtomicBool::new(false);
    let cancelled = &cancelled;

    thread::scope(|s| {
        // 1. Workers
        let mut workers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let rx = rx_pack.clone();
            let tx = tx_out.clone();
            workers.push(s.spawn(move || run_worker(filter, &rx, &tx, cancelled)));
        }
        // Drop the originals so channels close when their users finish
        drop(rx_pack);
        drop(tx_out);

        // 2. Writer thread
        let writer_handle = s.spawn(move || write_ordered(writer, &rx_out, cancelled));

        // 3. Reader (calling thread)
        let read_result = read_packs(reader, tx_pack, pack_size, cancelled);

        let mut panicked = false;
        for w in workers {
            panicked |= w.join().is_err();
        }
        let write_result = writer_handle.join().map_err(|_| FqFilterError::WorkerPanicked)?;

        read_result?;
        if panicked {
            return Err(FqFilterError::WorkerPanicked);
        }
        write_result
    })
}

fn read_packs(
    reader: &mut Reader,
    tx: Sender<Pack>,
    pack_size: usize,
    cancelled: &AtomicBool,
) -> Result<()> {
    let mut data = Vec::with_capacity(pack_size);
    let mut id = 0u64;

    while !cancelled.load(AtomicOrdering::Relaxed) {
        let rec = match reader.next_record() {
            Ok(Some(rec)) => rec,
            Ok(None) => break,
            Err(e) => {
                cancelled.store(true, AtomicOrdering::Relaxed);
                return Err(e);
            }
        };
        data.push(rec);
        if data.len() >= pack_size {
            let full = std::mem::replace(&mut data, Vec::with_capacity(pack_size));
            // A closed channel means downstream failed and reports its own error.
            if tx.send(Pack { id, data: full }).is_err() {
                return Ok(());
            }
            id += 1;
        }
    }

    // Send remaining data
    if !data.is_empty() && !cancelled.load(AtomicOrdering::Relaxed) {
        let _ = tx.send(Pack { id, data });
        id += 1;
    }
    debug!(
        "Reader finished: {} records in {id} packs from {}",
        reader.records_read(),
        reader.path().display()
    );
    Ok(())
}

fn run_worker(
    filter: &Filter,
    rx: &Receiver<Pack>,
    tx: &Sender<ProcessedPack>,
    cancelled: &AtomicBool,
) {
    while let Ok(pack) = rx.recv() {
        // Drain without work once the run is abandoned.
        if cancelled.load(AtomicOrdering::Relaxed) {
            continue;
        }
        let mut data = Vec::with_capacity(pack.data.len());
        let mut report = Report::default();
        for rec in pack.data {
            if let Some(rec) = filter.apply(rec, &mut report) {
                data.push(rec);
            }
        }
        if tx.send(ProcessedPack { id: pack.id, data, report }).is_err() {
            break;
        }
    }
}

fn write_ordered(
    writer: &mut Writer,
    rx: &Receiver<ProcessedPack>,
    cancelled: &AtomicBool,
) -> Result<Report> {
    let mut buffer = ReorderBuffer::new();
    let mut stats = StatsAggregator::new();
    let mut next_progress = PROGRESS_INTERVAL;
    let mut seen = 0u64;
    let mut peak = 0usize;

    for pack in rx {
        if cancelled.load(AtomicOrdering::Relaxed) {
            continue;
        }
        buffer.push(pack);
        peak = peak.max(buffer.len());

        while let Some(p) = buffer.pop_ready() {
            stats.add(&p.report);
            for rec in &p.data {
                if let Err(e) = writer.write_record(rec) {
                    cancelled.store(true, AtomicOrdering::Relaxed);
                    return Err(FqFilterError::io(writer.path(), e));
                }
            }
            seen += p.report.total_reads;
            if seen >= next_progress {
                info!("Processed {seen} reads");
                next_progress = (seen / PROGRESS_INTERVAL + 1) * PROGRESS_INTERVAL;
            }
        }
    }

    // Packs left behind belong to a worker that died mid-run.
    if !buffer.is_empty() && !cancelled.load(AtomicOrdering::Relaxed) {
        return Err(FqFilterError::WorkerPanicked);
    }
    debug!("Writer merged {} packs, at most {peak} held for reordering", stats.packs());
    Ok(stats.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::adapter_trie::{AdapterSet, AdapterTrie};
    use crate::filter::poly_x::PolyXDetector;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    fn processed(id: u64) -> ProcessedPack {
        ProcessedPack { id, data: Vec::new(), report: Report::default() }
    }

    #[test]
    fn test_reorder_buffer_releases_in_id_order() {
        let mut buffer = ReorderBuffer::new();
        buffer.push(processed(2));
        buffer.push(processed(0));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop_ready().map(|p| p.id), Some(0));
        assert!(buffer.pop_ready().is_none());
        assert_eq!(buffer.next_id(), 1);

        buffer.push(processed(1));
        assert_eq!(buffer.pop_ready().map(|p| p.id), Some(1));
        assert_eq!(buffer.pop_ready().map(|p| p.id), Some(2));
        assert!(buffer.is_empty());
    }

    /// Shared in-memory sink so the test can inspect what the writer produced.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn filter() -> Filter {
        let set = AdapterSet::from_sequences(["ACGTACGTACGT"]).unwrap();
        Filter::new(PolyXDetector::default(), AdapterTrie::new(&set))
    }

    fn input(n: usize) -> (String, Vec<String>) {
        let mut text = String::new();
        let mut clean = Vec::new();
        for i in 0..n {
            let seq = match i % 3 {
                0 => "AAAAAAAAAAAAAAAG".to_string(),
                1 => "TTTTACGTACGTACGTTTTT".to_string(),
                _ => format!("GATTACA{}GATTACA", ["A", "C", "G", "T"][i % 4]),
            };
            let qual = "I".repeat(seq.len());
            let unit = format!("@read{i}\n{seq}\n+\n{qual}\n");
            if i % 3 == 2 {
                clean.push(unit.clone());
            }
            text.push_str(&unit);
        }
        (text, clean)
    }

    fn reader(text: String) -> Reader {
        Reader::from_bufread(Box::new(Cursor::new(text.into_bytes())), "mem.fq")
    }

    #[test]
    fn test_output_order_matches_input_for_any_thread_count() {
        let (text, clean) = input(257);
        let expected = clean.concat();
        let f = filter();
        for threads in [1, 2, 3, 8] {
            let sink = SharedBuf::default();
            let mut w = Writer::from_writer(Box::new(sink.clone()), "mem.out");
            let opts = SchedulerOptions { threads, pack_size: 7, queue_depth: 0 };
            let report = filter_stream(&mut reader(text.clone()), &mut w, &f, &opts).unwrap();
            w.finish().unwrap();

            assert_eq!(String::from_utf8(sink.0.lock().unwrap().clone()).unwrap(), expected);
            assert_eq!(report.total_reads, 257);
            assert_eq!(report.discarded_poly_x, 86);
            assert_eq!(report.discarded_adapter, 86);
            assert_eq!(report.clean_reads, 85);
            assert!(report.is_consistent());
        }
    }

    #[test]
    fn test_empty_input_gives_zero_report() {
        let mut w = Writer::from_writer(Box::new(SharedBuf::default()), "mem.out");
        let opts = SchedulerOptions::default();
        let report = filter_stream(&mut reader(String::new()), &mut w, &filter(), &opts).unwrap();
        assert_eq!(report, Report::default());
    }

    #[test]
    fn test_decode_error_aborts_run() {
        let (mut text, _) = input(50);
        text.push_str("@broken\nACGT\n+\nII\n");
        let mut w = Writer::from_writer(Box::new(SharedBuf::default()), "mem.out");
        let opts = SchedulerOptions { threads: 4, pack_size: 5, queue_depth: 1 };
        match filter_stream(&mut reader(text), &mut w, &filter(), &opts) {
            Err(FqFilterError::Format { line, record, .. }) => {
                assert_eq!(line, 201);
                assert_eq!(record, 51);
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_error_aborts_run() {
        let (text, _) = input(500);
        let mut w = Writer::from_writer(Box::new(FailingSink), "full.out");
        let opts = SchedulerOptions { threads: 2, pack_size: 3, queue_depth: 1 };
        match filter_stream(&mut reader(text), &mut w, &filter(), &opts) {
            Err(FqFilterError::Io { path, .. }) => assert_eq!(path.to_str(), Some("full.out")),
            other => panic!("expected I/O error, got {other:?}"),
        }
    }

    fn send_packs(ids: &[u64]) -> Receiver<ProcessedPack> {
        let (tx, rx) = bounded(ids.len());
        for &id in ids {
            tx.send(processed(id)).unwrap();
        }
        rx
    }

    #[test]
    fn test_missing_pack_is_reported_as_worker_failure() {
        let rx = send_packs(&[0, 2]);
        let mut w = Writer::from_writer(Box::new(SharedBuf::default()), "mem.out");
        let cancelled = AtomicBool::new(false);
        let result = write_ordered(&mut w, &rx, &cancelled);
        assert!(matches!(result, Err(FqFilterError::WorkerPanicked)), "got {result:?}");
    }

    #[test]
    fn test_missing_pack_is_ignored_after_cancellation() {
        let rx = send_packs(&[0, 2]);
        let mut w = Writer::from_writer(Box::new(SharedBuf::default()), "mem.out");
        let cancelled = AtomicBool::new(true);
        assert_eq!(write_ordered(&mut w, &rx, &cancelled).unwrap(), Report::default());
    }
}
