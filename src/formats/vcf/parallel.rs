//! Parallel block scheduler.
//!
//! Record lines are grouped into fixed-size [`RecordBlock`]s in input order
//! and tagged with a sequence number. Blocks are decoded on a dedicated rayon
//! pool; results come back over a crossbeam channel in completion order and
//! are held in a reorder buffer until every earlier block has been handed
//! out. Callers therefore always see blocks in input order.
//!
//! At most `2 * workers` blocks are in flight, which bounds memory whatever
//! the input size.

use crate::error::{Result, VarchunkError};
use crate::formats::primitives::LineReader;
use crate::formats::vcf::chunk::ColumnSet;
use crate::formats::vcf::decoder::RecordDecoder;
use crate::formats::vcf::diagnostics::DiagnosticLog;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A run of raw record lines, stored contiguously.
#[derive(Debug, Default)]
pub(crate) struct RecordBlock {
    data: Vec<u8>,
    ends: Vec<usize>,
    lines: Vec<usize>,
}

impl RecordBlock {
    pub(crate) fn push(&mut self, record: &[u8], line: usize) {
        self.data.extend_from_slice(record);
        self.ends.push(self.data.len());
        self.lines.push(line);
    }

    pub(crate) fn len(&self) -> usize {
        self.ends.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Records with their input line numbers.
    pub(crate) fn records(&self) -> impl Iterator<Item = (&[u8], usize)> {
        let starts = std::iter::once(0).chain(self.ends.iter().copied());
        starts
            .zip(&self.ends)
            .zip(&self.lines)
            .map(move |((start, &end), &line)| (&self.data[start..end], line))
    }

    /// Reads up to `length` non-empty record lines.
    ///
    /// Returns an empty block at end of input.
    pub(crate) fn read_from<R: BufRead>(
        input: &mut LineReader<R>,
        scratch: &mut Vec<u8>,
        length: usize,
    ) -> Result<RecordBlock> {
        let mut block = RecordBlock::default();
        while block.len() < length && input.read_line(scratch)? {
            if !scratch.is_empty() {
                block.push(scratch, input.line_number());
            }
        }
        Ok(block)
    }
}

/// A decoded block, ready to be appended to a chunk.
#[derive(Debug)]
pub(crate) struct DecodedBlock {
    pub(crate) columns: ColumnSet,
    pub(crate) log: DiagnosticLog,
}

/// Decodes every record of `block` into a fresh column set.
pub(crate) fn decode_block(decoder: &RecordDecoder, block: &RecordBlock) -> DecodedBlock {
    let mut columns = decoder.new_columns(block.len());
    let mut log = DiagnosticLog::default();
    for (record, line) in block.records() {
        decoder.decode(record, line, &mut columns, &mut log);
    }
    DecodedBlock { columns, log }
}

type WorkerResult = (usize, std::result::Result<DecodedBlock, String>);

/// Decodes blocks on a thread pool and returns them in submission order.
pub(crate) struct BlockScheduler {
    pool: rayon::ThreadPool,
    decoder: Arc<RecordDecoder>,
    sender: Sender<WorkerResult>,
    receiver: Receiver<WorkerResult>,
    pending: BTreeMap<usize, DecodedBlock>,
    next_submit: usize,
    next_expected: usize,
    max_in_flight: usize,
}

impl BlockScheduler {
    /// Creates a scheduler with `workers` decode threads.
    ///
    /// # Errors
    ///
    /// Returns [`VarchunkError::Worker`] if the thread pool cannot be built.
    pub(crate) fn new(decoder: Arc<RecordDecoder>, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("varchunk-decode-{}", i))
            .build()
            .map_err(|e| VarchunkError::Worker(e.to_string()))?;
        let (sender, receiver) = unbounded();
        debug!("Started block decode pool with {} workers", workers);
        Ok(BlockScheduler {
            pool,
            decoder,
            sender,
            receiver,
            pending: BTreeMap::new(),
            next_submit: 0,
            next_expected: 0,
            max_in_flight: 2 * workers.max(1),
        })
    }

    fn in_flight(&self) -> usize {
        self.next_submit - self.next_expected
    }

    /// Returns `true` if another block may be submitted.
    pub(crate) fn has_capacity(&self) -> bool {
        self.in_flight() < self.max_in_flight
    }

    /// Queues `block` for decoding.
    pub(crate) fn submit(&mut self, block: RecordBlock) {
        let index = self.next_submit;
        self.next_submit += 1;
        let decoder = Arc::clone(&self.decoder);
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| decode_block(&decoder, &block)))
                .map_err(|_| format!("worker panicked while decoding block {}", index));
            // The receiver only goes away when the session is dropped
            let _ = sender.send((index, result));
        });
    }

    /// Returns the next block in submission order, waiting for it if needed.
    ///
    /// Returns `Ok(None)` once every submitted block has been returned.
    pub(crate) fn next_in_order(&mut self) -> Result<Option<DecodedBlock>> {
        if self.in_flight() == 0 {
            return Ok(None);
        }
        loop {
            if let Some(block) = self.pending.remove(&self.next_expected) {
                self.next_expected += 1;
                return Ok(Some(block));
            }
            let (index, result) = self.receiver.recv().map_err(|_| {
                VarchunkError::Worker(format!(
                    "channel closed while waiting for block {}",
                    self.next_expected
                ))
            })?;
            self.pending.insert(index, result.map_err(VarchunkError::Worker)?);
        }
    }
}
