//! Decode sessions.
//!
//! [`VcfChunks`] is the streaming entry point: it opens a source, reads the
//! header, resolves the field selection, and then yields [`Chunk`]s of at
//! most `chunk_length` rows until the input is exhausted. [`read_vcf`]
//! collects every chunk into one [`Callset`].
//!
//! Records are decoded on the calling thread unless `workers > 1`, in which
//! case blocks of `block_length` records are decoded on a thread pool and
//! reassembled in input order. A region restriction always uses the calling
//! thread.
//!
//! # Example
//!
//! ```no_run
//! use varchunk::formats::vcf::{ReadOptions, VcfChunks};
//!
//! # fn main() -> varchunk::Result<()> {
//! let options = ReadOptions::default()
//!     .fields(["CHROM", "POS", "calldata/GT"])
//!     .chunk_length(10_000)
//!     .workers(4);
//!
//! for chunk in VcfChunks::open("calls.vcf.gz", options)? {
//!     let chunk = chunk?;
//!     println!("{} rows, last at {:?}:{:?}", chunk.len(), chunk.last_chrom, chunk.last_pos);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, VarchunkError};
use crate::formats::primitives::{LineReader, Region};
use crate::formats::vcf::chunk::{Chunk, ColumnSet};
use crate::formats::vcf::decoder::RecordDecoder;
use crate::formats::vcf::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, Diagnostics};
use crate::formats::vcf::fields::{
    resolve_fields, FieldOverrides, FieldSpec, FillValue, ResolvedFields, SampleSelection,
};
use crate::formats::vcf::header::{parse_header, VcfHeader};
use crate::formats::vcf::parallel::{BlockScheduler, RecordBlock};
use crate::io::compression::{DataSource, DEFAULT_BUFFER_SIZE};
use crate::io::region::{locate, scan_matches};
use crate::io::sink::{Callset, ChunkSink, MemorySink};
use log::{debug, info};
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

/// Default rows per chunk.
pub const DEFAULT_CHUNK_LENGTH: usize = 65_536;

/// Default records per parallel block.
pub const DEFAULT_BLOCK_LENGTH: usize = 2_048;

/// Post-processing applied to every chunk before it is yielded.
///
/// # Example
///
/// ```
/// use varchunk::formats::vcf::{Chunk, ChunkTransformer};
///
/// /// Adds `variants/is_pass` as a copy of `FILTER_PASS`.
/// struct CopyPass;
///
/// impl ChunkTransformer for CopyPass {
///     fn transform(&self, chunk: &mut Chunk) -> varchunk::Result<()> {
///         if let Some(pass) = chunk.column("variants/FILTER_PASS").cloned() {
///             chunk.insert("variants/is_pass", pass)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ChunkTransformer: Send {
    /// Modifies `chunk` in place.
    fn transform(&self, chunk: &mut Chunk) -> Result<()>;
}

/// Options for a decode session.
pub struct ReadOptions {
    /// Field selection; `None` selects the default fields.
    pub fields: Option<Vec<String>>,
    /// Type, number and fill overrides.
    pub overrides: FieldOverrides,
    /// Region expression (`CHROM` or `CHROM:START-END`).
    pub region: Option<String>,
    /// Index tool used for regions; `None` always scans.
    pub tabix: Option<String>,
    /// Samples to decode calldata for.
    pub samples: SampleSelection,
    /// Input buffer size in bytes.
    pub buffer_size: usize,
    /// Maximum rows per chunk.
    pub chunk_length: usize,
    /// Decode threads; 1 decodes on the calling thread.
    pub workers: usize,
    /// Records per parallel block.
    pub block_length: usize,
    /// Turn the first diagnostic into an error.
    pub strict: bool,
    /// Log a progress line after every chunk.
    pub log_progress: bool,
    /// Hooks applied to every chunk, in order.
    pub transformers: Vec<Box<dyn ChunkTransformer>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            fields: None,
            overrides: FieldOverrides::default(),
            region: None,
            tabix: Some("tabix".to_string()),
            samples: SampleSelection::All,
            buffer_size: DEFAULT_BUFFER_SIZE,
            chunk_length: DEFAULT_CHUNK_LENGTH,
            workers: 1,
            block_length: DEFAULT_BLOCK_LENGTH,
            strict: false,
            log_progress: false,
            transformers: Vec::new(),
        }
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("fields", &self.fields)
            .field("overrides", &self.overrides)
            .field("region", &self.region)
            .field("tabix", &self.tabix)
            .field("samples", &self.samples)
            .field("buffer_size", &self.buffer_size)
            .field("chunk_length", &self.chunk_length)
            .field("workers", &self.workers)
            .field("block_length", &self.block_length)
            .field("strict", &self.strict)
            .field("log_progress", &self.log_progress)
            .field("transformers", &self.transformers.len())
            .finish()
    }
}

impl ReadOptions {
    /// Selects fields by name or wildcard.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides a field's type code (`"i2"`, `"S8"`, `"genotype/i1"`, ...).
    pub fn type_override(mut self, field: impl Into<String>, code: impl Into<String>) -> Self {
        self.overrides.types.insert(field.into(), code.into());
        self
    }

    /// Overrides a field's number of values.
    pub fn number_override(mut self, field: impl Into<String>, number: usize) -> Self {
        self.overrides.numbers.insert(field.into(), number);
        self
    }

    /// Overrides a field's fill value.
    pub fn fill_override(mut self, field: impl Into<String>, fill: impl Into<FillValue>) -> Self {
        self.overrides.fills.insert(field.into(), fill.into());
        self
    }

    /// Restricts decoding to a region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the index tool, or disables it with `None`.
    pub fn tabix(mut self, tabix: Option<&str>) -> Self {
        self.tabix = tabix.map(str::to_string);
        self
    }

    /// Selects samples.
    pub fn samples(mut self, samples: SampleSelection) -> Self {
        self.samples = samples;
        self
    }

    /// Sets the input buffer size.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the maximum rows per chunk.
    pub fn chunk_length(mut self, chunk_length: usize) -> Self {
        self.chunk_length = chunk_length;
        self
    }

    /// Sets the number of decode threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the records per parallel block.
    pub fn block_length(mut self, block_length: usize) -> Self {
        self.block_length = block_length;
        self
    }

    /// Enables or disables strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enables or disables progress logging.
    pub fn log_progress(mut self, log_progress: bool) -> Self {
        self.log_progress = log_progress;
        self
    }

    /// Adds a chunk transformer.
    pub fn transformer(mut self, transformer: impl ChunkTransformer + 'static) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    fn validate(&self) -> Result<()> {
        for (option, value) in [
            ("chunk_length", self.chunk_length),
            ("block_length", self.block_length),
            ("buffer_size", self.buffer_size),
        ] {
            if value == 0 {
                return Err(VarchunkError::InvalidOption {
                    option: option.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

struct Parallel {
    scheduler: BlockScheduler,
    /// A decoded block and how many of its rows were already emitted.
    current: Option<(ColumnSet, usize)>,
    eof: bool,
}

struct Progress {
    started: Instant,
    last: Instant,
    rows: usize,
}

/// Lazy sequence of chunks from one input.
///
/// Single pass: once exhausted, or after an error, it yields nothing more.
pub struct VcfChunks {
    input: LineReader<Box<dyn BufRead + Send>>,
    line: Vec<u8>,
    header: VcfHeader,
    resolved: ResolvedFields,
    decoder: Arc<RecordDecoder>,
    diagnostics: Diagnostics,
    scan: Option<Region>,
    parallel: Option<Parallel>,
    chunk_length: usize,
    block_length: usize,
    transformers: Vec<Box<dyn ChunkTransformer>>,
    progress: Option<Progress>,
    done: bool,
}

impl VcfChunks {
    /// Opens `source` and reads its header.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an unparsable region, a missing `#CHROM`
    /// line, I/O errors, or, in strict mode, any header or resolution
    /// diagnostic.
    pub fn open(source: impl Into<DataSource>, options: ReadOptions) -> Result<Self> {
        options.validate()?;
        let region = options
            .region
            .as_deref()
            .map(|region| region.parse::<Region>())
            .transpose()?;
        let mut diagnostics = Diagnostics::new(options.strict);

        let located = locate(
            source.into(),
            region.as_ref(),
            options.tabix.as_deref(),
            options.buffer_size,
        )?;
        for diagnostic in located.diagnostics {
            diagnostics.emit(diagnostic)?;
        }

        let mut input = LineReader::new(located.reader);
        let (header, header_diagnostics) = parse_header(&mut input)?;
        for diagnostic in header_diagnostics {
            diagnostics.emit(diagnostic)?;
        }

        let (resolved, field_diagnostics) = resolve_fields(
            &header,
            options.fields.as_deref(),
            &options.overrides,
            &options.samples,
        )?;
        for diagnostic in field_diagnostics {
            diagnostics.emit(diagnostic)?;
        }
        debug!(
            "Decoding {} fields for {} samples",
            resolved.fields.len(),
            resolved.samples.len()
        );

        let decoder = Arc::new(RecordDecoder::new(&resolved, &header));
        let parallel = if options.workers > 1 && region.is_some() {
            diagnostics.emit(Diagnostic::new(
                DiagnosticKind::Environment,
                "workers",
                "region filtering uses a single thread, ignoring workers",
            ))?;
            None
        } else if options.workers > 1 {
            Some(Parallel {
                scheduler: BlockScheduler::new(Arc::clone(&decoder), options.workers)?,
                current: None,
                eof: false,
            })
        } else {
            None
        };

        let progress = options.log_progress.then(|| {
            let now = Instant::now();
            Progress {
                started: now,
                last: now,
                rows: 0,
            }
        });

        Ok(VcfChunks {
            input,
            line: Vec::new(),
            header,
            resolved,
            decoder,
            diagnostics,
            scan: located.scan,
            parallel,
            chunk_length: options.chunk_length,
            block_length: options.block_length,
            transformers: options.transformers,
            progress,
            done: false,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    /// Selected sample identifiers, in header order.
    pub fn samples(&self) -> &[String] {
        &self.resolved.samples
    }

    /// Resolved fields, sorted by name.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.resolved.fields
    }

    /// Diagnostics raised so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.as_slice()
    }

    fn fill_direct(&mut self) -> Result<ColumnSet> {
        let mut set = self.decoder.new_columns(self.chunk_length);
        let mut log = DiagnosticLog::default();
        while set.rows() < self.chunk_length && self.input.read_line(&mut self.line)? {
            if self.line.is_empty() {
                continue;
            }
            if let Some(region) = &self.scan {
                if !scan_matches(region, &self.line) {
                    continue;
                }
            }
            self.decoder
                .decode(&self.line, self.input.line_number(), &mut set, &mut log);
            if !log.is_empty() {
                self.diagnostics.merge(&mut log)?;
            }
        }
        Ok(set)
    }

    fn fill_parallel(&mut self) -> Result<ColumnSet> {
        let mut set = self.decoder.new_columns(self.chunk_length);
        let Some(parallel) = self.parallel.as_mut() else {
            return Ok(set);
        };
        while set.rows() < self.chunk_length {
            if let Some((block, offset)) = parallel.current.as_mut() {
                let take = (self.chunk_length - set.rows()).min(block.rows() - *offset);
                set.extend_from(block, *offset..*offset + take)?;
                *offset += take;
                if *offset == block.rows() {
                    parallel.current = None;
                }
                continue;
            }

            while !parallel.eof && parallel.scheduler.has_capacity() {
                let block = RecordBlock::read_from(&mut self.input, &mut self.line, self.block_length)?;
                if block.is_empty() {
                    parallel.eof = true;
                } else {
                    parallel.scheduler.submit(block);
                }
            }
            match parallel.scheduler.next_in_order()? {
                Some(mut decoded) => {
                    self.diagnostics.merge(&mut decoded.log)?;
                    parallel.current = Some((decoded.columns, 0));
                }
                None => break,
            }
        }
        Ok(set)
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let set = if self.parallel.is_some() {
            self.fill_parallel()?
        } else {
            self.fill_direct()?
        };
        if set.rows() == 0 {
            if let Some(progress) = &self.progress {
                let elapsed = progress.started.elapsed().as_secs_f64();
                info!(
                    "Read {} rows in {:.2}s; all done ({:.0} rows/s)",
                    progress.rows,
                    elapsed,
                    progress.rows as f64 / elapsed.max(f64::EPSILON)
                );
            }
            return Ok(None);
        }

        let mut chunk = set.into_chunk(&self.resolved.fields, self.resolved.samples.len())?;
        for transformer in &self.transformers {
            transformer.transform(&mut chunk)?;
        }

        if let Some(progress) = self.progress.as_mut() {
            let now = Instant::now();
            let chunk_secs = now.duration_since(progress.last).as_secs_f64();
            progress.rows += chunk.len();
            progress.last = now;
            info!(
                "Read {} rows in {:.2}s; chunk in {:.2}s ({:.0} rows/s); {}:{}",
                progress.rows,
                progress.started.elapsed().as_secs_f64(),
                chunk_secs,
                chunk.len() as f64 / chunk_secs.max(f64::EPSILON),
                chunk.last_chrom.as_deref().unwrap_or("."),
                chunk.last_pos.unwrap_or(-1)
            );
        }
        Ok(Some(chunk))
    }
}

impl Iterator for VcfChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads a whole input into one [`Callset`].
///
/// An input without records gives zero-length arrays for every field.
///
/// # Errors
///
/// Any error [`VcfChunks::open`] or a chunk can raise.
pub fn read_vcf(source: impl Into<DataSource>, options: ReadOptions) -> Result<Callset> {
    let mut chunks = VcfChunks::open(source, options)?;
    let mut sink = MemorySink::new();
    let mut stored = false;
    for chunk in chunks.by_ref() {
        sink.store_chunk(&chunk?)?;
        stored = true;
    }
    if !stored {
        let empty = chunks
            .decoder
            .new_columns(0)
            .into_chunk(&chunks.resolved.fields, chunks.resolved.samples.len())?;
        sink.store_chunk(&empty)?;
    }

    let mut callset = sink.finish()?;
    callset.samples = chunks
        .resolved
        .return_samples
        .then(|| chunks.resolved.samples.clone());
    callset.headers = chunks.header.lines.clone();
    callset.diagnostics = chunks.diagnostics().to_vec();
    Ok(callset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VCF: &str = "##fileformat=VCFv4.1\n\
        ##FILTER=<ID=q10,Description=\"Quality below 10\">\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\n\
        1\t10\t.\tA\tC\t5\tq10\t.\tGT\t0/1\t1/1\n\
        1\t20\t.\tG\tT\t50\tPASS\t.\tGT\t0/0\t0/1\n\
        \n\
        2\t5\t.\tT\tA\t50\tPASS\t.\tGT\t./.\t1|1\n";

    fn open(options: ReadOptions) -> VcfChunks {
        VcfChunks::open(DataSource::from_reader(VCF.as_bytes()), options).unwrap()
    }

    #[test]
    fn test_default_selection() {
        let chunks = open(ReadOptions::default());
        let names: Vec<_> = chunks.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "calldata/GT",
                "variants/ALT",
                "variants/CHROM",
                "variants/FILTER_PASS",
                "variants/ID",
                "variants/POS",
                "variants/QUAL",
                "variants/REF",
            ]
        );
        assert_eq!(chunks.samples(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_chunk_lengths_and_positions() {
        let chunks: Vec<_> = open(ReadOptions::default().chunk_length(2))
            .collect::<Result<_>>()
            .unwrap();
        let lengths: Vec<_> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(lengths, vec![2, 1]);
        assert_eq!(chunks[0].last_chrom.as_deref(), Some("1"));
        assert_eq!(chunks[0].last_pos, Some(20));
        assert_eq!(chunks[1].last_chrom.as_deref(), Some("2"));
        assert_eq!(chunks[1].last_pos, Some(5));
    }

    #[test]
    fn test_parallel_matches_direct() {
        let direct: Vec<Chunk> = open(ReadOptions::default().chunk_length(2))
            .collect::<Result<_>>()
            .unwrap();
        for block_length in 1..4 {
            let parallel: Vec<Chunk> = open(
                ReadOptions::default()
                    .chunk_length(2)
                    .workers(3)
                    .block_length(block_length),
            )
            .collect::<Result<_>>()
            .unwrap();
            assert_eq!(parallel, direct);
        }
    }

    #[test]
    fn test_zero_lengths_rejected() {
        for options in [
            ReadOptions::default().chunk_length(0),
            ReadOptions::default().block_length(0),
            ReadOptions::default().buffer_size(0),
        ] {
            let err = VcfChunks::open(DataSource::from_reader(VCF.as_bytes()), options).err().unwrap();
            assert!(matches!(err, VarchunkError::InvalidOption { .. }));
        }
    }

    #[test]
    fn test_invalid_region_is_fatal() {
        let options = ReadOptions::default().region("1:20-10");
        let err = VcfChunks::open(DataSource::from_reader(VCF.as_bytes()), options).err().unwrap();
        assert!(matches!(err, VarchunkError::Format(_)));
    }

    #[test]
    fn test_region_with_workers_runs_single_threaded() {
        let mut chunks = open(ReadOptions::default().region("1:15-30").workers(4));
        let chunk = chunks.next().unwrap().unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.last_pos, Some(20));
        assert!(chunks.next().is_none());
        assert!(chunks
            .diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::Environment && d.subject == "workers"));
    }

    #[test]
    fn test_transformers_run_in_order() {
        struct Rename(&'static str, &'static str);
        impl ChunkTransformer for Rename {
            fn transform(&self, chunk: &mut Chunk) -> Result<()> {
                if let Some(column) = chunk.remove(self.0) {
                    chunk.insert(self.1, column)?;
                }
                Ok(())
            }
        }

        let options = ReadOptions::default()
            .fields(["POS"])
            .transformer(Rename("variants/POS", "variants/a"))
            .transformer(Rename("variants/a", "variants/b"));
        let chunk = open(options).next().unwrap().unwrap();
        let names: Vec<_> = chunk.columns().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["variants/b"]);
    }

    #[test]
    fn test_strict_mode_stops_at_first_diagnostic() {
        let vcf = "#CHROM\tPOS\n1\tx\n1\t2\n";
        let options = ReadOptions::default().fields(["POS"]).strict(true);
        let mut chunks = VcfChunks::open(DataSource::from_reader(vcf.as_bytes()), options).unwrap();
        let err = chunks.next().unwrap().unwrap_err();
        assert!(matches!(err, VarchunkError::Diagnostic(_)));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_read_vcf_empty_input() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let callset = read_vcf(DataSource::from_reader(vcf.as_bytes()), ReadOptions::default()).unwrap();
        assert!(callset.is_empty());
        assert_eq!(callset.column("variants/POS").unwrap().shape(), &[0]);
        assert_eq!(callset.samples, Some(Vec::new()));
    }
}
