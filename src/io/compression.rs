//! Byte sources and transparent decompression
//!
//! # Input handling
//!
//! - Local files at or above [`MMAP_THRESHOLD`] are memory-mapped, smaller
//!   files go through a `BufReader`
//! - gzip framing (including multi-member BGZF) is detected from the magic
//!   bytes, never from the file extension, and unwrapped before the header is
//!   read
//! - Any `Read + Send` value can be used as a source, which covers pipes,
//!   sockets and in-memory buffers

use crate::error::Result;
use flate2::read::MultiGzDecoder;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Memory-mapped file threshold (50 MB)
///
/// Below this size the mapping overhead dominates and buffered reads win.
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024; // 50 MB

/// Default input buffer size (16 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 14;

/// gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [31, 139];

/// Where variant text is read from
pub enum DataSource {
    /// Local file path (plain or gzip-compressed)
    Local(PathBuf),

    /// Any readable byte stream (plain or gzip-compressed)
    Reader(Box<dyn Read + Send>),
}

impl DataSource {
    /// Create a local file data source
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Local(path.as_ref().to_path_buf())
    }

    /// Create a data source from an arbitrary reader
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        DataSource::Reader(Box::new(reader))
    }

    /// Returns the local path, if this source is a file
    pub fn path(&self) -> Option<&Path> {
        match self {
            DataSource::Local(path) => Some(path),
            DataSource::Reader(_) => None,
        }
    }

    /// Open the data source and return a buffered reader
    pub fn open(self, buffer_size: usize) -> Result<Box<dyn BufRead + Send>> {
        match self {
            DataSource::Local(path) => open_local_file(&path, buffer_size),
            DataSource::Reader(reader) => Ok(Box::new(BufReader::with_capacity(buffer_size, reader))),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Local(path) => f.debug_tuple("Local").field(path).finish(),
            DataSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<PathBuf> for DataSource {
    fn from(path: PathBuf) -> Self {
        DataSource::Local(path)
    }
}

impl From<&Path> for DataSource {
    fn from(path: &Path) -> Self {
        DataSource::from_path(path)
    }
}

impl From<&str> for DataSource {
    fn from(path: &str) -> Self {
        DataSource::from_path(path)
    }
}

/// Open a local file, memory-mapping it when it is large
fn open_local_file(path: &Path, buffer_size: usize) -> Result<Box<dyn BufRead + Send>> {
    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len();

    if file_size >= MMAP_THRESHOLD {
        open_mmap_file(path)
    } else {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::with_capacity(buffer_size, file)))
    }
}

fn open_mmap_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and lives as long as the cursor that
    // owns it. Concurrent truncation of the file by another process is not
    // guarded against, as with any mmap-based reader.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Box::new(io::Cursor::new(mmap)))
}

/// Buffered reader that transparently removes gzip framing
///
/// # Example
///
/// ```no_run
/// use varchunk::io::compression::{CompressedReader, DataSource, DEFAULT_BUFFER_SIZE};
///
/// # fn main() -> varchunk::Result<()> {
/// let source = DataSource::from_path("calls.vcf.gz");
/// let reader = CompressedReader::new(source, DEFAULT_BUFFER_SIZE)?;
/// assert!(reader.is_compressed());
/// # Ok(())
/// # }
/// ```
pub struct CompressedReader {
    inner: Box<dyn BufRead + Send>,
    compressed: bool,
}

impl CompressedReader {
    /// Open `source` and wrap it in a gzip decoder if its first two bytes are
    /// the gzip magic
    pub fn new(source: DataSource, buffer_size: usize) -> Result<Self> {
        let mut reader = source.open(buffer_size)?;

        let is_gzipped = {
            let peeked = reader.fill_buf()?;
            peeked.len() >= 2 && peeked[..2] == GZIP_MAGIC
        };

        if is_gzipped {
            let decoder = MultiGzDecoder::new(reader);
            Ok(Self {
                inner: Box::new(BufReader::with_capacity(buffer_size, decoder)),
                compressed: true,
            })
        } else {
            Ok(Self {
                inner: reader,
                compressed: false,
            })
        }
    }

    /// Returns `true` if gzip framing was detected
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Get the inner buffered reader
    pub fn into_inner(self) -> Box<dyn BufRead + Send> {
        self.inner
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CompressedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
