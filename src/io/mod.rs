//! I/O module: byte sources, decompression, region lookup and chunk sinks
//!
//! Input is read as a stream with a fixed-size buffer, so memory use does not
//! grow with the input. gzip framing is detected and removed transparently.

pub mod compression;
pub mod region;
pub mod sink;

pub use compression::{CompressedReader, DataSource, DEFAULT_BUFFER_SIZE, MMAP_THRESHOLD};
pub use region::{locate, LocatedStream, TABIX_GRACE_PERIOD};
pub use sink::{Callset, ChunkSink, MemorySink};
