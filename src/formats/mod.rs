//! Variant file formats.
//!
//! - [`primitives`]: Shared infrastructure for tab-delimited formats
//!   - Line reading with mixed terminators, column splitting, genomic regions
//! - [`vcf`]: Streaming VCF decoder producing columnar chunks
//!
//! # Design Principles
//!
//! ## Streaming-First
//!
//! Memory use is bounded by the chunk size, never by the input size:
//!
//! ```rust,ignore
//! for chunk in VcfChunks::open("calls.vcf.gz", ReadOptions::default())? {
//!     let chunk = chunk?;
//!     // Process one chunk at a time
//! }
//! ```
//!
//! ## Recover, Don't Abort
//!
//! - A malformed token becomes the field's fill value plus a diagnostic
//! - No record is ever dropped because of a parse problem
//! - Strict mode turns the first diagnostic into an error for callers that
//!   prefer to stop

pub mod primitives;
pub mod vcf;

// Re-export commonly used types
pub use primitives::{FormatError, Region};
