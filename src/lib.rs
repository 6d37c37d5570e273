//! varchunk: streaming VCF decoder producing typed, columnar chunks
//!
//! # Overview
//!
//! varchunk reads Variant Call Format text (plain or gzip/BGZF compressed)
//! and turns it into dense `ndarray` arrays, one per requested field, in
//! chunks of a fixed number of records.
//!
//! ## Key Features
//!
//! - **Streaming**: Memory bounded by chunk size, not file size
//! - **Typed**: Every field has a fixed scalar type and width resolved from
//!   the header, built-in defaults, or user overrides
//! - **Tolerant**: Malformed values become fill values plus diagnostics;
//!   records are never dropped
//! - **Parallel**: Optional block-parallel decoding with order preserved
//! - **Regions**: `tabix` lookup with an in-process scan fallback
//!
//! ## Quick Start
//!
//! ```no_run
//! use varchunk::{read_vcf, ReadOptions};
//!
//! # fn main() -> varchunk::Result<()> {
//! let callset = read_vcf("calls.vcf.gz", ReadOptions::default().fields(["POS", "DP", "GT"]))?;
//!
//! let pos = callset.column("variants/POS").and_then(|c| c.as_i32());
//! println!("{} variants, first at {:?}", callset.len(), pos.map(|p| p[[0]]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`formats`]: Line primitives and the VCF decoder
//! - [`io`]: Byte sources, compression, region lookup, chunk sinks
//! - [`error`]: Error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod formats;
pub mod io;

// Re-export commonly used types
pub use error::{Result, VarchunkError};
pub use formats::vcf::{
    read_vcf, Chunk, ChunkTransformer, Column, Diagnostic, DiagnosticKind, ReadOptions,
    SampleSelection, VcfChunks,
};
pub use io::{Callset, ChunkSink, DataSource, MemorySink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
