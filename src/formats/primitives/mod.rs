//! Shared primitives for line-oriented variant files.
//!
//! This module provides the small pieces of infrastructure the VCF decoder is
//! built on:
//! - Line reading that tolerates `\n`, `\r\n` and bare `\r` terminators
//! - Genomic region expressions (`CHROM` or `CHROM:START-END`)
//!
//! # Example: Parsing a Region
//!
//! ```
//! use varchunk::formats::primitives::Region;
//!
//! let region: Region = "20:1000000-1233000".parse()?;
//! assert_eq!(region.chrom, "20");
//! assert!(region.contains(b"20", 1_110_696));
//! assert!(!region.contains(b"19", 1_110_696));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod genomic;
pub mod tab_delimited;

// Re-exports
pub use genomic::Region;
pub use tab_delimited::{split_tabs, LineReader, TabFields};

/// Errors that can occur when parsing line-oriented formats.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Invalid genomic region expression.
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion {
        /// Region expression as given
        region: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;
