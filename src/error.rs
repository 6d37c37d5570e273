//! Error types for varchunk

use crate::formats::vcf::diagnostics::Diagnostic;
use thiserror::Error;

/// Result type alias for varchunk operations
pub type Result<T> = std::result::Result<T, VarchunkError>;

/// Error types that can occur in varchunk
///
/// Only structural problems are errors. Per-field parse problems are
/// reported as [`Diagnostic`]s and become errors only in strict mode.
#[derive(Debug, Error)]
pub enum VarchunkError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mandatory `#CHROM` column-header line was never seen
    #[error("VCF input is missing the mandatory header line (\"#CHROM...\") after {lines} header lines")]
    MissingColumnHeader {
        /// Number of `#` lines read before the stream ended
        lines: usize,
    },

    /// Invalid user-supplied option or override
    #[error("Invalid option {option}: {reason}")]
    InvalidOption {
        /// Option or field the value was given for
        option: String,
        /// Why it was rejected
        reason: String,
    },

    /// A diagnostic raised while strict mode is enabled
    #[error("Strict mode: {0}")]
    Diagnostic(Diagnostic),

    /// A parallel decode worker went away without reporting its block
    #[error("Decode worker failed: {0}")]
    Worker(String),

    /// Decoded buffers did not match their array shape
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Lower-level format error
    #[error(transparent)]
    Format(#[from] crate::formats::primitives::FormatError),
}
