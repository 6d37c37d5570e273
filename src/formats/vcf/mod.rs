//! VCF decoding into columnar chunks.
//!
//! # Pipeline
//!
//! 1. [`header`] reads the `#` lines and collects FILTER/INFO/FORMAT declarations
//! 2. [`fields`] turns a field selection into typed, fixed-width [`FieldSpec`]s
//! 3. [`decoder`] decodes each record line into one row of every field
//! 4. [`chunk`] holds rows as flat buffers and finalizes them into `ndarray` chunks
//! 5. `parallel` optionally decodes blocks of records on a thread pool
//! 6. [`reader`] drives the session and yields chunks
//!
//! # Field names
//!
//! Fields are namespaced: `variants/POS`, `variants/DP`,
//! `variants/FILTER_PASS`, `calldata/GT`. Bare names are accepted in
//! selections and overrides and get their namespace from the header.
//!
//! # Example
//!
//! ```
//! use varchunk::formats::vcf::{read_vcf, ReadOptions};
//! use varchunk::io::DataSource;
//!
//! let text = "##fileformat=VCFv4.2\n\
//!             ###FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
//!             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
//!             2L\t100\t.\tA\tT\t30\tPASS\t.\tGT\t0|1\n";
//! let callset = read_vcf(DataSource::from_reader(text.as_bytes()), ReadOptions::default())?;
//!
//! assert_eq!(callset.len(), 1);
//! let gt = callset.column("calldata/GT").unwrap().as_i8().unwrap();
//! assert_eq!(gt.shape(), &[1, 1, 2]);
//! assert_eq!(gt[[0, 0, 1]], 1);
//! # Ok::<(), varchunk::VarchunkError>(())
//! ```

pub mod chunk;
pub mod decoder;
pub mod diagnostics;
pub mod fields;
pub mod header;
mod parallel;
pub mod reader;

pub use chunk::{Chunk, Column};
pub use decoder::RecordDecoder;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use fields::{
    resolve_fields, FieldKind, FieldOverrides, FieldSpec, FillValue, Namespace, ResolvedFields,
    SampleRef, SampleSelection, ScalarType,
};
pub use header::{parse_header, FieldDeclaration, VcfHeader};
pub use reader::{read_vcf, ChunkTransformer, ReadOptions, VcfChunks};
