//! Destinations for decoded chunks
//!
//! A [`ChunkSink`] is the consuming counterpart to
//! [`VcfChunks`](crate::formats::vcf::VcfChunks): chunks are handed over one
//! at a time, in input order, so a sink can write them out incrementally or
//! keep them.
//!
//! [`MemorySink`] keeps everything and concatenates it into a [`Callset`],
//! which is what [`read_vcf`](crate::formats::vcf::read_vcf) returns.
//!
//! # Example
//!
//! ```no_run
//! use varchunk::formats::vcf::{ReadOptions, VcfChunks};
//! use varchunk::io::{ChunkSink, MemorySink};
//!
//! # fn main() -> varchunk::Result<()> {
//! let chunks = VcfChunks::open("calls.vcf.gz", ReadOptions::default())?;
//! let mut sink = MemorySink::new();
//! for chunk in chunks {
//!     sink.store_chunk(&chunk?)?;
//! }
//! let callset = sink.finish()?;
//! println!("{} variants", callset.len());
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::formats::vcf::chunk::{Chunk, Column};
use crate::formats::vcf::diagnostics::Diagnostic;
use std::collections::BTreeMap;

/// Receives decoded chunks in input order.
pub trait ChunkSink {
    /// Stores one chunk.
    fn store_chunk(&mut self, chunk: &Chunk) -> Result<()>;
}

/// Every requested field of a whole input, as single arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Callset {
    /// Arrays by namespaced field name.
    pub columns: BTreeMap<String, Column>,
    /// Selected sample identifiers, if they were requested.
    pub samples: Option<Vec<String>>,
    /// Raw header lines.
    pub headers: Vec<String>,
    /// Diagnostics raised while reading.
    pub diagnostics: Vec<Diagnostic>,
}

impl Callset {
    /// Looks up an array by namespaced name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps chunks in memory and concatenates them on [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct MemorySink {
    parts: BTreeMap<String, Vec<Column>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored so far.
    pub fn len(&self) -> usize {
        self.parts
            .values()
            .next()
            .map_or(0, |parts| parts.iter().map(Column::len).sum())
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates the stored chunks along the row axis.
    ///
    /// # Errors
    ///
    /// Fails if two chunks disagree on a column's type or trailing shape.
    pub fn finish(self) -> Result<Callset> {
        let mut columns = BTreeMap::new();
        for (name, parts) in self.parts {
            let column = match parts.len() {
                1 => parts.into_iter().next(),
                _ => {
                    let refs: Vec<&Column> = parts.iter().collect();
                    Some(Column::concatenate(&refs)?)
                }
            };
            if let Some(column) = column {
                columns.insert(name, column);
            }
        }
        Ok(Callset {
            columns,
            ..Default::default()
        })
    }
}

impl ChunkSink for MemorySink {
    fn store_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        for (name, column) in chunk.columns() {
            self.parts.entry(name.clone()).or_default().push(column.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::primitives::LineReader;
    use crate::formats::vcf::decoder::RecordDecoder;
    use crate::formats::vcf::diagnostics::DiagnosticLog;
    use crate::formats::vcf::fields::{resolve_fields, FieldOverrides, SampleSelection};
    use crate::formats::vcf::header::parse_header;

    fn chunks(sizes: &[usize]) -> Vec<Chunk> {
        let text = "#CHROM\tPOS\n";
        let (header, _) = parse_header(&mut LineReader::new(text.as_bytes())).unwrap();
        let fields = vec!["CHROM".to_string(), "POS".to_string()];
        let (resolved, _) = resolve_fields(
            &header,
            Some(fields.as_slice()),
            &FieldOverrides::default(),
            &SampleSelection::All,
        )
        .unwrap();
        let decoder = RecordDecoder::new(&resolved, &header);

        let mut pos = 0;
        sizes
            .iter()
            .map(|&size| {
                let mut set = decoder.new_columns(size);
                let mut log = DiagnosticLog::default();
                for _ in 0..size {
                    pos += 1;
                    let line = format!("chr1\t{}", pos);
                    decoder.decode(line.as_bytes(), pos, &mut set, &mut log);
                }
                set.into_chunk(decoder.fields(), 0).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_memory_sink_concatenates() {
        let mut sink = MemorySink::new();
        for chunk in chunks(&[4, 4, 1]) {
            sink.store_chunk(&chunk).unwrap();
        }
        assert_eq!(sink.len(), 9);

        let callset = sink.finish().unwrap();
        assert_eq!(callset.len(), 9);
        let pos = callset.column("variants/POS").unwrap().as_i32().unwrap();
        assert_eq!(pos.iter().copied().collect::<Vec<_>>(), (1..=9).collect::<Vec<i32>>());
        assert_eq!(callset.column("variants/CHROM").unwrap().shape(), &[9, 12]);
    }

    #[test]
    fn test_empty_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        let callset = sink.finish().unwrap();
        assert!(callset.is_empty());
        assert!(callset.columns.is_empty());
    }
}
