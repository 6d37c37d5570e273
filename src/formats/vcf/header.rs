//! VCF header reader.
//!
//! Reads the leading `#` lines of a VCF stream up to and including the
//! mandatory `#CHROM` column-header line. `##FILTER`, `##INFO` and `##FORMAT`
//! meta-information lines are parsed into [`Declarations`]; a line that starts
//! with one of those markers but does not have the expected
//! `<ID=...,Number=...,Type=...,Description="...">` shape produces an
//! [`DiagnosticKind::InvalidHeader`] diagnostic and is otherwise ignored.
//!
//! # Example
//!
//! ```
//! use varchunk::formats::primitives::LineReader;
//! use varchunk::formats::vcf::header::parse_header;
//!
//! let text = "##fileformat=VCFv4.2\n\
//!             ###INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n\
//!             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";
//! let mut reader = LineReader::new(text.as_bytes());
//! let (header, diagnostics) = parse_header(&mut reader)?;
//!
//! assert_eq!(header.samples, vec!["S1", "S2"]);
//! assert_eq!(header.infos.get("DP").map(|d| d.number.as_str()), Some("1"));
//! assert!(diagnostics.is_empty());
//! # Ok::<(), varchunk::VarchunkError>(())
//! ```

use crate::error::{Result, VarchunkError};
use crate::formats::primitives::LineReader;
use crate::formats::vcf::diagnostics::{Diagnostic, DiagnosticKind};
use std::collections::HashMap;
use std::io::BufRead;

/// Leading literal of the mandatory column-header line.
pub const COLUMN_HEADER_PREFIX: &str = "#CHROM";

/// Number of fixed columns before the samples (`#CHROM` .. `FORMAT`).
pub const FIXED_COLUMN_COUNT: usize = 9;

/// One `##FILTER`, `##INFO` or `##FORMAT` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    /// Field identifier (`ID=`).
    pub id: String,
    /// Raw declared cardinality token (`Number=`), e.g. `1`, `A`, `R`, `G`, `.`.
    /// Always `"0"` for FILTER declarations.
    pub number: String,
    /// Declared type name (`Type=`). Always `"Flag"` for FILTER declarations.
    pub ty: String,
    /// Free-text description.
    pub description: String,
}

/// Declarations of one kind, in header order, with lookup by identifier.
///
/// A repeated identifier replaces the earlier declaration but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    entries: Vec<FieldDeclaration>,
    index: HashMap<String, usize>,
}

impl Declarations {
    /// Adds or replaces a declaration.
    pub fn insert(&mut self, declaration: FieldDeclaration) {
        match self.index.get(&declaration.id) {
            Some(&i) => self.entries[i] = declaration,
            None => {
                self.index.insert(declaration.id.clone(), self.entries.len());
                self.entries.push(declaration);
            }
        }
    }

    /// Looks up a declaration by identifier.
    pub fn get(&self, id: &str) -> Option<&FieldDeclaration> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// Returns `true` if `id` was declared.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates declarations in header order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.entries.iter()
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything read from the header of one VCF stream.
///
/// Built once at stream start and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcfHeader {
    /// All raw header lines, including the `#CHROM` line, without terminators.
    pub lines: Vec<String>,
    /// `##FILTER` declarations.
    pub filters: Declarations,
    /// `##INFO` declarations.
    pub infos: Declarations,
    /// `##FORMAT` declarations.
    pub formats: Declarations,
    /// Sample identifiers from the `#CHROM` line, in column order.
    pub samples: Vec<String>,
}

/// Reads header lines from `reader` up to and including the `#CHROM` line.
///
/// Returns the header together with any diagnostics about malformed
/// meta-information lines.
///
/// # Errors
///
/// Returns [`VarchunkError::MissingColumnHeader`] if the input ends, or a data
/// line appears, before the `#CHROM` line.
pub fn parse_header<R: BufRead>(reader: &mut LineReader<R>) -> Result<(VcfHeader, Vec<Diagnostic>)> {
    let mut header = VcfHeader::default();
    let mut diagnostics = Vec::new();
    let mut buf = Vec::with_capacity(256);

    while reader.read_line(&mut buf)? {
        if !buf.starts_with(b"#") {
            break;
        }
        let line = String::from_utf8_lossy(&buf).into_owned();

        if let Some(body) = line.strip_prefix("##FILTER=") {
            match parse_declaration(body, false) {
                Some(declaration) => header.filters.insert(declaration),
                None => diagnostics.push(invalid_header("FILTER", &line)),
            }
        } else if let Some(body) = line.strip_prefix("##INFO=") {
            match parse_declaration(body, true) {
                Some(declaration) => header.infos.insert(declaration),
                None => diagnostics.push(invalid_header("INFO", &line)),
            }
        } else if let Some(body) = line.strip_prefix("##FORMAT=") {
            match parse_declaration(body, true) {
                Some(declaration) => header.formats.insert(declaration),
                None => diagnostics.push(invalid_header("FORMAT", &line)),
            }
        } else if line.starts_with(COLUMN_HEADER_PREFIX) {
            header.samples = line
                .split('\t')
                .skip(FIXED_COLUMN_COUNT)
                .map(str::to_string)
                .collect();
            header.lines.push(line);
            return Ok((header, diagnostics));
        }

        header.lines.push(line);
    }

    Err(VarchunkError::MissingColumnHeader {
        lines: header.lines.len(),
    })
}

fn invalid_header(kind: &str, line: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::InvalidHeader,
        kind,
        format!("invalid {} header: {:?}", kind, line),
    )
}

/// Parses `<ID=..,Number=..,Type=..,Description="..">`.
///
/// FILTER declarations need only `ID`; INFO and FORMAT also need `Number` and
/// `Type`. Unknown keys (`Source`, `Version`, ...) are ignored.
fn parse_declaration(body: &str, typed: bool) -> Option<FieldDeclaration> {
    let inner = body.trim_end().strip_prefix('<')?.strip_suffix('>')?;
    let pairs = split_structured(inner)?;

    let lookup = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    let id = lookup("ID").filter(|id| !id.is_empty())?;
    let description = lookup("Description").unwrap_or_default();

    if typed {
        Some(FieldDeclaration {
            id,
            number: lookup("Number")?,
            ty: lookup("Type")?,
            description,
        })
    } else {
        Some(FieldDeclaration {
            id,
            number: "0".to_string(),
            ty: "Flag".to_string(),
            description,
        })
    }
}

/// Splits `key=value,key="quoted, value"` into pairs.
fn split_structured(inner: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        if key.is_empty() {
            return None;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return None;
            }
            match chars.next() {
                None => {
                    pairs.push((key, value));
                    return Some(pairs);
                }
                Some(',') => {}
                Some(_) => return None,
            }
        } else {
            let mut end = true;
            for c in chars.by_ref() {
                if c == ',' {
                    end = false;
                    break;
                }
                value.push(c);
            }
            pairs.push((key, value));
            if end {
                return Some(pairs);
            }
            continue;
        }
        pairs.push((key, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<(VcfHeader, Vec<Diagnostic>)> {
        parse_header(&mut LineReader::new(text.as_bytes()))
    }

    #[test]
    fn test_declarations() {
        let text = "##fileformat=VCFv4.0\n\
            ##FILTER=<ID=q10,Description=\"Quality below 10\">\n\
            ##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
            ##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">\n\
            ##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">\n\
            #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\n\
            20\t14370\n";
        let (header, diagnostics) = parse(text).unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(header.lines.len(), 6);
        assert_eq!(header.samples, vec!["NA00001", "NA00002"]);

        let q10 = header.filters.get("q10").unwrap();
        assert_eq!(q10.number, "0");
        assert_eq!(q10.description, "Quality below 10");

        let af = header.infos.get("AF").unwrap();
        assert_eq!((af.number.as_str(), af.ty.as_str()), ("A", "Float"));

        let db = header.infos.get("DB").unwrap();
        assert_eq!(db.description, "dbSNP membership, build 129");

        assert_eq!(header.formats.get("HQ").unwrap().number, "2");
        let ids: Vec<_> = header.infos.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["AF", "DB"]);
    }

    #[test]
    fn test_extra_keys_and_escapes() {
        let text = "##INFO=<ID=X,Number=1,Type=String,Description=\"say \\\"hi\\\"\",Source=\"tool\",Version=\"1\">\n\
            #CHROM\tPOS\n";
        let (header, diagnostics) = parse(text).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(header.infos.get("X").unwrap().description, "say \"hi\"");
    }

    #[test]
    fn test_invalid_meta_lines_warn() {
        let text = "##FILTER=<ID=q10>garbage\n\
            ##INFO=<ID=DP,Type=Integer,Description=\"missing number\">\n\
            ##FORMAT=broken\n\
            #CHROM\tPOS\n";
        let (header, diagnostics) = parse(text).unwrap();
        assert!(header.filters.is_empty());
        assert!(header.infos.is_empty());
        assert!(header.formats.is_empty());
        let kinds: Vec<_> = diagnostics.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(kinds, vec!["FILTER", "INFO", "FORMAT"]);
        assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::InvalidHeader));
    }

    #[test]
    fn test_minimal_column_header() {
        let (header, _) = parse("#CHROM\tPOS\n2L\t1\n").unwrap();
        assert!(header.samples.is_empty());
        assert_eq!(header.lines, vec!["#CHROM\tPOS"]);
    }

    #[test]
    fn test_missing_column_header() {
        let err = parse("##fileformat=VCFv4.2\n").unwrap_err();
        assert!(matches!(err, VarchunkError::MissingColumnHeader { lines: 1 }));

        let err = parse("##fileformat=VCFv4.2\n20\t14370\n").unwrap_err();
        assert!(matches!(err, VarchunkError::MissingColumnHeader { .. }));

        assert!(parse("").is_err());
    }

    #[test]
    fn test_redeclaration_replaces() {
        let mut declarations = Declarations::default();
        for description in ["first", "second"] {
            declarations.insert(FieldDeclaration {
                id: "DP".to_string(),
                number: "1".to_string(),
                ty: "Integer".to_string(),
                description: description.to_string(),
            });
        }
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations.get("DP").unwrap().description, "second");
    }
}
