//! Line and column splitting for tab-delimited text.
//!
//! VCF files in the wild are written on every platform, so [`LineReader`]
//! accepts `\n`, `\r\n` and bare `\r` as terminators and does not require a
//! terminator on the final line. Lines are handed out as raw bytes into a
//! caller-owned buffer, so the hot loop never allocates per line.
//!
//! # Examples
//!
//! ```
//! use varchunk::formats::primitives::{split_tabs, LineReader};
//!
//! let data = b"#CHROM\tPOS\r\n2L\t12\r2R\t34";
//! let mut reader = LineReader::new(&data[..]);
//! let mut line = Vec::new();
//!
//! let mut chroms = Vec::new();
//! while reader.read_line(&mut line)? {
//!     if line.starts_with(b"#") {
//!         continue;
//!     }
//!     let mut fields = split_tabs(&line);
//!     chroms.push(fields.next().unwrap_or_default().to_vec());
//! }
//! assert_eq!(chroms, vec![b"2L".to_vec(), b"2R".to_vec()]);
//! # Ok::<(), std::io::Error>(())
//! ```

use memchr::{memchr, memchr2};
use std::io::{self, BufRead};

/// Streaming line reader over any buffered byte source.
pub struct LineReader<R> {
    reader: R,
    skip_lf: bool,
    line_number: usize,
}

impl<R: BufRead> LineReader<R> {
    /// Creates a new line reader.
    pub fn new(reader: R) -> Self {
        LineReader {
            reader,
            skip_lf: false,
            line_number: 0,
        }
    }

    /// Reads the next line into `buf`, without its terminator.
    ///
    /// `buf` is cleared first. Returns `Ok(false)` once the input is
    /// exhausted; an empty line yields `Ok(true)` with an empty buffer.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        let mut read_any = false;

        loop {
            let (consumed, done) = {
                let available = match self.reader.fill_buf() {
                    Ok(available) => available,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };

                if available.is_empty() {
                    if read_any {
                        self.line_number += 1;
                    }
                    return Ok(read_any);
                }

                let mut start = 0;
                if self.skip_lf {
                    self.skip_lf = false;
                    if available[0] == b'\n' {
                        start = 1;
                    }
                }

                match memchr2(b'\n', b'\r', &available[start..]) {
                    Some(offset) => {
                        let end = start + offset;
                        buf.extend_from_slice(&available[start..end]);
                        self.skip_lf = available[end] == b'\r';
                        (end + 1, true)
                    }
                    None => {
                        buf.extend_from_slice(&available[start..]);
                        read_any |= available.len() > start;
                        (available.len(), false)
                    }
                }
            };

            self.reader.consume(consumed);
            if done {
                self.line_number += 1;
                return Ok(true);
            }
        }
    }

    /// Returns the number of lines read so far (1-based line number of the
    /// most recent line).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Unwraps the underlying reader.
    ///
    /// A pending `\n` belonging to a `\r\n` pair may still be unread.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Iterator over the tab-separated fields of one line.
///
/// Unlike `slice::split`, the unsplit tail can be taken at any point with
/// [`TabFields::remainder`], which lets the decoder stop after the fixed
/// columns without touching the sample columns.
#[derive(Debug, Clone)]
pub struct TabFields<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> TabFields<'a> {
    /// Returns the part of the line not yet yielded, if any.
    pub fn remainder(&self) -> Option<&'a [u8]> {
        self.rest
    }
}

impl<'a> Iterator for TabFields<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest?;
        match memchr(b'\t', rest) {
            Some(i) => {
                self.rest = Some(&rest[i + 1..]);
                Some(&rest[..i])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

/// Splits a line on tab characters.
#[inline]
pub fn split_tabs(line: &[u8]) -> TabFields<'_> {
    TabFields { rest: Some(line) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn read_all(data: &[u8], capacity: usize) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(BufReader::with_capacity(capacity, data));
        let mut line = Vec::new();
        let mut lines = Vec::new();
        while reader.read_line(&mut line).unwrap() {
            lines.push(line.clone());
        }
        lines
    }

    #[test]
    fn test_line_terminators() {
        let expected = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        assert_eq!(read_all(b"a\nb\nc\n", 64), expected);
        assert_eq!(read_all(b"a\r\nb\r\nc\r\n", 64), expected);
        assert_eq!(read_all(b"a\rb\rc\r", 64), expected);
        assert_eq!(read_all(b"a\nb\r\nc", 64), expected);
    }

    #[test]
    fn test_missing_final_terminator() {
        assert_eq!(read_all(b"2L\n2R", 64), vec![b"2L".to_vec(), b"2R".to_vec()]);
    }

    #[test]
    fn test_empty_lines_are_returned() {
        assert_eq!(
            read_all(b"a\n\nb\n", 64),
            vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_crlf_split_across_buffer_boundary() {
        // Buffer capacity 2 puts the \r and \n of each pair in different fills
        let lines = read_all(b"a\r\nbb\r\nccc", 2);
        assert_eq!(lines, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
    }

    #[test]
    fn test_line_number() {
        let mut reader = LineReader::new(&b"x\ny\nz"[..]);
        let mut line = Vec::new();
        assert_eq!(reader.line_number(), 0);
        reader.read_line(&mut line).unwrap();
        assert_eq!(reader.line_number(), 1);
        reader.read_line(&mut line).unwrap();
        reader.read_line(&mut line).unwrap();
        assert_eq!(reader.line_number(), 3);
        assert!(!reader.read_line(&mut line).unwrap());
        assert_eq!(reader.line_number(), 3);
    }

    #[test]
    fn test_split_tabs_and_remainder() {
        let mut fields = split_tabs(b"20\t14370\trs6054257\tG\tA");
        assert_eq!(fields.next(), Some(&b"20"[..]));
        assert_eq!(fields.next(), Some(&b"14370"[..]));
        assert_eq!(fields.remainder(), Some(&b"rs6054257\tG\tA"[..]));
        assert_eq!(fields.by_ref().count(), 3);
        assert_eq!(fields.remainder(), None);
    }

    #[test]
    fn test_split_tabs_empty_fields() {
        let fields: Vec<_> = split_tabs(b"a\t\tb\t").collect();
        assert_eq!(fields, vec![&b"a"[..], &b""[..], &b"b"[..], &b""[..]]);
    }
}
