//! Genomic region expressions.
//!
//! A [`Region`] is a tabix-style region string:
//! - `CHROM` matches every record on that chromosome
//! - `CHROM:START-END` matches records with `START <= POS <= END`
//!
//! # Coordinate System
//!
//! Regions use **1-based, closed** coordinates, the same as the `POS` column
//! of a VCF record and the region argument of `tabix`.
//!
//! # Examples
//!
//! ```
//! use varchunk::formats::primitives::Region;
//!
//! let whole: Region = "2L".parse()?;
//! assert_eq!(whole.start, None);
//! assert!(whole.contains(b"2L", 1));
//!
//! let bounded: Region = "2L:100-200".parse()?;
//! assert_eq!(bounded.start, Some(100));
//! assert_eq!(bounded.end, Some(200));
//! assert!(bounded.contains(b"2L", 200));
//! assert!(!bounded.contains(b"2L", 201));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::formats::primitives::{FormatError, Result};
use std::fmt;
use std::str::FromStr;

/// A chromosome plus optional 1-based inclusive bounds.
///
/// # Invariants
///
/// - Chromosome name is non-empty
/// - `start` and `end` are both present or both absent
/// - `1 <= start <= end` when present
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    /// Chromosome or contig name.
    pub chrom: String,

    /// Start position (1-based, inclusive).
    pub start: Option<u64>,

    /// End position (1-based, inclusive).
    pub end: Option<u64>,
}

impl Region {
    /// Creates a region covering a whole chromosome.
    pub fn chromosome(chrom: impl Into<String>) -> Self {
        Region {
            chrom: chrom.into(),
            start: None,
            end: None,
        }
    }

    /// Creates a bounded region.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidRegion`] if `start` is zero or greater
    /// than `end`.
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let chrom = chrom.into();
        if start == 0 || start > end {
            return Err(FormatError::InvalidRegion {
                region: format!("{}:{}-{}", chrom, start, end),
                reason: "expected 1 <= START <= END".to_string(),
            });
        }
        Ok(Region {
            chrom,
            start: Some(start),
            end: Some(end),
        })
    }

    /// Checks whether a record at `chrom`/`pos` falls inside this region.
    #[inline]
    pub fn contains(&self, chrom: &[u8], pos: u64) -> bool {
        if chrom != self.chrom.as_bytes() {
            return false;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= pos && pos <= end,
            _ => true,
        }
    }

    /// Returns `true` if the region has coordinate bounds.
    pub fn is_bounded(&self) -> bool {
        self.start.is_some()
    }
}

impl FromStr for Region {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| FormatError::InvalidRegion {
            region: s.to_string(),
            reason: reason.to_string(),
        };

        let s_trimmed = s.trim();
        if s_trimmed.is_empty() {
            return Err(invalid("empty region"));
        }

        let Some((chrom, range)) = s_trimmed.rsplit_once(':') else {
            return Ok(Region::chromosome(s_trimmed));
        };
        if chrom.is_empty() {
            return Err(invalid("missing chromosome name"));
        }

        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| invalid("expected CHROM:START-END"))?;
        let start: u64 = start
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| invalid("START is not a positive integer"))?;
        let end: u64 = end
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| invalid("END is not a positive integer"))?;

        Region::new(chrom, start, end).map_err(|_| invalid("expected 1 <= START <= END"))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, "{}:{}-{}", self.chrom, start, end),
            _ => write!(f, "{}", self.chrom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chromosome_only() {
        let region: Region = "20".parse().unwrap();
        assert_eq!(region, Region::chromosome("20"));
        assert!(!region.is_bounded());
    }

    #[test]
    fn test_parse_bounded() {
        let region: Region = "20:1000000-1233000".parse().unwrap();
        assert_eq!(region.chrom, "20");
        assert_eq!(region.start, Some(1_000_000));
        assert_eq!(region.end, Some(1_233_000));
    }

    #[test]
    fn test_parse_thousands_separators() {
        let region: Region = "chr1:1,000-2,000".parse().unwrap();
        assert_eq!(region.start, Some(1000));
        assert_eq!(region.end, Some(2000));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<Region>().is_err());
        assert!(":1-2".parse::<Region>().is_err());
        assert!("20:abc-5".parse::<Region>().is_err());
        assert!("20:10".parse::<Region>().is_err());
        assert!("20:200-100".parse::<Region>().is_err());
        assert!("20:0-100".parse::<Region>().is_err());
    }

    #[test]
    fn test_contains_bounds_inclusive() {
        let region = Region::new("2L", 100, 200).unwrap();
        assert!(region.contains(b"2L", 100));
        assert!(region.contains(b"2L", 200));
        assert!(!region.contains(b"2L", 99));
        assert!(!region.contains(b"2L", 201));
        assert!(!region.contains(b"2R", 150));
    }

    #[test]
    fn test_display() {
        assert_eq!(Region::chromosome("X").to_string(), "X");
        assert_eq!(Region::new("X", 1, 10).unwrap().to_string(), "X:1-10");
    }
}
