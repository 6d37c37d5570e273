//! Columnar chunks.
//!
//! While decoding, every requested field is held in a flat, growable
//! [`ColumnBuffer`]. Each new row is pushed pre-filled with the field's fill
//! value, so any slot the decoder does not overwrite keeps the fill. When a
//! chunk is complete the buffers are reshaped into `ndarray` arrays and handed
//! out as a [`Chunk`].
//!
//! # Array shapes
//!
//! | field                    | shape                       |
//! |--------------------------|-----------------------------|
//! | variants, number <= 1    | `[rows]`                    |
//! | variants, number n > 1   | `[rows, n]`                 |
//! | calldata, number <= 1    | `[rows, samples]`           |
//! | calldata, number n > 1   | `[rows, samples, n]`        |
//!
//! Byte-string columns carry one extra trailing axis of the field's width,
//! NUL padded.

use crate::error::{Result, VarchunkError};
use crate::formats::vcf::fields::{FieldSpec, FillValue, ScalarType};
use atoi::FromRadix10SignedChecked;
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug, Clone)]
enum ColumnData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Bytes { width: usize, data: Vec<u8> },
}

macro_rules! match_data {
    ($data:expr,
     int |$i:ident| $int_body:expr,
     float |$f:ident| $float_body:expr,
     bool |$b:ident| $bool_body:expr,
     bytes |$w:ident, $s:ident| $bytes_body:expr $(,)?) => {
        match $data {
            ColumnData::Int8($i) => $int_body,
            ColumnData::Int16($i) => $int_body,
            ColumnData::Int32($i) => $int_body,
            ColumnData::Int64($i) => $int_body,
            ColumnData::UInt8($i) => $int_body,
            ColumnData::UInt16($i) => $int_body,
            ColumnData::UInt32($i) => $int_body,
            ColumnData::UInt64($i) => $int_body,
            ColumnData::Float32($f) => $float_body,
            ColumnData::Float64($f) => $float_body,
            ColumnData::Bool($b) => $bool_body,
            ColumnData::Bytes { width: $w, data: $s } => $bytes_body,
        }
    };
}

impl ColumnData {
    fn with_capacity(ty: ScalarType, values: usize) -> Self {
        match ty {
            ScalarType::Int8 => ColumnData::Int8(Vec::with_capacity(values)),
            ScalarType::Int16 => ColumnData::Int16(Vec::with_capacity(values)),
            ScalarType::Int32 => ColumnData::Int32(Vec::with_capacity(values)),
            ScalarType::Int64 => ColumnData::Int64(Vec::with_capacity(values)),
            ScalarType::UInt8 => ColumnData::UInt8(Vec::with_capacity(values)),
            ScalarType::UInt16 => ColumnData::UInt16(Vec::with_capacity(values)),
            ScalarType::UInt32 => ColumnData::UInt32(Vec::with_capacity(values)),
            ScalarType::UInt64 => ColumnData::UInt64(Vec::with_capacity(values)),
            ScalarType::Float32 => ColumnData::Float32(Vec::with_capacity(values)),
            ScalarType::Float64 => ColumnData::Float64(Vec::with_capacity(values)),
            ScalarType::Bool => ColumnData::Bool(Vec::with_capacity(values)),
            ScalarType::Bytes(width) => ColumnData::Bytes {
                width,
                data: Vec::with_capacity(values * width),
            },
        }
    }
}

/// Parses an ASCII decimal integer, requiring the whole token to be consumed.
#[inline]
pub(crate) fn parse_int(token: &[u8]) -> Option<i64> {
    match i64::from_radix_10_signed_checked(token) {
        (Some(v), used) if used == token.len() && used > 0 => Some(v),
        _ => None,
    }
}

#[inline]
pub(crate) fn parse_float(token: &[u8]) -> Option<f64> {
    std::str::from_utf8(token).ok()?.parse::<f64>().ok()
}

#[inline]
fn parse_bool(token: &[u8]) -> Option<bool> {
    match token {
        b"1" | b"true" | b"True" | b"TRUE" => Some(true),
        b"0" | b"false" | b"False" | b"FALSE" => Some(false),
        _ => None,
    }
}

/// Flat buffer for one field, `per_row` scalars per row.
#[derive(Debug, Clone)]
pub(crate) struct ColumnBuffer {
    data: ColumnData,
    per_row: usize,
    fill_int: i64,
    fill_float: f64,
    fill_bool: bool,
    fill_bytes: Vec<u8>,
}

impl ColumnBuffer {
    pub(crate) fn new(spec: &FieldSpec, n_samples: usize, capacity_rows: usize) -> Self {
        let per_row = spec.values_per_row(n_samples);
        let (mut fill_int, mut fill_float, mut fill_bool, mut fill_bytes) = (-1, f64::NAN, false, Vec::new());
        match &spec.fill {
            FillValue::Int(v) => {
                fill_int = *v;
                fill_float = *v as f64;
            }
            FillValue::Float(v) => {
                fill_float = *v;
                fill_int = *v as i64;
            }
            FillValue::Bool(b) => fill_bool = *b,
            FillValue::Bytes(b) => fill_bytes = b.clone(),
        }
        if let ScalarType::Bytes(width) = spec.ty {
            fill_bytes.resize(width, 0);
        }
        ColumnBuffer {
            data: ColumnData::with_capacity(spec.ty, per_row * capacity_rows),
            per_row,
            fill_int,
            fill_float,
            fill_bool,
            fill_bytes,
        }
    }

    /// Appends one row of fill values.
    pub(crate) fn push_filled_row(&mut self) {
        let n = self.per_row;
        let (fill_int, fill_float, fill_bool) = (self.fill_int, self.fill_float, self.fill_bool);
        let fill_bytes = &self.fill_bytes;
        match_data!(&mut self.data,
            int |v| v.resize(v.len() + n, fill_int as _),
            float |v| v.resize(v.len() + n, fill_float as _),
            bool |v| v.extend(std::iter::repeat(fill_bool).take(n)),
            bytes |_w, v| {
                for _ in 0..n {
                    v.extend_from_slice(fill_bytes);
                }
            },
        )
    }

    /// Scalars per row.
    pub(crate) fn per_row(&self) -> usize {
        self.per_row
    }

    /// Decodes `token` into the scalar at flat `index`.
    ///
    /// Returns `false` and leaves the fill in place if the token does not
    /// parse as this column's type.
    #[inline]
    pub(crate) fn set_token(&mut self, index: usize, token: &[u8]) -> bool {
        match_data!(&mut self.data,
            int |v| match parse_int(token).and_then(|x| x.try_into().ok()) {
                Some(x) => {
                    v[index] = x;
                    true
                }
                None => false,
            },
            float |v| match parse_float(token) {
                Some(x) => {
                    v[index] = x as _;
                    true
                }
                None => false,
            },
            bool |v| match parse_bool(token) {
                Some(x) => {
                    v[index] = x;
                    true
                }
                None => false,
            },
            bytes |w, v| {
                let width = *w;
                let slot = &mut v[index * width..(index + 1) * width];
                let n = token.len().min(width);
                slot[..n].copy_from_slice(&token[..n]);
                slot[n..].fill(0);
                true
            },
        )
    }

    /// Stores an integer at flat `index`, converting to the column type.
    ///
    /// Returns `false` and leaves the fill in place if `value` is out of
    /// range for an integer column.
    pub(crate) fn set_int(&mut self, index: usize, value: i64) -> bool {
        match_data!(&mut self.data,
            int |v| match value.try_into() {
                Ok(x) => {
                    v[index] = x;
                    true
                }
                Err(_) => false,
            },
            float |v| {
                v[index] = value as _;
                true
            },
            bool |v| {
                v[index] = value != 0;
                true
            },
            bytes |w, v| {
                let width = *w;
                let text = value.to_string();
                let slot = &mut v[index * width..(index + 1) * width];
                let n = text.len().min(width);
                slot[..n].copy_from_slice(&text.as_bytes()[..n]);
                slot[n..].fill(0);
                true
            },
        )
    }

    /// Stores a boolean at flat `index`.
    pub(crate) fn set_bool(&mut self, index: usize, value: bool) {
        self.set_int(index, value as i64);
    }

    fn extend_from(&mut self, other: &ColumnBuffer, rows: Range<usize>) -> Result<()> {
        let (start, end) = (rows.start * self.per_row, rows.end * self.per_row);
        match (&mut self.data, &other.data) {
            (ColumnData::Int8(a), ColumnData::Int8(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Int16(a), ColumnData::Int16(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::UInt8(a), ColumnData::UInt8(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::UInt16(a), ColumnData::UInt16(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::UInt32(a), ColumnData::UInt32(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from_slice(&b[start..end]),
            (ColumnData::Bytes { width, data: a }, ColumnData::Bytes { width: w, data: b })
                if *width == *w =>
            {
                a.extend_from_slice(&b[start * *width..end * *width])
            }
            _ => {
                return Err(VarchunkError::InvalidOption {
                    option: "fields".to_string(),
                    reason: "column layout differs between decoded blocks".to_string(),
                })
            }
        }
        Ok(())
    }

    fn into_column(self, mut shape: Vec<usize>) -> Result<Column> {
        let column = match self.data {
            ColumnData::Int8(v) => Column::Int8(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Int16(v) => Column::Int16(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Int32(v) => Column::Int32(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Int64(v) => Column::Int64(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::UInt8(v) => Column::UInt8(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::UInt16(v) => Column::UInt16(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::UInt32(v) => Column::UInt32(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::UInt64(v) => Column::UInt64(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Float32(v) => Column::Float32(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Float64(v) => Column::Float64(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Bool(v) => Column::Bool(ArrayD::from_shape_vec(IxDyn(&shape), v)?),
            ColumnData::Bytes { width, data } => {
                shape.push(width);
                Column::Bytes(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
            }
        };
        Ok(column)
    }
}

/// CHROM and POS of every row, kept for positional metadata.
#[derive(Debug, Clone, Default)]
struct LocusTrack {
    /// `(first row, chrom)` for each run of equal chromosomes.
    runs: Vec<(usize, Vec<u8>)>,
    pos: Vec<i64>,
}

impl LocusTrack {
    fn push(&mut self, chrom: &[u8], pos: i64) {
        let row = self.pos.len();
        if self.runs.last().map(|(_, c)| c.as_slice()) != Some(chrom) {
            self.runs.push((row, chrom.to_vec()));
        }
        self.pos.push(pos);
    }

    fn chrom_at(&self, row: usize) -> &[u8] {
        let i = self.runs.partition_point(|(first, _)| *first <= row);
        match i.checked_sub(1).and_then(|i| self.runs.get(i)) {
            Some((_, chrom)) => chrom,
            None => b"",
        }
    }

    fn extend_from(&mut self, other: &LocusTrack, rows: Range<usize>) {
        for row in rows {
            self.push(other.chrom_at(row), other.pos[row]);
        }
    }

    fn last(&self) -> Option<(String, i64)> {
        let pos = *self.pos.last()?;
        let chrom = self.chrom_at(self.pos.len() - 1);
        Some((String::from_utf8_lossy(chrom).into_owned(), pos))
    }
}

/// Buffers for every requested field, row-aligned.
#[derive(Debug, Clone)]
pub(crate) struct ColumnSet {
    columns: Vec<ColumnBuffer>,
    rows: usize,
    loci: LocusTrack,
}

impl ColumnSet {
    pub(crate) fn new(fields: &[FieldSpec], n_samples: usize, capacity_rows: usize) -> Self {
        ColumnSet {
            columns: fields
                .iter()
                .map(|f| ColumnBuffer::new(f, n_samples, capacity_rows))
                .collect(),
            rows: 0,
            loci: LocusTrack::default(),
        }
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    /// Appends a filled row for every column and returns its index.
    ///
    /// `pos` is -1 when the record has no parsable position.
    pub(crate) fn push_row(&mut self, chrom: &[u8], pos: i64) -> usize {
        for column in &mut self.columns {
            column.push_filled_row();
        }
        self.loci.push(chrom, pos);
        self.rows += 1;
        self.rows - 1
    }

    pub(crate) fn column_mut(&mut self, i: usize) -> &mut ColumnBuffer {
        &mut self.columns[i]
    }

    /// Appends rows `rows` of `other`, which must share this set's fields.
    pub(crate) fn extend_from(&mut self, other: &ColumnSet, rows: Range<usize>) -> Result<()> {
        for (column, source) in self.columns.iter_mut().zip(&other.columns) {
            column.extend_from(source, rows.clone())?;
        }
        self.loci.extend_from(&other.loci, rows.clone());
        self.rows += rows.len();
        Ok(())
    }

    /// Reshapes the buffers into arrays.
    pub(crate) fn into_chunk(self, fields: &[FieldSpec], n_samples: usize) -> Result<Chunk> {
        let last = self.loci.last();
        let rows = self.rows;
        let mut columns = BTreeMap::new();
        for (spec, buffer) in fields.iter().zip(self.columns) {
            let mut shape = vec![rows];
            shape.extend(spec.inner_shape(n_samples));
            columns.insert(spec.name.clone(), buffer.into_column(shape)?);
        }
        let (last_chrom, last_pos) = match last {
            Some((chrom, pos)) => (Some(chrom), Some(pos)),
            None => (None, None),
        };
        Ok(Chunk {
            len: rows,
            columns,
            last_chrom,
            last_pos,
        })
    }
}

/// A decoded array of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// `i1`
    Int8(ArrayD<i8>),
    /// `i2`
    Int16(ArrayD<i16>),
    /// `i4`
    Int32(ArrayD<i32>),
    /// `i8`
    Int64(ArrayD<i64>),
    /// `u1`
    UInt8(ArrayD<u8>),
    /// `u2`
    UInt16(ArrayD<u16>),
    /// `u4`
    UInt32(ArrayD<u32>),
    /// `u8`
    UInt64(ArrayD<u64>),
    /// `f4`
    Float32(ArrayD<f32>),
    /// `f8`
    Float64(ArrayD<f64>),
    /// `bool`
    Bool(ArrayD<bool>),
    /// `S<width>`; the last axis is the width, NUL padded
    Bytes(ArrayD<u8>),
}

macro_rules! each_column {
    ($column:expr, |$a:ident| $body:expr) => {
        match $column {
            Column::Int8($a) => $body,
            Column::Int16($a) => $body,
            Column::Int32($a) => $body,
            Column::Int64($a) => $body,
            Column::UInt8($a) => $body,
            Column::UInt16($a) => $body,
            Column::UInt32($a) => $body,
            Column::UInt64($a) => $body,
            Column::Float32($a) => $body,
            Column::Float64($a) => $body,
            Column::Bool($a) => $body,
            Column::Bytes($a) => $body,
        }
    };
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $t:ty) => {
        #[doc = concat!("Returns the array if this column is `", stringify!($variant), "`.")]
        pub fn $name(&self) -> Option<&ArrayD<$t>> {
            match self {
                Column::$variant(a) => Some(a),
                _ => None,
            }
        }
    };
}

macro_rules! concat_variant {
    ($parts:expr, $variant:ident) => {{
        let mut views = Vec::with_capacity($parts.len());
        for part in $parts {
            match part {
                Column::$variant(a) => views.push(a.view()),
                _ => return Err(mismatch()),
            }
        }
        Column::$variant(ndarray::concatenate(Axis(0), &views)?)
    }};
}

fn mismatch() -> VarchunkError {
    VarchunkError::InvalidOption {
        option: "chunk".to_string(),
        reason: "cannot concatenate columns of different types".to_string(),
    }
}

impl Column {
    accessor!(as_i8, Int8, i8);
    accessor!(as_i16, Int16, i16);
    accessor!(as_i32, Int32, i32);
    accessor!(as_i64, Int64, i64);
    accessor!(as_u8, UInt8, u8);
    accessor!(as_u16, UInt16, u16);
    accessor!(as_u32, UInt32, u32);
    accessor!(as_u64, UInt64, u64);
    accessor!(as_f32, Float32, f32);
    accessor!(as_f64, Float64, f64);
    accessor!(as_bool, Bool, bool);
    accessor!(as_bytes, Bytes, u8);

    /// Full array shape, including the width axis of byte strings.
    pub fn shape(&self) -> &[usize] {
        each_column!(self, |a| a.shape())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte-string values in row-major order with NUL padding removed.
    ///
    /// Returns `None` for non-string columns.
    pub fn strings(&self) -> Option<Vec<String>> {
        let a = self.as_bytes()?;
        let width = *a.shape().last()?;
        if width == 0 {
            return Some(Vec::new());
        }
        let flat: Vec<u8> = a.iter().copied().collect();
        Some(
            flat.chunks(width)
                .map(|s| {
                    let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
                    String::from_utf8_lossy(&s[..end]).into_owned()
                })
                .collect(),
        )
    }

    /// Concatenates columns of the same type along the row axis.
    ///
    /// # Errors
    ///
    /// Fails if the parts differ in type or in their trailing dimensions.
    pub fn concatenate(parts: &[&Column]) -> Result<Column> {
        let first = parts.first().ok_or_else(mismatch)?;
        let column = match first {
            Column::Int8(_) => concat_variant!(parts, Int8),
            Column::Int16(_) => concat_variant!(parts, Int16),
            Column::Int32(_) => concat_variant!(parts, Int32),
            Column::Int64(_) => concat_variant!(parts, Int64),
            Column::UInt8(_) => concat_variant!(parts, UInt8),
            Column::UInt16(_) => concat_variant!(parts, UInt16),
            Column::UInt32(_) => concat_variant!(parts, UInt32),
            Column::UInt64(_) => concat_variant!(parts, UInt64),
            Column::Float32(_) => concat_variant!(parts, Float32),
            Column::Float64(_) => concat_variant!(parts, Float64),
            Column::Bool(_) => concat_variant!(parts, Bool),
            Column::Bytes(_) => concat_variant!(parts, Bytes),
        };
        Ok(column)
    }
}

/// A batch of decoded records.
///
/// Every column has the same number of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    len: usize,
    columns: BTreeMap<String, Column>,
    /// CHROM of the last row.
    pub last_chrom: Option<String>,
    /// POS of the last row (-1 if it could not be parsed).
    pub last_pos: Option<i64>,
}

impl Chunk {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the chunk has no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Looks up a column by namespaced name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// All columns, by name.
    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    /// Adds or replaces a column.
    ///
    /// # Errors
    ///
    /// Returns [`VarchunkError::InvalidOption`] if the column's row count
    /// differs from the chunk's.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<Option<Column>> {
        let name = name.into();
        if column.len() != self.len {
            return Err(VarchunkError::InvalidOption {
                option: name,
                reason: format!("column has {} rows, chunk has {}", column.len(), self.len),
            });
        }
        Ok(self.columns.insert(name, column))
    }

    /// Removes a column.
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }
}
