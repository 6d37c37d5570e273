//! Field selection and resolution.
//!
//! Turns a user field selection (`"*"`, `"variants/*"`, `"DP"`,
//! `"calldata/GQ"`, ...) plus the header declarations into the concrete list of
//! [`FieldSpec`]s a decode session works with. Each field gets a scalar type,
//! a number of values per record (per sample for calldata) and a fill value,
//! resolved with this precedence:
//!
//! 1. user override
//! 2. built-in default table for common identifiers
//! 3. the header declaration (`Type=`, `Number=`)
//! 4. a generic fallback (`S12`, number 1), with a [`Diagnostic`]
//!
//! Symbolic numbers map to small constants: `A` and `G` to 3, `R` to 4, `.`
//! to 3. Records with more values than that are truncated.

use crate::error::{Result, VarchunkError};
use crate::formats::vcf::diagnostics::{Diagnostic, DiagnosticKind};
use crate::formats::vcf::header::VcfHeader;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Fixed leading columns that can be selected.
pub const FIXED_FIELDS: [&str; 6] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL"];

/// Fields computed from REF/ALT rather than read from a column.
pub const COMPUTED_FIELDS: [&str; 2] = ["numalt", "svlen"];

/// Default width of string fields without a more specific type.
pub const DEFAULT_STRING_WIDTH: usize = 12;

/// Number assigned to `Number=A`, `Number=G` and `Number=.`.
pub const NUMBER_PER_ALT: usize = 3;

/// Number assigned to `Number=R`.
pub const NUMBER_PER_ALLELE: usize = 4;

const DEFAULT_TYPES: [(&str, &str); 19] = [
    ("variants/CHROM", "S12"),
    ("variants/POS", "i4"),
    ("variants/ID", "S12"),
    ("variants/REF", "S1"),
    ("variants/ALT", "S1"),
    ("variants/QUAL", "f4"),
    ("variants/DP", "i4"),
    ("variants/AN", "i4"),
    ("variants/AC", "i4"),
    ("variants/AF", "f4"),
    ("variants/MQ", "f4"),
    ("variants/ANN", "S400"),
    ("calldata/GT", "genotype/i1"),
    ("calldata/GQ", "i1"),
    ("calldata/HQ", "i1"),
    ("calldata/DP", "i2"),
    ("calldata/AD", "i2"),
    ("calldata/MQ0", "i2"),
    ("calldata/MQ", "f2"),
];

const DEFAULT_NUMBERS: [(&str, usize); 18] = [
    ("variants/CHROM", 1),
    ("variants/POS", 1),
    ("variants/ID", 1),
    ("variants/REF", 1),
    ("variants/ALT", 3),
    ("variants/QUAL", 1),
    ("variants/DP", 1),
    ("variants/AN", 1),
    ("variants/AC", 3),
    ("variants/AF", 3),
    ("variants/MQ", 1),
    ("calldata/DP", 1),
    ("calldata/GT", 2),
    ("calldata/GQ", 1),
    ("calldata/HQ", 2),
    ("calldata/AD", 4),
    ("calldata/MQ0", 1),
    ("calldata/MQ", 1),
];

/// Variant-level or per-sample field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// One value (or `number` values) per record.
    Variants,
    /// One value (or `number` values) per record per selected sample.
    Calldata,
}

impl Namespace {
    /// Prefix used in field names.
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Variants => "variants",
            Namespace::Calldata => "calldata",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Concrete scalar type of a decoded field.
///
/// Parsed from numpy-style codes (`i1`, `u4`, `f8`, `S12`, `bool`), long
/// names (`int16`, `float32`) or VCF type names (`Integer`, `Float`,
/// `String`, `Character`, `Flag`). Half-precision floats (`f2`) are widened
/// to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Boolean
    Bool,
    /// Fixed-width byte string, NUL padded
    Bytes(usize),
}

impl ScalarType {
    /// Returns `true` for signed and unsigned integer types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ScalarType::Int8
                | ScalarType::Int16
                | ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::UInt8
                | ScalarType::UInt16
                | ScalarType::UInt32
                | ScalarType::UInt64
        )
    }

    /// Returns `true` for floating-point types.
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }

    /// The "no data" value for this type: -1 for integers (all bits set for
    /// unsigned types), NaN for floats, empty for strings, false for booleans.
    pub fn natural_fill(&self) -> FillValue {
        match self {
            t if t.is_integer() => FillValue::Int(-1),
            t if t.is_float() => FillValue::Float(f64::NAN),
            ScalarType::Bool => FillValue::Bool(false),
            _ => FillValue::Bytes(Vec::new()),
        }
    }
}

impl FromStr for ScalarType {
    type Err = VarchunkError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().trim_start_matches(['<', '>', '|', '=']);
        let ty = match code {
            "i1" | "int8" => ScalarType::Int8,
            "i2" | "int16" => ScalarType::Int16,
            "i4" | "int32" | "Integer" => ScalarType::Int32,
            "i8" | "int64" => ScalarType::Int64,
            "u1" | "uint8" => ScalarType::UInt8,
            "u2" | "uint16" => ScalarType::UInt16,
            "u4" | "uint32" => ScalarType::UInt32,
            "u8" | "uint64" => ScalarType::UInt64,
            "f2" | "float16" | "f4" | "float32" | "Float" => ScalarType::Float32,
            "f8" | "float64" => ScalarType::Float64,
            "b1" | "bool" | "?" | "Flag" => ScalarType::Bool,
            "String" => ScalarType::Bytes(DEFAULT_STRING_WIDTH),
            "Character" => ScalarType::Bytes(1),
            _ => {
                let width = code
                    .strip_prefix('S')
                    .and_then(|w| w.parse::<usize>().ok())
                    .filter(|&w| w > 0);
                match width {
                    Some(width) => ScalarType::Bytes(width),
                    None => {
                        return Err(VarchunkError::InvalidOption {
                            option: "type".to_string(),
                            reason: format!("unsupported type {:?}", s),
                        })
                    }
                }
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Int8 => f.write_str("i1"),
            ScalarType::Int16 => f.write_str("i2"),
            ScalarType::Int32 => f.write_str("i4"),
            ScalarType::Int64 => f.write_str("i8"),
            ScalarType::UInt8 => f.write_str("u1"),
            ScalarType::UInt16 => f.write_str("u2"),
            ScalarType::UInt32 => f.write_str("u4"),
            ScalarType::UInt64 => f.write_str("u8"),
            ScalarType::Float32 => f.write_str("f4"),
            ScalarType::Float64 => f.write_str("f8"),
            ScalarType::Bool => f.write_str("bool"),
            ScalarType::Bytes(width) => write!(f, "S{}", width),
        }
    }
}

/// Value substituted when a field is absent or unparsable.
///
/// Integer fills are stored as `i64` and converted with a wrapping cast, so
/// `Int(-1)` fills an unsigned column with its maximum value.
#[derive(Debug, Clone)]
pub enum FillValue {
    /// Integer fill
    Int(i64),
    /// Float fill
    Float(f64),
    /// Boolean fill
    Bool(bool),
    /// Byte-string fill
    Bytes(Vec<u8>),
}

impl PartialEq for FillValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FillValue::Int(a), FillValue::Int(b)) => a == b,
            (FillValue::Float(a), FillValue::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (FillValue::Bool(a), FillValue::Bool(b)) => a == b,
            (FillValue::Bytes(a), FillValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl FillValue {
    /// Converts a user fill to the field's type.
    fn coerce(&self, ty: ScalarType, field: &str) -> Result<FillValue> {
        let coerced = match (self, ty) {
            (FillValue::Int(v), t) if t.is_integer() => Some(FillValue::Int(*v)),
            (FillValue::Float(v), t) if t.is_integer() && v.fract() == 0.0 => {
                Some(FillValue::Int(*v as i64))
            }
            (FillValue::Int(v), t) if t.is_float() => Some(FillValue::Float(*v as f64)),
            (FillValue::Float(v), t) if t.is_float() => Some(FillValue::Float(*v)),
            (FillValue::Bool(b), ScalarType::Bool) => Some(FillValue::Bool(*b)),
            (FillValue::Int(v @ (0 | 1)), ScalarType::Bool) => Some(FillValue::Bool(*v == 1)),
            (FillValue::Bytes(b), ScalarType::Bytes(width)) => {
                Some(FillValue::Bytes(b[..b.len().min(width)].to_vec()))
            }
            _ => None,
        };
        coerced.ok_or_else(|| VarchunkError::InvalidOption {
            option: field.to_string(),
            reason: format!("fill value {:?} is not compatible with type {}", self, ty),
        })
    }
}

impl From<i64> for FillValue {
    fn from(v: i64) -> Self {
        FillValue::Int(v)
    }
}

impl From<i32> for FillValue {
    fn from(v: i32) -> Self {
        FillValue::Int(v as i64)
    }
}

impl From<f64> for FillValue {
    fn from(v: f64) -> Self {
        FillValue::Float(v)
    }
}

impl From<bool> for FillValue {
    fn from(v: bool) -> Self {
        FillValue::Bool(v)
    }
}

impl From<&str> for FillValue {
    fn from(v: &str) -> Self {
        FillValue::Bytes(v.as_bytes().to_vec())
    }
}

/// Fixed leading column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedColumn {
    /// CHROM
    Chrom,
    /// POS
    Pos,
    /// ID
    Id,
    /// REF
    Ref,
    /// ALT
    Alt,
    /// QUAL
    Qual,
}

impl FixedColumn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "CHROM" => Some(FixedColumn::Chrom),
            "POS" => Some(FixedColumn::Pos),
            "ID" => Some(FixedColumn::Id),
            "REF" => Some(FixedColumn::Ref),
            "ALT" => Some(FixedColumn::Alt),
            "QUAL" => Some(FixedColumn::Qual),
            _ => None,
        }
    }

    /// Zero-based column index in a record line.
    pub fn column(&self) -> usize {
        match self {
            FixedColumn::Chrom => 0,
            FixedColumn::Pos => 1,
            FixedColumn::Id => 2,
            FixedColumn::Ref => 3,
            FixedColumn::Alt => 4,
            FixedColumn::Qual => 5,
        }
    }
}

/// Where a field's values come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// One of the fixed leading columns.
    Fixed(FixedColumn),
    /// `FILTER_PASS`: true iff the FILTER column holds the token `PASS`.
    FilterPass,
    /// `FILTER_<name>`: true iff `name` appears in the FILTER column.
    Filter(String),
    /// An INFO key.
    Info(String),
    /// A FORMAT sub-field decoded as plain values.
    Format(String),
    /// The GT sub-field decoded as allele indices.
    Genotype,
    /// Number of non-missing ALT alleles.
    NumAlt,
    /// `len(ALT) - len(REF)` per ALT slot.
    SvLen,
}

/// A fully resolved field to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Namespaced name, e.g. `variants/DP` or `calldata/GT`.
    pub name: String,
    /// Namespace.
    pub namespace: Namespace,
    /// Value source.
    pub kind: FieldKind,
    /// Scalar type.
    pub ty: ScalarType,
    /// Values per record (per sample for calldata). Zero means a boolean
    /// presence flag.
    pub number: usize,
    /// Fill value, already converted to `ty`.
    pub fill: FillValue,
}

impl FieldSpec {
    /// Trailing dimensions of this field's output array after the row axis,
    /// excluding the byte-string width axis.
    pub fn inner_shape(&self, n_samples: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(2);
        if self.namespace == Namespace::Calldata {
            shape.push(n_samples);
        }
        if self.number > 1 {
            shape.push(self.number);
        }
        shape
    }

    /// Scalars stored per row.
    pub fn values_per_row(&self, n_samples: usize) -> usize {
        self.inner_shape(n_samples).iter().product()
    }
}

/// One entry of a sample subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleRef {
    /// Sample identifier as it appears in the header.
    Name(String),
    /// Zero-based sample index in header order.
    Index(usize),
}

impl From<&str> for SampleRef {
    fn from(name: &str) -> Self {
        SampleRef::Name(name.to_string())
    }
}

impl From<String> for SampleRef {
    fn from(name: String) -> Self {
        SampleRef::Name(name)
    }
}

impl From<usize> for SampleRef {
    fn from(index: usize) -> Self {
        SampleRef::Index(index)
    }
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRef::Name(name) => write!(f, "{:?}", name),
            SampleRef::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Which samples to decode calldata for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SampleSelection {
    /// Every sample in the header.
    #[default]
    All,
    /// A subset by name or index. Output order follows the header.
    Subset(Vec<SampleRef>),
}

/// Per-field user overrides, keyed by bare or namespaced field name.
#[derive(Debug, Clone, Default)]
pub struct FieldOverrides {
    /// Type codes (`"i2"`, `"S4"`, `"Float"`, `"genotype/i1"`, ...).
    pub types: BTreeMap<String, String>,
    /// Numbers of values per record.
    pub numbers: BTreeMap<String, usize>,
    /// Fill values.
    pub fills: BTreeMap<String, FillValue>,
}

/// Result of resolving a selection against a header.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFields {
    /// Fields to decode, sorted by name.
    pub fields: Vec<FieldSpec>,
    /// Selected sample identifiers, in header order.
    pub samples: Vec<String>,
    /// For every sample column in the header, whether it is selected.
    pub sample_mask: Vec<bool>,
    /// Whether the caller asked for the sample list (`"samples"` or default).
    pub return_samples: bool,
}

impl ResolvedFields {
    /// Looks up a field by namespaced name.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns `true` if any per-sample field is selected.
    pub fn has_calldata(&self) -> bool {
        self.fields.iter().any(|f| f.namespace == Namespace::Calldata)
    }
}

/// Resolves the sample subset against the header.
///
/// Returns the selected names in header order and a per-column mask.
/// Entries matching no sample produce one diagnostic.
pub fn select_samples(
    header_samples: &[String],
    selection: &SampleSelection,
) -> (Vec<String>, Vec<bool>, Option<Diagnostic>) {
    let subset = match selection {
        SampleSelection::All => {
            return (header_samples.to_vec(), vec![true; header_samples.len()], None);
        }
        SampleSelection::Subset(subset) => subset,
    };

    let mut pending: BTreeSet<&SampleRef> = subset.iter().collect();
    let mut names = Vec::new();
    let mut mask = vec![false; header_samples.len()];

    for (i, sample) in header_samples.iter().enumerate() {
        let by_index = SampleRef::Index(i);
        let by_name = SampleRef::Name(sample.clone());
        let hit_index = pending.remove(&by_index);
        let hit_name = pending.remove(&by_name);
        if hit_index || hit_name {
            names.push(sample.clone());
            mask[i] = true;
        }
    }

    let diagnostic = (!pending.is_empty()).then(|| {
        let missing: Vec<String> = pending.iter().map(|s| s.to_string()).collect();
        Diagnostic::new(
            DiagnosticKind::Undeclared,
            "samples",
            format!("samples not found, will be ignored: {}", missing.join(", ")),
        )
    });

    (names, mask, diagnostic)
}

/// Adds a namespace to a bare field name.
///
/// Order: fixed columns, `FILTER_` names, declared filters, declared INFO,
/// declared FORMAT, then `variants/` for anything else.
pub fn normalize_field_prefix(field: &str, header: &VcfHeader) -> String {
    if field.starts_with("variants/") || field.starts_with("calldata/") {
        field.to_string()
    } else if FIXED_FIELDS.contains(&field) || field.starts_with("FILTER_") {
        format!("variants/{}", field)
    } else if header.filters.contains(field) {
        format!("variants/FILTER_{}", field)
    } else if header.infos.contains(field) {
        format!("variants/{}", field)
    } else if header.formats.contains(field) {
        format!("calldata/{}", field)
    } else {
        format!("variants/{}", field)
    }
}

fn check_field(field: &str, header: &VcfHeader, diagnostics: &mut Vec<Diagnostic>) {
    let (group, name) = split_name(field);
    let undeclared = |what: &str, id: &str| {
        Diagnostic::new(
            DiagnosticKind::Undeclared,
            field,
            format!("{} not declared in header: {:?}", what, id),
        )
    };

    if group == "calldata" {
        if !header.formats.contains(name) {
            diagnostics.push(undeclared("FORMAT", name));
        }
    } else if FIXED_FIELDS.contains(&name) || COMPUTED_FIELDS.contains(&name) {
    } else if let Some(filter) = name.strip_prefix("FILTER_") {
        if filter != "PASS" && !header.filters.contains(filter) {
            diagnostics.push(undeclared("FILTER", filter));
        }
    } else if !header.infos.contains(name) {
        diagnostics.push(undeclared("INFO", name));
    }
}

fn split_name(field: &str) -> (&str, &str) {
    field.split_once('/').unwrap_or(("variants", field))
}

fn add_fixed(fields: &mut BTreeSet<String>) {
    for f in FIXED_FIELDS {
        fields.insert(format!("variants/{}", f));
    }
}

fn add_info(fields: &mut BTreeSet<String>, header: &VcfHeader) {
    for d in header.infos.iter() {
        fields.insert(format!("variants/{}", d.id));
    }
}

fn add_filters(fields: &mut BTreeSet<String>, header: &VcfHeader) {
    fields.insert("variants/FILTER_PASS".to_string());
    for d in header.filters.iter() {
        fields.insert(format!("variants/FILTER_{}", d.id));
    }
}

fn add_variants(fields: &mut BTreeSet<String>, header: &VcfHeader) {
    add_fixed(fields);
    add_info(fields, header);
    add_filters(fields, header);
    for f in COMPUTED_FIELDS {
        fields.insert(format!("variants/{}", f));
    }
}

fn add_calldata(fields: &mut BTreeSet<String>, header: &VcfHeader) {
    for d in header.formats.iter() {
        fields.insert(format!("calldata/{}", d.id));
    }
}

/// Expands a selection into namespaced field names.
///
/// Returns the names, whether `samples` was requested, and diagnostics for
/// explicitly named fields that the header never declared.
pub fn normalize_fields(
    selection: &[String],
    header: &VcfHeader,
    have_samples: bool,
) -> (BTreeSet<String>, bool, Vec<Diagnostic>) {
    let mut fields = BTreeSet::new();
    let mut want_samples = false;
    let mut diagnostics = Vec::new();

    for f in selection {
        match f.as_str() {
            "samples" => want_samples = true,
            "*" | "kitchen sink" => {
                want_samples = true;
                add_variants(&mut fields, header);
                if have_samples {
                    add_calldata(&mut fields, header);
                }
            }
            "variants" | "variants*" | "variants/*" => add_variants(&mut fields, header),
            "calldata" | "calldata*" | "calldata/*" => {
                if have_samples {
                    add_calldata(&mut fields, header);
                }
            }
            "INFO" | "INFO*" | "INFO/*" | "variants/INFO" | "variants/INFO*"
            | "variants/INFO/*" => add_info(&mut fields, header),
            "FILTER" | "FILTER*" | "FILTER/*" | "FILTER_*" | "variants/FILTER"
            | "variants/FILTER*" | "variants/FILTER/*" | "variants/FILTER_*" => {
                add_filters(&mut fields, header)
            }
            other => {
                let name = normalize_field_prefix(other, header);
                check_field(&name, header, &mut diagnostics);
                if !(name.starts_with("calldata/") && !have_samples) {
                    fields.insert(name);
                }
            }
        }
    }

    (fields, want_samples, diagnostics)
}

fn normalize_keys<V: Clone>(map: &BTreeMap<String, V>, header: &VcfHeader) -> BTreeMap<String, V> {
    map.iter()
        .map(|(k, v)| (normalize_field_prefix(k, header), v.clone()))
        .collect()
}

/// Maps a declared `Number=` token to a fixed count.
///
/// Unparsable tokens resolve to 1 with a diagnostic.
pub fn parse_number(field: &str, token: &str) -> (usize, Option<Diagnostic>) {
    match token {
        "A" | "G" | "." => (NUMBER_PER_ALT, None),
        "R" => (NUMBER_PER_ALLELE, None),
        _ => match token.parse::<usize>() {
            Ok(n) => (n, None),
            Err(_) => (
                1,
                Some(Diagnostic::new(
                    DiagnosticKind::Fallback,
                    field,
                    format!("error parsing {:?} as number, falling back to 1", token),
                )),
            ),
        },
    }
}

/// Type code with an optional `genotype/` marker.
fn parse_type_code(field: &str, code: &str) -> Result<(ScalarType, bool)> {
    let (genotype, code) = match code.strip_prefix("genotype/") {
        Some(inner) => (true, inner),
        None => (false, code),
    };
    let ty = code.parse::<ScalarType>().map_err(|_| VarchunkError::InvalidOption {
        option: field.to_string(),
        reason: format!("unsupported type {:?}", code),
    })?;
    if genotype && !ty.is_integer() {
        return Err(VarchunkError::InvalidOption {
            option: field.to_string(),
            reason: format!("genotype type must be an integer, got {}", ty),
        });
    }
    Ok((ty, genotype))
}

struct Resolver<'a> {
    header: &'a VcfHeader,
    types: BTreeMap<String, String>,
    numbers: BTreeMap<String, usize>,
    fills: BTreeMap<String, FillValue>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    fn resolve_type(&mut self, field: &str) -> Result<(ScalarType, bool)> {
        if let Some(code) = self.types.get(field) {
            return parse_type_code(field, code);
        }
        if let Some((_, code)) = DEFAULT_TYPES.iter().find(|(f, _)| *f == field) {
            return parse_type_code(field, code);
        }

        let (group, name) = split_name(field);
        if group == "variants" {
            if COMPUTED_FIELDS.contains(&name) {
                return Ok((ScalarType::Int32, false));
            }
            if name.starts_with("FILTER_") {
                return Ok((ScalarType::Bool, false));
            }
        }
        let declared = if group == "variants" {
            self.header.infos.get(name)
        } else {
            self.header.formats.get(name)
        };
        if let Some(ty) = declared.and_then(|d| d.ty.parse::<ScalarType>().ok()) {
            return Ok((ty, false));
        }

        let fallback = ScalarType::Bytes(DEFAULT_STRING_WIDTH);
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::Fallback,
            field,
            format!("could not determine type, falling back to {}", fallback),
        ));
        Ok((fallback, false))
    }

    fn resolve_number(&mut self, field: &str) -> usize {
        if let Some(&n) = self.numbers.get(field) {
            return n;
        }
        if let Some((_, n)) = DEFAULT_NUMBERS.iter().find(|(f, _)| *f == field) {
            return *n;
        }

        let (group, name) = split_name(field);
        if group == "variants" {
            match name {
                "numalt" => return 1,
                "svlen" => return self.resolve_number("variants/ALT"),
                n if n.starts_with("FILTER_") => return 0,
                _ => {}
            }
        }
        let declared = if group == "variants" {
            self.header.infos.get(name)
        } else {
            self.header.formats.get(name)
        };
        match declared {
            Some(d) => {
                let (n, diagnostic) = parse_number(field, &d.number);
                self.diagnostics.extend(diagnostic);
                n
            }
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::Fallback,
                    field,
                    "could not determine number, falling back to 1",
                ));
                1
            }
        }
    }

    fn resolve(&mut self, field: &str) -> Result<FieldSpec> {
        let (group, name) = split_name(field);
        let namespace = if group == "calldata" {
            Namespace::Calldata
        } else {
            Namespace::Variants
        };

        let (mut ty, genotype) = self.resolve_type(field)?;
        let mut number = self.resolve_number(field);

        let kind = match namespace {
            Namespace::Variants => match (FixedColumn::from_name(name), name) {
                (Some(column), _) => FieldKind::Fixed(column),
                (None, "numalt") => FieldKind::NumAlt,
                (None, "svlen") => FieldKind::SvLen,
                (None, "FILTER_PASS") => FieldKind::FilterPass,
                (None, n) => match n.strip_prefix("FILTER_") {
                    Some(filter) => FieldKind::Filter(filter.to_string()),
                    None => FieldKind::Info(n.to_string()),
                },
            },
            Namespace::Calldata if name == "GT" && (genotype || ty.is_integer()) => {
                FieldKind::Genotype
            }
            Namespace::Calldata => FieldKind::Format(name.to_string()),
        };

        match kind {
            FieldKind::Fixed(FixedColumn::Alt) | FieldKind::SvLen | FieldKind::Genotype
                if number == 0 =>
            {
                return Err(VarchunkError::InvalidOption {
                    option: field.to_string(),
                    reason: "number must be at least 1".to_string(),
                });
            }
            FieldKind::Fixed(FixedColumn::Alt) => {}
            FieldKind::Fixed(_) | FieldKind::NumAlt => number = 1,
            _ => {}
        }

        if number == 0 {
            ty = ScalarType::Bool;
        }

        let fill = match self.fills.get(field) {
            Some(fill) => fill.coerce(ty, field)?,
            None => ty.natural_fill(),
        };

        Ok(FieldSpec {
            name: field.to_string(),
            namespace,
            kind,
            ty,
            number,
            fill,
        })
    }
}

/// Resolves a field selection against a header.
///
/// `selection` is `None` for the default selection: the fixed columns,
/// `FILTER_PASS`, `calldata/GT` when samples are selected and GT is declared,
/// and the sample list.
///
/// # Errors
///
/// Returns [`VarchunkError::InvalidOption`] for unsupported type codes, fills
/// incompatible with the field type, or a zero number for ALT or GT.
pub fn resolve_fields(
    header: &VcfHeader,
    selection: Option<&[String]>,
    overrides: &FieldOverrides,
    samples: &SampleSelection,
) -> Result<(ResolvedFields, Vec<Diagnostic>)> {
    let mut diagnostics = Vec::new();

    let (sample_names, sample_mask, sample_diagnostic) = select_samples(&header.samples, samples);
    diagnostics.extend(sample_diagnostic);
    let have_samples = !sample_names.is_empty();

    let (names, return_samples) = match selection {
        None => {
            let mut names = BTreeSet::new();
            add_fixed(&mut names);
            names.insert("variants/FILTER_PASS".to_string());
            if have_samples && header.formats.contains("GT") {
                names.insert("calldata/GT".to_string());
            }
            (names, true)
        }
        Some(selection) => {
            let (names, want_samples, field_diagnostics) =
                normalize_fields(selection, header, have_samples);
            diagnostics.extend(field_diagnostics);
            (names, want_samples)
        }
    };

    let mut resolver = Resolver {
        header,
        types: normalize_keys(&overrides.types, header),
        numbers: normalize_keys(&overrides.numbers, header),
        fills: normalize_keys(&overrides.fills, header),
        diagnostics: Vec::new(),
    };

    let fields = names
        .iter()
        .map(|name| resolver.resolve(name))
        .collect::<Result<Vec<_>>>()?;
    diagnostics.append(&mut resolver.diagnostics);

    Ok((
        ResolvedFields {
            fields,
            samples: sample_names,
            sample_mask,
            return_samples,
        },
        diagnostics,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::primitives::LineReader;
    use crate::formats::vcf::header::parse_header;

    const HEADER: &str = "##fileformat=VCFv4.0\n\
        ##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n\
        ##INFO=<ID=AC,Number=.,Type=Integer,Description=\"Allele count\">\n\
        ##INFO=<ID=AF,Number=.,Type=Float,Description=\"Allele Frequency\">\n\
        ##INFO=<ID=AA,Number=1,Type=String,Description=\"Ancestral Allele\">\n\
        ##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">\n\
        ##INFO=<ID=XR,Number=R,Type=Integer,Description=\"Per allele\">\n\
        ##INFO=<ID=XQ,Number=Q,Type=Integer,Description=\"Bad number\">\n\
        ##FILTER=<ID=q10,Description=\"Quality below 10\">\n\
        ##FILTER=<ID=s50,Description=\"Less than 50% of samples have data\">\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        ##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">\n\
        ##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\tNA00003\n";

    fn header() -> VcfHeader {
        parse_header(&mut LineReader::new(HEADER.as_bytes())).unwrap().0
    }

    fn resolve(selection: &[&str], overrides: &FieldOverrides) -> (ResolvedFields, Vec<Diagnostic>) {
        let selection: Vec<String> = selection.iter().map(|s| s.to_string()).collect();
        resolve_fields(&header(), Some(selection.as_slice()), overrides, &SampleSelection::All).unwrap()
    }

    fn names(resolved: &ResolvedFields) -> Vec<&str> {
        resolved.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_scalar_type_codes() {
        assert_eq!("i1".parse::<ScalarType>().unwrap(), ScalarType::Int8);
        assert_eq!("<u4".parse::<ScalarType>().unwrap(), ScalarType::UInt32);
        assert_eq!("f2".parse::<ScalarType>().unwrap(), ScalarType::Float32);
        assert_eq!("Float".parse::<ScalarType>().unwrap(), ScalarType::Float32);
        assert_eq!("String".parse::<ScalarType>().unwrap(), ScalarType::Bytes(12));
        assert_eq!("Character".parse::<ScalarType>().unwrap(), ScalarType::Bytes(1));
        assert_eq!("S400".parse::<ScalarType>().unwrap(), ScalarType::Bytes(400));
        assert_eq!("Flag".parse::<ScalarType>().unwrap(), ScalarType::Bool);
        assert!("S0".parse::<ScalarType>().is_err());
        assert!("complex128".parse::<ScalarType>().is_err());
    }

    #[test]
    fn test_default_selection() {
        let (resolved, diagnostics) =
            resolve_fields(&header(), None, &FieldOverrides::default(), &SampleSelection::All).unwrap();
        assert!(diagnostics.is_empty());
        assert!(resolved.return_samples);
        assert_eq!(
            names(&resolved),
            vec![
                "calldata/GT",
                "variants/ALT",
                "variants/CHROM",
                "variants/FILTER_PASS",
                "variants/ID",
                "variants/POS",
                "variants/QUAL",
                "variants/REF",
            ]
        );
    }

    #[test]
    fn test_wildcards() {
        let (resolved, _) = resolve(&["FILTER"], &FieldOverrides::default());
        assert_eq!(
            names(&resolved),
            vec!["variants/FILTER_PASS", "variants/FILTER_q10", "variants/FILTER_s50"]
        );

        let (resolved, _) = resolve(&["variants/INFO/*"], &FieldOverrides::default());
        assert_eq!(resolved.fields.len(), 7);

        let (resolved, _) = resolve(&["calldata/*"], &FieldOverrides::default());
        assert_eq!(names(&resolved), vec!["calldata/GQ", "calldata/GT", "calldata/HQ"]);

        let (resolved, _) = resolve(&["*"], &FieldOverrides::default());
        assert!(resolved.get("variants/numalt").is_some());
        assert!(resolved.get("variants/svlen").is_some());
        assert!(resolved.get("calldata/HQ").is_some());
        assert!(resolved.return_samples);

        let (resolved, _) = resolve(&["variants/*"], &FieldOverrides::default());
        assert!(!resolved.return_samples);
    }

    #[test]
    fn test_prefix_inference() {
        let h = header();
        assert_eq!(normalize_field_prefix("POS", &h), "variants/POS");
        assert_eq!(normalize_field_prefix("FILTER_foo", &h), "variants/FILTER_foo");
        assert_eq!(normalize_field_prefix("q10", &h), "variants/FILTER_q10");
        assert_eq!(normalize_field_prefix("AF", &h), "variants/AF");
        assert_eq!(normalize_field_prefix("GQ", &h), "calldata/GQ");
        assert_eq!(normalize_field_prefix("nope", &h), "variants/nope");
        assert_eq!(normalize_field_prefix("calldata/nope", &h), "calldata/nope");
    }

    #[test]
    fn test_types_and_numbers() {
        let (resolved, diagnostics) = resolve(
            &["CHROM", "ALT", "AC", "AF", "AA", "DB", "XR", "GT", "GQ", "HQ", "svlen"],
            &FieldOverrides::default(),
        );
        assert!(diagnostics.is_empty());

        let check = |name: &str, ty: ScalarType, number: usize| {
            let f = resolved.get(name).unwrap();
            assert_eq!((f.ty, f.number), (ty, number), "{}", name);
        };
        check("variants/CHROM", ScalarType::Bytes(12), 1);
        check("variants/ALT", ScalarType::Bytes(1), 3);
        check("variants/AC", ScalarType::Int32, 3);
        check("variants/AF", ScalarType::Float32, 3);
        check("variants/AA", ScalarType::Bytes(12), 1);
        check("variants/DB", ScalarType::Bool, 0);
        check("variants/XR", ScalarType::Int32, 4);
        check("variants/svlen", ScalarType::Int32, 3);
        check("calldata/GT", ScalarType::Int8, 2);
        check("calldata/GQ", ScalarType::Int8, 1);
        check("calldata/HQ", ScalarType::Int8, 2);
        assert_eq!(resolved.get("calldata/GT").unwrap().kind, FieldKind::Genotype);
    }

    #[test]
    fn test_fallbacks_warn() {
        let (resolved, diagnostics) = resolve(&["XQ", "nope", "calldata/nope"], &FieldOverrides::default());
        let xq = resolved.get("variants/XQ").unwrap();
        assert_eq!(xq.number, 1);
        let nope = resolved.get("variants/nope").unwrap();
        assert_eq!((nope.ty, nope.number), (ScalarType::Bytes(12), 1));

        let subjects: Vec<_> = diagnostics.iter().map(|d| (d.kind, d.subject.as_str())).collect();
        assert!(subjects.contains(&(DiagnosticKind::Fallback, "variants/XQ")));
        assert!(subjects.contains(&(DiagnosticKind::Undeclared, "variants/nope")));
        assert!(subjects.contains(&(DiagnosticKind::Fallback, "variants/nope")));
        assert!(subjects.contains(&(DiagnosticKind::Undeclared, "calldata/nope")));
    }

    #[test]
    fn test_overrides() {
        let mut overrides = FieldOverrides::default();
        overrides.types.insert("ALT".to_string(), "S4".to_string());
        overrides.numbers.insert("ALT".to_string(), 2);
        overrides.numbers.insert("AC".to_string(), 0);
        overrides.types.insert("GT".to_string(), "S3".to_string());
        overrides.fills.insert("variants/AF".to_string(), FillValue::Int(-2));
        overrides.types.insert("GQ".to_string(), "u1".to_string());

        let (resolved, _) = resolve(&["ALT", "AC", "AF", "GT", "GQ"], &overrides);
        let alt = resolved.get("variants/ALT").unwrap();
        assert_eq!((alt.ty, alt.number), (ScalarType::Bytes(4), 2));
        assert_eq!(resolved.get("variants/AC").unwrap().ty, ScalarType::Bool);
        assert_eq!(resolved.get("variants/AF").unwrap().fill, FillValue::Float(-2.0));
        assert_eq!(
            resolved.get("calldata/GT").unwrap().kind,
            FieldKind::Format("GT".to_string())
        );
        assert_eq!(resolved.get("calldata/GQ").unwrap().fill, FillValue::Int(-1));
    }

    #[test]
    fn test_invalid_overrides() {
        let header = header();
        let selection = vec!["AF".to_string()];
        let mut overrides = FieldOverrides::default();
        overrides.fills.insert("AF".to_string(), FillValue::from("x"));
        assert!(resolve_fields(&header, Some(selection.as_slice()), &overrides, &SampleSelection::All).is_err());

        let mut overrides = FieldOverrides::default();
        overrides.types.insert("AF".to_string(), "c16".to_string());
        assert!(resolve_fields(&header, Some(selection.as_slice()), &overrides, &SampleSelection::All).is_err());

        let selection = vec!["GT".to_string()];
        let mut overrides = FieldOverrides::default();
        overrides.numbers.insert("GT".to_string(), 0);
        assert!(resolve_fields(&header, Some(selection.as_slice()), &overrides, &SampleSelection::All).is_err());
    }

    #[test]
    fn test_sample_subset() {
        let all: Vec<String> = ["NA00001", "NA00002", "NA00003"].iter().map(|s| s.to_string()).collect();

        let subset = SampleSelection::Subset(vec![SampleRef::from("NA00003"), SampleRef::from(0usize)]);
        let (names, mask, diagnostic) = select_samples(&all, &subset);
        assert_eq!(names, vec!["NA00001", "NA00003"]);
        assert_eq!(mask, vec![true, false, true]);
        assert!(diagnostic.is_none());

        let subset = SampleSelection::Subset(vec![SampleRef::from("NA00002"), SampleRef::from("nobody")]);
        let (names, _, diagnostic) = select_samples(&all, &subset);
        assert_eq!(names, vec!["NA00002"]);
        assert!(diagnostic.unwrap().reason.contains("nobody"));
    }

    #[test]
    fn test_calldata_dropped_without_samples() {
        let selection = vec!["GT".to_string(), "POS".to_string()];
        let subset = SampleSelection::Subset(Vec::new());
        let (resolved, _) =
            resolve_fields(&header(), Some(selection.as_slice()), &FieldOverrides::default(), &subset).unwrap();
        assert_eq!(names(&resolved), vec!["variants/POS"]);
        assert!(!resolved.has_calldata());
    }

    #[test]
    fn test_inner_shape() {
        let (resolved, _) = resolve(&["POS", "ALT", "GQ", "HQ"], &FieldOverrides::default());
        assert_eq!(resolved.get("variants/POS").unwrap().inner_shape(3), Vec::<usize>::new());
        assert_eq!(resolved.get("variants/ALT").unwrap().inner_shape(3), vec![3]);
        assert_eq!(resolved.get("calldata/GQ").unwrap().inner_shape(3), vec![3]);
        assert_eq!(resolved.get("calldata/HQ").unwrap().inner_shape(3), vec![3, 2]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let selection = vec!["*".to_string()];
        let overrides = FieldOverrides::default();
        let first = resolve_fields(&header(), Some(selection.as_slice()), &overrides, &SampleSelection::All).unwrap();
        let second = resolve_fields(&header(), Some(selection.as_slice()), &overrides, &SampleSelection::All).unwrap();
        assert_eq!(first.0, second.0);
    }
}
