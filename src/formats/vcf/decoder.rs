//! Record decoder.
//!
//! [`RecordDecoder`] turns one tab-delimited record line into one row of a
//! column set. It is built once per session from the resolved fields and is
//! read-only afterwards, so parallel workers share it behind an `Arc`.
//!
//! Decoding never drops a record. A token that fails to parse leaves the
//! field's fill value in place and adds a [`DiagnosticKind::ParseError`]
//! diagnostic to the block log; empty and `.` tokens are filled silently.

use crate::formats::primitives::split_tabs;
use crate::formats::vcf::chunk::{parse_int, ColumnBuffer, ColumnSet};
use crate::formats::vcf::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
use crate::formats::vcf::fields::{FieldKind, FieldSpec, FixedColumn, ResolvedFields};
use crate::formats::vcf::header::VcfHeader;
use memchr::memchr;
use std::collections::{HashMap, HashSet};

#[inline]
fn is_missing(token: &[u8]) -> bool {
    token.is_empty() || token == b"."
}

/// Splits on either of two separator bytes.
#[inline]
fn split2(value: &[u8], a: u8, b: u8) -> impl Iterator<Item = &[u8]> {
    value.split(move |&c| c == a || c == b)
}

/// Where an INFO or FORMAT key is written.
#[derive(Debug, Clone, Copy)]
struct Target {
    column: usize,
    number: usize,
    genotype: bool,
}

/// Decodes record lines into column sets.
#[derive(Debug)]
pub struct RecordDecoder {
    fields: Vec<FieldSpec>,
    n_samples: usize,
    sample_mask: Vec<bool>,
    fixed: [Option<usize>; 6],
    filter_pass: Option<usize>,
    filters: HashMap<Vec<u8>, usize>,
    declared_filters: HashSet<Vec<u8>>,
    infos: HashMap<Vec<u8>, Target>,
    formats: HashMap<Vec<u8>, Target>,
    numalt: Option<usize>,
    svlen: Option<usize>,
}

impl RecordDecoder {
    /// Builds a decoder for `resolved` fields against `header`.
    pub fn new(resolved: &ResolvedFields, header: &VcfHeader) -> Self {
        let mut decoder = RecordDecoder {
            fields: resolved.fields.clone(),
            n_samples: resolved.samples.len(),
            sample_mask: resolved.sample_mask.clone(),
            fixed: [None; 6],
            filter_pass: None,
            filters: HashMap::new(),
            declared_filters: header.filters.iter().map(|d| d.id.as_bytes().to_vec()).collect(),
            infos: HashMap::new(),
            formats: HashMap::new(),
            numalt: None,
            svlen: None,
        };

        for (column, spec) in resolved.fields.iter().enumerate() {
            let target = |genotype| Target {
                column,
                number: spec.number,
                genotype,
            };
            match &spec.kind {
                FieldKind::Fixed(fixed) => decoder.fixed[fixed.column()] = Some(column),
                FieldKind::FilterPass => decoder.filter_pass = Some(column),
                FieldKind::Filter(name) => {
                    decoder.filters.insert(name.as_bytes().to_vec(), column);
                }
                FieldKind::Info(name) => {
                    decoder.infos.insert(name.as_bytes().to_vec(), target(false));
                }
                FieldKind::Format(name) => {
                    decoder.formats.insert(name.as_bytes().to_vec(), target(false));
                }
                FieldKind::Genotype => {
                    decoder.formats.insert(b"GT".to_vec(), target(true));
                }
                FieldKind::NumAlt => decoder.numalt = Some(column),
                FieldKind::SvLen => decoder.svlen = Some(column),
            }
        }
        decoder
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of selected samples.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Creates an empty column set for these fields.
    pub(crate) fn new_columns(&self, capacity_rows: usize) -> ColumnSet {
        ColumnSet::new(&self.fields, self.n_samples, capacity_rows)
    }

    fn wants_filters(&self) -> bool {
        self.filter_pass.is_some() || !self.filters.is_empty()
    }

    /// Decodes one record line into a new row of `set`.
    ///
    /// `line` is the 1-based input line number, used in diagnostics only.
    pub(crate) fn decode(
        &self,
        record: &[u8],
        line: usize,
        set: &mut ColumnSet,
        log: &mut DiagnosticLog,
    ) {
        let mut columns = split_tabs(record);
        let mut fixed: [&[u8]; 8] = [b"".as_slice(); 8];
        for slot in fixed.iter_mut() {
            match columns.next() {
                Some(token) => *slot = token,
                None => break,
            }
        }
        let [chrom, pos, id, reference, alt, qual, filter, info] = fixed;

        let pos_value = parse_int(pos).filter(|&p| p >= 0);
        let row = set.push_row(chrom, pos_value.unwrap_or(-1));

        if let Some(c) = self.fixed[FixedColumn::Chrom.column()] {
            if chrom.is_empty() {
                log.push(Diagnostic::new(
                    DiagnosticKind::ParseError,
                    self.fields[c].name.as_str(),
                    format!("empty CHROM at record line {}", line),
                ));
            } else {
                set.column_mut(c).set_token(row, chrom);
            }
        }
        if let Some(c) = self.fixed[FixedColumn::Pos.column()] {
            let stored = pos_value.is_some_and(|p| set.column_mut(c).set_int(row, p));
            if !stored {
                log.push(Diagnostic::parse_error(self.fields[c].name.as_str(), pos, line));
            }
        }
        for (fixed, token) in [(FixedColumn::Id, id), (FixedColumn::Ref, reference)] {
            if let Some(c) = self.fixed[fixed.column()] {
                if !is_missing(token) && !set.column_mut(c).set_token(row, token) {
                    log.push(Diagnostic::parse_error(self.fields[c].name.as_str(), token, line));
                }
            }
        }
        if let Some(c) = self.fixed[FixedColumn::Alt.column()] {
            let spec = &self.fields[c];
            let base = row * set.column_mut(c).per_row();
            decode_values(set.column_mut(c), base, spec.number, alt, b',', spec, line, log);
        }
        if let Some(c) = self.fixed[FixedColumn::Qual.column()] {
            if !is_missing(qual) && !set.column_mut(c).set_token(row, qual) {
                log.push(Diagnostic::parse_error(self.fields[c].name.as_str(), qual, line));
            }
        }

        if self.numalt.is_some() || self.svlen.is_some() {
            self.decode_computed(row, reference, alt, line, set, log);
        }
        if self.wants_filters() {
            self.decode_filter(row, filter, set, log);
        }
        if !self.infos.is_empty() && !is_missing(info) {
            self.decode_info(row, info, line, set, log);
        }
        if !self.formats.is_empty() && self.n_samples > 0 {
            let format = columns.next().unwrap_or_default();
            if let Some(samples) = columns.remainder() {
                self.decode_samples(row, format, samples, line, set, log);
            }
        }
    }

    fn decode_computed(
        &self,
        row: usize,
        reference: &[u8],
        alt: &[u8],
        line: usize,
        set: &mut ColumnSet,
        log: &mut DiagnosticLog,
    ) {
        let alleles: Vec<&[u8]> = if is_missing(alt) {
            Vec::new()
        } else {
            alt.split(|&b| b == b',').collect()
        };
        if let Some(c) = self.numalt {
            let n = alleles.iter().filter(|a| !is_missing(a)).count();
            if !set.column_mut(c).set_int(row, n as i64) {
                log.push(Diagnostic::parse_error(self.fields[c].name.as_str(), alt, line));
            }
        }
        if let Some(c) = self.svlen {
            let spec = &self.fields[c];
            let column = set.column_mut(c);
            let base = row * column.per_row();
            for (j, allele) in alleles.iter().take(spec.number).enumerate() {
                let svlen = allele.len() as i64 - reference.len() as i64;
                if !is_missing(allele) && !column.set_int(base + j, svlen) {
                    log.push(Diagnostic::parse_error(spec.name.as_str(), allele, line));
                }
            }
        }
    }

    fn decode_filter(&self, row: usize, filter: &[u8], set: &mut ColumnSet, log: &mut DiagnosticLog) {
        if is_missing(filter) {
            return;
        }
        if let Some(c) = self.filter_pass {
            set.column_mut(c).set_bool(row, false);
        }
        for &c in self.filters.values() {
            set.column_mut(c).set_bool(row, false);
        }
        for token in split2(filter, b';', b',') {
            if is_missing(token) {
                continue;
            }
            if token == b"PASS" {
                if let Some(c) = self.filter_pass {
                    set.column_mut(c).set_bool(row, true);
                }
                continue;
            }
            if let Some(&c) = self.filters.get(token) {
                set.column_mut(c).set_bool(row, true);
            }
            if !self.declared_filters.contains(token) {
                log.push_once(Diagnostic::new(
                    DiagnosticKind::Undeclared,
                    format!("FILTER_{}", String::from_utf8_lossy(token)),
                    "filter not declared in header",
                ));
            }
        }
    }

    fn decode_info(
        &self,
        row: usize,
        info: &[u8],
        line: usize,
        set: &mut ColumnSet,
        log: &mut DiagnosticLog,
    ) {
        for entry in info.split(|&b| b == b';') {
            if entry.is_empty() {
                continue;
            }
            let (key, value) = match memchr(b'=', entry) {
                Some(i) => (&entry[..i], Some(&entry[i + 1..])),
                None => (entry, None),
            };
            if key.is_empty() {
                log.push(Diagnostic::new(
                    DiagnosticKind::ParseError,
                    "variants/INFO",
                    format!(
                        "missing key in {:?} at record line {}",
                        String::from_utf8_lossy(entry),
                        line
                    ),
                ));
                continue;
            }
            let Some(target) = self.infos.get(key) else {
                continue;
            };
            let spec = &self.fields[target.column];
            let column = set.column_mut(target.column);
            if target.number == 0 {
                column.set_bool(row, value.is_none());
                continue;
            }
            if let Some(value) = value {
                let base = row * column.per_row();
                decode_values(column, base, target.number, value, b',', spec, line, log);
            }
        }
    }

    fn decode_samples(
        &self,
        row: usize,
        format: &[u8],
        samples: &[u8],
        line: usize,
        set: &mut ColumnSet,
        log: &mut DiagnosticLog,
    ) {
        if is_missing(format) {
            return;
        }
        let targets: Vec<Option<Target>> = format
            .split(|&b| b == b':')
            .map(|key| self.formats.get(key).copied())
            .collect();
        if targets.iter().all(Option::is_none) {
            return;
        }

        let mut selected = 0;
        for (i, sample) in split_tabs(samples).enumerate() {
            if selected == self.n_samples {
                break;
            }
            if !self.sample_mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            let s = selected;
            selected += 1;
            if is_missing(sample) {
                continue;
            }

            for (target, token) in targets.iter().zip(sample.split(|&b| b == b':')) {
                let Some(target) = target else {
                    continue;
                };
                let spec = &self.fields[target.column];
                let column = set.column_mut(target.column);
                let width = target.number.max(1);
                let base = row * column.per_row() + s * width;
                if target.genotype {
                    decode_genotype(column, base, target.number, token, spec, line, log);
                } else if target.number == 0 {
                    column.set_bool(base, !is_missing(token));
                } else {
                    decode_values(column, base, target.number, token, b',', spec, line, log);
                }
            }
        }
    }
}

/// Writes up to `number` separated values into consecutive slots from `base`.
#[allow(clippy::too_many_arguments)]
fn decode_values(
    column: &mut ColumnBuffer,
    base: usize,
    number: usize,
    value: &[u8],
    separator: u8,
    spec: &FieldSpec,
    line: usize,
    log: &mut DiagnosticLog,
) {
    if is_missing(value) {
        return;
    }
    let number = number.max(1);
    for (j, token) in value.split(|&b| b == separator).take(number).enumerate() {
        if is_missing(token) {
            continue;
        }
        if !column.set_token(base + j, token) {
            log.push(Diagnostic::parse_error(spec.name.as_str(), token, line));
        }
    }
}

fn decode_genotype(
    column: &mut ColumnBuffer,
    base: usize,
    ploidy: usize,
    value: &[u8],
    spec: &FieldSpec,
    line: usize,
    log: &mut DiagnosticLog,
) {
    if is_missing(value) {
        return;
    }
    for (j, allele) in split2(value, b'/', b'|').take(ploidy).enumerate() {
        if is_missing(allele) {
            continue;
        }
        let stored = parse_int(allele)
            .filter(|&a| a >= 0)
            .is_some_and(|a| column.set_int(base + j, a));
        if !stored {
            log.push(Diagnostic::parse_error(spec.name.as_str(), allele, line));
        }
    }
}
