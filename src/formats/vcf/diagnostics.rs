//! Non-fatal decode diagnostics.
//!
//! Per-field parse problems never stop a decode session. They are reported as
//! [`Diagnostic`] values, logged through `log::warn!`, and collected so callers
//! can inspect them after the fact. In strict mode the first diagnostic is
//! turned into [`VarchunkError::Diagnostic`] instead.
//!
//! Decoders write into a block-local [`DiagnosticLog`]; the session merges
//! those logs in input order, so the diagnostic stream is the same whether
//! blocks were decoded on one thread or many.

use crate::error::{Result, VarchunkError};
use log::warn;
use std::collections::HashSet;
use std::fmt;

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A token could not be decoded as its field's type; the fill value was used.
    ParseError,
    /// A field or filter was used but never declared in the header.
    Undeclared,
    /// A type or number could not be resolved and a generic default was used.
    Fallback,
    /// A header meta-information line did not have the expected shape.
    InvalidHeader,
    /// The environment forced a simpler mode (no tabix, region with workers).
    Environment,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::ParseError => "parse error",
            DiagnosticKind::Undeclared => "undeclared",
            DiagnosticKind::Fallback => "fallback",
            DiagnosticKind::InvalidHeader => "invalid header",
            DiagnosticKind::Environment => "environment",
        };
        f.write_str(name)
    }
}

/// A single non-fatal warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Category.
    pub kind: DiagnosticKind,
    /// The field, token or option the warning is about.
    pub subject: String,
    /// Short human-readable reason.
    pub reason: String,
}

impl Diagnostic {
    /// Creates a diagnostic.
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse_error(subject: impl Into<String>, token: &[u8], line: usize) -> Self {
        Diagnostic::new(
            DiagnosticKind::ParseError,
            subject,
            format!(
                "could not parse value {:?} at record line {}",
                String::from_utf8_lossy(token),
                line
            ),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.reason)
    }
}

/// Diagnostics produced while decoding one block of records.
///
/// Entries marked `once` are deduplicated by subject within the block and
/// again by the session.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticLog {
    entries: Vec<(Diagnostic, bool)>,
    seen: HashSet<String>,
}

impl DiagnosticLog {
    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push((diagnostic, false));
    }

    pub(crate) fn push_once(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.subject.clone()) {
            self.entries.push((diagnostic, true));
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn drain(&mut self) -> std::vec::Drain<'_, (Diagnostic, bool)> {
        self.entries.drain(..)
    }
}

/// Session-wide diagnostics sink.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    strict: bool,
    once: HashSet<(DiagnosticKind, String)>,
    collected: Vec<Diagnostic>,
}

impl Diagnostics {
    pub(crate) fn new(strict: bool) -> Self {
        Diagnostics {
            strict,
            ..Default::default()
        }
    }

    /// Records a diagnostic, failing in strict mode.
    pub(crate) fn emit(&mut self, diagnostic: Diagnostic) -> Result<()> {
        warn!("{}", diagnostic);
        self.collected.push(diagnostic.clone());
        if self.strict {
            return Err(VarchunkError::Diagnostic(diagnostic));
        }
        Ok(())
    }

    /// Records a diagnostic the first time its subject is seen this session.
    pub(crate) fn emit_once(&mut self, diagnostic: Diagnostic) -> Result<()> {
        if self.once.insert((diagnostic.kind, diagnostic.subject.clone())) {
            self.emit(diagnostic)
        } else {
            Ok(())
        }
    }

    /// Moves a block log into the session, in order.
    pub(crate) fn merge(&mut self, log: &mut DiagnosticLog) -> Result<()> {
        if log.is_empty() {
            return Ok(());
        }
        let entries: Vec<_> = log.drain().collect();
        for (diagnostic, once) in entries {
            if once {
                self.emit_once(diagnostic)?;
            } else {
                self.emit(diagnostic)?;
            }
        }
        Ok(())
    }

    pub(crate) fn as_slice(&self) -> &[Diagnostic] {
        &self.collected
    }
}
