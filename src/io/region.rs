//! Region locator
//!
//! Restricts a VCF stream to one [`Region`]. Two paths produce the same
//! stream shape (header lines first, then matching records):
//!
//! - **Index lookup**: for a local bgzip-compressed file, `tabix -h <path>
//!   <region>` is run as a child process and its stdout becomes the input.
//! - **Scan**: every record is read and kept only if its CHROM and POS fall
//!   inside the region. Only those two columns are looked at.
//!
//! The index path is abandoned in favour of the scan when the tool cannot be
//! started, exits with an error before producing output, or stays silent for
//! [`TABIX_GRACE_PERIOD`]. Each fallback is reported as a
//! [`DiagnosticKind::Environment`] diagnostic.

use crate::error::Result;
use crate::formats::primitives::{split_tabs, Region};
use crate::formats::vcf::chunk::parse_int;
use crate::formats::vcf::diagnostics::{Diagnostic, DiagnosticKind};
use crate::io::compression::{CompressedReader, DataSource};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::debug;
use std::io::{self, BufRead, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// How long the index tool may take to produce its first bytes.
pub const TABIX_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Size of the pieces handed from the tool's stdout to the decoder.
const PIPE_CHUNK: usize = 64 * 1024;

/// A byte stream restricted (or to be restricted) to a region.
pub struct LocatedStream {
    /// Decompressed VCF text, header included.
    pub reader: Box<dyn BufRead + Send>,
    /// Region records must still be checked against, when the scan path is used.
    pub scan: Option<Region>,
    /// Fallback notices.
    pub diagnostics: Vec<Diagnostic>,
}

/// Opens `source`, restricted to `region` if one is given.
///
/// `tabix` names the index tool; `None` disables the index path.
pub fn locate(
    source: DataSource,
    region: Option<&Region>,
    tabix: Option<&str>,
    buffer_size: usize,
) -> Result<LocatedStream> {
    let mut diagnostics = Vec::new();

    let Some(region) = region else {
        return Ok(LocatedStream {
            reader: Box::new(CompressedReader::new(source, buffer_size)?),
            scan: None,
            diagnostics,
        });
    };

    if let (Some(tool), Some(path)) = (tabix, source.path().filter(|p| is_gzip_path(p))) {
        match spawn_tabix(tool, path, region) {
            Ok(output) => {
                debug!("Using {} for region {}", tool, region);
                let reader = CompressedReader::new(DataSource::from_reader(output), buffer_size)?;
                return Ok(LocatedStream {
                    reader: Box::new(reader),
                    scan: None,
                    diagnostics,
                });
            }
            Err(reason) => diagnostics.push(Diagnostic::new(
                DiagnosticKind::Environment,
                tool,
                format!("{}; falling back to scanning for region {}", reason, region),
            )),
        }
    }

    debug!("Scanning for region {}", region);
    Ok(LocatedStream {
        reader: Box::new(CompressedReader::new(source, buffer_size)?),
        scan: Some(region.clone()),
        diagnostics,
    })
}

fn is_gzip_path(path: &Path) -> bool {
    path.to_str().map_or(false, |p| p.ends_with("gz"))
}

/// Returns `true` if a record line falls inside `region`.
///
/// A record whose POS does not parse matches only an unbounded region.
pub fn scan_matches(region: &Region, record: &[u8]) -> bool {
    let mut columns = split_tabs(record);
    let chrom = columns.next().unwrap_or_default();
    if chrom != region.chrom.as_bytes() {
        return false;
    }
    if !region.is_bounded() {
        return true;
    }
    match columns.next().and_then(parse_int) {
        Some(pos) if pos >= 0 => region.contains(chrom, pos as u64),
        _ => false,
    }
}

fn spawn_tabix(tool: &str, path: &Path, region: &Region) -> std::result::Result<TabixOutput, String> {
    let mut child = Command::new(tool)
        .arg("-h")
        .arg(path)
        .arg(region.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("could not run {}: {}", tool, e))?;

    let Some(mut stdout) = child.stdout.take() else {
        return Err(format!("{} has no stdout", tool));
    };
    let (sender, receiver) = bounded::<io::Result<Vec<u8>>>(4);
    thread::spawn(move || loop {
        let mut buf = vec![0u8; PIPE_CHUNK];
        match stdout.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                if sender.send(Ok(buf)).is_err() || n == 0 {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = sender.send(Err(e));
                break;
            }
        }
    });

    let mut output = TabixOutput {
        child,
        receiver,
        buf: Vec::new(),
        pos: 0,
        finished: false,
    };
    match output.receiver.recv_timeout(TABIX_GRACE_PERIOD) {
        Ok(Ok(first)) if !first.is_empty() => {
            output.buf = first;
            Ok(output)
        }
        Ok(Ok(_)) | Err(RecvTimeoutError::Disconnected) => Err(output.failure(tool)),
        Ok(Err(e)) => Err(format!("error reading from {}: {}", tool, e)),
        Err(RecvTimeoutError::Timeout) => Err(format!(
            "{} produced no output within {} ms",
            tool,
            TABIX_GRACE_PERIOD.as_millis()
        )),
    }
}

/// Stdout of a running index tool.
///
/// The child is killed and reaped when this is dropped.
struct TabixOutput {
    child: Child,
    receiver: Receiver<io::Result<Vec<u8>>>,
    buf: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl TabixOutput {
    /// Describes why the tool stopped without output.
    fn failure(&mut self, tool: &str) -> String {
        // Drain stderr first: a full pipe would keep the child from exiting.
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        self.finished = true;
        format!("{} failed ({}): {}", tool, status, stderr.trim())
    }
}

impl Read for TabixOutput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.buf.len() {
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) if !chunk.is_empty() => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(_)) | Err(_) => {
                    self.finished = true;
                    let status = self.child.wait()?;
                    if !status.success() {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            format!("region lookup failed: {}", status),
                        ));
                    }
                }
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for TabixOutput {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
