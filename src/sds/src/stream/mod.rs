//! Uniform byte-oriented sink/source over plain file, gzip, and LZMA
//! backends.

pub mod gzip;
pub mod lzma;
pub mod mem;
pub mod plain;

use crate::error::{IoErrorKind, SdsError, SdsResult};
use std::io::Write;
use std::path::Path;

/// Compression selected by file extension: `.gz` -> gzip,
/// `.xz`/`.lzma` -> LZMA, anything else -> plain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Lzma,
}

impl Compression {
    pub fn from_path(path: &Path) -> Compression {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("xz") | Some("lzma") => Compression::Lzma,
            _ => Compression::Plain,
        }
    }

    pub fn supports_seek(self) -> bool {
        matches!(self, Compression::Plain)
    }
}

/// A uniform interface over plain/gzip/LZMA backends. Implementations own
/// their underlying file handle and release it on `close`/`Drop`.
pub trait SdsStream: Send {
    fn puts(&mut self, s: &str) -> SdsResult<()>;

    fn write_fmt_str(&mut self, formatted: &str) -> SdsResult<()> {
        self.puts(formatted)
    }

    /// Reads one line (including the trailing `\n` if present) into `dst`,
    /// truncating `dst` first. Returns the number of bytes read, `0` at EOF.
    /// Backends over LZMA must collapse the `' ' '\n'` decode artifact
    /// into a plain `'\n'` before returning.
    fn gets(&mut self, dst: &mut String) -> SdsResult<usize>;

    fn read(&mut self, buf: &mut [u8]) -> SdsResult<usize>;
    fn write(&mut self, buf: &[u8]) -> SdsResult<()>;

    fn tell(&mut self) -> SdsResult<u64>;
    fn seek(&mut self, pos: u64) -> SdsResult<()>;

    fn eof(&self) -> bool;
    fn flush(&mut self) -> SdsResult<()>;
    fn close(&mut self) -> SdsResult<()>;

    fn supports_seek(&self) -> bool;
}

/// Collapse the LZMA `' ' '\n'` decode artifact into `'\n'`. Only the LZMA
/// backend's `gets` exhibits this quirk.
pub(crate) fn collapse_lzma_newline_artifact(line: &mut String) {
    if line.ends_with(" \n") {
        line.truncate(line.len() - 2);
        line.push('\n');
    }
}

pub(crate) fn short_write_if_mismatched(written: usize, expected: usize, site: &'static str) -> SdsResult<()> {
    if written != expected {
        return Err(SdsError::io(site, IoErrorKind::ShortWrite));
    }
    Ok(())
}

pub(crate) fn flush_writer<W: Write>(w: &mut W, site: &'static str) -> SdsResult<()> {
    w.flush().map_err(|e| SdsError::io(site, IoErrorKind::Other(e)))
}
