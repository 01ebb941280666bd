use super::{flush_writer, SdsStream};
use crate::error::{IoErrorKind, SdsError, SdsResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const SITE: &str = "PlainStream";

enum Inner {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

pub struct PlainStream {
    inner: Inner,
    eof: bool,
}

impl PlainStream {
    pub fn open_write(path: &Path) -> SdsResult<Self> {
        let file = File::create(path)?;
        Ok(PlainStream {
            inner: Inner::Writer(BufWriter::new(file)),
            eof: false,
        })
    }

    pub fn open_read(path: &Path) -> SdsResult<Self> {
        let file = File::open(path)?;
        Ok(PlainStream {
            inner: Inner::Reader(BufReader::new(file)),
            eof: false,
        })
    }
}

impl SdsStream for PlainStream {
    fn puts(&mut self, s: &str) -> SdsResult<()> {
        match &mut self.inner {
            Inner::Writer(w) => w.write_all(s.as_bytes()).map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
            Inner::Reader(_) => Err(SdsError::protocol(SITE, "puts on a read-mode stream")),
        }
    }

    fn gets(&mut self, dst: &mut String) -> SdsResult<usize> {
        dst.clear();
        match &mut self.inner {
            Inner::Reader(r) => {
                let n = r
                    .read_line(dst)
                    .map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e)))?;
                if n == 0 {
                    self.eof = true;
                }
                Ok(n)
            }
            Inner::Writer(_) => Err(SdsError::protocol(SITE, "gets on a write-mode stream")),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> SdsResult<usize> {
        match &mut self.inner {
            Inner::Reader(r) => {
                let n = r.read(buf).map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e)))?;
                if n == 0 && !buf.is_empty() {
                    self.eof = true;
                }
                Ok(n)
            }
            Inner::Writer(_) => Err(SdsError::protocol(SITE, "read on a write-mode stream")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> SdsResult<()> {
        match &mut self.inner {
            Inner::Writer(w) => w.write_all(buf).map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
            Inner::Reader(_) => Err(SdsError::protocol(SITE, "write on a read-mode stream")),
        }
    }

    fn tell(&mut self) -> SdsResult<u64> {
        match &mut self.inner {
            Inner::Reader(r) => r.stream_position().map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
            Inner::Writer(w) => w.stream_position().map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
        }
    }

    fn seek(&mut self, pos: u64) -> SdsResult<()> {
        match &mut self.inner {
            Inner::Reader(r) => r
                .seek(SeekFrom::Start(pos))
                .map(|_| ())
                .map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
            Inner::Writer(w) => w
                .seek(SeekFrom::Start(pos))
                .map(|_| ())
                .map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
        }
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn flush(&mut self) -> SdsResult<()> {
        match &mut self.inner {
            Inner::Writer(w) => flush_writer(w, SITE),
            Inner::Reader(_) => Ok(()),
        }
    }

    fn close(&mut self) -> SdsResult<()> {
        self.flush()
    }

    fn supports_seek(&self) -> bool {
        true
    }
}
