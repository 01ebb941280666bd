use super::{collapse_lzma_newline_artifact, flush_writer, SdsStream};
use crate::error::{IoErrorKind, SdsError, SdsResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

const SITE: &str = "LzmaStream";
/// Default accumulation block size before handing bytes to the codec.
const BLOCK_SIZE: usize = 40 * 1024;
const LZMA_PRESET: u32 = 6;

enum Inner {
    Reader(BufReader<XzDecoder<BufReader<File>>>),
    Writer(XzEncoder<BufWriter<File>>),
}

pub struct LzmaStream {
    inner: Inner,
    eof: bool,
}

impl LzmaStream {
    pub fn open_write(path: &Path) -> SdsResult<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(BLOCK_SIZE, file);
        Ok(LzmaStream {
            inner: Inner::Writer(XzEncoder::new(writer, LZMA_PRESET)),
            eof: false,
        })
    }

    pub fn open_read(path: &Path) -> SdsResult<Self> {
        let file = File::open(path)?;
        let decoder = XzDecoder::new(BufReader::with_capacity(BLOCK_SIZE, file));
        Ok(LzmaStream {
            inner: Inner::Reader(BufReader::new(decoder)),
            eof: false,
        })
    }
}

impl SdsStream for LzmaStream {
    fn puts(&mut self, s: &str) -> SdsResult<()> {
        self.write(s.as_bytes())
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
                // Known liblzma quirk: collapse a trailing
                // " \n" produced between the real payload and the newline.
                collapse_lzma_newline_artifact(dst);
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
        Err(SdsError::io(SITE, IoErrorKind::SeekOnCompressed))
    }

    fn seek(&mut self, _pos: u64) -> SdsResult<()> {
        Err(SdsError::io(SITE, IoErrorKind::SeekOnCompressed))
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
        match &mut self.inner {
            Inner::Writer(w) => w.try_finish().map_err(|e| SdsError::io(SITE, IoErrorKind::Other(e))),
            Inner::Reader(_) => Ok(()),
        }
    }

    fn supports_seek(&self) -> bool {
        false
    }
}
