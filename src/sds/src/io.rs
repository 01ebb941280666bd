//! Top-level dataset lifecycle: compression dispatch by file extension,
//! advisory locking, header emission/parsing, and per-page codec dispatch.

use crate::codec::{ascii, binary, header};
use crate::dataset::{Dataset, StreamRole};
use crate::error::{SdsError, SdsResult};
use crate::layout::{DataModeKind, Layout};
use crate::lock;
use crate::stream::gzip::GzipStream;
use crate::stream::lzma::LzmaStream;
use crate::stream::plain::PlainStream;
use crate::stream::{Compression, SdsStream};
use std::fs::{File, OpenOptions};
use std::path::Path;

const SITE_INIT_OUTPUT: &str = "Dataset::initialize_output";
const SITE_INIT_INPUT: &str = "Dataset::initialize_input";
const SITE_WRITE_PAGE: &str = "Dataset::write_page";
const SITE_READ_PAGE: &str = "Dataset::read_page";

fn open_write_stream(path: &Path, compression: Compression) -> SdsResult<Box<dyn SdsStream>> {
    Ok(match compression {
        Compression::Plain => Box::new(PlainStream::open_write(path)?),
        Compression::Gzip => Box::new(GzipStream::open_write(path)?),
        Compression::Lzma => Box::new(LzmaStream::open_write(path)?),
    })
}

fn open_read_stream(path: &Path, compression: Compression) -> SdsResult<Box<dyn SdsStream>> {
    Ok(match compression {
        Compression::Plain => Box::new(PlainStream::open_read(path)?),
        Compression::Gzip => Box::new(GzipStream::open_read(path)?),
        Compression::Lzma => Box::new(LzmaStream::open_read(path)?),
    })
}

impl Dataset {
    /// `InitializeOutput`: pick a compression backend from `path`'s
    /// extension, reject `fixed_row_count` on a non-seekable (compressed)
    /// stream, take an advisory exclusive lock held for the dataset's
    /// lifetime, and write the header immediately.
    pub fn initialize_output(path: &Path, layout: Layout) -> SdsResult<Dataset> {
        let compression = Compression::from_path(path);
        if layout.data_mode.fixed_row_count && !compression.supports_seek() {
            return Err(SdsError::protocol(
                SITE_INIT_OUTPUT,
                "fixed_row_count requires a seekable (uncompressed) stream",
            ));
        }

        let lock_file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        lock::acquire_exclusive(&lock_file)?;

        let stream = open_write_stream(path, compression)?;
        let mut dataset = Dataset::new(layout, stream, StreamRole::Write);
        dataset.lock_file = Some(lock_file);
        dataset.write_header()?;
        Ok(dataset)
    }

    /// `InitializeInput`: open the stream for the given compression and parse
    /// its header into a fresh working layout.
    pub fn initialize_input(path: &Path) -> SdsResult<Dataset> {
        let compression = Compression::from_path(path);
        let mut stream = open_read_stream(path, compression)?;
        let layout = header::read_header(stream.as_mut())?;
        let mut dataset = Dataset::new(layout, stream, StreamRole::Read);
        dataset.layout_written = true;
        Ok(dataset)
    }

    fn write_header(&mut self) -> SdsResult<()> {
        self.save_layout()?;
        let stream = self.stream.as_mut().ok_or(SdsError::BadDataset { site: SITE_WRITE_PAGE })?;
        header::write_header(stream.as_mut(), &self.layout)?;
        self.layout_written = true;
        Ok(())
    }

    /// Writes out the current page's body using the layout's declared data
    /// mode, after emitting the header on the first call.
    pub fn write_page(&mut self) -> SdsResult<()> {
        if !self.layout_written {
            self.write_header()?;
        }
        let page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_WRITE_PAGE })?.clone();
        let stream = self.stream.as_mut().ok_or(SdsError::BadDataset { site: SITE_WRITE_PAGE })?;
        match self.layout.data_mode.mode {
            DataModeKind::Ascii => ascii::write_page_ascii(stream.as_mut(), &self.layout, &page)?,
            DataModeKind::Binary => binary::write_page_binary(stream.as_mut(), &self.layout, &page)?,
        }
        stream.flush()?;
        Ok(())
    }

    /// Reads the next page off the input stream, replacing `self.page`.
    /// Returns `false` at a clean end-of-data (no more pages).
    pub fn read_page(&mut self) -> SdsResult<bool> {
        let stream = self.stream.as_mut().ok_or(SdsError::BadDataset { site: SITE_READ_PAGE })?;
        let page = match self.layout.data_mode.mode {
            DataModeKind::Ascii => ascii::read_page_ascii(stream.as_mut(), &self.layout)?,
            DataModeKind::Binary => binary::read_page_binary(stream.as_mut(), &self.layout)?,
        };
        match page {
            Some(mut page) => {
                page.page_number = self.page.as_ref().map(|p| p.page_number + 1).unwrap_or(1);
                self.page = Some(page);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether `path` is currently held by another writer's advisory lock.
    pub fn file_is_locked(path: &Path) -> SdsResult<bool> {
        let file = File::open(path)?;
        lock::file_is_locked(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDef, CommonDef};
    use crate::setters::Target;
    use crate::types::{Type, Value};
    use tempfile::tempdir;

    fn layout_with_column() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: "x".into(),
                    ..Default::default()
                },
                ty: Type::Int32,
                field_length: 0,
            })
            .unwrap();
        layout
    }

    #[test]
    fn ascii_round_trip_through_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.sds");

        let mut writer = Dataset::initialize_output(&path, layout_with_column()).unwrap();
        writer.start_page(2).unwrap();
        writer.set_column(Target::Name("x"), &[Value::Int32(1), Value::Int32(2)]).unwrap();
        writer.write_page().unwrap();
        writer.terminate().unwrap();

        let mut reader = Dataset::initialize_input(&path).unwrap();
        assert!(reader.read_page().unwrap());
        let page = reader.page.as_ref().unwrap();
        assert_eq!(page.columns[0][..2], [Value::Int32(1), Value::Int32(2)]);
        assert!(!reader.read_page().unwrap());
    }

    #[test]
    fn binary_round_trip_through_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin.sds");

        let mut layout = layout_with_column();
        layout.data_mode.mode = DataModeKind::Binary;

        let mut writer = Dataset::initialize_output(&path, layout).unwrap();
        writer.start_page(3).unwrap();
        writer
            .set_column(Target::Name("x"), &[Value::Int32(7), Value::Int32(8), Value::Int32(9)])
            .unwrap();
        writer.write_page().unwrap();
        writer.terminate().unwrap();

        let mut reader = Dataset::initialize_input(&path).unwrap();
        assert!(reader.read_page().unwrap());
        let page = reader.page.as_ref().unwrap();
        assert_eq!(page.columns[0][..3], [Value::Int32(7), Value::Int32(8), Value::Int32(9)]);
    }

    #[test]
    fn lock_is_held_until_terminate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locked.sds");

        let writer = Dataset::initialize_output(&path, layout_with_column()).unwrap();
        assert!(Dataset::file_is_locked(&path).unwrap());
        writer.terminate().unwrap();
        assert!(!Dataset::file_is_locked(&path).unwrap());
    }

    #[test]
    fn fixed_row_count_rejected_on_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.sds.gz");

        let mut layout = layout_with_column();
        layout.data_mode.fixed_row_count = true;

        assert!(Dataset::initialize_output(&path, layout).is_err());
    }
}
