//! Per-page mutable storage and the page lifecycle.

use crate::error::{ErrorChain, SdsError, SdsResult};
use crate::layout::Layout;
use crate::stream::SdsStream;
use crate::types::{Type, Value};
use std::fs::File;

const SITE_START_PAGE: &str = "Dataset::start_page";
const SITE_SHORTEN: &str = "Dataset::shorten_table";
const SITE_LENGTHEN: &str = "Dataset::lengthen_table";
const SITE_CLEAR: &str = "Dataset::clear_page";
const SITE_SAVE_LAYOUT: &str = "Dataset::save_layout";
const SITE_RESTORE_LAYOUT: &str = "Dataset::restore_layout";

/// One instantiated array value: `definition` index into `Layout::arrays`,
/// `dimension[i]` extents, and a flattened row-major `data` buffer of
/// `elements = Π dimension[i]` values.
#[derive(Debug, Clone)]
pub struct ArrayInstance {
    pub definition: usize,
    pub dimension: Vec<usize>,
    pub data: Vec<Value>,
}

impl ArrayInstance {
    pub fn elements(&self) -> usize {
        self.dimension.iter().product()
    }

    fn empty(definition: usize, dimensions: usize) -> Self {
        ArrayInstance {
            definition,
            dimension: vec![0; dimensions],
            data: Vec::new(),
        }
    }
}

/// One page's worth of mutable state: parameter values, array instances, the
/// column table, and the bookkeeping vectors the copy engine and setter API
/// rely on.
#[derive(Debug, Clone)]
pub struct Page {
    pub parameters: Vec<Value>,
    pub arrays: Vec<ArrayInstance>,
    pub columns: Vec<Vec<Value>>,
    pub row_flag: Vec<bool>,
    pub column_flag: Vec<bool>,
    pub column_order: Vec<usize>,
    pub n_rows: usize,
    pub n_rows_allocated: usize,
    pub n_rows_written: usize,
    pub last_row_written: i64,
    pub first_row_in_mem: usize,
    pub page_number: u64,
    pub page_started: bool,
    pub writing_page: bool,
}

impl Page {
    pub(crate) fn allocate(layout: &Layout, n_rows_allocated: usize) -> Self {
        let columns = layout
            .columns
            .iter()
            .map(|c| vec![Value::zero(c.ty); n_rows_allocated])
            .collect();
        let parameters = layout.parameters.iter().map(|p| Value::zero(p.ty)).collect();
        let arrays = layout
            .arrays
            .iter()
            .enumerate()
            .map(|(i, a)| ArrayInstance::empty(i, a.dimensions))
            .collect();
        let n_columns = layout.n_columns();
        Page {
            parameters,
            arrays,
            columns,
            row_flag: vec![true; n_rows_allocated],
            column_flag: vec![true; n_columns],
            column_order: (0..n_columns).collect(),
            n_rows: 0,
            n_rows_allocated,
            n_rows_written: 0,
            last_row_written: -1,
            first_row_in_mem: 0,
            page_number: 0,
            page_started: true,
            writing_page: false,
        }
    }

    /// Invariant checks on buffer shapes and flag/order consistency.
    pub fn check_invariants(&self, n_columns: usize) -> SdsResult<()> {
        if self.columns.len() != n_columns {
            return Err(SdsError::protocol(
                "Page::check_invariants",
                "column count mismatch",
            ));
        }
        for column in &self.columns {
            if column.len() != self.n_rows_allocated {
                return Err(SdsError::protocol(
                    "Page::check_invariants",
                    "column buffer length != n_rows_allocated",
                ));
            }
        }
        if self.n_rows > self.n_rows_allocated {
            return Err(SdsError::protocol(
                "Page::check_invariants",
                "n_rows exceeds n_rows_allocated",
            ));
        }
        if self.row_flag.len() != self.n_rows_allocated {
            return Err(SdsError::protocol(
                "Page::check_invariants",
                "row_flag length != n_rows_allocated",
            ));
        }
        if self.column_flag.len() != n_columns || self.column_order.len() != n_columns {
            return Err(SdsError::protocol(
                "Page::check_invariants",
                "column_flag/column_order length != n_columns",
            ));
        }
        let mut seen = vec![false; n_columns];
        for &idx in &self.column_order {
            if idx >= n_columns || seen[idx] {
                return Err(SdsError::protocol(
                    "Page::check_invariants",
                    "column_order is not a permutation of [0, n_columns)",
                ));
            }
            seen[idx] = true;
        }
        Ok(())
    }
}

/// Which side a `Dataset` was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    Write,
    Read,
    Mem,
}

/// The in-memory engine: a working layout, an independent "original" snapshot,
/// the current page, the bound stream, and the per-handle error chain.
pub struct Dataset {
    pub layout: Layout,
    pub original_layout: Layout,
    pub page: Option<Page>,
    pub stream: Option<Box<dyn SdsStream>>,
    pub role: StreamRole,
    pub errors: ErrorChain,

    pub layout_written: bool,
    pub byte_order_declared: bool,
    pub disconnected: bool,
    pub defer_saving_layout: bool,

    /// Advisory exclusive lock held for the lifetime of the write, if any.
    /// Held open so the `flock` stays in effect until
    /// `terminate`/`disconnect_file` drops it — see `crate::lock`.
    pub(crate) lock_file: Option<File>,
}

impl Dataset {
    pub fn new(layout: Layout, stream: Box<dyn SdsStream>, role: StreamRole) -> Self {
        Dataset {
            original_layout: layout.clone(),
            layout,
            page: None,
            stream: Some(stream),
            role,
            errors: ErrorChain::new(),
            layout_written: false,
            byte_order_declared: false,
            disconnected: false,
            defer_saving_layout: false,
            lock_file: None,
        }
    }

    fn require_connected(&self, site: &'static str) -> SdsResult<()> {
        if self.disconnected {
            return Err(SdsError::BadDataset { site });
        }
        Ok(())
    }

    /// Snapshot the working layout into `original_layout`, unless deferred.
    /// Refuses to run if working and original already alias.
    pub fn save_layout(&mut self) -> SdsResult<()> {
        if self.defer_saving_layout {
            return Ok(());
        }
        debug_assert!(
            !std::ptr::eq(&self.layout, &self.original_layout),
            "working and original layout storage must never alias"
        );
        self.original_layout.copy_layout(&self.layout);
        log::trace!("layout saved to original snapshot");
        Ok(())
    }

    /// The reverse of `save_layout`: restore the working layout from the
    /// original snapshot.
    pub fn restore_layout(&mut self) -> SdsResult<()> {
        debug_assert!(
            !std::ptr::eq(&self.layout, &self.original_layout),
            "working and original layout storage must never alias"
        );
        self.layout.copy_layout(&self.original_layout);
        Ok(())
    }

    /// `StartPage(n)`: allocate or resize buffers to hold at least `n` rows
    /// (`n <= 0` clamped to 1), reset flags/counters, bump `page_number`.
    pub fn start_page(&mut self, expected_rows: i64) -> SdsResult<()> {
        self.require_connected(SITE_START_PAGE)?;
        let expected_rows = expected_rows.max(1) as usize;

        if let Some(page) = &mut self.page {
            if page.page_started && self.layout.data_mode.fixed_row_count {
                // Update the in-place row count of the page being closed out.
                page.n_rows_written = page.n_rows;
            }
        }

        self.save_layout()?;

        let page_number = self.page.as_ref().map(|p| p.page_number).unwrap_or(0);
        let reuse = self
            .page
            .as_ref()
            .map(|p| expected_rows <= p.n_rows_allocated)
            .unwrap_or(false);

        if reuse {
            let page = self.page.as_mut().expect("checked above");
            for column in &mut page.columns {
                for v in column.iter_mut() {
                    if let Value::String(s) = v {
                        s.clear();
                    }
                }
            }
            page.n_rows = 0;
            page.n_rows_written = 0;
            page.last_row_written = -1;
            page.row_flag.iter_mut().for_each(|f| *f = true);
            page.column_flag.iter_mut().for_each(|f| *f = true);
            let n_columns = page.column_order.len();
            page.column_order = (0..n_columns).collect();
        } else {
            let mut page = Page::allocate(&self.layout, expected_rows);
            page.page_number = page_number;
            self.page = Some(page);
        }

        let page = self.page.as_mut().expect("page allocated above");
        page.page_number += 1;
        page.page_started = true;
        page.writing_page = false;
        log::debug!(
            "start_page: page {} with {} rows allocated",
            page.page_number,
            page.n_rows_allocated
        );
        Ok(())
    }

    fn page_mut(&mut self, site: &'static str) -> SdsResult<&mut Page> {
        self.require_connected(site)?;
        self.page.as_mut().ok_or(SdsError::BadDataset { site })
    }

    /// `ShortenTable(n)`: reallocate every column buffer to exactly `n`
    /// elements and reset `n_rows = 0`.
    pub fn shorten_table(&mut self, n: usize) -> SdsResult<()> {
        let column_types: Vec<Type> = self.layout.columns.iter().map(|c| c.ty).collect();
        let page = self.page_mut(SITE_SHORTEN)?;
        for (column, ty) in page.columns.iter_mut().zip(column_types) {
            *column = vec![Value::zero(ty); n];
        }
        page.row_flag = vec![true; n];
        page.n_rows_allocated = n;
        page.n_rows = 0;
        Ok(())
    }

    /// `LengthenTable(delta)`: grow each column buffer by `delta`, zero-fill
    /// the new tail, and reinitialize row/column flags and order.
    pub fn lengthen_table(&mut self, delta: usize) -> SdsResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let column_types: Vec<Type> = self.layout.columns.iter().map(|c| c.ty).collect();
        let page = self.page_mut(SITE_LENGTHEN)?;
        let new_len = page.n_rows_allocated + delta;
        for (column, ty) in page.columns.iter_mut().zip(column_types) {
            column.resize(new_len, Value::zero(ty));
        }
        page.row_flag = vec![true; new_len];
        page.n_rows_allocated = new_len;
        let n_columns = page.column_flag.len();
        page.column_flag = vec![true; n_columns];
        page.column_order = (0..n_columns).collect();
        Ok(())
    }

    /// `ClearPage`: zero all value storage in place without changing
    /// `n_rows_allocated`.
    pub fn clear_page(&mut self) -> SdsResult<()> {
        let param_types: Vec<Type> = self.layout.parameters.iter().map(|p| p.ty).collect();
        let column_types: Vec<Type> = self.layout.columns.iter().map(|c| c.ty).collect();
        let page = self.page_mut(SITE_CLEAR)?;

        for (value, ty) in page.parameters.iter_mut().zip(param_types) {
            *value = Value::zero(ty);
        }
        for array in &mut page.arrays {
            array.data.clear();
            array.dimension.iter_mut().for_each(|d| *d = 0);
        }
        for (column, ty) in page.columns.iter_mut().zip(column_types) {
            for v in column.iter_mut() {
                *v = Value::zero(ty);
            }
        }
        page.row_flag.iter_mut().for_each(|f| *f = true);
        page.column_flag.iter_mut().for_each(|f| *f = true);
        let n_columns = page.column_order.len();
        page.column_order = (0..n_columns).collect();
        page.n_rows = 0;
        Ok(())
    }

    pub fn disconnect_file(&mut self) -> SdsResult<Box<dyn SdsStream>> {
        let stream = self.stream.take().ok_or(SdsError::BadDataset {
            site: "Dataset::disconnect_file",
        })?;
        self.disconnected = true;
        Ok(stream)
    }

    pub fn reconnect_file(&mut self, stream: Box<dyn SdsStream>) {
        self.stream = Some(stream);
        self.disconnected = false;
    }

    /// `Terminate`: close the stream, release any advisory lock, and drop
    /// all buffers. String contents are always freed in this representation
    /// since Rust's `Value::String` owns its bytes; there is no separate
    /// "terminate mode" needed.
    pub fn terminate(mut self) -> SdsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.close()?;
        }
        self.lock_file.take();
        self.page = None;
        Ok(())
    }

    pub fn push_error(&mut self, error: SdsError) {
        self.errors.push(error);
    }

    /// The handle's accumulated error chain.
    pub fn errors(&self) -> &ErrorChain {
        &self.errors
    }

    pub fn last_error(&self) -> Option<&SdsError> {
        self.errors.last()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDef, CommonDef};
    use crate::stream::mem::MemStream;

    fn layout_with_int_column(name: &str) -> Layout {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: name.to_string(),
                    ..Default::default()
                },
                ty: Type::Int32,
                field_length: 0,
            })
            .unwrap();
        layout
    }

    fn dataset() -> Dataset {
        let layout = layout_with_int_column("x");
        Dataset::new(layout, Box::new(MemStream::new()), StreamRole::Write)
    }

    #[test]
    fn start_page_zero_clamps_to_one() {
        let mut ds = dataset();
        ds.start_page(0).unwrap();
        assert_eq!(ds.page.as_ref().unwrap().n_rows_allocated, 1);
    }

    #[test]
    fn lengthen_table_zero_is_noop() {
        let mut ds = dataset();
        ds.start_page(3).unwrap();
        ds.lengthen_table(0).unwrap();
        assert_eq!(ds.page.as_ref().unwrap().n_rows_allocated, 3);
    }

    #[test]
    fn shorten_table_zeros_n_rows_and_reallocates() {
        let mut ds = dataset();
        ds.start_page(5).unwrap();
        ds.page.as_mut().unwrap().n_rows = 5;
        ds.shorten_table(2).unwrap();
        let page = ds.page.as_ref().unwrap();
        assert_eq!(page.n_rows, 0);
        assert_eq!(page.n_rows_allocated, 2);
        assert_eq!(page.columns[0].len(), 2);
    }

    #[test]
    fn invariants_hold_after_start_page() {
        let mut ds = dataset();
        ds.start_page(4).unwrap();
        ds.page
            .as_ref()
            .unwrap()
            .check_invariants(ds.layout.n_columns())
            .unwrap();
    }
}
