//! Operations that copy data between two datasets with (potentially)
//! overlapping schemas, joined by name.

use crate::dataset::{ArrayInstance, Dataset};
use crate::error::{SdsError, SdsResult};
use crate::types::Type;

const SITE_PARAMS: &str = "Dataset::copy_parameters";
const SITE_ARRAYS: &str = "Dataset::copy_arrays";
const SITE_COLUMNS: &str = "Dataset::copy_columns";
const SITE_ROWS_OF_INTEREST: &str = "Dataset::copy_rows_of_interest";
const SITE_ROWS: &str = "Dataset::copy_rows";
const SITE_ROW: &str = "Dataset::copy_row";
const SITE_ADDITIONAL_ROWS: &str = "Dataset::copy_additional_rows";
const SITE_PAGE: &str = "Dataset::copy_page";

impl Dataset {
    /// For each source parameter whose name exists in `target`, cast and
    /// assign. Non-matching source parameters are skipped silently.
    pub fn copy_parameters(&self, target: &mut Dataset) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_PARAMS })?;
        for (src_idx, src_def) in self.layout.parameters.iter().enumerate() {
            let Some(dst_idx) = target.layout.parameter_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.parameters[dst_idx].ty;
            let value = source_page.parameters[src_idx].cast_to(dst_ty, SITE_PARAMS)?;
            let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_PARAMS })?;
            dst_page.parameters[dst_idx] = value;
        }
        Ok(())
    }

    /// Matched arrays: copy element count, dimension vector, and data,
    /// casting element-wise for differing numeric types or deep-copying
    /// strings.
    pub fn copy_arrays(&self, target: &mut Dataset) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_ARRAYS })?;
        for (src_idx, src_def) in self.layout.arrays.iter().enumerate() {
            let Some(dst_idx) = target.layout.array_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.arrays[dst_idx].ty;
            let src_array = &source_page.arrays[src_idx];
            let mut data = Vec::with_capacity(src_array.data.len());
            for v in &src_array.data {
                data.push(v.cast_to(dst_ty, SITE_ARRAYS)?);
            }
            let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_ARRAYS })?;
            dst_page.arrays[dst_idx] = ArrayInstance {
                definition: dst_idx,
                dimension: src_array.dimension.clone(),
                data,
            };
        }
        Ok(())
    }

    /// Row-by-row copy of matched columns. Requires
    /// `target.n_rows_allocated >= source.n_rows`.
    pub fn copy_columns(&self, target: &mut Dataset) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_COLUMNS })?;
        let n_rows = source_page.n_rows;
        {
            let dst_page = target.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_COLUMNS })?;
            if dst_page.n_rows_allocated < n_rows {
                return Err(SdsError::protocol(
                    SITE_COLUMNS,
                    "target n_rows_allocated < source n_rows",
                ));
            }
        }
        for (src_idx, src_def) in self.layout.columns.iter().enumerate() {
            let Some(dst_idx) = target.layout.column_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.columns[dst_idx].ty;
            let mut cast_values = Vec::with_capacity(n_rows);
            for row in 0..n_rows {
                cast_values.push(source_page.columns[src_idx][row].cast_to(dst_ty, SITE_COLUMNS)?);
            }
            let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_COLUMNS })?;
            for (row, value) in cast_values.into_iter().enumerate() {
                dst_page.columns[dst_idx][row] = value;
            }
        }
        let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_COLUMNS })?;
        dst_page.n_rows = n_rows;
        Ok(())
    }

    /// Like `copy_columns` but selects the subset of source rows where
    /// `row_flag[j] == true`, preserving order, compacted into `[0, k)`.
    pub fn copy_rows_of_interest(&self, target: &mut Dataset) -> SdsResult<()> {
        let source_page = self
            .page
            .as_ref()
            .ok_or(SdsError::BadDataset { site: SITE_ROWS_OF_INTEREST })?;
        let selected: Vec<usize> = (0..source_page.n_rows)
            .filter(|&r| source_page.row_flag[r])
            .collect();
        let count = selected.len();
        {
            let dst_page = target
                .page
                .as_ref()
                .ok_or(SdsError::BadDataset { site: SITE_ROWS_OF_INTEREST })?;
            if dst_page.n_rows_allocated < count {
                return Err(SdsError::protocol(
                    SITE_ROWS_OF_INTEREST,
                    "target n_rows_allocated < count of interest",
                ));
            }
        }
        for (src_idx, src_def) in self.layout.columns.iter().enumerate() {
            let Some(dst_idx) = target.layout.column_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.columns[dst_idx].ty;
            let mut cast_values = Vec::with_capacity(count);
            for &row in &selected {
                cast_values.push(source_page.columns[src_idx][row].cast_to(dst_ty, SITE_ROWS_OF_INTEREST)?);
            }
            let dst_page = target
                .page
                .as_mut()
                .ok_or(SdsError::BadDataset { site: SITE_ROWS_OF_INTEREST })?;
            for (row, value) in cast_values.into_iter().enumerate() {
                dst_page.columns[dst_idx][row] = value;
            }
        }
        let dst_page = target
            .page
            .as_mut()
            .ok_or(SdsError::BadDataset { site: SITE_ROWS_OF_INTEREST })?;
        dst_page.n_rows = count;
        Ok(())
    }

    /// Like `copy_rows_of_interest` but with an explicit inclusive range
    /// `[first, last]` instead of the row-flag selection.
    pub fn copy_rows(&self, target: &mut Dataset, first: usize, last: usize) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_ROWS })?;
        if last < first || last >= source_page.n_rows {
            return Err(SdsError::protocol(SITE_ROWS, "invalid [first, last] row range"));
        }
        let count = last - first + 1;
        {
            let dst_page = target.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_ROWS })?;
            if dst_page.n_rows_allocated < count {
                return Err(SdsError::protocol(
                    SITE_ROWS,
                    "target n_rows_allocated < range length",
                ));
            }
        }
        for (src_idx, src_def) in self.layout.columns.iter().enumerate() {
            let Some(dst_idx) = target.layout.column_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.columns[dst_idx].ty;
            let mut cast_values = Vec::with_capacity(count);
            for row in first..=last {
                cast_values.push(source_page.columns[src_idx][row].cast_to(dst_ty, SITE_ROWS)?);
            }
            let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_ROWS })?;
            for (row, value) in cast_values.into_iter().enumerate() {
                dst_page.columns[dst_idx][row] = value;
            }
        }
        let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_ROWS })?;
        dst_page.n_rows = count;
        Ok(())
    }

    /// Populate one target row (`dst_row`) from one source row selected by
    /// rank among row-flagged rows.
    pub fn copy_row(&self, target: &mut Dataset, rank: usize, dst_row: usize) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_ROW })?;
        let src_row = (0..source_page.n_rows)
            .filter(|&r| source_page.row_flag[r])
            .nth(rank)
            .ok_or_else(|| SdsError::protocol(SITE_ROW, "rank exceeds count of row-flagged rows"))?;
        self.copy_row_direct(target, src_row, dst_row)
    }

    /// Populate one target row directly from one source row index, joining
    /// columns by name; missing columns in source are skipped.
    pub fn copy_row_direct(&self, target: &mut Dataset, src_row: usize, dst_row: usize) -> SdsResult<()> {
        let source_page = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_ROW })?;
        if src_row >= source_page.n_rows {
            return Err(SdsError::protocol(SITE_ROW, "src_row exceeds source n_rows"));
        }
        for (src_idx, src_def) in self.layout.columns.iter().enumerate() {
            let Some(dst_idx) = target.layout.column_named(&src_def.common.name) else {
                continue;
            };
            let dst_ty = target.layout.columns[dst_idx].ty;
            let value = source_page.columns[src_idx][src_row].cast_to(dst_ty, SITE_ROW)?;
            let dst_page = target.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_ROW })?;
            if dst_row >= dst_page.n_rows_allocated {
                return Err(SdsError::protocol(SITE_ROW, "dst_row exceeds target n_rows_allocated"));
            }
            dst_page.columns[dst_idx][dst_row] = value;
            dst_page.row_flag[dst_row] = true;
            dst_page.n_rows = dst_page.n_rows.max(dst_row + 1);
        }
        Ok(())
    }

    /// Append source rows past `target.n_rows`, growing the target via
    /// `lengthen_table` if needed.
    pub fn copy_additional_rows(&self, target: &mut Dataset) -> SdsResult<()> {
        let source_page = self
            .page
            .as_ref()
            .ok_or(SdsError::BadDataset { site: SITE_ADDITIONAL_ROWS })?;
        let src_n_rows = source_page.n_rows;
        let dst_n_rows = target
            .page
            .as_ref()
            .ok_or(SdsError::BadDataset { site: SITE_ADDITIONAL_ROWS })?
            .n_rows;
        if src_n_rows <= dst_n_rows {
            return Ok(());
        }
        let additional = src_n_rows - dst_n_rows;
        let allocated = target
            .page
            .as_ref()
            .ok_or(SdsError::BadDataset { site: SITE_ADDITIONAL_ROWS })?
            .n_rows_allocated;
        if allocated < src_n_rows {
            target.lengthen_table(src_n_rows - allocated)?;
        }
        for row in dst_n_rows..dst_n_rows + additional {
            self.copy_row_direct(target, row, row)?;
        }
        Ok(())
    }

    /// `StartPage(source.n_rows)` then `CopyParameters`, `CopyArrays`,
    /// `CopyColumns`.
    pub fn copy_page(&self, target: &mut Dataset) -> SdsResult<()> {
        let n_rows = self.page.as_ref().ok_or(SdsError::BadDataset { site: SITE_PAGE })?.n_rows;
        target.start_page(n_rows as i64)?;
        self.copy_parameters(target)?;
        self.copy_arrays(target)?;
        self.copy_columns(target)?;
        Ok(())
    }

    /// Per-rank column byte count for the MPI interface contract:
    /// `Σ over columns of rows * element_size`.
    pub fn per_rank_column_bytes(&self) -> SdsResult<usize> {
        let page = self.page.as_ref().ok_or(SdsError::BadDataset { site: "Dataset::per_rank_column_bytes" })?;
        let mut total = 0usize;
        for (idx, def) in self.layout.columns.iter().enumerate() {
            let size = match def.ty {
                Type::String => page.columns[idx]
                    .iter()
                    .map(|v| match v {
                        crate::types::Value::String(s) => s.len() + 4,
                        _ => 0,
                    })
                    .sum(),
                ty => page.n_rows * ty.fixed_size(),
            };
            total += size;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::StreamRole;
    use crate::layout::{ColumnDef, CommonDef, Layout};
    use crate::setters::Target;
    use crate::stream::mem::MemStream;
    use crate::types::{Type, Value};

    fn int_column_layout(name: &str, ty: Type) -> Layout {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: name.to_string(),
                    ..Default::default()
                },
                ty,
                field_length: 0,
            })
            .unwrap();
        layout
    }

    fn string_column_layout(name: &str, other: &str) -> Layout {
        let mut layout = int_column_layout(name, Type::Int32);
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: other.to_string(),
                    ..Default::default()
                },
                ty: Type::String,
                field_length: 0,
            })
            .unwrap();
        layout
    }

    #[test]
    fn copy_columns_casts_float_to_double() {
        let mut source = Dataset::new(int_column_layout("c", Type::Float), Box::new(MemStream::new()), StreamRole::Mem);
        source.start_page(3).unwrap();
        source
            .set_column(Target::Name("c"), &[Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)])
            .unwrap();

        let mut target = Dataset::new(int_column_layout("c", Type::Double), Box::new(MemStream::new()), StreamRole::Mem);
        target.start_page(3).unwrap();

        source.copy_columns(&mut target).unwrap();

        let page = target.page.as_ref().unwrap();
        assert_eq!(page.columns[0], vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0)]);
        assert_eq!(page.n_rows, 3);
    }

    #[test]
    fn copy_columns_requires_enough_allocated_rows() {
        let mut source = Dataset::new(int_column_layout("c", Type::Int32), Box::new(MemStream::new()), StreamRole::Mem);
        source.start_page(5).unwrap();
        source
            .set_column(
                Target::Name("c"),
                &(0..5).map(Value::Int32).collect::<Vec<_>>(),
            )
            .unwrap();

        let mut target = Dataset::new(int_column_layout("c", Type::Int32), Box::new(MemStream::new()), StreamRole::Mem);
        target.start_page(2).unwrap();

        assert!(source.copy_columns(&mut target).is_err());
    }

    #[test]
    fn copy_rows_of_interest_selects_flagged_rows_in_order() {
        let mut source = Dataset::new(string_column_layout("a", "b"), Box::new(MemStream::new()), StreamRole::Mem);
        source.start_page(4).unwrap();
        source
            .set_column(Target::Name("a"), &[10, 20, 30, 40].map(Value::Int32))
            .unwrap();
        source
            .set_column(
                Target::Name("b"),
                &["p", "q", "r", "s"].map(|s| Value::String(s.to_string())),
            )
            .unwrap();
        source.page.as_mut().unwrap().row_flag = vec![true, false, true, true];

        let mut target = Dataset::new(string_column_layout("a", "b"), Box::new(MemStream::new()), StreamRole::Mem);
        target.start_page(3).unwrap();

        source.copy_rows_of_interest(&mut target).unwrap();

        let page = target.page.as_ref().unwrap();
        assert_eq!(page.columns[0], vec![Value::Int32(10), Value::Int32(30), Value::Int32(40)]);
        assert_eq!(
            page.columns[1],
            vec!["p", "r", "s"].into_iter().map(|s| Value::String(s.to_string())).collect::<Vec<_>>()
        );
        assert_eq!(page.n_rows, 3);
    }

    #[test]
    fn copy_parameters_skips_non_matching_names() {
        let mut source_layout = Layout::new();
        source_layout
            .define_parameter(crate::layout::ParameterDef {
                common: CommonDef {
                    name: "only_in_source".into(),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                fixed_value: None,
            })
            .unwrap();
        let mut source = Dataset::new(source_layout, Box::new(MemStream::new()), StreamRole::Mem);
        source.start_page(1).unwrap();

        let mut target = Dataset::new(Layout::new(), Box::new(MemStream::new()), StreamRole::Mem);
        target.start_page(1).unwrap();

        source.copy_parameters(&mut target).unwrap();
    }
}
