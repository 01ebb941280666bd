//! Uniform "set value(s)" operations. The C source's variadic,
//! sentinel-terminated argument lists and mode-flag bitmask are replaced by a
//! small typed `Target` enum and explicit per-shape methods.

use crate::dataset::Dataset;
use crate::error::{SdsError, SdsResult};
use crate::types::{Type, Value};

/// Target identification axis: by index or by name.
#[derive(Debug, Clone)]
pub enum Target<'a> {
    Index(usize),
    Name(&'a str),
}

impl<'a> Target<'a> {
    fn describe(&self) -> String {
        match self {
            Target::Index(i) => format!("#{i}"),
            Target::Name(n) => n.to_string(),
        }
    }
}

const SITE_SET_PARAM: &str = "Dataset::set_parameter";
const SITE_SET_COLUMN: &str = "Dataset::set_column";
const SITE_SET_ROW: &str = "Dataset::set_row";
const SITE_SET_ARRAY: &str = "Dataset::set_array";

impl Dataset {
    fn parameter_index(&self, target: &Target, site: &'static str) -> SdsResult<usize> {
        match target {
            Target::Index(i) => {
                if *i < self.layout.n_parameters() {
                    Ok(*i)
                } else {
                    Err(SdsError::bad_target(site, target.describe()))
                }
            }
            Target::Name(name) => self
                .layout
                .parameter_named(name)
                .ok_or_else(|| SdsError::bad_target(site, target.describe())),
        }
    }

    fn column_index(&self, target: &Target, site: &'static str) -> SdsResult<usize> {
        match target {
            Target::Index(i) => {
                if *i < self.layout.n_columns() {
                    Ok(*i)
                } else {
                    Err(SdsError::bad_target(site, target.describe()))
                }
            }
            Target::Name(name) => self
                .layout
                .column_named(name)
                .ok_or_else(|| SdsError::bad_target(site, target.describe())),
        }
    }

    fn array_index(&self, target: &Target, site: &'static str) -> SdsResult<usize> {
        match target {
            Target::Index(i) => {
                if *i < self.layout.n_arrays() {
                    Ok(*i)
                } else {
                    Err(SdsError::bad_target(site, target.describe()))
                }
            }
            Target::Name(name) => self
                .layout
                .array_named(name)
                .ok_or_else(|| SdsError::bad_target(site, target.describe())),
        }
    }

    /// Set a single parameter value, casting into the parameter's declared type.
    pub fn set_parameter(&mut self, target: Target, value: Value) -> SdsResult<()> {
        let idx = self.parameter_index(&target, SITE_SET_PARAM)?;
        let ty = self.layout.parameters[idx].ty;
        let cast = value.cast_to(ty, SITE_SET_PARAM)?;
        let page = self.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_SET_PARAM })?;
        page.parameters[idx] = cast;
        Ok(())
    }

    /// Set many parameters in one call.
    pub fn set_parameters(&mut self, values: &[(Target, Value)]) -> SdsResult<()> {
        for (target, value) in values {
            self.set_parameter(target.clone(), value.clone())?;
        }
        Ok(())
    }

    /// Set a whole column. `values.len()` must equal the page's current row count.
    pub fn set_column(&mut self, target: Target, values: &[Value]) -> SdsResult<()> {
        let idx = self.column_index(&target, SITE_SET_COLUMN)?;
        let ty = self.layout.columns[idx].ty;
        let mut cast_values = Vec::with_capacity(values.len());
        for v in values {
            cast_values.push(v.cast_to(ty, SITE_SET_COLUMN)?);
        }
        let page = self.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_SET_COLUMN })?;
        if cast_values.len() > page.n_rows_allocated {
            return Err(SdsError::protocol(
                SITE_SET_COLUMN,
                "value count exceeds n_rows_allocated",
            ));
        }
        for (slot, v) in page.columns[idx].iter_mut().zip(cast_values.iter()) {
            *slot = v.clone();
        }
        page.column_flag[idx] = true;
        page.column_order[idx] = idx;
        page.n_rows = page.n_rows.max(cast_values.len());
        Ok(())
    }

    /// Typed convenience: cast a uniformly-typed `f64` source array into a
    /// column, including the String-target formatting path.
    pub fn set_column_from_doubles(&mut self, target: Target, values: &[f64]) -> SdsResult<()> {
        let owned: Vec<Value> = values.iter().map(|v| Value::Double(*v)).collect();
        self.set_column(target, &owned)
    }

    pub fn set_column_from_long_doubles(&mut self, target: Target, values: &[f64]) -> SdsResult<()> {
        let owned: Vec<Value> = values.iter().map(|v| Value::LongDouble(*v)).collect();
        self.set_column(target, &owned)
    }

    pub fn set_column_from_floats(&mut self, target: Target, values: &[f32]) -> SdsResult<()> {
        let owned: Vec<Value> = values.iter().map(|v| Value::Float(*v)).collect();
        self.set_column(target, &owned)
    }

    pub fn set_column_from_longs(&mut self, target: Target, values: &[i32]) -> SdsResult<()> {
        let owned: Vec<Value> = values.iter().map(|v| Value::Int32(*v)).collect();
        self.set_column(target, &owned)
    }

    pub fn set_parameters_from_doubles(&mut self, values: &[(Target, f64)]) -> SdsResult<()> {
        for (target, v) in values {
            self.set_parameter(target.clone(), Value::Double(*v))?;
        }
        Ok(())
    }

    pub fn set_parameters_from_long_doubles(&mut self, values: &[(Target, f64)]) -> SdsResult<()> {
        for (target, v) in values {
            self.set_parameter(target.clone(), Value::LongDouble(*v))?;
        }
        Ok(())
    }

    pub fn set_parameters_from_floats(&mut self, values: &[(Target, f32)]) -> SdsResult<()> {
        for (target, v) in values {
            self.set_parameter(target.clone(), Value::Float(*v))?;
        }
        Ok(())
    }

    pub fn set_parameters_from_longs(&mut self, values: &[(Target, i32)]) -> SdsResult<()> {
        for (target, v) in values {
            self.set_parameter(target.clone(), Value::Int32(*v))?;
        }
        Ok(())
    }

    /// Set one row's worth of (target, value) pairs, growing `n_rows` as needed.
    pub fn set_row(&mut self, row: usize, values: &[(Target, Value)]) -> SdsResult<()> {
        let mut resolved = Vec::with_capacity(values.len());
        for (target, value) in values {
            let idx = self.column_index(target, SITE_SET_ROW)?;
            let ty = self.layout.columns[idx].ty;
            resolved.push((idx, value.cast_to(ty, SITE_SET_ROW)?));
        }
        let page = self.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_SET_ROW })?;
        if row >= page.n_rows_allocated {
            return Err(SdsError::protocol(SITE_SET_ROW, "row index exceeds n_rows_allocated"));
        }
        for (idx, value) in resolved {
            page.columns[idx][row] = value;
        }
        page.row_flag[row] = true;
        page.n_rows = page.n_rows.max(row + 1);
        Ok(())
    }

    /// Sizes `dimension[]`, computes `elements`, and stores a flat row-major
    /// buffer. 1-D arrays always
    /// use this path.
    pub fn set_array_contiguous(&mut self, target: Target, dimension: Vec<usize>, data: Vec<Value>) -> SdsResult<()> {
        let idx = self.array_index(&target, SITE_SET_ARRAY)?;
        let def = &self.layout.arrays[idx];
        if dimension.len() != def.dimensions {
            return Err(SdsError::bad_field(
                SITE_SET_ARRAY,
                format!("expected {} dimensions, got {}", def.dimensions, dimension.len()),
            ));
        }
        let elements: usize = dimension.iter().product();
        if data.len() != elements {
            return Err(SdsError::bad_field(
                SITE_SET_ARRAY,
                format!("expected {elements} elements, got {}", data.len()),
            ));
        }
        let ty = def.ty;
        let mut cast = Vec::with_capacity(data.len());
        for v in data {
            cast.push(v.cast_to(ty, SITE_SET_ARRAY)?);
        }
        let page = self.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_SET_ARRAY })?;
        page.arrays[idx].dimension = dimension;
        page.arrays[idx].data = cast;
        Ok(())
    }

    /// `SetArrayVararg`'s pointer-array-of-pointer-arrays shape, flattened
    /// row-major via an explicit mixed-radix counter. Only
    /// `dimensions == nested.len()`'s natural depth is supported; deeper
    /// nesting must be pre-flattened by the caller via `advance_counter`.
    pub fn set_array_nested(&mut self, target: Target, dimension: Vec<usize>, nested: Vec<Vec<Value>>) -> SdsResult<()> {
        let flat: Vec<Value> = nested.into_iter().flatten().collect();
        self.set_array_contiguous(target, dimension, flat)
    }

    pub fn array_type(&self, target: Target) -> SdsResult<Type> {
        let idx = self.array_index(&target, SITE_SET_ARRAY)?;
        Ok(self.layout.arrays[idx].ty)
    }

    /// Appends to a 1-D array's existing contiguous data (the source's
    /// `AppendToArrayVararg` only ever supported contiguous appends).
    /// Multi-dimensional arrays have no defined append semantics and fail
    /// with `Protocol`.
    pub fn append_array(&mut self, target: Target, data: Vec<Value>) -> SdsResult<()> {
        let idx = self.array_index(&target, SITE_SET_ARRAY)?;
        let def = &self.layout.arrays[idx];
        if def.dimensions != 1 {
            return Err(SdsError::protocol(
                SITE_SET_ARRAY,
                "Unsupported: multi-dimensional array append",
            ));
        }
        let ty = def.ty;
        let mut cast = Vec::with_capacity(data.len());
        for v in data {
            cast.push(v.cast_to(ty, SITE_SET_ARRAY)?);
        }
        let page = self.page.as_mut().ok_or(SdsError::BadDataset { site: SITE_SET_ARRAY })?;
        page.arrays[idx].data.extend(cast);
        let new_len = page.arrays[idx].data.len();
        page.arrays[idx].dimension = vec![new_len];
        Ok(())
    }
}

/// Mixed-radix counter advance used to flatten nested array inputs row-major
///. `counter[k]` is incremented; on overflow of `max[k]` it
/// resets to zero and carries into `counter[k-1]`. Returns `false` once the
/// counter has wrapped past the most significant digit (enumeration done).
pub fn advance_counter(counter: &mut [usize], max: &[usize], start_dim: usize) -> bool {
    if counter.is_empty() {
        return false;
    }
    let mut k = counter.len();
    loop {
        if k == start_dim {
            return false;
        }
        k -= 1;
        counter[k] += 1;
        if counter[k] < max[k] {
            return true;
        }
        counter[k] = 0;
        if k == 0 {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ArrayDef, ColumnDef, CommonDef, Layout, ParameterDef};
    use crate::stream::mem::MemStream;
    use crate::dataset::StreamRole;

    fn layout() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDef {
                common: CommonDef {
                    name: "p".into(),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                fixed_value: None,
            })
            .unwrap();
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
            .define_array(ArrayDef {
                common: CommonDef {
                    name: "a".into(),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                dimensions: 2,
                group_name: None,
            })
            .unwrap();
        layout
            .define_array(ArrayDef {
                common: CommonDef {
                    name: "b".into(),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                dimensions: 1,
                group_name: None,
            })
            .unwrap();
        layout
    }

    fn dataset() -> Dataset {
        Dataset::new(layout(), Box::new(MemStream::new()), StreamRole::Write)
    }

    #[test]
    fn set_parameter_and_set_column_populate_page() {
        let mut ds = dataset();
        ds.start_page(3).unwrap();
        ds.set_parameter(Target::Name("p"), Value::Double(3.5)).unwrap();
        ds.set_column(
            Target::Name("x"),
            &[Value::Int32(1), Value::Int32(2), Value::Int32(3)],
        )
        .unwrap();

        let page = ds.page.as_ref().unwrap();
        assert_eq!(page.parameters[0], Value::Double(3.5));
        assert_eq!(
            page.columns[0],
            vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
        );
        assert_eq!(page.n_rows, 3);
    }

    #[test]
    fn unknown_target_name_is_bad_target() {
        let mut ds = dataset();
        ds.start_page(1).unwrap();
        assert!(ds.set_parameter(Target::Name("nope"), Value::Double(1.0)).is_err());
    }

    #[test]
    fn set_array_contiguous_computes_elements() {
        let mut ds = dataset();
        ds.start_page(1).unwrap();
        ds.set_array_contiguous(
            Target::Name("a"),
            vec![2, 3],
            (0..6).map(|i| Value::Double(i as f64)).collect(),
        )
        .unwrap();
        let page = ds.page.as_ref().unwrap();
        assert_eq!(page.arrays[0].elements(), 6);
    }

    #[test]
    fn set_row_updates_row_flag_and_n_rows() {
        let mut ds = dataset();
        ds.start_page(5).unwrap();
        ds.set_row(2, &[(Target::Name("x"), Value::Int32(42))]).unwrap();
        let page = ds.page.as_ref().unwrap();
        assert!(page.row_flag[2]);
        assert_eq!(page.n_rows, 3);
        assert_eq!(page.columns[0][2], Value::Int32(42));
    }

    #[test]
    fn append_array_extends_one_dimensional_array() {
        let mut ds = dataset();
        ds.start_page(1).unwrap();
        ds.set_array_contiguous(
            Target::Name("b"),
            vec![2],
            vec![Value::Double(1.0), Value::Double(2.0)],
        )
        .unwrap();
        ds.append_array(Target::Name("b"), vec![Value::Double(3.0)]).unwrap();
        let page = ds.page.as_ref().unwrap();
        assert_eq!(
            page.arrays[1].data,
            vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0)]
        );
        assert_eq!(page.arrays[1].dimension, vec![3]);
    }

    #[test]
    fn append_array_rejects_multi_dimensional() {
        let mut ds = dataset();
        ds.start_page(1).unwrap();
        let err = ds.append_array(Target::Name("a"), vec![Value::Double(1.0)]).unwrap_err();
        assert!(matches!(err, SdsError::Protocol { .. }));
    }

    #[test]
    fn advance_counter_enumerates_row_major() {
        let max = [2usize, 3usize];
        let mut counter = [0usize, 0usize];
        let mut seen = vec![counter];
        while advance_counter(&mut counter, &max, 0) {
            seen.push(counter);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(*seen.last().unwrap(), [1, 2]);
    }
}
