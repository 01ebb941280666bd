//! Ordered named definitions for parameters, arrays, columns, associates, plus
//! the version/endianness/data-mode metadata that makes up a dataset's schema.

use crate::error::{SdsError, SdsResult};
use crate::types::Type;
use std::collections::HashMap;

/// Fields shared by every definition kind.
#[derive(Debug, Clone, Default)]
pub struct CommonDef {
    pub name: String,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub common: CommonDef,
    pub ty: Type,
    pub field_length: i32,
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub common: CommonDef,
    pub ty: Type,
    pub field_length: i32,
    pub fixed_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArrayDef {
    pub common: CommonDef,
    pub ty: Type,
    pub field_length: i32,
    pub dimensions: usize,
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AssociateDef {
    pub common: CommonDef,
    pub filename: String,
    pub path: String,
    pub contents: String,
    pub sdds: bool,
}

/// `mode` of a page body plus the handful of flags that alter its physical shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModeKind {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMemoryMode {
    FixedField,
    StreamedField,
}

impl Default for ColumnMemoryMode {
    fn default() -> Self {
        ColumnMemoryMode::StreamedField
    }
}

#[derive(Debug, Clone)]
pub struct DataMode {
    pub mode: DataModeKind,
    pub lines_per_row: u32,
    pub no_row_counts: bool,
    pub column_major: bool,
    pub fixed_row_count: bool,
    pub column_memory_mode: ColumnMemoryMode,
}

impl Default for DataMode {
    fn default() -> Self {
        DataMode {
            mode: DataModeKind::Ascii,
            lines_per_row: 1,
            no_row_counts: false,
            column_major: false,
            fixed_row_count: false,
            column_memory_mode: ColumnMemoryMode::default(),
        }
    }
}

/// Which kind of definition table a name lookup or index targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    Column,
    Parameter,
    Array,
    Associate,
}

#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub description: Option<String>,
    pub contents: Option<String>,
    pub byte_order: Option<ByteOrder>,
    pub data_mode: DataMode,

    pub columns: Vec<ColumnDef>,
    pub parameters: Vec<ParameterDef>,
    pub arrays: Vec<ArrayDef>,
    pub associates: Vec<AssociateDef>,

    column_index: HashMap<String, usize>,
    parameter_index: HashMap<String, usize>,
    array_index: HashMap<String, usize>,
    associate_index: HashMap<String, usize>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_column(&mut self, def: ColumnDef) -> SdsResult<usize> {
        if self.column_index.contains_key(&def.common.name) {
            return Err(SdsError::bad_field(
                "Layout::define_column",
                format!("duplicate column name '{}'", def.common.name),
            ));
        }
        let idx = self.columns.len();
        self.column_index.insert(def.common.name.clone(), idx);
        self.columns.push(def);
        Ok(idx)
    }

    pub fn define_parameter(&mut self, def: ParameterDef) -> SdsResult<usize> {
        if self.parameter_index.contains_key(&def.common.name) {
            return Err(SdsError::bad_field(
                "Layout::define_parameter",
                format!("duplicate parameter name '{}'", def.common.name),
            ));
        }
        let idx = self.parameters.len();
        self.parameter_index.insert(def.common.name.clone(), idx);
        self.parameters.push(def);
        Ok(idx)
    }

    pub fn define_array(&mut self, def: ArrayDef) -> SdsResult<usize> {
        if self.array_index.contains_key(&def.common.name) {
            return Err(SdsError::bad_field(
                "Layout::define_array",
                format!("duplicate array name '{}'", def.common.name),
            ));
        }
        let idx = self.arrays.len();
        self.array_index.insert(def.common.name.clone(), idx);
        self.arrays.push(def);
        Ok(idx)
    }

    pub fn define_associate(&mut self, def: AssociateDef) -> SdsResult<usize> {
        if self.associate_index.contains_key(&def.common.name) {
            return Err(SdsError::bad_field(
                "Layout::define_associate",
                format!("duplicate associate name '{}'", def.common.name),
            ));
        }
        let idx = self.associates.len();
        self.associate_index.insert(def.common.name.clone(), idx);
        self.associates.push(def);
        Ok(idx)
    }

    pub fn column_named(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn parameter_named(&self, name: &str) -> Option<usize> {
        self.parameter_index.get(name).copied()
    }

    pub fn array_named(&self, name: &str) -> Option<usize> {
        self.array_index.get(name).copied()
    }

    pub fn associate_named(&self, name: &str) -> Option<usize> {
        self.associate_index.get(name).copied()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn n_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// The lowest protocol version that can represent every type/feature
    /// present: the max of each feature's version bump.
    pub fn version(&self) -> u8 {
        let mut version = 1u8;
        let any_unsigned_16_32 = self
            .columns
            .iter()
            .map(|c| c.ty)
            .chain(self.parameters.iter().map(|p| p.ty))
            .chain(self.arrays.iter().map(|a| a.ty))
            .any(|t| t.forces_version_2());
        if any_unsigned_16_32 {
            version = version.max(2);
        }
        if self.data_mode.mode == DataModeKind::Binary && self.data_mode.column_major {
            version = version.max(3);
        }
        let any_long_double = self
            .columns
            .iter()
            .map(|c| c.ty)
            .chain(self.parameters.iter().map(|p| p.ty))
            .chain(self.arrays.iter().map(|a| a.ty))
            .any(|t| t.forces_version_4());
        if any_long_double {
            version = version.max(4);
        }
        let any_64bit_int = self
            .columns
            .iter()
            .map(|c| c.ty)
            .chain(self.parameters.iter().map(|p| p.ty))
            .chain(self.arrays.iter().map(|a| a.ty))
            .any(|t| t.forces_version_5());
        if any_64bit_int {
            version = version.max(5);
        }
        version
    }

    /// Merge: append definitions from `source` whose name is not already present
    /// in `self`.
    pub fn append_layout(&mut self, source: &Layout) -> SdsResult<()> {
        for c in &source.columns {
            if self.column_named(&c.common.name).is_none() {
                self.define_column(c.clone())?;
            }
        }
        for p in &source.parameters {
            if self.parameter_named(&p.common.name).is_none() {
                self.define_parameter(p.clone())?;
            }
        }
        for a in &source.arrays {
            if self.array_named(&a.common.name).is_none() {
                self.define_array(a.clone())?;
            }
        }
        for a in &source.associates {
            if self.associate_named(&a.common.name).is_none() {
                self.define_associate(a.clone())?;
            }
        }
        Ok(())
    }

    /// Replace `self`'s definitions outright with `source`'s, resetting the
    /// per-layout flags `CopyLayout` is documented to reset.
    pub fn copy_layout(&mut self, source: &Layout) {
        self.description = source.description.clone();
        self.contents = source.contents.clone();
        self.byte_order = source.byte_order;
        self.columns = source.columns.clone();
        self.parameters = source.parameters.clone();
        self.arrays = source.arrays.clone();
        self.associates = source.associates.clone();
        self.column_index = source.column_index.clone();
        self.parameter_index = source.parameter_index.clone();
        self.array_index = source.array_index.clone();
        self.associate_index = source.associate_index.clone();

        self.data_mode = DataMode {
            mode: source.data_mode.mode,
            lines_per_row: source.data_mode.lines_per_row,
            no_row_counts: false,
            column_major: source.data_mode.column_major,
            fixed_row_count: false,
            column_memory_mode: ColumnMemoryMode::default(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: Type) -> ColumnDef {
        ColumnDef {
            common: CommonDef {
                name: name.to_string(),
                ..Default::default()
            },
            ty,
            field_length: 0,
        }
    }

    #[test]
    fn duplicate_names_within_kind_are_rejected() {
        let mut layout = Layout::new();
        layout.define_column(col("x", Type::Int32)).unwrap();
        assert!(layout.define_column(col("x", Type::Double)).is_err());
    }

    #[test]
    fn version_bumps_to_max_applicable_feature() {
        let mut layout = Layout::new();
        layout.define_column(col("k", Type::UInt32)).unwrap();
        assert_eq!(layout.version(), 2);

        layout.define_column(col("ld", Type::LongDouble)).unwrap();
        assert_eq!(layout.version(), 4);

        layout.define_column(col("i64", Type::Int64)).unwrap();
        assert_eq!(layout.version(), 5);

        layout.data_mode.mode = DataModeKind::Binary;
        layout.data_mode.column_major = true;
        assert_eq!(layout.version(), 5);
    }

    #[test]
    fn copy_layout_resets_flags() {
        let mut source = Layout::new();
        source.define_column(col("a", Type::Int32)).unwrap();
        source.data_mode.no_row_counts = true;
        source.data_mode.fixed_row_count = true;

        let mut target = Layout::new();
        target.copy_layout(&source);
        assert_eq!(target.columns.len(), 1);
        assert!(!target.data_mode.no_row_counts);
        assert!(!target.data_mode.fixed_row_count);
    }

    #[test]
    fn append_layout_skips_existing_names() {
        let mut target = Layout::new();
        target.define_column(col("a", Type::Int32)).unwrap();

        let mut source = Layout::new();
        source.define_column(col("a", Type::Double)).unwrap();
        source.define_column(col("b", Type::Double)).unwrap();

        target.append_layout(&source).unwrap();
        assert_eq!(target.columns.len(), 2);
        assert_eq!(target.columns[0].ty, Type::Int32);
    }
}
