//! Shape descriptors and native entry-point name derivation.
//!
//! The native library exports one function family per shape/type suffix,
//! e.g. `vital_eigen_matrix2x1d_new_sized` or `vital_eigen_matrixXXf_data`.
//! Resolution is pure: no native calls happen here.

use std::fmt;

use matbind_abi::{DYNAMIC_DIM_TOKEN, MATRIX_SYMBOL_PREFIX};

use crate::types::{ElementLayout, ElementType, NativeElement};

/// Logical operations exported for every shape/type combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    New,
    NewSized,
    Destroy,
    Get,
    Set,
    Rows,
    Cols,
    RowStride,
    ColStride,
    Data,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 10] = [
        EntryPoint::New,
        EntryPoint::NewSized,
        EntryPoint::Destroy,
        EntryPoint::Get,
        EntryPoint::Set,
        EntryPoint::Rows,
        EntryPoint::Cols,
        EntryPoint::RowStride,
        EntryPoint::ColStride,
        EntryPoint::Data,
    ];

    /// Operation word appended to the symbol name.
    pub fn word(self) -> &'static str {
        match self {
            EntryPoint::New => "new",
            EntryPoint::NewSized => "new_sized",
            EntryPoint::Destroy => "destroy",
            EntryPoint::Get => "get",
            EntryPoint::Set => "set",
            EntryPoint::Rows => "rows",
            EntryPoint::Cols => "cols",
            EntryPoint::RowStride => "row_stride",
            EntryPoint::ColStride => "col_stride",
            EntryPoint::Data => "data",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.word())
    }
}

/// Requested matrix shape and element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeSpec {
    pub rows: usize,
    pub cols: usize,
    /// Use the runtime-sized native type for rows.
    pub dynamic_rows: bool,
    /// Use the runtime-sized native type for columns.
    pub dynamic_cols: bool,
    pub element_type: ElementType,
}

impl ShapeSpec {
    pub fn new(rows: usize, cols: usize, element_type: ElementType) -> Self {
        Self {
            rows,
            cols,
            dynamic_rows: false,
            dynamic_cols: false,
            element_type,
        }
    }

    /// Fixed-size shape for the Rust element type `T`.
    pub fn of<T: NativeElement>(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, T::ELEMENT_TYPE)
    }

    /// Fully runtime-sized (`XX`) matrix.
    pub fn dynamic(rows: usize, cols: usize, element_type: ElementType) -> Self {
        Self {
            rows,
            cols,
            dynamic_rows: true,
            dynamic_cols: true,
            element_type,
        }
    }

    pub fn with_dynamic(mut self, dynamic_rows: bool, dynamic_cols: bool) -> Self {
        self.dynamic_rows = dynamic_rows;
        self.dynamic_cols = dynamic_cols;
        self
    }

    /// Shape/type suffix, e.g. `2x1d`, `XxXf`, `3xXd`.
    pub fn suffix(&self) -> String {
        let rows = dim_token(self.rows, self.dynamic_rows);
        let cols = dim_token(self.cols, self.dynamic_cols);
        format!("{rows}x{cols}{}", self.element_type.tag())
    }

    pub fn resolve(&self) -> ResolvedShape {
        ResolvedShape {
            entry_points: EntryPointMap::for_suffix(&self.suffix()),
            element: self.element_type.layout(),
        }
    }
}

fn dim_token(count: usize, dynamic: bool) -> String {
    if dynamic {
        DYNAMIC_DIM_TOKEN.to_string()
    } else {
        count.to_string()
    }
}

/// Output of shape resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedShape {
    pub entry_points: EntryPointMap,
    pub element: ElementLayout,
}

/// Concrete native symbol name for each [`EntryPoint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointMap {
    suffix: String,
    symbols: [String; 10],
}

impl EntryPointMap {
    fn for_suffix(suffix: &str) -> Self {
        let symbols = EntryPoint::ALL.map(|ep| format!("{MATRIX_SYMBOL_PREFIX}{suffix}_{}", ep.word()));
        Self {
            suffix: suffix.to_string(),
            symbols,
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn symbol(&self, entry: EntryPoint) -> &str {
        &self.symbols[entry.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryPoint, &str)> {
        EntryPoint::ALL
            .iter()
            .map(move |&ep| (ep, self.symbol(ep)))
    }
}
