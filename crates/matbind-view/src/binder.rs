//! Entry point for creating and wrapping native matrices.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use matbind_abi::MatrixOpaque;

use crate::config::BinderConfig;
use crate::error::{BindError, BindResult};
use crate::host::HostMatrix;
use crate::library::SymbolSource;
use crate::native::RawMatrixHandle;
use crate::registry;
use crate::shape::ShapeSpec;
use crate::types::{ElementType, NativeElement};
use crate::view::{MatrixView, ViewLineage, ViewOptions};

/// Defaults for fields a [`ViewRequest`] leaves unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDefaults {
    pub dtype: ElementType,
    pub owns_wrapped: bool,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            dtype: ElementType::F64,
            owns_wrapped: false,
        }
    }
}

/// A dynamically typed view request.
///
/// ```ignore
/// let m = binder.bind(ViewRequest::new(3, 3).dtype("float32"))?;
/// ```
pub struct ViewRequest<'a> {
    rows: usize,
    cols: usize,
    dynamic_rows: bool,
    dynamic_cols: bool,
    dtype: Option<String>,
    existing: Option<*mut MatrixOpaque>,
    owns_data: Option<bool>,
    parent: Option<&'a dyn ViewLineage>,
}

impl<'a> ViewRequest<'a> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            dynamic_rows: false,
            dynamic_cols: false,
            dtype: None,
            existing: None,
            owns_data: None,
            parent: None,
        }
    }

    /// Host dtype name (`float64`, `f32`, `double`, …).
    pub fn dtype(mut self, dtype: impl Into<String>) -> Self {
        self.dtype = Some(dtype.into());
        self
    }

    pub fn dynamic(mut self, dynamic_rows: bool, dynamic_cols: bool) -> Self {
        self.dynamic_rows = dynamic_rows;
        self.dynamic_cols = dynamic_cols;
        self
    }

    /// Wrap an existing native matrix instead of constructing one.
    ///
    /// # Safety
    ///
    /// A non-null `handle` must point to a live native matrix of the
    /// requested shape and element type, and must stay alive for as long as
    /// any view over it when ownership is not transferred.
    pub unsafe fn existing(mut self, handle: *mut MatrixOpaque) -> Self {
        self.existing = Some(handle);
        self
    }

    pub fn owns_data(mut self, owns_data: bool) -> Self {
        self.owns_data = Some(owns_data);
        self
    }

    pub fn parent(mut self, parent: &'a dyn ViewLineage) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Creates views over one native library.
#[derive(Clone)]
pub struct MatrixBinder {
    symbols: Arc<dyn SymbolSource>,
    defaults: ViewDefaults,
}

impl MatrixBinder {
    pub fn new(symbols: Arc<dyn SymbolSource>) -> Self {
        Self {
            symbols,
            defaults: ViewDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: ViewDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Bind to the shared library at `path`, reusing an already loaded copy.
    pub fn load(path: impl AsRef<Path>) -> BindResult<Self> {
        let library = registry::load_library_path(path.as_ref())?;
        Ok(Self::new(library))
    }

    /// Bind to a library by base name (`vital_c` → `libvital_c.so`).
    pub fn load_by_name(name: &str) -> BindResult<Self> {
        let library = registry::load_library(name)?;
        Ok(Self::new(library))
    }

    pub fn from_config(config: &BinderConfig) -> anyhow::Result<Self> {
        let binder = match &config.library.path {
            Some(path) => Self::load(path)
                .with_context(|| format!("Failed to load native library {}", path.display()))?,
            None => Self::load_by_name(&config.library.name).with_context(|| {
                format!("Failed to load native library '{}'", config.library.name)
            })?,
        };
        Ok(binder.with_defaults(ViewDefaults {
            dtype: config.views.default_dtype,
            owns_wrapped: config.views.default_owns_wrapped,
        }))
    }

    pub fn symbols(&self) -> &Arc<dyn SymbolSource> {
        &self.symbols
    }

    pub fn defaults(&self) -> ViewDefaults {
        self.defaults
    }

    /// Construct a new owning native matrix of `shape`.
    pub fn create<T: NativeElement>(&self, shape: ShapeSpec) -> BindResult<MatrixView<T>> {
        MatrixView::acquire(self.symbols.clone(), shape, ViewOptions::default())
    }

    /// Wrap an existing native matrix.
    ///
    /// # Safety
    ///
    /// `handle` must point to a live native matrix matching `shape`. When
    /// `owns_data` is false it must outlive every view created from it.
    pub unsafe fn wrap<T: NativeElement>(
        &self,
        shape: ShapeSpec,
        handle: RawMatrixHandle,
        owns_data: bool,
    ) -> BindResult<MatrixView<T>> {
        MatrixView::acquire(
            self.symbols.clone(),
            shape,
            ViewOptions {
                existing: Some(handle),
                owns_data: Some(owns_data),
                parent: None,
            },
        )
    }

    /// Create or wrap a matrix from a dynamically typed request.
    ///
    /// The dtype is validated before any native call is made.
    pub fn bind(&self, request: ViewRequest<'_>) -> BindResult<HostMatrix> {
        let element_type = match &request.dtype {
            Some(name) => name.parse::<ElementType>()?,
            None => self.defaults.dtype,
        };
        let shape = ShapeSpec::new(request.rows, request.cols, element_type)
            .with_dynamic(request.dynamic_rows, request.dynamic_cols);

        let existing = match request.existing {
            Some(ptr) => Some(RawMatrixHandle::new(ptr).ok_or_else(|| {
                BindError::NullHandle {
                    operation: format!("wrap {}", shape.suffix()),
                }
            })?),
            None => None,
        };
        let owns_data = match existing {
            Some(_) => Some(request.owns_data.unwrap_or(self.defaults.owns_wrapped)),
            None => request.owns_data,
        };

        let options = ViewOptions {
            existing,
            owns_data,
            parent: request.parent,
        };
        match element_type {
            ElementType::F64 => {
                MatrixView::<f64>::acquire(self.symbols.clone(), shape, options).map(HostMatrix::F64)
            }
            ElementType::F32 => {
                MatrixView::<f32>::acquire(self.symbols.clone(), shape, options).map(HostMatrix::F32)
            }
        }
    }
}

impl std::fmt::Debug for MatrixBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixBinder")
            .field("library", &self.symbols.describe())
            .field("defaults", &self.defaults)
            .finish()
    }
}
