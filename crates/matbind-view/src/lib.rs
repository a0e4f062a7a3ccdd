//! Zero-copy views over matrices owned by a native C-ABI matrix library.
//!
//! The native library exports one family of entry points per shape and
//! element type:
//!
//! ```text
//! vital_eigen_matrix{R}x{C}{t}_{new,new_sized,destroy,get,set,
//!                               rows,cols,row_stride,col_stride,data}
//! ```
//!
//! where `R`/`C` are fixed counts or `X` for runtime-sized dimensions and
//! `t` is `d` (`f64`) or `f` (`f32`). A [`MatrixBinder`] resolves those
//! names, constructs or adopts native matrices and wraps their buffers in
//! [`MatrixView`]s that alias native memory directly.
//!
//! # Example
//!
//! ```ignore
//! use matbind_view::{MatrixBinder, ShapeSpec, ViewRequest};
//!
//! let binder = MatrixBinder::load_by_name("vital_c")?;
//! let mut m = binder.create::<f64>(ShapeSpec::of::<f64>(2, 1))?;
//! m.set(1, 0, 4.5)?;
//! assert_eq!(m.to_owned_array()[[1, 0]], 4.5);
//!
//! // Dynamically typed hosts go through `bind`.
//! let h = binder.bind(ViewRequest::new(3, 3).dtype("float32"))?;
//! let col = h.slice(0..3, 1..2)?;
//! ```
//!
//! # Ownership
//!
//! Exactly one view per native matrix owns it: the view that constructed
//! it, or a wrapping view that was handed ownership. Derived views share
//! the native object without owning it; the native destructor runs once,
//! after the owner is finalized and the last derived view is gone.

mod binder;
mod config;
mod error;
mod error_handle;
mod host;
mod library;
mod native;
mod registry;
mod shape;
mod types;
mod view;

pub use binder::{MatrixBinder, ViewDefaults, ViewRequest};
pub use config::{
    BinderConfig, ConfigFormat, ConfigLoader, LibraryConfig, LogLevel, LoggingConfig, ViewsConfig,
    DEFAULT_LIBRARY_NAME,
};
pub use error::{Axis, BindError, BindResult};
pub use host::{DynamicDerivation, HostMatrix};
pub use library::{NativeLibrary, SymbolSource, SymbolTable};
pub use native::{NativeMatrix, NativeObject, RawMatrixHandle};
pub use registry::{global_registry, load_library, load_library_path, LibraryRegistry};
pub use shape::{EntryPoint, EntryPointMap, ResolvedShape, ShapeSpec};
pub use types::{ElementLayout, ElementType, NativeElement};
pub use view::{MatrixView, ViewId, ViewLineage};

pub use matbind_abi::MatrixOpaque;
