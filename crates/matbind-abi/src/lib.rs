//! C ABI types for the native matrix library consumed by `matbind-view`.
//!
//! The native library exports one family of functions per
//! (rows, cols, element type) combination. Every family shares the
//! signatures declared here; only the element type `T` changes.

use std::ffi::{c_char, c_int};

/// Symbol prefix shared by every matrix entry point.
pub const MATRIX_SYMBOL_PREFIX: &str = "vital_eigen_matrix";

/// Constructor of a fresh error handle.
pub const ERROR_HANDLE_NEW_SYMBOL: &str = "vital_eh_new";

/// Destructor of an error handle (also frees its message).
pub const ERROR_HANDLE_DESTROY_SYMBOL: &str = "vital_eh_destroy";

/// Dimension token used in symbol names for runtime-sized dimensions.
pub const DYNAMIC_DIM_TOKEN: &str = "X";

/// Error state written by the native side.
///
/// A zero `error_code` means success. `message` is owned by the native
/// library and released by `vital_eh_destroy`.
#[repr(C)]
#[derive(Debug)]
pub struct ErrorHandleRaw {
    pub error_code: c_int,
    pub message: *mut c_char,
}

impl Default for ErrorHandleRaw {
    fn default() -> Self {
        Self {
            error_code: 0,
            message: std::ptr::null_mut(),
        }
    }
}

/// Opaque native matrix instance.
///
/// Only ever handled behind a pointer.
#[repr(C)]
pub struct MatrixOpaque {
    _private: [u8; 0],
}

pub type ErrorHandleNewFn = unsafe extern "C" fn() -> *mut ErrorHandleRaw;
pub type ErrorHandleDestroyFn = unsafe extern "C" fn(*mut ErrorHandleRaw);

pub type MatrixNewFn = unsafe extern "C" fn() -> *mut MatrixOpaque;
pub type MatrixNewSizedFn = unsafe extern "C" fn(isize, isize) -> *mut MatrixOpaque;
pub type MatrixDestroyFn = unsafe extern "C" fn(*mut MatrixOpaque, *mut ErrorHandleRaw);
pub type MatrixGetFn<T> =
    unsafe extern "C" fn(*mut MatrixOpaque, isize, isize, *mut ErrorHandleRaw) -> T;
pub type MatrixSetFn<T> =
    unsafe extern "C" fn(*mut MatrixOpaque, isize, isize, T, *mut ErrorHandleRaw);

/// Shared by `rows`, `cols`, `row_stride` and `col_stride`.
///
/// Strides are reported in elements, not bytes.
pub type MatrixExtentFn = unsafe extern "C" fn(*mut MatrixOpaque, *mut ErrorHandleRaw) -> isize;

/// Pointer to the first stored element. May be null for empty matrices.
pub type MatrixDataFn<T> = unsafe extern "C" fn(*mut MatrixOpaque, *mut ErrorHandleRaw) -> *mut T;
