//! Native matrix handles: acquisition, queries and destruction.

use std::ptr::NonNull;
use std::sync::Arc;

use matbind_abi::{
    MatrixDataFn, MatrixDestroyFn, MatrixExtentFn, MatrixGetFn, MatrixNewSizedFn, MatrixOpaque,
    MatrixSetFn,
};

use crate::error::{BindError, BindResult};
use crate::error_handle::ScopedErrorHandle;
use crate::library::{resolve, SymbolSource};
use crate::shape::{EntryPoint, EntryPointMap};
use crate::types::NativeElement;

/// Non-null pointer to a native matrix instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawMatrixHandle(NonNull<MatrixOpaque>);

impl RawMatrixHandle {
    /// `None` for a null pointer.
    pub fn new(ptr: *mut MatrixOpaque) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut MatrixOpaque {
        self.0.as_ptr()
    }
}

/// Lifecycle hooks shared by every native-backed object.
pub trait NativeObject {
    /// Underlying native pointer; null once the object has been destroyed.
    fn c_pointer(&self) -> *mut MatrixOpaque;

    fn is_null(&self) -> bool {
        self.c_pointer().is_null()
    }

    /// Release the native object if this instance is responsible for it.
    fn destroy(&mut self) -> BindResult<()>;
}

/// Shape, strides (in elements) and data pointer reported by the native side.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeLayout<T> {
    pub rows: usize,
    pub cols: usize,
    pub row_stride: isize,
    pub col_stride: isize,
    pub data: *mut T,
}

/// Shared owner of one native matrix instance.
///
/// Views hold this behind an `Rc`; when `owned` is set the native destroy
/// entry point runs exactly once, on explicit release or when the last
/// reference drops.
pub struct NativeMatrix {
    raw: RawMatrixHandle,
    owned: bool,
    released: bool,
    entry_points: Arc<EntryPointMap>,
    symbols: Arc<dyn SymbolSource>,
}

impl NativeMatrix {
    /// Allocate a new native matrix through `new_sized`. Always owned.
    pub(crate) fn construct(
        symbols: Arc<dyn SymbolSource>,
        entry_points: Arc<EntryPointMap>,
        rows: usize,
        cols: usize,
    ) -> BindResult<Self> {
        let symbol = entry_points.symbol(EntryPoint::NewSized);
        let new_sized: MatrixNewSizedFn = unsafe { resolve(symbols.as_ref(), symbol)? };

        let rows_arg = isize::try_from(rows)
            .map_err(|_| BindError::native(symbol, format!("row count {rows} exceeds isize")))?;
        let cols_arg = isize::try_from(cols)
            .map_err(|_| BindError::native(symbol, format!("column count {cols} exceeds isize")))?;

        log::trace!("calling {symbol}({rows}, {cols})");
        let raw = RawMatrixHandle::new(unsafe { new_sized(rows_arg, cols_arg) }).ok_or_else(|| {
            BindError::ConstructionFailure {
                symbol: symbol.to_string(),
            }
        })?;

        log::debug!("constructed native matrix {:p} via {symbol}", raw.as_ptr());
        Ok(Self {
            raw,
            owned: true,
            released: false,
            entry_points,
            symbols,
        })
    }

    /// Adopt an existing native matrix.
    pub(crate) fn wrap(
        symbols: Arc<dyn SymbolSource>,
        entry_points: Arc<EntryPointMap>,
        raw: RawMatrixHandle,
        owned: bool,
    ) -> Self {
        log::debug!(
            "wrapping native matrix {:p} ({}, owned: {owned})",
            raw.as_ptr(),
            entry_points.suffix()
        );
        Self {
            raw,
            owned,
            released: false,
            entry_points,
            symbols,
        }
    }

    pub fn raw(&self) -> RawMatrixHandle {
        self.raw
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn entry_points(&self) -> &EntryPointMap {
        &self.entry_points
    }

    fn symbol(&self, entry: EntryPoint) -> &str {
        self.entry_points.symbol(entry)
    }

    fn extent(&self, eh: &ScopedErrorHandle, entry: EntryPoint) -> BindResult<isize> {
        let symbol = self.symbol(entry);
        let f: MatrixExtentFn = unsafe { resolve(self.symbols.as_ref(), symbol)? };
        let value = unsafe { f(self.raw.as_ptr(), eh.as_ptr()) };
        eh.check(symbol)?;
        Ok(value)
    }

    fn dimension(&self, eh: &ScopedErrorHandle, entry: EntryPoint) -> BindResult<usize> {
        let value = self.extent(eh, entry)?;
        usize::try_from(value).map_err(|_| {
            BindError::native(self.symbol(entry), format!("negative extent {value} reported"))
        })
    }

    /// Query shape, element strides and data pointer under one error handle.
    pub(crate) fn query_layout<T: NativeElement>(&self) -> BindResult<NativeLayout<T>> {
        let eh = ScopedErrorHandle::acquire(self.symbols.as_ref())?;

        let rows = self.dimension(&eh, EntryPoint::Rows)?;
        let cols = self.dimension(&eh, EntryPoint::Cols)?;
        let row_stride = self.extent(&eh, EntryPoint::RowStride)?;
        let col_stride = self.extent(&eh, EntryPoint::ColStride)?;

        let symbol = self.symbol(EntryPoint::Data);
        let data_fn: MatrixDataFn<T> = unsafe { resolve(self.symbols.as_ref(), symbol)? };
        let data = unsafe { data_fn(self.raw.as_ptr(), eh.as_ptr()) };
        eh.check(symbol)?;

        log::trace!(
            "queried {}: {rows}x{cols}, strides ({row_stride}, {col_stride}), data {data:p}",
            self.entry_points.suffix()
        );
        Ok(NativeLayout {
            rows,
            cols,
            row_stride,
            col_stride,
            data,
        })
    }

    /// Native element read; indices address the native object's own storage.
    pub(crate) fn get<T: NativeElement>(&self, row: isize, col: isize) -> BindResult<T> {
        let symbol = self.symbol(EntryPoint::Get);
        let f: MatrixGetFn<T> = unsafe { resolve(self.symbols.as_ref(), symbol)? };
        let eh = ScopedErrorHandle::acquire(self.symbols.as_ref())?;
        let value = unsafe { f(self.raw.as_ptr(), row, col, eh.as_ptr()) };
        eh.check(symbol)?;
        Ok(value)
    }

    pub(crate) fn set<T: NativeElement>(&self, row: isize, col: isize, value: T) -> BindResult<()> {
        let symbol = self.symbol(EntryPoint::Set);
        let f: MatrixSetFn<T> = unsafe { resolve(self.symbols.as_ref(), symbol)? };
        let eh = ScopedErrorHandle::acquire(self.symbols.as_ref())?;
        unsafe { f(self.raw.as_ptr(), row, col, value, eh.as_ptr()) };
        eh.check(symbol)
    }

    /// Destroy now (when owned) and report any native failure.
    pub(crate) fn release(mut self) -> BindResult<()> {
        let result = if self.owned {
            self.destroy_native()
        } else {
            Ok(())
        };
        self.released = true;
        result
    }

    fn destroy_native(&self) -> BindResult<()> {
        let symbol = self.symbol(EntryPoint::Destroy);
        let destroy: MatrixDestroyFn = unsafe { resolve(self.symbols.as_ref(), symbol)? };
        let eh = ScopedErrorHandle::acquire(self.symbols.as_ref())?;
        log::debug!("destroying native matrix {:p} via {symbol}", self.raw.as_ptr());
        unsafe { destroy(self.raw.as_ptr(), eh.as_ptr()) };
        eh.check(symbol)
    }
}

impl Drop for NativeMatrix {
    fn drop(&mut self) {
        if !self.owned || self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.destroy_native() {
            log::warn!("failed to destroy native matrix {:p}: {e}", self.raw.as_ptr());
        }
    }
}

impl std::fmt::Debug for NativeMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeMatrix")
            .field("raw", &self.raw.as_ptr())
            .field("owned", &self.owned)
            .field("suffix", &self.entry_points.suffix())
            .field("library", &self.symbols.describe())
            .finish()
    }
}
