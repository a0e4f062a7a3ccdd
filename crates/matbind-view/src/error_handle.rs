//! Scoped native error handles.
//!
//! A handle is acquired right before a native call and released on every
//! exit path when the guard drops.

use std::ffi::CStr;
use std::ptr::NonNull;

use matbind_abi::{
    ErrorHandleDestroyFn, ErrorHandleNewFn, ErrorHandleRaw, ERROR_HANDLE_DESTROY_SYMBOL,
    ERROR_HANDLE_NEW_SYMBOL,
};

use crate::error::{BindError, BindResult};
use crate::library::{resolve, SymbolSource};

pub(crate) struct ScopedErrorHandle {
    raw: NonNull<ErrorHandleRaw>,
    destroy: ErrorHandleDestroyFn,
}

impl ScopedErrorHandle {
    pub(crate) fn acquire(symbols: &dyn SymbolSource) -> BindResult<Self> {
        // SAFETY: signatures fixed by the native error-handle ABI
        let new: ErrorHandleNewFn = unsafe { resolve(symbols, ERROR_HANDLE_NEW_SYMBOL)? };
        let destroy: ErrorHandleDestroyFn =
            unsafe { resolve(symbols, ERROR_HANDLE_DESTROY_SYMBOL)? };

        let raw = NonNull::new(unsafe { new() })
            .ok_or_else(|| BindError::native(ERROR_HANDLE_NEW_SYMBOL, "null error handle"))?;
        Ok(Self { raw, destroy })
    }

    pub(crate) fn as_ptr(&self) -> *mut ErrorHandleRaw {
        self.raw.as_ptr()
    }

    /// Turn a non-zero error code left by the last call into an error.
    pub(crate) fn check(&self, operation: &str) -> BindResult<()> {
        // SAFETY: raw stays valid until drop
        let eh = unsafe { self.raw.as_ref() };
        if eh.error_code == 0 {
            return Ok(());
        }
        let message = if eh.message.is_null() {
            "(no message)".to_string()
        } else {
            unsafe { CStr::from_ptr(eh.message) }
                .to_string_lossy()
                .into_owned()
        };
        log::trace!("native call {operation} reported error {}", eh.error_code);
        Err(BindError::NativeOperation {
            operation: operation.to_string(),
            code: eh.error_code,
            message,
        })
    }
}

impl Drop for ScopedErrorHandle {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.raw.as_ptr()) };
    }
}
