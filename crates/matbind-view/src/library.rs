//! Native library loading and symbol lookup.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{BindError, BindResult};

/// Anything that can hand out addresses of native entry points.
pub trait SymbolSource: Send + Sync {
    /// Human readable origin, used in error messages.
    fn describe(&self) -> &str;

    /// Address of the exported symbol `name`.
    fn symbol_address(&self, name: &str) -> BindResult<*const c_void>;
}

/// Resolve `name` from `source` as a function pointer of type `F`.
///
/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the real
/// signature of the native symbol.
pub(crate) unsafe fn resolve<F: Copy>(source: &dyn SymbolSource, name: &str) -> BindResult<F> {
    debug_assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<*const c_void>()
    );
    let addr = source.symbol_address(name)?;
    if addr.is_null() {
        return Err(BindError::SymbolNotFound {
            symbol: name.to_string(),
            library: source.describe().to_string(),
            message: "symbol resolved to a null address".to_string(),
        });
    }
    // SAFETY: non-null code address reinterpreted as the caller-asserted fn type
    Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&addr) })
}

/// A loaded native library.
pub struct NativeLibrary {
    library: Library,
    /// Path to the library (for diagnostics)
    path: String,
}

impl NativeLibrary {
    /// Load a native library from a path.
    pub fn load(path: impl AsRef<Path>) -> BindResult<Self> {
        let path = path.as_ref();

        let library = unsafe { Library::new(path) }.map_err(|e| BindError::LibraryLoad {
            library: path.display().to_string(),
            message: e.to_string(),
        })?;

        log::debug!("loaded native library {}", path.display());
        Ok(Self {
            library,
            path: path.display().to_string(),
        })
    }

    /// Load a library by base name (`"vital_c"` → `libvital_c.so` on Linux),
    /// trying the current directory before the system search path.
    pub fn load_by_name(name: &str) -> BindResult<Self> {
        Self::load_by_name_in(name, Path::new("."))
    }

    fn load_by_name_in(name: &str, dir: &Path) -> BindResult<Self> {
        let lib_name = Self::platform_lib_name(name);
        let local = dir.join(&lib_name);

        let mut tried = Vec::new();
        if local.is_file() {
            match Self::load(&local) {
                Ok(lib) => return Ok(lib),
                Err(e) => log::debug!("{e}; falling back to the system search path"),
            }
            tried.push(local.display().to_string());
        }
        tried.push(lib_name.clone());

        // a bare file name makes the loader consult the system search path
        let library = unsafe { Library::new(&lib_name) }.map_err(|e| BindError::LibraryLoad {
            library: format!("{name} (tried '{}')", tried.join("', '")),
            message: e.to_string(),
        })?;

        log::debug!("loaded native library {lib_name} from system paths");
        Ok(Self {
            library,
            path: lib_name,
        })
    }

    /// Platform-specific library filename.
    pub(crate) fn platform_lib_name(name: &str) -> String {
        #[cfg(target_os = "windows")]
        {
            format!("{}.dll", name)
        }
        #[cfg(target_os = "macos")]
        {
            format!("lib{}.dylib", name)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            format!("lib{}.so", name)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SymbolSource for NativeLibrary {
    fn describe(&self) -> &str {
        &self.path
    }

    fn symbol_address(&self, name: &str) -> BindResult<*const c_void> {
        let c_name = CString::new(name).map_err(|_| BindError::SymbolNotFound {
            symbol: name.to_string(),
            library: self.path.clone(),
            message: "symbol name contains a NUL byte".to_string(),
        })?;

        let symbol: Symbol<'_, unsafe extern "C" fn()> =
            unsafe { self.library.get(c_name.as_bytes_with_nul()) }.map_err(|e| {
                BindError::SymbolNotFound {
                    symbol: name.to_string(),
                    library: self.path.clone(),
                    message: e.to_string(),
                }
            })?;
        Ok(*symbol as *const c_void)
    }
}

/// Statically registered symbols, for native code linked into the process.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    name: String,
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, addr: *const c_void) {
        self.symbols.insert(symbol.into(), addr as usize);
    }

    pub fn with(mut self, symbol: impl Into<String>, addr: *const c_void) -> Self {
        self.insert(symbol, addr);
        self
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for SymbolTable {
    fn describe(&self) -> &str {
        &self.name
    }

    fn symbol_address(&self, name: &str) -> BindResult<*const c_void> {
        self.symbols
            .get(name)
            .map(|&addr| addr as *const c_void)
            .ok_or_else(|| BindError::SymbolNotFound {
                symbol: name.to_string(),
                library: self.name.clone(),
                message: "not registered".to_string(),
            })
    }
}
