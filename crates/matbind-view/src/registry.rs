//! Process-wide cache of loaded native libraries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::error::{BindError, BindResult};
use crate::library::NativeLibrary;

/// Libraries keyed by the name or path they were requested under.
#[derive(Default)]
pub struct LibraryRegistry {
    libraries: HashMap<String, Arc<NativeLibrary>>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<NativeLibrary>> {
        self.libraries.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, library: Arc<NativeLibrary>) {
        self.libraries.insert(key.into(), library);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.libraries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

static REGISTRY: Lazy<Mutex<LibraryRegistry>> = Lazy::new(|| Mutex::new(LibraryRegistry::new()));

pub fn global_registry() -> &'static Mutex<LibraryRegistry> {
    &REGISTRY
}

/// Load (or reuse) a library by base name.
pub fn load_library(name: &str) -> BindResult<Arc<NativeLibrary>> {
    load_with(name, || NativeLibrary::load_by_name(name))
}

/// Load (or reuse) a library by path.
pub fn load_library_path(path: &Path) -> BindResult<Arc<NativeLibrary>> {
    let key = path.display().to_string();
    load_with(&key, || NativeLibrary::load(path))
}

fn load_with(
    key: &str,
    load: impl FnOnce() -> BindResult<NativeLibrary>,
) -> BindResult<Arc<NativeLibrary>> {
    let mut registry = global_registry()
        .lock()
        .map_err(|_| BindError::LibraryLoad {
            library: key.to_string(),
            message: "library registry lock poisoned".to_string(),
        })?;

    if let Some(lib) = registry.get(key) {
        return Ok(lib);
    }

    let lib = Arc::new(load()?);
    registry.insert(key, lib.clone());
    Ok(lib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_loads_are_not_cached() {
        let name = "matbind_registry_missing_library";
        assert!(load_library(name).is_err());
        assert!(!global_registry().lock().unwrap().contains(name));
    }

    #[test]
    fn empty_registry() {
        let registry = LibraryRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
    }
}
