//! Process-wide registry of bound libraries.
//!
//! Entry points are resolved once per (library, grid kind) pair. The registry
//! only keeps weak references, so a library is unloaded as soon as the last
//! proxy using it is dropped, and bound again on the next request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::api::Bindings;
use crate::config::{BindingConfig, GridKind};
use crate::error::{FieldError, Result};

type RegistryKey = (PathBuf, GridKind);

static REGISTRY: LazyLock<Mutex<FxHashMap<RegistryKey, Weak<Bindings>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// Existing files are keyed by canonical path so `./lib.so` and `lib.so`
/// share an entry. Bare names are left for the platform loader to resolve.
fn registry_key(path: &Path, kind: GridKind) -> RegistryKey {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    (path, kind)
}

/// Returns the live binding for `config`, opening the library if needed.
pub(crate) fn bind(config: &BindingConfig) -> Result<Arc<Bindings>> {
    let key = registry_key(&config.library_path, config.kind);

    // Held across the load so two threads never resolve the same library twice.
    let mut registry = REGISTRY
        .lock()
        .map_err(|_| FieldError::LockPoisoned("binding registry"))?;

    if let Some(bindings) = registry.get(&key).and_then(Weak::upgrade) {
        debug!("Reusing bound library {} ({})", key.0.display(), key.1);
        return Ok(bindings);
    }

    let bindings = Arc::new(Bindings::open(&key.0, key.1)?);
    registry.retain(|_, weak| weak.strong_count() > 0);
    registry.insert(key, Arc::downgrade(&bindings));
    info!(
        "Bound native library {} ({} symbols)",
        bindings.label(),
        bindings.kind()
    );

    Ok(bindings)
}

/// Number of libraries currently bound and still in use.
pub fn bound_count() -> usize {
    REGISTRY.lock().map_or(0, |registry| {
        registry
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_load_error() {
        let config = BindingConfig::new("/nonexistent/dir/libmissing_engine.so");
        let err = Bindings::load(&config).unwrap_err();
        assert!(matches!(err, FieldError::Load { .. }), "{err}");
        assert!(err.to_string().contains("libmissing_engine"));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let config = BindingConfig::new("/nonexistent/dir/libnever_there.so");
        let before = bound_count();
        assert!(Bindings::load(&config).is_err());
        assert_eq!(bound_count(), before);
    }

    #[test]
    fn test_key_keeps_bare_names() {
        let (path, kind) = registry_key(Path::new("libnot_a_real_file.so"), GridKind::EGrid);
        assert_eq!(path, PathBuf::from("libnot_a_real_file.so"));
        assert_eq!(kind, GridKind::EGrid);
    }
}
