//! Callback plugin loader: builds a `CallbackRegistry` from a shared object
//! named by `SIMPLY_MIGRATE_CALLBACK_FILE`. Grounded on spec §9's design
//! note (one loader variant per environment, no reflection-based dynamic
//! import) and on `original_source/app/callback/callback_registry.py`'s
//! `load_from_file` (the env var is optional; a missing file is logged at
//! info level, not treated as an error).
//!
//! The plugin exports one C ABI entry point:
//!
//! ```ignore
//! #[no_mangle]
//! pub extern "C" fn fleet_migrate_register(registry: &mut fleet_migrate_core::callback::CallbackRegistry) {
//!     registry.register(HookKind::BeforeJob, Arc::new(MyHandler));
//! }
//! ```

use std::path::Path;

use fleet_migrate_core::callback::CallbackRegistry;
use libloading::{Library, Symbol};

use crate::error::ServerError;

type RegisterFn = unsafe extern "C" fn(&mut CallbackRegistry);

/// Keeps the loaded library alive for as long as handlers registered from it
/// might be invoked. Must outlive the `CallbackRegistry` it populated.
pub struct CallbackPlugin {
    _lib: Library,
}

/// Builds the registry for this process. `path` is the resolved value of
/// `SIMPLY_MIGRATE_CALLBACK_FILE`; `None` or a nonexistent path yields an
/// empty registry rather than an error, per the spec's loading contract.
pub fn load(path: Option<&Path>) -> Result<(CallbackRegistry, Option<CallbackPlugin>), ServerError> {
    let mut registry = CallbackRegistry::new();

    let Some(path) = path else {
        log::info!("SIMPLY_MIGRATE_CALLBACK_FILE not set; running with an empty callback registry");
        return Ok((registry, None));
    };

    if !path.exists() {
        log::info!(
            "callback file '{}' does not exist; running with an empty callback registry",
            path.display()
        );
        return Ok((registry, None));
    }

    // Safety: the plugin must be built against the same fleet-migrate-core
    // version so the CallbackRegistry/Handler ABI lines up; this is a
    // deployment contract, not something the loader can verify.
    unsafe {
        let lib = Library::new(path)
            .map_err(|e| ServerError::Plugin(format!("failed to load '{}': {}", path.display(), e)))?;
        let register: Symbol<RegisterFn> = lib
            .get(b"fleet_migrate_register")
            .map_err(|e| ServerError::Plugin(format!("'{}' has no fleet_migrate_register symbol: {}", path.display(), e)))?;
        register(&mut registry);
        Ok((registry, Some(CallbackPlugin { _lib: lib })))
    }
}
