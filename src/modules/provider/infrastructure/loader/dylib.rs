//! Native provider bundles loaded with `libloading`.
//!
//! A bundle is a shared library built against this crate with the same toolchain.
//! It exports:
//! - `reelhost_manifest`: `extern "C" fn() -> *const c_char`, a NUL-terminated JSON
//!   [`BundleManifest`] with static lifetime;
//! - one constructor per entry point: `extern "C" fn() -> *mut ProviderBox`, returning
//!   `Box::into_raw(Box::new(provider))` or null when construction fails.
//!
//! Each bundle is opened as its own library handle (`RTLD_LOCAL` on Unix), so two
//! versions of a provider, or a provider and the host, never share symbols.

use super::module_handle::{BundleManifest, EntryPoint, ModuleHandle, ModuleLoader};
use crate::modules::provider::traits::Provider;
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_info};
use libloading::{Library, Symbol};
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Thin pointer wrapper crossing the bundle boundary
pub type ProviderBox = Box<dyn Provider>;

pub const MANIFEST_SYMBOL: &str = "reelhost_manifest";

type ManifestFn = unsafe extern "C" fn() -> *const c_char;
type ConstructorFn = unsafe extern "C" fn() -> *mut ProviderBox;

/// Opens native bundles from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibModuleLoader;

impl DylibModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DylibModuleLoader {
    fn open(&self, path: &Path) -> AppResult<Arc<dyn ModuleHandle>> {
        if !path.is_file() {
            return Err(AppError::LoadFailure(format!(
                "Bundle {} is not a readable file",
                path.display()
            )));
        }

        // SAFETY: loading a library runs its initialisers. Bundles are trusted
        // provider code the user chose to install.
        let library = unsafe { Library::new(path) }?;
        let manifest = read_manifest(&library)?;
        manifest.validate()?;

        log_info!(
            "Opened bundle {} ({} entry points)",
            path.display(),
            manifest.entry_points.len()
        );

        Ok(Arc::new(DylibModule {
            manifest,
            path: path.to_path_buf(),
            disposed: AtomicBool::new(false),
            library,
        }))
    }
}

fn read_manifest(library: &Library) -> AppResult<BundleManifest> {
    let symbol = CString::new(MANIFEST_SYMBOL)
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    // SAFETY: the symbol is documented to have the `ManifestFn` signature and to
    // return a pointer to a static NUL-terminated string (or null).
    let raw = unsafe {
        let manifest_fn: Symbol<ManifestFn> = library
            .get(symbol.as_bytes_with_nul())
            .map_err(|e| AppError::LoadFailure(format!("Missing manifest symbol: {}", e)))?;
        let ptr = manifest_fn();
        if ptr.is_null() {
            return Err(AppError::LoadFailure("Bundle returned no manifest".to_string()));
        }
        CStr::from_ptr(ptr)
            .to_str()
            .map_err(|e| AppError::LoadFailure(format!("Manifest is not UTF-8: {}", e)))?
            .to_owned()
    };

    serde_json::from_str(&raw)
        .map_err(|e| AppError::LoadFailure(format!("Unreadable manifest: {}", e)))
}

struct DylibModule {
    manifest: BundleManifest,
    path: PathBuf,
    disposed: AtomicBool,
    // Last field: unmapped after everything else in the module is gone
    library: Library,
}

impl ModuleHandle for DylibModule {
    fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    fn instantiate(&self, entry_point: &EntryPoint) -> AppResult<Box<dyn Provider>> {
        if self.is_disposed() {
            return Err(AppError::LoadFailure(format!(
                "Bundle {} was disposed",
                self.path.display()
            )));
        }

        let symbol = CString::new(entry_point.symbol.as_str()).map_err(|_| {
            AppError::LoadFailure(format!("Invalid entry point symbol {:?}", entry_point.symbol))
        })?;

        // SAFETY: constructor symbols follow the `ConstructorFn` contract; a non-null
        // result comes from `Box::into_raw` in the bundle and ownership moves here.
        let provider = unsafe {
            let constructor: Symbol<ConstructorFn> = self
                .library
                .get(symbol.as_bytes_with_nul())
                .map_err(|e| {
                    AppError::LoadFailure(format!(
                        "Missing entry point {}: {}",
                        entry_point.symbol, e
                    ))
                })?;
            let raw = constructor();
            if raw.is_null() {
                return Err(AppError::LoadFailure(format!(
                    "Entry point {} failed to construct a provider",
                    entry_point.symbol
                )));
            }
            *Box::from_raw(raw)
        };

        log_debug!(
            "Instantiated {} from {}",
            entry_point.symbol,
            self.path.display()
        );
        Ok(provider)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            log_debug!("Disposed bundle {}", self.path.display());
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
