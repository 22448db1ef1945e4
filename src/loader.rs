//! Native Library Loader
//!
//! Opens the CatBoost shared library through libloading and resolves every
//! expected entry point in one pass. Resolution is all-or-nothing: a
//! library missing any required symbol is rejected at startup with a single
//! error listing everything absent, instead of failing at first use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::error::{BridgeError, BridgeResult};
use crate::symbols::SymbolTable;

/// Base name of the CatBoost model inference library
/// (`libcatboostmodel.so` / `.dylib`, `catboostmodel.dll`).
pub const DEFAULT_LIBRARY_NAME: &str = "catboostmodel";

/// Environment variable holding an extra directory to search first.
pub const LIBRARY_PATH_ENV: &str = "CATBOOST_LIBRARY_PATH";

/// A loaded copy of the native inference library.
///
/// The underlying [`Library`] is reference-counted; every resolved function
/// pointer is only valid while at least one clone of that `Arc` is alive,
/// so [`crate::bridge::ModelBridge`] keeps one for its whole lifetime.
#[derive(Debug)]
pub struct NativeLibrary {
    path: PathBuf,
    library: Arc<Library>,
}

impl NativeLibrary {
    /// Open the shared library at the given path.
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading a shared object runs its initializers. We trust
        // the path the embedder supplied, same as any dlopen.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                BridgeError::LibraryLoad(format!("'{}': {}", path.display(), e))
            })?
        };

        log::debug!("Loaded native library {}", path.display());

        Ok(Self {
            path,
            library: Arc::new(library),
        })
    }

    /// Locate and open a library by base name using the platform search
    /// paths (see [`find_library`]).
    pub fn open_named(name: &str) -> BridgeResult<Self> {
        let path =
            find_library(name).ok_or_else(|| BridgeError::LibraryNotFound(name.to_string()))?;
        Self::open(path)
    }

    /// Locate and open the CatBoost model library under its standard name.
    pub fn open_default() -> BridgeResult<Self> {
        Self::open_named(DEFAULT_LIBRARY_NAME)
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Resolve every expected entry point into a [`SymbolTable`].
    ///
    /// Fails with [`BridgeError::MissingSymbols`] naming all absent symbols
    /// if the library does not export the full surface. Signatures are
    /// taken from the expected-symbol table and cannot be verified against
    /// the library itself; a mismatched export is undefined behavior at the
    /// first dispatched call.
    pub fn resolve(&self) -> BridgeResult<SymbolTable> {
        let mut missing = Vec::new();
        let lib: &Library = &self.library;

        let table = SymbolTable {
            get_error_string: lookup(lib, "GetErrorString", &mut missing),
            model_calcer_create: lookup(lib, "ModelCalcerCreate", &mut missing),
            model_calcer_delete: lookup(lib, "ModelCalcerDelete", &mut missing),
            load_full_model_from_buffer: lookup(lib, "LoadFullModelFromBuffer", &mut missing),
            calc_model_prediction_single: lookup(lib, "CalcModelPredictionSingle", &mut missing),
            calc_model_prediction: lookup(lib, "CalcModelPrediction", &mut missing),
            get_float_features_count: lookup(lib, "GetFloatFeaturesCount", &mut missing),
            get_cat_features_count: lookup(lib, "GetCatFeaturesCount", &mut missing),
            get_dimensions_count: lookup(lib, "GetDimensionsCount", &mut missing),
            set_prediction_type_string: lookup(lib, "SetPredictionTypeString", &mut missing),
            get_model_used_features_names: lookup(lib, "GetModelUsedFeaturesNames", &mut missing),
            get_model_info_value: lookup(lib, "GetModelInfoValue", &mut missing),
            get_cat_feature_indices: lookup(lib, "GetCatFeatureIndices", &mut missing),
            get_float_feature_indices: lookup(lib, "GetFloatFeatureIndices", &mut missing),
        };

        if !missing.is_empty() {
            return Err(BridgeError::MissingSymbols {
                library: self.path.display().to_string(),
                symbols: missing,
            });
        }

        Ok(table)
    }
}

/// Look up one symbol, recording its name on failure.
fn lookup<T: Copy>(
    library: &Library,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<T> {
    // Safety: the requested type comes from the expected-symbol table in
    // `symbols.rs`; correctness of that signature against the library's
    // actual export is the loader contract's unchecked half.
    let symbol: Result<Symbol<T>, _> = unsafe { library.get(name.as_bytes()) };
    match symbol {
        Ok(sym) => Some(*sym),
        Err(_) => {
            missing.push(name);
            None
        }
    }
}

/// Find a library by base name in the platform search paths.
///
/// Absolute or relative paths that already exist are returned unchanged.
pub fn find_library(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.exists() {
        return Some(direct.to_path_buf());
    }

    let filename = library_filename(name);
    for search_path in default_search_paths() {
        let candidate = search_path.join(&filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

/// Default library search paths for this platform.
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(dir) = std::env::var(LIBRARY_PATH_ENV) {
        paths.push(PathBuf::from(dir));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));
        paths.push(PathBuf::from("/lib64"));
        paths.push(PathBuf::from("/usr/lib64"));

        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            for p in ld_path.split(':') {
                paths.push(PathBuf::from(p));
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));

        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            for p in dyld_path.split(':') {
                paths.push(PathBuf::from(p));
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Windows\\System32"));

        if let Ok(path) = std::env::var("PATH") {
            for p in path.split(';') {
                paths.push(PathBuf::from(p));
            }
        }
    }

    paths
}

/// Construct the platform-specific library filename.
fn library_filename(name: &str) -> String {
    #[cfg(target_os = "linux")]
    {
        if name.starts_with("lib") && name.ends_with(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        name.to_string()
    }
}
