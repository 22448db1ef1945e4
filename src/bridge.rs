//! Wrapper Dispatch
//!
//! One typed wrapper per native entry point. Every wrapper checks its
//! [`SymbolTable`] slot before dispatch: an unset slot yields the
//! operation's failure sentinel (null, false, zero or a no-op) without
//! touching any argument memory; a set slot forwards the arguments
//! unchanged and returns the native result unmodified. No buffering, no
//! retries, no transformation — dispatch plus a presence check.
//!
//! A [`ModelBridge`] is immutable once constructed, so wrapper calls from
//! multiple threads are safe with respect to the registry. What the native
//! library promises about concurrent calls on one model handle is its own
//! contract; see [`crate::model::Model`].

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::OnceCell;

use crate::error::{BridgeError, BridgeResult};
use crate::loader::NativeLibrary;
use crate::symbols::{ModelCalcerHandle, SymbolTable};

/// Dispatch context: a resolved symbol table plus the library that keeps
/// its function pointers alive.
///
/// Construct one with [`load`](Self::load) / [`load_default`](Self::load_default)
/// (fail-fast resolution through the typed loader) or
/// [`from_table`](Self::from_table) (a hand-populated table; unresolved
/// entry points surface as sentinels at first use).
pub struct ModelBridge {
    symbols: SymbolTable,
    // Dropping the Library would invalidate every resolved pointer, so the
    // bridge holds it for its whole lifetime. None when the table was
    // populated from raw addresses the embedder owns.
    _library: Option<Arc<Library>>,
}

impl ModelBridge {
    /// Open the shared library at `path` and resolve the full entry-point
    /// surface.
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let library = NativeLibrary::open(path)?;
        Self::from_library(&library)
    }

    /// Locate the CatBoost library in the platform search paths and
    /// resolve the full entry-point surface.
    pub fn load_default() -> BridgeResult<Self> {
        let library = NativeLibrary::open_default()?;
        Self::from_library(&library)
    }

    /// Resolve a bridge from an already opened library.
    pub fn from_library(library: &NativeLibrary) -> BridgeResult<Self> {
        let symbols = library.resolve()?;
        log::info!(
            "Resolved {} model entry points from {}",
            SymbolTable::SLOT_COUNT,
            library.path().display()
        );
        Ok(Self {
            symbols,
            _library: Some(Arc::clone(library.library())),
        })
    }

    /// Build a bridge from a hand-populated symbol table.
    ///
    /// This is the embedder path: addresses were resolved elsewhere and
    /// fed in through the [`SymbolTable`] setters. Slots left unset are
    /// reported by [`missing_symbols`](Self::missing_symbols) and answer
    /// with their sentinel when dispatched.
    pub fn from_table(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            _library: None,
        }
    }

    /// Whether every entry point is resolved.
    pub fn is_complete(&self) -> bool {
        self.symbols.is_complete()
    }

    /// Entry points still unresolved.
    pub fn missing_symbols(&self) -> Vec<&'static str> {
        self.symbols.missing()
    }

    // Raw wrappers. Each mirrors its native signature exactly. They are
    // `unsafe` because pointer arguments are forwarded verbatim into
    // native code; the caller upholds the native call's contract (valid
    // buffers of the stated sizes, a live model handle where one is
    // taken). With an unset slot no argument memory is read or written.

    /// `GetErrorString`. Sentinel: null.
    pub unsafe fn get_error_string(&self) -> *const c_char {
        match self.symbols.get_error_string {
            Some(f) => f(),
            None => ptr::null(),
        }
    }

    /// `ModelCalcerCreate`. Sentinel: null.
    pub unsafe fn model_calcer_create(&self) -> *mut ModelCalcerHandle {
        match self.symbols.model_calcer_create {
            Some(f) => f(),
            None => ptr::null_mut(),
        }
    }

    /// `ModelCalcerDelete`. Sentinel: no-op.
    pub unsafe fn model_calcer_delete(&self, model: *mut ModelCalcerHandle) {
        if let Some(f) = self.symbols.model_calcer_delete {
            f(model);
        }
    }

    /// `LoadFullModelFromBuffer`. Sentinel: false.
    pub unsafe fn load_full_model_from_buffer(
        &self,
        model: *mut ModelCalcerHandle,
        buffer: *const c_void,
        buffer_size: usize,
    ) -> bool {
        match self.symbols.load_full_model_from_buffer {
            Some(f) => f(model, buffer, buffer_size),
            None => false,
        }
    }

    /// `CalcModelPredictionSingle`. Sentinel: false.
    ///
    /// # Safety
    ///
    /// `float_features` must be readable for `float_features_size` floats,
    /// `cat_features` for `cat_features_size` string pointers, and
    /// `result` writable for `result_size` doubles; on success the native
    /// side writes the document's predictions into `result`.
    pub unsafe fn calc_model_prediction_single(
        &self,
        model: *mut ModelCalcerHandle,
        float_features: *const f32,
        float_features_size: usize,
        cat_features: *const *const c_char,
        cat_features_size: usize,
        result: *mut f64,
        result_size: usize,
    ) -> bool {
        match self.symbols.calc_model_prediction_single {
            Some(f) => f(
                model,
                float_features,
                float_features_size,
                cat_features,
                cat_features_size,
                result,
                result_size,
            ),
            None => false,
        }
    }

    /// `CalcModelPrediction` (batch). Sentinel: false.
    ///
    /// # Safety
    ///
    /// The matrices must hold `doc_count` rows of the stated widths and
    /// `result` must be writable for `result_size` doubles; the native
    /// side writes `doc_count × dimensions` values row-major.
    pub unsafe fn calc_model_prediction(
        &self,
        model: *mut ModelCalcerHandle,
        doc_count: usize,
        float_features: *const *const f32,
        float_features_size: usize,
        cat_features: *const *const *const c_char,
        cat_features_size: usize,
        result: *mut f64,
        result_size: usize,
    ) -> bool {
        match self.symbols.calc_model_prediction {
            Some(f) => f(
                model,
                doc_count,
                float_features,
                float_features_size,
                cat_features,
                cat_features_size,
                result,
                result_size,
            ),
            None => false,
        }
    }

    /// `GetFloatFeaturesCount`. Sentinel: 0.
    pub unsafe fn get_float_features_count(&self, model: *mut ModelCalcerHandle) -> usize {
        match self.symbols.get_float_features_count {
            Some(f) => f(model),
            None => 0,
        }
    }

    /// `GetCatFeaturesCount`. Sentinel: 0.
    pub unsafe fn get_cat_features_count(&self, model: *mut ModelCalcerHandle) -> usize {
        match self.symbols.get_cat_features_count {
            Some(f) => f(model),
            None => 0,
        }
    }

    /// `GetDimensionsCount`. Sentinel: 0.
    pub unsafe fn get_dimensions_count(&self, model: *mut ModelCalcerHandle) -> usize {
        match self.symbols.get_dimensions_count {
            Some(f) => f(model),
            None => 0,
        }
    }

    /// `SetPredictionTypeString`. Sentinel: false.
    pub unsafe fn set_prediction_type_string(
        &self,
        model: *mut ModelCalcerHandle,
        prediction_type: *const c_char,
    ) -> bool {
        match self.symbols.set_prediction_type_string {
            Some(f) => f(model, prediction_type),
            None => false,
        }
    }

    /// `GetModelUsedFeaturesNames`. Sentinel: false.
    ///
    /// On success the native side writes a string array it allocated into
    /// `feature_names` and its length into `feature_count`; the caller
    /// releases it, normally by wrapping it in
    /// [`crate::marshal::NativeStringArray`].
    pub unsafe fn get_model_used_features_names(
        &self,
        model: *mut ModelCalcerHandle,
        feature_names: *mut *mut *mut c_char,
        feature_count: *mut usize,
    ) -> bool {
        match self.symbols.get_model_used_features_names {
            Some(f) => f(model, feature_names, feature_count),
            None => false,
        }
    }

    /// `GetModelInfoValue`. Sentinel: null.
    ///
    /// The returned string remains owned by the native library — copy it,
    /// never free it.
    pub unsafe fn get_model_info_value(
        &self,
        model: *mut ModelCalcerHandle,
        key: *const c_char,
        key_size: usize,
    ) -> *const c_char {
        match self.symbols.get_model_info_value {
            Some(f) => f(model, key, key_size),
            None => ptr::null(),
        }
    }

    /// `GetCatFeatureIndices`. Sentinel: false.
    pub unsafe fn get_cat_feature_indices(
        &self,
        model: *mut ModelCalcerHandle,
        indices: *mut *mut usize,
        count: *mut usize,
    ) -> bool {
        match self.symbols.get_cat_feature_indices {
            Some(f) => f(model, indices, count),
            None => false,
        }
    }

    /// `GetFloatFeatureIndices`. Sentinel: false.
    pub unsafe fn get_float_feature_indices(
        &self,
        model: *mut ModelCalcerHandle,
        indices: *mut *mut usize,
        count: *mut usize,
    ) -> bool {
        match self.symbols.get_float_feature_indices {
            Some(f) => f(model, indices, count),
            None => false,
        }
    }

    /// Copy of the most recent native error text.
    ///
    /// Empty when no error has been recorded or the error accessor itself
    /// is unresolved. The text reflects the last failing call on the
    /// calling thread only — read it immediately after a failure, before
    /// any other native call.
    pub fn last_error(&self) -> String {
        // Safety: no argument memory involved; the native-owned string is
        // copied before any further native call can invalidate it.
        unsafe {
            let text = self.get_error_string();
            if text.is_null() {
                String::new()
            } else {
                CStr::from_ptr(text).to_string_lossy().into_owned()
            }
        }
    }
}

static GLOBAL_BRIDGE: OnceCell<ModelBridge> = OnceCell::new();

/// Install the process-wide bridge.
///
/// A single explicit initialization step: the first call installs the
/// bridge and returns it; any later call fails with
/// [`BridgeError::AlreadyInitialized`]. The one-time cell publishes the
/// table to every thread, so wrapper calls anywhere in the process observe
/// a fully populated registry.
pub fn init(bridge: ModelBridge) -> BridgeResult<&'static ModelBridge> {
    let mut fresh = false;
    let installed = GLOBAL_BRIDGE.get_or_init(|| {
        fresh = true;
        bridge
    });
    if fresh {
        Ok(installed)
    } else {
        Err(BridgeError::AlreadyInitialized)
    }
}

/// The process-wide bridge, if [`init`] has run.
pub fn global() -> Option<&'static ModelBridge> {
    GLOBAL_BRIDGE.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_bridge() -> ModelBridge {
        ModelBridge::from_table(SymbolTable::new())
    }

    #[test]
    fn test_unset_slots_report_missing() {
        let bridge = empty_bridge();
        assert!(!bridge.is_complete());
        assert_eq!(bridge.missing_symbols().len(), SymbolTable::SLOT_COUNT);
    }

    #[test]
    fn test_sentinels_without_touching_arguments() {
        let bridge = empty_bridge();
        // Null and garbage-free arguments throughout: an unset slot must
        // return its sentinel without a single memory access.
        unsafe {
            assert!(bridge.get_error_string().is_null());
            assert!(bridge.model_calcer_create().is_null());
            bridge.model_calcer_delete(ptr::null_mut());
            assert!(!bridge.load_full_model_from_buffer(ptr::null_mut(), ptr::null(), 0));
            assert!(!bridge.calc_model_prediction_single(
                ptr::null_mut(),
                ptr::null(),
                0,
                ptr::null(),
                0,
                ptr::null_mut(),
                0
            ));
            assert!(!bridge.calc_model_prediction(
                ptr::null_mut(),
                0,
                ptr::null(),
                0,
                ptr::null(),
                0,
                ptr::null_mut(),
                0
            ));
            assert_eq!(bridge.get_float_features_count(ptr::null_mut()), 0);
            assert_eq!(bridge.get_cat_features_count(ptr::null_mut()), 0);
            assert_eq!(bridge.get_dimensions_count(ptr::null_mut()), 0);
            assert!(!bridge.set_prediction_type_string(ptr::null_mut(), ptr::null()));
            assert!(!bridge.get_model_used_features_names(
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut()
            ));
            assert!(bridge
                .get_model_info_value(ptr::null_mut(), ptr::null(), 0)
                .is_null());
            assert!(!bridge.get_cat_feature_indices(
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut()
            ));
            assert!(!bridge.get_float_feature_indices(
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut()
            ));
        }
    }

    #[test]
    fn test_last_error_empty_when_unresolved() {
        let bridge = empty_bridge();
        assert_eq!(bridge.last_error(), "");
    }

    #[test]
    fn test_partial_table() {
        unsafe extern "C" fn forty_two(_: *mut ModelCalcerHandle) -> usize {
            42
        }

        let mut table = SymbolTable::new();
        unsafe {
            table.set_get_dimensions_count(forty_two as *const ());
        }
        let bridge = ModelBridge::from_table(table);

        assert!(!bridge.is_complete());
        unsafe {
            assert_eq!(bridge.get_dimensions_count(ptr::null_mut()), 42);
            // Neighboring slots are still sentinels.
            assert_eq!(bridge.get_float_features_count(ptr::null_mut()), 0);
        }
    }
}
