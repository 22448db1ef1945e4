//! Symbol Table
//!
//! One function-pointer slot per entry point of the CatBoost model
//! inference C API. Slots start out unset and are populated either by the
//! typed loader (see [`crate::loader::NativeLibrary::resolve`]) or one at a
//! time through the raw-address setters, for embedders that resolve symbol
//! addresses themselves.
//!
//! The table performs no signature validation: a setter trusts that the
//! address it is handed was resolved from the correctly named symbol. That
//! match is an unchecked precondition, which is why every setter is
//! `unsafe`. Reading an unset slot is well defined — the corresponding
//! wrapper returns its failure sentinel (see [`crate::bridge::ModelBridge`]).

use std::mem;
use std::os::raw::{c_char, c_void};

/// Opaque model instance owned by the native library.
///
/// Only ever handled by pointer; the bridge never reads through it.
#[repr(C)]
pub struct ModelCalcerHandle {
    _private: [u8; 0],
}

pub type GetErrorStringFn = unsafe extern "C" fn() -> *const c_char;
pub type ModelCalcerCreateFn = unsafe extern "C" fn() -> *mut ModelCalcerHandle;
pub type ModelCalcerDeleteFn = unsafe extern "C" fn(*mut ModelCalcerHandle);
pub type LoadFullModelFromBufferFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *const c_void, usize) -> bool;
pub type CalcModelPredictionSingleFn = unsafe extern "C" fn(
    *mut ModelCalcerHandle,
    *const f32,
    usize,
    *const *const c_char,
    usize,
    *mut f64,
    usize,
) -> bool;
pub type CalcModelPredictionFn = unsafe extern "C" fn(
    *mut ModelCalcerHandle,
    usize,
    *const *const f32,
    usize,
    *const *const *const c_char,
    usize,
    *mut f64,
    usize,
) -> bool;
pub type GetFloatFeaturesCountFn = unsafe extern "C" fn(*mut ModelCalcerHandle) -> usize;
pub type GetCatFeaturesCountFn = unsafe extern "C" fn(*mut ModelCalcerHandle) -> usize;
pub type GetDimensionsCountFn = unsafe extern "C" fn(*mut ModelCalcerHandle) -> usize;
pub type SetPredictionTypeStringFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *const c_char) -> bool;
pub type GetModelUsedFeaturesNamesFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *mut *mut *mut c_char, *mut usize) -> bool;
pub type GetModelInfoValueFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *const c_char, usize) -> *const c_char;
pub type GetCatFeatureIndicesFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *mut *mut usize, *mut usize) -> bool;
pub type GetFloatFeatureIndicesFn =
    unsafe extern "C" fn(*mut ModelCalcerHandle, *mut *mut usize, *mut usize) -> bool;

/// Function-pointer table for the native entry points.
///
/// A plain value — construct one, populate it, then hand it to
/// [`crate::bridge::ModelBridge`]. After that the table is immutable, which
/// is what makes concurrent wrapper calls registry-safe.
#[derive(Default)]
pub struct SymbolTable {
    pub(crate) get_error_string: Option<GetErrorStringFn>,
    pub(crate) model_calcer_create: Option<ModelCalcerCreateFn>,
    pub(crate) model_calcer_delete: Option<ModelCalcerDeleteFn>,
    pub(crate) load_full_model_from_buffer: Option<LoadFullModelFromBufferFn>,
    pub(crate) calc_model_prediction_single: Option<CalcModelPredictionSingleFn>,
    pub(crate) calc_model_prediction: Option<CalcModelPredictionFn>,
    pub(crate) get_float_features_count: Option<GetFloatFeaturesCountFn>,
    pub(crate) get_cat_features_count: Option<GetCatFeaturesCountFn>,
    pub(crate) get_dimensions_count: Option<GetDimensionsCountFn>,
    pub(crate) set_prediction_type_string: Option<SetPredictionTypeStringFn>,
    pub(crate) get_model_used_features_names: Option<GetModelUsedFeaturesNamesFn>,
    pub(crate) get_model_info_value: Option<GetModelInfoValueFn>,
    pub(crate) get_cat_feature_indices: Option<GetCatFeatureIndicesFn>,
    pub(crate) get_float_feature_indices: Option<GetFloatFeatureIndicesFn>,
}

/// Native symbol names, in table order.
pub const SYMBOL_NAMES: [&str; SymbolTable::SLOT_COUNT] = [
    "GetErrorString",
    "ModelCalcerCreate",
    "ModelCalcerDelete",
    "LoadFullModelFromBuffer",
    "CalcModelPredictionSingle",
    "CalcModelPrediction",
    "GetFloatFeaturesCount",
    "GetCatFeaturesCount",
    "GetDimensionsCount",
    "SetPredictionTypeString",
    "GetModelUsedFeaturesNames",
    "GetModelInfoValue",
    "GetCatFeatureIndices",
    "GetFloatFeatureIndices",
];

/// Convert a raw address into a typed function pointer slot.
///
/// Null means "absent", anything else is trusted verbatim.
unsafe fn slot<F: Copy>(addr: *const ()) -> Option<F> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const ()>());
    if addr.is_null() {
        None
    } else {
        Some(mem::transmute_copy(&addr))
    }
}

impl SymbolTable {
    /// Number of entry points the table tracks.
    pub const SLOT_COUNT: usize = 14;

    /// Create a table with every slot unset.
    pub fn new() -> Self {
        Self::default()
    }

    // Raw-address setters, one per entry point. Each is `unsafe` because
    // the address is transmuted to the slot's signature without any check;
    // passing an address resolved from a differently named symbol is
    // undefined behavior at the first dispatched call. Passing null clears
    // the slot; setting an already-set slot silently overwrites it.

    /// Set the `GetErrorString` slot from a raw address.
    pub unsafe fn set_get_error_string(&mut self, addr: *const ()) {
        self.get_error_string = slot(addr);
    }

    /// Set the `ModelCalcerCreate` slot from a raw address.
    pub unsafe fn set_model_calcer_create(&mut self, addr: *const ()) {
        self.model_calcer_create = slot(addr);
    }

    /// Set the `ModelCalcerDelete` slot from a raw address.
    pub unsafe fn set_model_calcer_delete(&mut self, addr: *const ()) {
        self.model_calcer_delete = slot(addr);
    }

    /// Set the `LoadFullModelFromBuffer` slot from a raw address.
    pub unsafe fn set_load_full_model_from_buffer(&mut self, addr: *const ()) {
        self.load_full_model_from_buffer = slot(addr);
    }

    /// Set the `CalcModelPredictionSingle` slot from a raw address.
    pub unsafe fn set_calc_model_prediction_single(&mut self, addr: *const ()) {
        self.calc_model_prediction_single = slot(addr);
    }

    /// Set the `CalcModelPrediction` slot from a raw address.
    pub unsafe fn set_calc_model_prediction(&mut self, addr: *const ()) {
        self.calc_model_prediction = slot(addr);
    }

    /// Set the `GetFloatFeaturesCount` slot from a raw address.
    pub unsafe fn set_get_float_features_count(&mut self, addr: *const ()) {
        self.get_float_features_count = slot(addr);
    }

    /// Set the `GetCatFeaturesCount` slot from a raw address.
    pub unsafe fn set_get_cat_features_count(&mut self, addr: *const ()) {
        self.get_cat_features_count = slot(addr);
    }

    /// Set the `GetDimensionsCount` slot from a raw address.
    pub unsafe fn set_get_dimensions_count(&mut self, addr: *const ()) {
        self.get_dimensions_count = slot(addr);
    }

    /// Set the `SetPredictionTypeString` slot from a raw address.
    pub unsafe fn set_set_prediction_type_string(&mut self, addr: *const ()) {
        self.set_prediction_type_string = slot(addr);
    }

    /// Set the `GetModelUsedFeaturesNames` slot from a raw address.
    pub unsafe fn set_get_model_used_features_names(&mut self, addr: *const ()) {
        self.get_model_used_features_names = slot(addr);
    }

    /// Set the `GetModelInfoValue` slot from a raw address.
    pub unsafe fn set_get_model_info_value(&mut self, addr: *const ()) {
        self.get_model_info_value = slot(addr);
    }

    /// Set the `GetCatFeatureIndices` slot from a raw address.
    pub unsafe fn set_get_cat_feature_indices(&mut self, addr: *const ()) {
        self.get_cat_feature_indices = slot(addr);
    }

    /// Set the `GetFloatFeatureIndices` slot from a raw address.
    pub unsafe fn set_get_float_feature_indices(&mut self, addr: *const ()) {
        self.get_float_feature_indices = slot(addr);
    }

    fn slot_states(&self) -> [bool; Self::SLOT_COUNT] {
        [
            self.get_error_string.is_some(),
            self.model_calcer_create.is_some(),
            self.model_calcer_delete.is_some(),
            self.load_full_model_from_buffer.is_some(),
            self.calc_model_prediction_single.is_some(),
            self.calc_model_prediction.is_some(),
            self.get_float_features_count.is_some(),
            self.get_cat_features_count.is_some(),
            self.get_dimensions_count.is_some(),
            self.set_prediction_type_string.is_some(),
            self.get_model_used_features_names.is_some(),
            self.get_model_info_value.is_some(),
            self.get_cat_feature_indices.is_some(),
            self.get_float_feature_indices.is_some(),
        ]
    }

    /// Number of slots currently set.
    pub fn resolved_count(&self) -> usize {
        self.slot_states().iter().filter(|set| **set).count()
    }

    /// Whether every slot is set.
    pub fn is_complete(&self) -> bool {
        self.resolved_count() == Self::SLOT_COUNT
    }

    /// Names of the slots still unset, in table order.
    pub fn missing(&self) -> Vec<&'static str> {
        self.slot_states()
            .iter()
            .zip(SYMBOL_NAMES.iter())
            .filter(|(set, _)| !**set)
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_char;
    use std::ptr;

    unsafe extern "C" fn stub_error_string() -> *const c_char {
        ptr::null()
    }

    unsafe extern "C" fn stub_create() -> *mut ModelCalcerHandle {
        ptr::null_mut()
    }

    #[test]
    fn test_empty_table() {
        let table = SymbolTable::new();
        assert_eq!(table.resolved_count(), 0);
        assert!(!table.is_complete());
        assert_eq!(table.missing().len(), SymbolTable::SLOT_COUNT);
        assert_eq!(table.missing()[0], "GetErrorString");
    }

    #[test]
    fn test_set_and_clear_slot() {
        let mut table = SymbolTable::new();
        unsafe {
            table.set_get_error_string(stub_error_string as *const ());
        }
        assert_eq!(table.resolved_count(), 1);
        assert!(!table.missing().contains(&"GetErrorString"));

        // Null clears back to the absent state.
        unsafe {
            table.set_get_error_string(ptr::null());
        }
        assert_eq!(table.resolved_count(), 0);
    }

    #[test]
    fn test_overwrite_is_silent() {
        let mut table = SymbolTable::new();
        unsafe {
            table.set_model_calcer_create(stub_create as *const ());
            table.set_model_calcer_create(stub_create as *const ());
        }
        assert_eq!(table.resolved_count(), 1);
    }

    #[test]
    fn test_symbol_names_cover_all_slots() {
        assert_eq!(SYMBOL_NAMES.len(), SymbolTable::SLOT_COUNT);
    }
}
