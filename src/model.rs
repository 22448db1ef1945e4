//! Safe Model Layer
//!
//! [`Model`] owns one opaque native handle for its whole lifetime: created
//! through the bridge, released through `ModelCalcerDelete` on every exit
//! path via Drop. Prediction and query methods marshal arguments, dispatch
//! through [`ModelBridge`], and surface native failures as
//! [`BridgeError::Native`] with the error-surface text captured
//! immediately after the failing call.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::bridge::ModelBridge;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{
    CStringArray, CStringMatrix, FloatMatrix, NativeIndexArray, NativeStringArray,
};
use crate::symbols::ModelCalcerHandle;

/// Output mode for predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionType {
    /// Raw formula value (the default).
    RawFormulaVal,
    /// Exponent of the raw value.
    Exponent,
    /// Probability (binary classification).
    Probability,
    /// Class label index.
    Class,
}

impl PredictionType {
    /// The mode string the native API expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionType::RawFormulaVal => "RawFormulaVal",
            PredictionType::Exponent => "Exponent",
            PredictionType::Probability => "Probability",
            PredictionType::Class => "Class",
        }
    }
}

impl std::fmt::Display for PredictionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One loaded model instance.
///
/// Holds its handle exclusively — the bridge never aliases or copies it.
/// `Send` but deliberately not `Sync`: whether two threads may predict on
/// the same handle concurrently is the native library's contract, and it
/// is treated as single-writer here.
pub struct Model {
    handle: NonNull<ModelCalcerHandle>,
    bridge: Arc<ModelBridge>,
}

// Safety: the handle is exclusively owned and every native call on it goes
// through &self/&mut self on a single thread at a time (no Sync).
unsafe impl Send for Model {}

/// Classify a failed operation: unresolved entry point, or a native
/// failure with its diagnostic text read off the error surface right away.
fn op_error(bridge: &ModelBridge, op: &'static str) -> BridgeError {
    if bridge.missing_symbols().contains(&op) {
        BridgeError::SymbolUnset(op)
    } else {
        BridgeError::Native {
            op,
            message: bridge.last_error(),
        }
    }
}

impl Model {
    /// Create an empty model handle.
    ///
    /// The handle is unusable for prediction until a model buffer is
    /// loaded into it.
    pub fn new(bridge: Arc<ModelBridge>) -> BridgeResult<Self> {
        // Safety: no argument memory; the returned handle is checked.
        let raw = unsafe { bridge.model_calcer_create() };
        let handle =
            NonNull::new(raw).ok_or_else(|| op_error(&bridge, "ModelCalcerCreate"))?;
        Ok(Self { handle, bridge })
    }

    /// Create a handle and load a serialized model from memory.
    pub fn from_buffer(bridge: Arc<ModelBridge>, buffer: &[u8]) -> BridgeResult<Self> {
        let mut model = Self::new(bridge)?;
        model.load_buffer(buffer)?;
        Ok(model)
    }

    /// Create a handle and load a serialized model from a file.
    pub fn from_file(bridge: Arc<ModelBridge>, path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path)?;
        log::info!(
            "Loading model from {} ({} bytes)",
            path.display(),
            buffer.len()
        );
        Self::from_buffer(bridge, &buffer)
    }

    /// Load a serialized model into this handle.
    pub fn load_buffer(&mut self, buffer: &[u8]) -> BridgeResult<()> {
        // Safety: buffer pointer/length describe a live slice; the native
        // side reads it only for the duration of the call.
        let ok = unsafe {
            self.bridge.load_full_model_from_buffer(
                self.handle.as_ptr(),
                buffer.as_ptr() as *const c_void,
                buffer.len(),
            )
        };
        if ok {
            Ok(())
        } else {
            Err(op_error(&self.bridge, "LoadFullModelFromBuffer"))
        }
    }

    /// The bridge this model dispatches through.
    pub fn bridge(&self) -> &Arc<ModelBridge> {
        &self.bridge
    }

    /// Number of float features the loaded model expects.
    pub fn float_features_count(&self) -> usize {
        // Safety: live handle, no other argument memory.
        unsafe { self.bridge.get_float_features_count(self.handle.as_ptr()) }
    }

    /// Number of categorical features the loaded model expects.
    pub fn cat_features_count(&self) -> usize {
        // Safety: live handle, no other argument memory.
        unsafe { self.bridge.get_cat_features_count(self.handle.as_ptr()) }
    }

    /// Number of output values per document.
    pub fn dimensions_count(&self) -> usize {
        // Safety: live handle, no other argument memory.
        unsafe { self.bridge.get_dimensions_count(self.handle.as_ptr()) }
    }

    /// Select the output mode for subsequent predictions.
    pub fn set_prediction_type(&mut self, prediction_type: PredictionType) -> BridgeResult<()> {
        let mode = CString::new(prediction_type.as_str())?;
        // Safety: live handle and a nul-terminated mode string.
        let ok = unsafe {
            self.bridge
                .set_prediction_type_string(self.handle.as_ptr(), mode.as_ptr())
        };
        if ok {
            Ok(())
        } else {
            Err(op_error(&self.bridge, "SetPredictionTypeString"))
        }
    }

    /// Predict one document.
    ///
    /// Returns `dimensions_count` values. Row widths are the native
    /// library's contract for a single document; they are forwarded as
    /// given.
    pub fn predict_single<S: AsRef<str>>(
        &self,
        float_features: &[f32],
        cat_features: &[S],
    ) -> BridgeResult<Vec<f64>> {
        let cats = CStringArray::new(cat_features)?;
        let mut result = vec![0.0f64; self.dimensions_count()];
        // Safety: the slice and marshaled array outlive the call; result
        // is writable for its full length.
        let ok = unsafe {
            self.bridge.calc_model_prediction_single(
                self.handle.as_ptr(),
                float_features.as_ptr(),
                float_features.len(),
                cats.as_ptr(),
                cats.len(),
                result.as_mut_ptr(),
                result.len(),
            )
        };
        if ok {
            Ok(result)
        } else {
            Err(op_error(&self.bridge, "CalcModelPredictionSingle"))
        }
    }

    /// Predict a batch of documents.
    ///
    /// `float_features` and `cat_features` must have one row per document
    /// and equal row lengths within each matrix; the two matrices are
    /// independently sized. Returns `doc_count × dimensions_count` values
    /// in row-major order.
    pub fn predict_batch<S: AsRef<str>>(
        &self,
        float_features: &[Vec<f32>],
        cat_features: &[Vec<S>],
    ) -> BridgeResult<Vec<f64>> {
        let doc_count = float_features.len();
        if cat_features.len() != doc_count {
            return Err(BridgeError::DocCountMismatch {
                float_docs: doc_count,
                cat_docs: cat_features.len(),
            });
        }
        if doc_count == 0 {
            return Ok(Vec::new());
        }

        let float_width = float_features[0].len();
        for (index, row) in float_features.iter().enumerate() {
            if row.len() != float_width {
                return Err(BridgeError::RowLengthMismatch {
                    index,
                    expected: float_width,
                    got: row.len(),
                });
            }
        }
        let cat_width = cat_features[0].len();
        for (index, row) in cat_features.iter().enumerate() {
            if row.len() != cat_width {
                return Err(BridgeError::RowLengthMismatch {
                    index,
                    expected: cat_width,
                    got: row.len(),
                });
            }
        }

        let floats = FloatMatrix::from_rows(float_features);
        let cats = CStringMatrix::from_rows(cat_features)?;
        let mut result = vec![0.0f64; doc_count * self.dimensions_count()];

        // Safety: both matrices outlive the call and hold `doc_count` rows
        // of the stated widths; result is writable for its full length.
        let ok = unsafe {
            self.bridge.calc_model_prediction(
                self.handle.as_ptr(),
                doc_count,
                floats.as_ptr(),
                float_width,
                cats.as_ptr(),
                cat_width,
                result.as_mut_ptr(),
                result.len(),
            )
        };
        if ok {
            Ok(result)
        } else {
            Err(op_error(&self.bridge, "CalcModelPrediction"))
        }
    }

    /// Names of the features the model actually uses.
    pub fn used_feature_names(&self) -> BridgeResult<Vec<String>> {
        let mut names: *mut *mut c_char = ptr::null_mut();
        let mut count: usize = 0;
        // Safety: out-pointers target live locals; on success the native
        // array passes into the guard, which releases it.
        let ok = unsafe {
            self.bridge
                .get_model_used_features_names(self.handle.as_ptr(), &mut names, &mut count)
        };
        if !ok {
            return Err(op_error(&self.bridge, "GetModelUsedFeaturesNames"));
        }
        let guard = unsafe { NativeStringArray::from_raw(names, count) };
        Ok(guard.to_vec())
    }

    /// A metadata value stored in the model, e.g. under `"params"`.
    ///
    /// Returns `None` when the key is absent. The native library owns the
    /// underlying string; this copies it out.
    pub fn model_info_value(&self, key: &str) -> BridgeResult<Option<String>> {
        if self.bridge.missing_symbols().contains(&"GetModelInfoValue") {
            return Err(BridgeError::SymbolUnset("GetModelInfoValue"));
        }
        // Safety: the key is passed as pointer plus length, no terminator
        // required; the returned native-owned string is copied before the
        // next native call.
        let value = unsafe {
            self.bridge.get_model_info_value(
                self.handle.as_ptr(),
                key.as_ptr() as *const c_char,
                key.len(),
            )
        };
        if value.is_null() {
            Ok(None)
        } else {
            let text = unsafe { std::ffi::CStr::from_ptr(value) };
            Ok(Some(text.to_string_lossy().into_owned()))
        }
    }

    /// Positions of categorical features in the model's feature layout.
    pub fn cat_feature_indices(&self) -> BridgeResult<Vec<usize>> {
        let mut indices: *mut usize = ptr::null_mut();
        let mut count: usize = 0;
        // Safety: out-pointers target live locals; ownership of the native
        // buffer passes into the guard.
        let ok = unsafe {
            self.bridge
                .get_cat_feature_indices(self.handle.as_ptr(), &mut indices, &mut count)
        };
        if !ok {
            return Err(op_error(&self.bridge, "GetCatFeatureIndices"));
        }
        let guard = unsafe { NativeIndexArray::from_raw(indices, count) };
        Ok(guard.to_vec())
    }

    /// Positions of float features in the model's feature layout.
    pub fn float_feature_indices(&self) -> BridgeResult<Vec<usize>> {
        let mut indices: *mut usize = ptr::null_mut();
        let mut count: usize = 0;
        // Safety: as above.
        let ok = unsafe {
            self.bridge
                .get_float_feature_indices(self.handle.as_ptr(), &mut indices, &mut count)
        };
        if !ok {
            return Err(op_error(&self.bridge, "GetFloatFeatureIndices"));
        }
        let guard = unsafe { NativeIndexArray::from_raw(indices, count) };
        Ok(guard.to_vec())
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // Safety: the handle was created through this bridge and is not
        // released anywhere else.
        unsafe { self.bridge.model_calcer_delete(self.handle.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_prediction_type_strings() {
        assert_eq!(PredictionType::RawFormulaVal.as_str(), "RawFormulaVal");
        assert_eq!(PredictionType::Probability.to_string(), "Probability");
        assert_eq!(PredictionType::Class.as_str(), "Class");
        assert_eq!(PredictionType::Exponent.as_str(), "Exponent");
    }

    #[test]
    fn test_create_fails_without_entry_point() {
        let bridge = Arc::new(ModelBridge::from_table(SymbolTable::new()));
        match Model::new(bridge) {
            Err(BridgeError::SymbolUnset(name)) => assert_eq!(name, "ModelCalcerCreate"),
            other => panic!("expected SymbolUnset, got {:?}", other.map(|_| ())),
        }
    }

    // Handle-only stub: enough table to construct a Model so the shape
    // checks (which run before any dispatch) can be exercised.
    unsafe extern "C" fn stub_create() -> *mut ModelCalcerHandle {
        NonNull::<ModelCalcerHandle>::dangling().as_ptr()
    }
    unsafe extern "C" fn stub_delete(_: *mut ModelCalcerHandle) {}

    fn handle_only_model() -> Model {
        let mut table = SymbolTable::new();
        unsafe {
            table.set_model_calcer_create(stub_create as *const ());
            table.set_model_calcer_delete(stub_delete as *const ());
        }
        let bridge = Arc::new(ModelBridge::from_table(table));
        match Model::new(bridge) {
            Ok(model) => model,
            Err(e) => panic!("stub create failed: {}", e),
        }
    }

    #[test]
    fn test_batch_rejects_ragged_float_rows() {
        let model = handle_only_model();
        let floats = vec![vec![1.0f32, 2.0], vec![3.0]];
        let cats: Vec<Vec<String>> = vec![Vec::new(), Vec::new()];
        match model.predict_batch(&floats, &cats) {
            Err(BridgeError::RowLengthMismatch { index, expected, got }) => {
                assert_eq!((index, expected, got), (1, 2, 1));
            }
            other => panic!("expected RowLengthMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_batch_rejects_doc_count_mismatch() {
        let model = handle_only_model();
        let floats = vec![vec![1.0f32]];
        let cats: Vec<Vec<String>> = Vec::new();
        assert!(matches!(
            model.predict_batch(&floats, &cats),
            Err(BridgeError::DocCountMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_of_zero_documents_is_empty() {
        let model = handle_only_model();
        let result = model
            .predict_batch::<&str>(&[], &[])
            .expect("empty batch should short-circuit");
        assert!(result.is_empty());
    }

    #[test]
    fn test_unresolved_prediction_is_symbol_unset() {
        let model = handle_only_model();
        match model.predict_single(&[1.0], &["a"]) {
            Err(BridgeError::SymbolUnset(name)) => {
                assert_eq!(name, "CalcModelPredictionSingle");
            }
            other => panic!("expected SymbolUnset, got {:?}", other.map(|_| ())),
        }
    }
}
