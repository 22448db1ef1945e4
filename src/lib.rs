//! Catbridge - Runtime-Bound CatBoost Inference Bridge
//!
//! Calls the CatBoost model inference C library without a link-time
//! dependency: every entry point is resolved to a function pointer at
//! startup and dispatched through a typed wrapper that checks resolution
//! first. The inference math belongs entirely to the native library; this
//! crate owns the boundary discipline — the symbol table, the dispatch
//! layer, and the marshaling of variable-length string and float arrays
//! across the ABI.
//!
//! # Architecture
//!
//! ```text
//! Host code (features, model buffers)
//!       │
//!       ▼
//! Model (RAII handle, safe calls)
//!       │
//!       ▼
//! ModelBridge (presence check + dispatch)
//!       │
//!       ▼
//! SymbolTable ◄── NativeLibrary (libloading, fail-fast resolve)
//!       │              or raw addresses from the embedder
//!       ▼
//! libcatboostmodel entry points
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use catbridge::{Model, ModelBridge, PredictionType};
//!
//! # fn main() -> Result<(), catbridge::BridgeError> {
//! let bridge = Arc::new(ModelBridge::load_default()?);
//! let mut model = Model::from_file(Arc::clone(&bridge), "ranker.cbm")?;
//! model.set_prediction_type(PredictionType::Probability)?;
//!
//! let scores = model.predict_single(&[0.5, 1.2, 3.0], &["music", "weekend"])?;
//! println!("p = {:.4}", scores[0]);
//! # Ok(())
//! # }
//! ```
//!
//! Failure is always a return value: unresolved entry points answer with
//! their sentinel at the raw layer and `BridgeError::SymbolUnset` at the
//! safe layer; native failures carry the text from the error surface.

#![warn(clippy::all)]

pub mod bridge;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod model;
pub mod symbols;

pub use bridge::{global, init, ModelBridge};
pub use error::{BridgeError, BridgeResult};
pub use loader::{find_library, NativeLibrary, DEFAULT_LIBRARY_NAME, LIBRARY_PATH_ENV};
pub use marshal::{
    CStringArray, CStringMatrix, FloatMatrix, NativeIndexArray, NativeStringArray,
};
pub use model::{Model, PredictionType};
pub use symbols::{ModelCalcerHandle, SymbolTable, SYMBOL_NAMES};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
