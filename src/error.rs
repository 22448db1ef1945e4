//! Bridge Error Types
//!
//! Every operation in this crate communicates failure through its return
//! value; nothing panics across the boundary.

use thiserror::Error;

/// Errors surfaced by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The shared library could not be opened.
    #[error("Failed to load native library: {0}")]
    LibraryLoad(String),

    /// The shared library was not found in any search path.
    #[error("Native library '{0}' not found in search paths")]
    LibraryNotFound(String),

    /// One or more expected entry points are absent from the library.
    ///
    /// Produced by the fail-fast loader; lists every missing symbol at
    /// once so a partial deployment is diagnosed in a single pass.
    #[error("Library '{library}' is missing required symbols: {}", .symbols.join(", "))]
    MissingSymbols {
        library: String,
        symbols: Vec<&'static str>,
    },

    /// A wrapper was invoked while its registry slot is unset.
    #[error("Entry point '{0}' is not registered")]
    SymbolUnset(&'static str),

    /// The native call reported failure.
    ///
    /// `message` holds the text from the native error surface, captured
    /// immediately after the failing call.
    #[error("{op} failed: {message}")]
    Native { op: &'static str, message: String },

    /// A caller-supplied string contains an interior nul byte and cannot
    /// cross the boundary.
    #[error("Invalid string argument: {0}")]
    InvalidString(#[from] std::ffi::NulError),

    /// A feature-matrix row does not match the established row width.
    #[error("Row {index} has length {got}, expected {expected}")]
    RowLengthMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Float and categorical matrices disagree on document count.
    #[error("Float matrix has {float_docs} row(s) but categorical matrix has {cat_docs}")]
    DocCountMismatch { float_docs: usize, cat_docs: usize },

    /// Reading a model file failed.
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    /// The process-wide bridge was initialized twice.
    #[error("Bridge already initialized")]
    AlreadyInitialized,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
