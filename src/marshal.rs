//! Array Marshaling
//!
//! The native API exchanges variable-length collections in three shapes:
//! one-dimensional string arrays (`char **`), two-dimensional string arrays
//! (`char ***`) and two-dimensional float arrays (`float **`). The types
//! here own boundary-compatible copies of that data and record their own
//! shape, so allocation and release are paired structurally: dropping the
//! container releases exactly what was allocated, with no caller-tracked
//! sizes to replay.
//!
//! Two directions, two ownership stories:
//!
//! - Caller → native: [`CStringArray`], [`CStringMatrix`] and
//!   [`FloatMatrix`] duplicate the source data element by element. The
//!   source may be freed or reused as soon as construction returns; the
//!   raw pointers stay valid until the container is dropped.
//! - Native → caller: [`NativeStringArray`] and [`NativeIndexArray`] take
//!   over arrays the library allocated and free them through the native
//!   allocator on drop. Strings the library retains ownership of (error
//!   text, model info values) are never wrapped in a guard — the safe
//!   layer copies them out instead, so there is no way to free a borrowed
//!   string by mistake.
//!
//! None of these types inspect the equal-row-length invariant of feature
//! matrices; that is enforced by the prediction layer before any call.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use crate::error::BridgeResult;

/// A one-dimensional `char **` array of nul-terminated string copies.
pub struct CStringArray {
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CStringArray {
    /// Duplicate `items` into boundary form.
    ///
    /// Fails if any item contains an interior nul byte.
    pub fn new<S: AsRef<str>>(items: &[S]) -> BridgeResult<Self> {
        let mut strings = Vec::with_capacity(items.len());
        for item in items {
            strings.push(CString::new(item.as_ref())?);
        }
        let ptrs = strings.iter().map(|s| s.as_ptr()).collect();
        Ok(Self { strings, ptrs })
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Element at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.strings.get(index).map(|s| s.as_c_str())
    }

    /// Pointer suitable for a `const char **` parameter.
    ///
    /// Valid for [`len`](Self::len) elements, until `self` is dropped.
    /// The element pointers target heap buffers, so moving the container
    /// does not invalidate them.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }
}

/// A two-dimensional `char ***` array: one [`CStringArray`] per document.
///
/// Rows are independently sized; the prediction layer, not this type,
/// decides whether ragged rows are acceptable.
pub struct CStringMatrix {
    rows: Vec<CStringArray>,
    row_ptrs: Vec<*const *const c_char>,
}

impl CStringMatrix {
    /// Duplicate `rows` into boundary form.
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> BridgeResult<Self> {
        let mut owned = Vec::with_capacity(rows.len());
        for row in rows {
            owned.push(CStringArray::new(row)?);
        }
        // Collected only once every row is in place; each entry targets a
        // row's heap-allocated pointer block, stable across moves.
        let row_ptrs = owned.iter().map(|row| row.as_ptr()).collect();
        Ok(Self {
            rows: owned,
            row_ptrs,
        })
    }

    /// Number of documents (outer length).
    pub fn doc_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `index`, if in bounds.
    pub fn row(&self, index: usize) -> Option<&CStringArray> {
        self.rows.get(index)
    }

    /// Pointer suitable for a `const char ***` parameter.
    pub fn as_ptr(&self) -> *const *const *const c_char {
        self.row_ptrs.as_ptr()
    }
}

/// A two-dimensional `float **` array of 32-bit float rows.
pub struct FloatMatrix {
    rows: Vec<Vec<f32>>,
    row_ptrs: Vec<*const f32>,
}

impl FloatMatrix {
    /// Duplicate `rows` into boundary form.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let owned: Vec<Vec<f32>> = rows.to_vec();
        let row_ptrs = owned.iter().map(|row| row.as_ptr()).collect();
        Self {
            rows: owned,
            row_ptrs,
        }
    }

    /// Number of documents (outer length).
    pub fn doc_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `index`, if in bounds.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(|row| row.as_slice())
    }

    /// Pointer suitable for a `const float **` parameter.
    pub fn as_ptr(&self) -> *const *const f32 {
        self.row_ptrs.as_ptr()
    }
}

/// A string array allocated by the native library and owned by the caller.
///
/// Returned by the used-feature-names query. Dropping the guard frees each
/// string, then the array itself, through the native allocator — once, with
/// the count recorded at hand-off.
pub struct NativeStringArray {
    ptr: *mut *mut c_char,
    len: usize,
}

impl NativeStringArray {
    /// Take ownership of a native-allocated `char **` of `len` entries.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or an array of exactly `len` nul-terminated
    /// strings, all allocated by the native library's allocator, and not
    /// released elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut *mut c_char, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        if self.ptr.is_null() {
            0
        } else {
            self.len
        }
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, if in bounds and non-null.
    pub fn get(&self, index: usize) -> Option<&CStr> {
        if index >= self.len() {
            return None;
        }
        // Safety: within bounds of the array we own; element nullness is
        // checked before dereferencing.
        unsafe {
            let element = *self.ptr.add(index);
            if element.is_null() {
                None
            } else {
                Some(CStr::from_ptr(element))
            }
        }
    }

    /// Copy all strings out, lossily converting non-UTF-8 bytes.
    pub fn to_vec(&self) -> Vec<String> {
        (0..self.len())
            .filter_map(|i| self.get(i))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

impl Drop for NativeStringArray {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // Safety: we own the array and its elements; each is freed exactly
        // once, elements before the block that holds them.
        unsafe {
            for i in 0..self.len {
                let element = *self.ptr.add(i);
                if !element.is_null() {
                    libc::free(element as *mut c_void);
                }
            }
            libc::free(self.ptr as *mut c_void);
        }
    }
}

/// An index array allocated by the native library and owned by the caller.
///
/// Returned by the feature-index queries; freed through the native
/// allocator on drop.
pub struct NativeIndexArray {
    ptr: *mut usize,
    len: usize,
}

impl NativeIndexArray {
    /// Take ownership of a native-allocated index buffer of `len` entries.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a buffer of exactly `len` indices allocated by
    /// the native library's allocator, and not released elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut usize, len: usize) -> Self {
        Self { ptr, len }
    }

    /// The indices as a slice.
    pub fn as_slice(&self) -> &[usize] {
        if self.ptr.is_null() || self.len == 0 {
            return &[];
        }
        // Safety: non-null buffer of exactly `len` entries, owned by us.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Copy the indices out.
    pub fn to_vec(&self) -> Vec<usize> {
        self.as_slice().to_vec()
    }
}

impl Drop for NativeIndexArray {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // Safety: we own the buffer; freed exactly once.
            unsafe { libc::free(self.ptr as *mut c_void) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_cstring_array_round_trip() {
        let array = CStringArray::new(&["alpha", "beta", ""]).unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0).unwrap().to_str().unwrap(), "alpha");
        assert_eq!(array.get(1).unwrap().to_str().unwrap(), "beta");
        assert_eq!(array.get(2).unwrap().to_str().unwrap(), "");
        assert!(array.get(3).is_none());
    }

    #[test]
    fn test_cstring_array_rejects_interior_nul() {
        assert!(CStringArray::new(&["ok", "bad\0bad"]).is_err());
    }

    #[test]
    fn test_cstring_array_pointers_match_contents() {
        let array = CStringArray::new(&["x", "yz"]).unwrap();
        let outer = array.as_ptr();
        unsafe {
            let first = CStr::from_ptr(*outer);
            let second = CStr::from_ptr(*outer.add(1));
            assert_eq!(first.to_str().unwrap(), "x");
            assert_eq!(second.to_str().unwrap(), "yz");
        }
    }

    #[test]
    fn test_matrix_round_trip_ascii() {
        let rows = vec![
            vec!["cat".to_string(), "dog".to_string()],
            vec!["fish".to_string(), "bird".to_string()],
        ];
        let matrix = CStringMatrix::from_rows(&rows).unwrap();
        assert_eq!(matrix.doc_count(), 2);
        for (i, row) in rows.iter().enumerate() {
            for (j, expected) in row.iter().enumerate() {
                let got = matrix.row(i).unwrap().get(j).unwrap();
                assert_eq!(got.to_str().unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_matrix_duplicates_rather_than_aliases() {
        let mut rows = vec![vec!["original".to_string()]];
        let matrix = CStringMatrix::from_rows(&rows).unwrap();

        rows[0][0].clear();
        rows[0][0].push_str("mutated");

        assert_eq!(
            matrix.row(0).unwrap().get(0).unwrap().to_str().unwrap(),
            "original"
        );
    }

    #[test]
    fn test_matrix_pointers_reach_every_element() {
        let rows = vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
        ];
        let matrix = CStringMatrix::from_rows(&rows).unwrap();
        let outer = matrix.as_ptr();
        unsafe {
            let row1 = *outer.add(1);
            assert_eq!(CStr::from_ptr(*row1).to_str().unwrap(), "b");
            assert_eq!(CStr::from_ptr(*row1.add(1)).to_str().unwrap(), "c");
        }
    }

    #[test]
    fn test_float_matrix_round_trip() {
        let rows = vec![vec![1.0f32, 2.5], vec![-3.0, 0.0]];
        let matrix = FloatMatrix::from_rows(&rows);
        assert_eq!(matrix.doc_count(), 2);
        assert_eq!(matrix.row(0).unwrap(), &[1.0, 2.5]);
        unsafe {
            let row1 = *matrix.as_ptr().add(1);
            assert_eq!(*row1, -3.0);
            assert_eq!(*row1.add(1), 0.0);
        }
    }

    #[test]
    fn test_float_matrix_is_a_copy() {
        let mut rows = vec![vec![7.0f32]];
        let matrix = FloatMatrix::from_rows(&rows);
        rows[0][0] = 9.0;
        assert_eq!(matrix.row(0).unwrap(), &[7.0]);
    }

    #[test]
    fn test_empty_allocations() {
        // n = 0 for all three kinds builds and drops cleanly.
        let strings = CStringArray::new::<&str>(&[]).unwrap();
        assert!(strings.is_empty());

        let matrix = CStringMatrix::from_rows::<&str>(&[]).unwrap();
        assert_eq!(matrix.doc_count(), 0);

        let floats = FloatMatrix::from_rows(&[]);
        assert!(floats.is_empty());
    }

    #[test]
    fn test_matrix_with_empty_rows() {
        let matrix = CStringMatrix::from_rows(&[Vec::<String>::new(), Vec::new()]).unwrap();
        assert_eq!(matrix.doc_count(), 2);
        assert!(matrix.row(0).unwrap().is_empty());
    }

    // Simulates the native side: allocate through libc so the guards can
    // release through the same allocator.
    unsafe fn native_string(s: &str) -> *mut c_char {
        let buf = libc::malloc(s.len() + 1) as *mut c_char;
        ptr::copy_nonoverlapping(s.as_ptr() as *const c_char, buf, s.len());
        *buf.add(s.len()) = 0;
        buf
    }

    #[test]
    fn test_native_string_array_reads_and_frees() {
        let guard = unsafe {
            let array = libc::malloc(2 * std::mem::size_of::<*mut c_char>()) as *mut *mut c_char;
            *array = native_string("f0");
            *array.add(1) = native_string("f1");
            NativeStringArray::from_raw(array, 2)
        };
        assert_eq!(guard.len(), 2);
        assert_eq!(guard.to_vec(), vec!["f0".to_string(), "f1".to_string()]);
        // Drop frees both strings and the array through libc.
    }

    #[test]
    fn test_native_string_array_null_is_empty() {
        let guard = unsafe { NativeStringArray::from_raw(ptr::null_mut(), 5) };
        assert!(guard.is_empty());
        assert!(guard.get(0).is_none());
        assert!(guard.to_vec().is_empty());
    }

    #[test]
    fn test_native_index_array_reads_and_frees() {
        let guard = unsafe {
            let buf = libc::malloc(3 * std::mem::size_of::<usize>()) as *mut usize;
            *buf = 4;
            *buf.add(1) = 7;
            *buf.add(2) = 9;
            NativeIndexArray::from_raw(buf, 3)
        };
        assert_eq!(guard.as_slice(), &[4, 7, 9]);
        assert_eq!(guard.to_vec(), vec![4, 7, 9]);
    }

    #[test]
    fn test_native_index_array_null_is_empty() {
        let guard = unsafe { NativeIndexArray::from_raw(ptr::null_mut(), 3) };
        assert!(guard.is_empty());
        assert_eq!(guard.as_slice(), &[] as &[usize]);
    }
}
