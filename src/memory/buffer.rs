//! Typed byte views over caller-owned buffers.
//!
//! A view pairs a byte slice with the [`DataType`] its elements are
//! interpreted as. Collectives check the element type of the send and
//! receive views against each other and compute every offset in elements,
//! so no caller ever does raw pointer arithmetic.

use crate::error::{CollError, Result};
use crate::types::{CollElement, DataType};

// ── BufferView ───────────────────────────────────────────────────────

/// Read-only view: (pointer, length, element type).
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
    dtype: DataType,
}

impl<'a> BufferView<'a> {
    /// View a typed slice.
    pub fn of<T: CollElement>(data: &'a [T]) -> Self {
        // SAFETY: `CollElement` is sealed to padding-free primitives, so every
        // byte of `data` is initialized and the length cannot overflow.
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
        };
        Self {
            bytes,
            dtype: T::DTYPE,
        }
    }

    /// View raw bytes as elements of `dtype`.
    ///
    /// Fails if the byte length is not a whole number of elements.
    pub fn from_bytes(bytes: &'a [u8], dtype: DataType) -> Result<Self> {
        check_whole_elements(bytes.len(), dtype)?;
        Ok(Self { bytes, dtype })
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Size of the buffer in bytes.
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Number of whole elements in the view.
    pub fn len_elems(&self) -> usize {
        self.bytes.len() / self.dtype.size_in_bytes()
    }
}

// ── BufferViewMut ────────────────────────────────────────────────────

/// Writable view: (pointer, length, element type).
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    bytes: &'a mut [u8],
    dtype: DataType,
}

impl<'a> BufferViewMut<'a> {
    /// View a typed mutable slice.
    pub fn of<T: CollElement>(data: &'a mut [T]) -> Self {
        let len = std::mem::size_of_val(data);
        // SAFETY: as in `BufferView::of`; additionally every byte pattern is a
        // valid `T`, so writes through the byte view cannot create invalid values.
        let bytes = unsafe { std::slice::from_raw_parts_mut(data.as_mut_ptr().cast::<u8>(), len) };
        Self {
            bytes,
            dtype: T::DTYPE,
        }
    }

    /// View raw bytes as elements of `dtype`.
    pub fn from_bytes(bytes: &'a mut [u8], dtype: DataType) -> Result<Self> {
        check_whole_elements(bytes.len(), dtype)?;
        Ok(Self { bytes, dtype })
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn len_elems(&self) -> usize {
        self.bytes.len() / self.dtype.size_in_bytes()
    }
}

// ── SendSource ───────────────────────────────────────────────────────

/// Where a collective takes its outgoing data from.
#[derive(Debug, Clone, Copy)]
pub enum SendSource<'a> {
    /// A separate send buffer.
    Buffer(BufferView<'a>),
    /// The receive buffer doubles as the send buffer. The outgoing data is
    /// copied to scratch space before anything is published.
    InPlace,
}

impl<'a> SendSource<'a> {
    pub fn is_in_place(&self) -> bool {
        matches!(self, SendSource::InPlace)
    }
}

impl<'a> From<BufferView<'a>> for SendSource<'a> {
    fn from(view: BufferView<'a>) -> Self {
        SendSource::Buffer(view)
    }
}

fn check_whole_elements(len: usize, dtype: DataType) -> Result<()> {
    let elem = dtype.size_in_bytes();
    if len % elem != 0 {
        return Err(CollError::BufferSizeMismatch {
            expected: len.next_multiple_of(elem),
            actual: len,
        });
    }
    Ok(())
}
