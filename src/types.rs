/// Rank of a participant in a communicator (0-indexed).
pub type Rank = usize;

/// Process-wide unique communicator identifier.
pub type CommId = u64;

/// Element types supported by the collectives.
///
/// Every collective requires the send and receive descriptors to carry the
/// same `DataType`; there is no conversion between kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    I8,
    U8,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Untyped bytes.
    Byte,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::I8 | DataType::U8 | DataType::Byte => 1,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::I8 => "i8",
            DataType::U8 => "u8",
            DataType::I32 => "i32",
            DataType::U32 => "u32",
            DataType::I64 => "i64",
            DataType::U64 => "u64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::Byte => "byte",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust primitives that can be moved through a collective.
///
/// Sealed: only plain-old-data types with no padding and no invalid bit
/// patterns implement it, which is what makes the byte views in
/// [`crate::memory`] sound.
pub trait CollElement: sealed::Sealed + Copy + Send + Sync + 'static {
    const DTYPE: DataType;
}

macro_rules! impl_coll_element {
    ($ty:ty, $dtype:expr) => {
        impl sealed::Sealed for $ty {}
        impl CollElement for $ty {
            const DTYPE: DataType = $dtype;
        }
    };
}

impl_coll_element!(i8, DataType::I8);
impl_coll_element!(u8, DataType::U8);
impl_coll_element!(i32, DataType::I32);
impl_coll_element!(u32, DataType::U32);
impl_coll_element!(i64, DataType::I64);
impl_coll_element!(u64, DataType::U64);
impl_coll_element!(f32, DataType::F32);
impl_coll_element!(f64, DataType::F64);
