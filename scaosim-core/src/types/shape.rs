//! Array schema recorded in every segment header.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of dimensions a segment can describe.
pub const MAX_DIMS: usize = 4;

/// Fixed shape of a segment payload.
///
/// Stored inline so headers and error values stay `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    ndim: u8,
    dims: [u64; MAX_DIMS],
}

impl Shape {
    /// Create a shape from its dimensions.
    ///
    /// # Panics
    /// Panics if `dims` is empty or has more than `MAX_DIMS` entries.
    #[must_use]
    pub fn new(dims: &[u64]) -> Self {
        Self::try_new(dims).unwrap_or_else(|| {
            panic!("shape must have 1..={MAX_DIMS} dimensions, got {}", dims.len())
        })
    }

    /// Create a shape, returning `None` for an unsupported rank.
    #[must_use]
    pub fn try_new(dims: &[u64]) -> Option<Self> {
        if dims.is_empty() || dims.len() > MAX_DIMS {
            return None;
        }
        let mut packed = [0u64; MAX_DIMS];
        packed[..dims.len()].copy_from_slice(dims);
        Some(Self {
            ndim: dims.len() as u8,
            dims: packed,
        })
    }

    /// Two-dimensional shape `(rows, cols)`.
    #[must_use]
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::new(&[rows as u64, cols as u64])
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.ndim as usize
    }

    /// The dimensions.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims[..self.ndim as usize]
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dims().iter().product::<u64>() as usize
    }

    /// Check if the shape holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload size in bytes for the given element type.
    #[must_use]
    pub fn byte_len(&self, dtype: DType) -> usize {
        self.len() * dtype.size()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.ndim == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{self}")
    }
}

impl Serialize for Shape {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.dims().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dims = Vec::<u64>::deserialize(deserializer)?;
        Self::try_new(&dims).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "shape must have 1..={MAX_DIMS} dimensions, got {}",
                dims.len()
            ))
        })
    }
}

/// Element type of a segment payload.
///
/// The discriminant is the code written into the segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum DType {
    /// Unsigned byte.
    U8 = 1,
    /// Unsigned 16-bit integer.
    U16 = 2,
    /// Signed 32-bit integer.
    I32 = 3,
    /// Unsigned 32-bit integer.
    U32 = 4,
    /// 32-bit float.
    F32 = 5,
    /// 64-bit float.
    F64 = 6,
}

impl DType {
    /// Header code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decode a header code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::U8,
            2 => Self::U16,
            3 => Self::I32,
            4 => Self::U32,
            5 => Self::F32,
            6 => Self::F64,
            _ => return None,
        })
    }

    /// Element size in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Memory order of multi-dimensional payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ElementOrder {
    /// Last index varies fastest (C order).
    #[default]
    RowMajor = 0,
    /// First index varies fastest (Fortran order).
    ColumnMajor = 1,
}

impl ElementOrder {
    /// Header code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decode a header code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::RowMajor),
            1 => Some(Self::ColumnMajor),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_len_and_bytes() {
        let s = Shape::matrix(64, 64);
        assert_eq!(s.ndim(), 2);
        assert_eq!(s.len(), 4096);
        assert_eq!(s.byte_len(DType::F32), 16384);
        assert_eq!(s.dims(), &[64, 64]);
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape::new(&[100, 2]).to_string(), "(100, 2)");
        assert_eq!(Shape::new(&[7]).to_string(), "(7,)");
    }

    #[test]
    fn shape_equality_ignores_nothing() {
        assert_ne!(Shape::new(&[100, 2]), Shape::new(&[50, 2]));
        assert_ne!(Shape::new(&[200]), Shape::new(&[100, 2]));
        assert_eq!(Shape::new(&[100, 2]), Shape::matrix(100, 2));
    }

    #[test]
    fn shape_rank_limits() {
        assert!(Shape::try_new(&[]).is_none());
        assert!(Shape::try_new(&[1, 2, 3, 4, 5]).is_none());
        assert!(Shape::try_new(&[1, 2, 3, 4]).is_some());
    }

    #[test]
    fn dtype_codes() {
        for dtype in [DType::U8, DType::U16, DType::I32, DType::U32, DType::F32, DType::F64] {
            assert_eq!(DType::from_code(dtype.code()), Some(dtype));
        }
        assert_eq!(DType::from_code(0), None);
        assert_eq!(DType::from_code(99), None);
    }

    #[test]
    fn shape_yaml() {
        let s: Shape = serde_yaml::from_str("[64, 64]").unwrap();
        assert_eq!(s, Shape::matrix(64, 64));
        assert!(serde_yaml::from_str::<Shape>("[]").is_err());
    }
}
