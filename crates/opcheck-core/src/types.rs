//! Core type definitions: DType, Shape.

/// Supported element types.
///
/// Integer dtypes are stored widened to `i64` inside an [`crate::Array`];
/// float dtypes are stored as `f64` rounded to the dtype's precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    U8,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::Bool,
        DType::U8,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F32,
        DType::F64,
    ];

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::U8 | DType::I8 | DType::I16 | DType::I32 | DType::I64
        )
    }

    /// Inclusive `(min, max)` representable by an integer dtype.
    pub fn int_bounds(self) -> Option<(i64, i64)> {
        match self {
            DType::U8 => Some((u8::MIN as i64, u8::MAX as i64)),
            DType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DType::I64 => Some((i64::MIN, i64::MAX)),
            DType::Bool | DType::F32 | DType::F64 => None,
        }
    }

    /// Half-open `[low, high)` range used when sampling random integers.
    ///
    /// The high bound is the dtype maximum itself, so the maximum is never drawn.
    pub fn sampling_range(self) -> Option<std::ops::Range<i64>> {
        self.int_bounds().map(|(lo, hi)| lo..hi)
    }

    /// Wrap an `i64` into this integer dtype (two's complement truncation).
    pub fn wrap_int(self, v: i64) -> i64 {
        match self {
            DType::U8 => v as u8 as i64,
            DType::I8 => v as i8 as i64,
            DType::I16 => v as i16 as i64,
            DType::I32 => v as i32 as i64,
            DType::Bool => (v != 0) as i64,
            DType::I64 | DType::F32 | DType::F64 => v,
        }
    }

    /// Round an `f64` to the precision of this float dtype.
    pub fn round_float(self, v: f64) -> f64 {
        match self {
            DType::F32 => v as f32 as f64,
            _ => v,
        }
    }

    /// ONNX `TensorProto.DataType` element code.
    pub fn onnx_code(self) -> i64 {
        match self {
            DType::F32 => 1,
            DType::U8 => 2,
            DType::I8 => 3,
            DType::I16 => 5,
            DType::I32 => 6,
            DType::I64 => 7,
            DType::Bool => 9,
            DType::F64 => 11,
        }
    }

    /// Inverse of [`DType::onnx_code`].
    pub fn from_onnx_code(code: i64) -> Option<DType> {
        DType::ALL.into_iter().find(|d| d.onnx_code() == code)
    }

    /// Numeric priority for dtype promotion (higher = wider).
    pub fn priority(self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::U8 => 1,
            DType::I8 => 2,
            DType::I16 => 3,
            DType::I32 => 4,
            DType::I64 => 5,
            DType::F32 => 6,
            DType::F64 => 7,
        }
    }

    /// Promote two dtypes to a common result dtype.
    ///
    /// `uint8` and `int8` have no common 8-bit type and meet at `int16`.
    pub fn promote(a: DType, b: DType) -> DType {
        match (a, b) {
            _ if a == b => a,
            (DType::U8, DType::I8) | (DType::I8, DType::U8) => DType::I16,
            _ if a.priority() >= b.priority() => a,
            _ => b,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for DType {
    type Err = crate::OpcheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bool" => Ok(DType::Bool),
            "uint8" | "u8" => Ok(DType::U8),
            "int8" | "i8" => Ok(DType::I8),
            "int16" | "i16" => Ok(DType::I16),
            "int32" | "i32" => Ok(DType::I32),
            "int64" | "i64" => Ok(DType::I64),
            "float32" | "f32" | "float" => Ok(DType::F32),
            "float64" | "f64" | "double" => Ok(DType::F64),
            other => Err(crate::OpcheckError::InvalidArgument(format!(
                "unknown dtype `{other}`"
            ))),
        }
    }
}

/// Tensor shape (dimensions).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Shape(pub Vec<i64>);

impl Shape {
    pub fn new(dims: impl Into<Vec<i64>>) -> Self {
        Self(dims.into())
    }

    /// Scalar (rank-0) shape.
    pub fn scalar() -> Self {
        Self(vec![])
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. Assumes a valid shape; see [`Shape::checked_numel`].
    pub fn numel(&self) -> i64 {
        self.0.iter().product()
    }

    /// Element count of a shape that can back an array.
    ///
    /// Fails on any negative dimension and when the product overflows.
    pub fn checked_numel(&self) -> crate::Result<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| {
            let d = usize::try_from(d).map_err(|_| {
                crate::OpcheckError::InvalidArgument(format!("negative dimension {d} in shape {self}"))
            })?;
            acc.checked_mul(d).ok_or_else(|| {
                crate::OpcheckError::InvalidArgument(format!("element count of shape {self} overflows"))
            })
        })
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1].max(0) as usize;
        }
        strides
    }

    /// Convert a flat row-major offset into a multi-dimensional index.
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut index = Vec::with_capacity(self.0.len());
        for stride in self.strides() {
            index.push(flat / stride.max(1));
            flat %= stride.max(1);
        }
        index
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
