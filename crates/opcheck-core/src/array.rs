//! Dense host arrays: the materialized tensor values both backends exchange.
//!
//! An `Array` owns its data. Integer dtypes share an `i64` buffer and float
//! dtypes an `f64` buffer; the dtype tag fixes the logical width and every
//! constructor checks that values fit it.

use crate::{DType, OpcheckError, Result, Shape};

/// Where an array's data lives. Comparison ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

/// Typed element storage.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Buffer {
    pub fn len(&self) -> usize {
        match self {
            Buffer::Bool(v) => v.len(),
            Buffer::Int(v) => v.len(),
            Buffer::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense, row-major array.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    shape: Shape,
    dtype: DType,
    device: Device,
    data: Buffer,
}

impl Array {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create an array from float data, rounding to the dtype's precision.
    pub fn from_f64(data: Vec<f64>, shape: &Shape, dtype: DType) -> Result<Self> {
        if !dtype.is_float() {
            return Err(OpcheckError::InvalidArgument(format!(
                "float data cannot back a {dtype} array"
            )));
        }
        check_len(data.len(), shape)?;
        let data = data.into_iter().map(|v| dtype.round_float(v)).collect();
        Ok(Self::raw(shape, dtype, Buffer::Float(data)))
    }

    /// Create an `F32` array.
    pub fn from_f32(data: &[f32], shape: &Shape) -> Result<Self> {
        Self::from_f64(data.iter().map(|&v| v as f64).collect(), shape, DType::F32)
    }

    /// Create an integer array. Every value must fit the dtype.
    pub fn from_i64(data: Vec<i64>, shape: &Shape, dtype: DType) -> Result<Self> {
        let Some((lo, hi)) = dtype.int_bounds() else {
            return Err(OpcheckError::InvalidArgument(format!(
                "integer data cannot back a {dtype} array"
            )));
        };
        check_len(data.len(), shape)?;
        if let Some(bad) = data.iter().find(|&&v| v < lo || v > hi) {
            return Err(OpcheckError::OutOfRange {
                value: *bad,
                dtype,
            });
        }
        Ok(Self::raw(shape, dtype, Buffer::Int(data)))
    }

    pub fn from_bool(data: Vec<bool>, shape: &Shape) -> Result<Self> {
        check_len(data.len(), shape)?;
        Ok(Self::raw(shape, DType::Bool, Buffer::Bool(data)))
    }

    /// Create an array of `dtype` from f64 values, casting as needed.
    ///
    /// Floats are truncated toward zero and wrapped for integer dtypes;
    /// any non-zero value is `true` for `Bool`.
    pub fn cast_from_f64(data: Vec<f64>, shape: &Shape, dtype: DType) -> Result<Self> {
        match dtype {
            DType::Bool => Self::from_bool(data.iter().map(|&v| v != 0.0).collect(), shape),
            d if d.is_float() => Self::from_f64(data, shape, d),
            d => Self::from_i64(
                data.iter().map(|&v| d.wrap_int(v as i64)).collect(),
                shape,
                d,
            ),
        }
    }

    /// Rank-0 array holding a single value.
    pub fn scalar_f64(v: f64, dtype: DType) -> Result<Self> {
        Self::cast_from_f64(vec![v], &Shape::scalar(), dtype)
    }

    fn raw(shape: &Shape, dtype: DType, data: Buffer) -> Self {
        Self {
            shape: shape.clone(),
            dtype,
            device: Device::Cpu,
            data,
        }
    }

    /// Same data, tagged with another device.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Reinterpret the data under a new shape with the same element count.
    pub fn reshape(&self, shape: &Shape) -> Result<Self> {
        if shape.checked_numel()? != self.numel() {
            return Err(OpcheckError::ShapeMismatch {
                expected: self.shape.0.clone(),
                got: shape.0.clone(),
            });
        }
        let mut out = self.clone();
        out.shape = shape.clone();
        Ok(out)
    }

    // ── Element access ──────────────────────────────────────────────────

    /// Element `i` as f64 (`true` → 1.0).
    pub fn get_f64(&self, i: usize) -> f64 {
        match &self.data {
            Buffer::Bool(v) => v[i] as u8 as f64,
            Buffer::Int(v) => v[i] as f64,
            Buffer::Float(v) => v[i],
        }
    }

    /// Copy all elements out as f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.numel()).map(|i| self.get_f64(i)).collect()
    }

    /// Copy all elements out as f32.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        (0..self.numel()).map(|i| self.get_f64(i) as f32).collect()
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match &self.data {
            Buffer::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match &self.data {
            Buffer::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match &self.data {
            Buffer::Bool(v) => Some(v),
            _ => None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn data(&self) -> &Buffer {
        &self.data
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

fn check_len(len: usize, shape: &Shape) -> Result<()> {
    let expected = shape.checked_numel()?;
    if len != expected {
        return Err(OpcheckError::InvalidArgument(format!(
            "data length {len} does not match shape {shape} (expected {expected})"
        )));
    }
    Ok(())
}
