//! Dense numeric arrays of the host runtime.
//!
//! Data is always held in logical row-major order; `strides` is layout
//! metadata only, observable through `x.stride()` and guarded by
//! `ArrayMatch`, but never consulted by the kernels.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::errors::HostError;

/// Element type of a numeric array.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
    Int64,
    Bool,
}

impl DType {
    pub fn is_floating_point(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Result type of a binary elementwise operation.
    pub fn promote(self, other: DType) -> DType {
        use DType::*;
        match (self, other) {
            (Float64, _) | (_, Float64) => Float64,
            (Float32, _) | (_, Float32) => Float32,
            (Int64, _) | (_, Int64) => Int64,
            (Bool, Bool) => Bool,
        }
    }
}

/// Placement of a numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(u8),
}

impl Device {
    pub fn is_cuda(self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub dtype: DType,
    pub device: Device,
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub data: Vec<f64>,
}

/// Row-major strides for `shape`, in elements.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    let mut acc = 1usize;
    for (stride, dim) in strides.iter_mut().zip(shape).rev() {
        *stride = acc;
        acc = acc.saturating_mul(*dim);
    }
    strides
}

impl ArrayValue {
    /// Builds a contiguous float64 array; fails when `data` does not fill `shape`.
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, HostError> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(HostError::Value(format!(
                "cannot reshape array of size {} into shape {shape:?}",
                data.len()
            )));
        }
        Ok(Self {
            dtype: DType::Float64,
            device: Device::Cpu,
            strides: contiguous_strides(&shape),
            shape,
            data,
        })
    }

    /// A contiguous array of `shape` with every element set to `value`.
    pub fn full(shape: Vec<usize>, value: f64) -> Self {
        let numel = shape.iter().product();
        Self {
            dtype: DType::Float64,
            device: Device::Cpu,
            strides: contiguous_strides(&shape),
            data: vec![value; numel],
            shape,
        }
    }

    /// 0-d array holding `value`.
    pub fn scalar(value: f64, dtype: DType) -> Self {
        Self {
            dtype,
            device: Device::Cpu,
            shape: Vec::new(),
            strides: Vec::new(),
            data: vec![value],
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Overrides the layout metadata, e.g. to model a transposed view.
    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Applies `f` to every element, keeping shape and placement.
    pub fn map(&self, dtype: DType, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dtype,
            device: self.device,
            shape: self.shape.clone(),
            strides: contiguous_strides(&self.shape),
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// Elementwise combination of two arrays of equal shape, or of an array
    /// with a 0-d array on either side.
    pub fn zip_with(&self, other: &ArrayValue, f: impl Fn(f64, f64) -> f64) -> Result<Self, HostError> {
        let dtype = self.dtype.promote(other.dtype);
        if self.shape == other.shape {
            return Ok(Self {
                dtype,
                device: self.device,
                shape: self.shape.clone(),
                strides: contiguous_strides(&self.shape),
                data: self
                    .data
                    .iter()
                    .zip(&other.data)
                    .map(|(a, b)| f(*a, *b))
                    .collect(),
            });
        }
        match (self.data.as_slice(), other.data.as_slice()) {
            (_, [rhs]) if other.ndim() == 0 => Ok(self.map(dtype, |a| f(a, *rhs))),
            ([lhs], _) if self.ndim() == 0 => Ok(other.map(dtype, |b| f(*lhs, b))),
            _ => Err(HostError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: other.shape.clone(),
            }),
        }
    }

    /// Selects index `index` along the first dimension.
    pub fn select(&self, index: i64) -> Result<Self, HostError> {
        let Some((&len, rest)) = self.shape.split_first() else {
            return Err(HostError::Index("invalid index of a 0-d array".to_string()));
        };
        let position = normalize_index(index, len)
            .ok_or_else(|| HostError::Index(format!("index {index} is out of bounds for dimension 0 with size {len}")))?;
        let inner: usize = rest.iter().product();
        let start = position.saturating_mul(inner);
        let data = self
            .data
            .get(start..start.saturating_add(inner))
            .ok_or_else(|| HostError::Index(format!("index {index} out of range")))?
            .to_vec();
        Ok(Self {
            dtype: self.dtype,
            device: self.device,
            shape: rest.to_vec(),
            strides: contiguous_strides(rest),
            data,
        })
    }

    pub fn sum(&self) -> Self {
        let total = self.data.iter().sum();
        Self::scalar(total, self.dtype).with_device(self.device)
    }
}

/// Resolves a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index.checked_add(len)? } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}
