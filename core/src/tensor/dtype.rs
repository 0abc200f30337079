//! Element types and casting.
//!
//! [`DType`] names the element types a tensor can carry at runtime, [`HasDType`] ties each
//! Rust type to its tag. Attention uses the tags to decide when softmax must be computed in
//! `f32` ([`MixedPrecision`]); checkpoints use them to pick the on-disk dtype.

use crate::tensor::{Cpu, Device, Result, Tensor, TensorElem, TensorError};
use half::{bf16, f16};
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Runtime tag for a tensor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    I32,
    I64,
    USize,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Half-width float types whose softmax should be computed in a wider type.
    pub fn is_reduced_precision(self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::USize => std::mem::size_of::<usize>(),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::USize => "usize",
        };
        f.write_str(name)
    }
}

/// Associates an element type with its [`DType`] tag and its little-endian byte form.
pub trait HasDType: TensorElem + 'static {
    const DTYPE: DType;
    /// Bytes per element in serialized form.
    const WIDTH: usize;

    fn write_le(self, out: &mut Vec<u8>);

    /// Decodes one element from exactly [`Self::WIDTH`] bytes.
    fn read_le(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_has_dtype {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl HasDType for $ty {
                const DTYPE: DType = DType::$tag;
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Option<Self> {
                    Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    };
}

impl_has_dtype!(
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    i32 => I32,
    i64 => I64,
);

// Serialized as u64 so files do not depend on the host pointer width.
impl HasDType for usize {
    const DTYPE: DType = DType::USize;
    const WIDTH: usize = 8;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self as u64).to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Option<Self> {
        u64::from_le_bytes(bytes.try_into().ok()?).try_into().ok()
    }
}

/// Activation and weight dtypes of a model.
///
/// Mixed precision means reduced-precision activations (`f16`/`bf16`) with `f32` weights.
/// In that regime attention logits are upcast to `f32` for the softmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedPrecision {
    pub activation: DType,
    pub weight: DType,
}

impl MixedPrecision {
    pub fn new(activation: DType, weight: DType) -> Self {
        Self { activation, weight }
    }

    /// Activations of type `T` with `f32` weights.
    pub fn for_activation<T: HasDType>() -> Self {
        Self::new(T::DTYPE, DType::F32)
    }

    pub fn is_enabled(&self) -> bool {
        self.activation.is_reduced_precision() && self.weight == DType::F32
    }
}

/// Converts every element of `x` to `U`.
///
/// When `T` and `U` are the same type the tensor is returned untouched.
///
/// # Errors
///
/// `TensorError::Unsupported` if an element is not representable in `U` (for example a NaN
/// cast to an integer type).
pub fn cast<U, T, const RANK: usize>(x: Tensor<T, RANK, Cpu>) -> Result<Tensor<U, RANK, Cpu>>
where
    T: TensorElem + 'static,
    U: TensorElem + 'static,
{
    let mut slot = Some(x);
    if let Some(same) = (&mut slot as &mut dyn Any).downcast_mut::<Option<Tensor<U, RANK, Cpu>>>() {
        if let Some(t) = same.take() {
            return Ok(t);
        }
    }

    match slot {
        Some(x) => convert(&x),
        None => Err(TensorError::Unsupported("cast of a moved tensor".into())),
    }
}

/// Casts `x` to the element type of `y`.
///
/// A no-op when the types already match and `x` lives on the CPU. Logs a warning when `x`
/// and `y` live on different devices, since matching them costs a copy.
pub fn cast_like<T, U, const RANK: usize, const OTHER: usize, Dx, Dy>(
    x: Tensor<T, RANK, Dx>,
    y: &Tensor<U, OTHER, Dy>,
) -> Result<Tensor<U, RANK, Cpu>>
where
    T: TensorElem + 'static,
    U: TensorElem + 'static,
    Dx: Device + 'static,
    Dy: Device,
{
    let (from, to) = (x.device().name(), y.device().name());
    if from != to {
        warn!(
            "cast_like: {} tensor {:?} is copied to match a {} tensor",
            from,
            x.shape(),
            to
        );
    }

    let mut slot = Some(x);
    if let Some(same) = (&mut slot as &mut dyn Any).downcast_mut::<Option<Tensor<U, RANK, Cpu>>>() {
        if let Some(t) = same.take() {
            return Ok(t);
        }
    }

    match slot {
        Some(x) => convert(&x),
        None => Err(TensorError::Unsupported("cast of a moved tensor".into())),
    }
}

fn convert<U, T, const RANK: usize, D>(x: &Tensor<T, RANK, D>) -> Result<Tensor<U, RANK, Cpu>>
where
    T: TensorElem,
    U: TensorElem,
    D: Device,
{
    let data: Option<Vec<U>> = x
        .data()
        .par_iter()
        .map(|v| v.to_f64().and_then(U::from_f64))
        .collect();

    match data {
        Some(data) => Tensor::new(data, *x.shape()),
        None => Err(TensorError::Unsupported(format!(
            "element of {:?} tensor is not representable in the target type",
            x.shape()
        ))),
    }
}
