//! Weight files.
//!
//! Named tensors are stored in the `safetensors` format. The on-disk dtype comes from the
//! element type's [`HasDType`] tag and every tensor keeps its full shape, so a loader asking
//! for the same element type and rank gets back exactly what was saved.
//!
//! ```rust
//! use std::collections::HashMap;
//! use transcribe_rs::checkpoint::{load_weights, save_weights};
//! use transcribe_rs::tensor::Tensor;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("weights.h5");
//!
//! let mut weights = HashMap::new();
//! weights.insert("proj".to_string(), Tensor::<f32, 2>::ones([2, 3]));
//! save_weights(&path, &weights).unwrap();
//!
//! let loaded = load_weights::<f32, 2>(&path).unwrap();
//! assert_eq!(loaded["proj"].shape(), &[2, 3]);
//! ```

use crate::tensor::{Cpu, DType, HasDType, Tensor, TensorError};
use crate::training::{Result, TrainError};
use log::debug;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;

fn to_safetensors_dtype(dtype: DType) -> Dtype {
    match dtype {
        DType::F16 => Dtype::F16,
        DType::BF16 => Dtype::BF16,
        DType::F32 => Dtype::F32,
        DType::F64 => Dtype::F64,
        DType::I32 => Dtype::I32,
        DType::I64 => Dtype::I64,
        DType::USize => Dtype::U64,
    }
}

fn serialization(err: impl std::fmt::Debug) -> TrainError {
    TensorError::Serialization(format!("{:?}", err)).into()
}

/// Writes `tensors` to `path`, replacing any existing file.
pub fn save_weights<T, const RANK: usize>(
    path: impl AsRef<Path>,
    tensors: &HashMap<String, Tensor<T, RANK, Cpu>>,
) -> Result<()>
where
    T: HasDType,
{
    let dtype = to_safetensors_dtype(T::DTYPE);

    let encoded: Vec<(&String, Vec<u8>, Vec<usize>)> = tensors
        .iter()
        .map(|(name, tensor)| {
            let mut bytes = Vec::with_capacity(tensor.size() * T::WIDTH);
            for &x in tensor.data() {
                x.write_le(&mut bytes);
            }
            (name, bytes, tensor.shape().to_vec())
        })
        .collect();

    let mut views = Vec::with_capacity(encoded.len());
    for (name, bytes, shape) in &encoded {
        let view = TensorView::new(dtype, shape.clone(), bytes).map_err(serialization)?;
        views.push((name.as_str(), view));
    }

    let buffer = safetensors::serialize(views.iter().map(|(name, view)| (*name, view)), &None)
        .map_err(serialization)?;
    std::fs::write(path.as_ref(), buffer)?;
    debug!(
        "saved {} {} tensors to {}",
        tensors.len(),
        T::DTYPE,
        path.as_ref().display()
    );
    Ok(())
}

/// Reads every tensor in `path` as rank `RANK` with element type `T`.
///
/// # Errors
///
/// `MissingFile` if `path` does not exist. A tensor stored with another dtype or rank is a
/// `Serialization` or `ShapeMismatch` error.
pub fn load_weights<T, const RANK: usize>(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, Tensor<T, RANK, Cpu>>>
where
    T: HasDType,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(TrainError::MissingFile(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let file = SafeTensors::deserialize(&bytes).map_err(serialization)?;
    let want = to_safetensors_dtype(T::DTYPE);

    let mut tensors = HashMap::new();
    for (name, view) in file.tensors() {
        if view.dtype() != want {
            return Err(TensorError::Serialization(format!(
                "tensor {} is stored as {:?}, expected {:?}",
                name,
                view.dtype(),
                want
            ))
            .into());
        }

        // Rank mismatches report the ranks, not the shapes.
        let shape: [usize; RANK] = view.shape().try_into().map_err(|_| TensorError::ShapeMismatch {
            expected: vec![RANK],
            got: vec![view.shape().len()],
        })?;

        let data = view
            .data()
            .chunks_exact(T::WIDTH)
            .map(|chunk| {
                T::read_le(chunk).ok_or_else(|| {
                    TensorError::Serialization(format!("tensor {} holds an invalid element", name))
                })
            })
            .collect::<std::result::Result<Vec<T>, _>>()?;

        tensors.insert(name, Tensor::new(data, shape)?);
    }
    Ok(tensors)
}
