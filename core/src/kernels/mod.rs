//! Row-wise kernels used by attention.
//!
//! Unlike `transcribe-rs-kernels`, these need float math or element-type conversions that
//! depend on `TensorElem`, so they live next to the tensor type.

pub mod attention;
