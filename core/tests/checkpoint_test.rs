use std::collections::HashMap;
use transcribe_rs::checkpoint::{load_weights, save_weights};
use transcribe_rs::tensor::Tensor;
use transcribe_rs::TrainError;

#[test]
fn test_save_load_tensors() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("weights.h5");

    // Two projection matrices of a 4-channel, 2-head attention layer.
    let q_proj = Tensor::<f32, 2>::new((0..16).map(|i| i as f32 / 16.0).collect(), [4, 4]).unwrap();
    let o_proj = Tensor::<f32, 2>::new(vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5, -0.5, 0.25], [4, 2]).unwrap();

    let mut tensors = HashMap::new();
    tensors.insert("attention/q_proj".to_string(), q_proj.clone());
    tensors.insert("attention/o_proj".to_string(), o_proj.clone());
    save_weights(&file_path, &tensors).unwrap();

    let loaded = load_weights::<f32, 2>(&file_path).unwrap();
    assert_eq!(loaded.len(), 2);

    let l1 = &loaded["attention/q_proj"];
    assert_eq!(l1.shape(), q_proj.shape());
    assert_eq!(l1.data(), q_proj.data());

    let l2 = &loaded["attention/o_proj"];
    assert_eq!(l2.shape(), &[4, 2]);
    assert_eq!(l2.data(), o_proj.data());
}

#[test]
fn test_overwrite_replaces_previous_weights() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("weights.h5");

    let mut tensors = HashMap::new();
    tensors.insert("bias".to_string(), Tensor::<f64, 1>::zeros([3]));
    save_weights(&file_path, &tensors).unwrap();

    tensors.insert("bias".to_string(), Tensor::<f64, 1>::ones([3]));
    save_weights(&file_path, &tensors).unwrap();

    let loaded = load_weights::<f64, 1>(&file_path).unwrap();
    assert_eq!(loaded["bias"].data(), &[1.0, 1.0, 1.0]);
}

#[test]
fn test_index_maps_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("indices.safetensors");

    let mut tensors = HashMap::new();
    tensors.insert("blocks".to_string(), Tensor::<usize, 2>::new(vec![0, 1, 4, 5], [1, 4]).unwrap());
    save_weights(&file_path, &tensors).unwrap();

    let loaded = load_weights::<usize, 2>(&file_path).unwrap();
    assert_eq!(loaded["blocks"].data(), &[0, 1, 4, 5]);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.h5");

    match load_weights::<f32, 2>(&missing) {
        Err(TrainError::MissingFile(path)) => assert_eq!(path, missing),
        other => panic!("expected MissingFile, got {:?}", other.map(|t| t.len())),
    }
}
