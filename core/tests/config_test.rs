use std::io::Write;
use transcribe_rs::TrainError;
use transcribe_rs::config::{load_config, validate_config};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"{
            "epochs": 30,
            "attention": {
                "num_heads": 8,
                "query_shape": [4, 8],
                "memory_flange": [2, 4],
                "dropout_rate": 0.1
            },
            "early_stopping": { "monitor": "val_loss", "patience": 3 },
            "checkpoint": { "dir": "ckpt/vocal", "save_best_only": true }
        }"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.epochs, 30);
    assert_eq!(config.attention.query_shape, [4, 8]);
    assert_eq!(config.early_stopping.as_ref().unwrap().patience, 3);

    let checkpoint = config.checkpoint.as_ref().unwrap();
    assert_eq!(checkpoint.monitor, "val_acc");
    assert!(checkpoint.save_best_only);
    assert!(!checkpoint.save_weights_only);

    let layer = config.attention.layer(64).unwrap();
    assert_eq!(layer.attention().memory_shape(), [8, 16]);
    assert_eq!(config.callbacks().len(), 2);
}

#[test]
fn test_missing_file_checked_first() {
    let err = load_config("does/not/exist.json").unwrap_err();
    assert!(matches!(err, TrainError::MissingFile(_)));
}

#[test]
fn test_malformed_and_invalid_configs() {
    let file = write_config(r#"{"epochs": 3, "attention": "#);
    assert!(matches!(load_config(file.path()), Err(TrainError::Json(_))));

    let file = write_config(r#"{"epochs": 0, "attention": {"num_heads": 2}}"#);
    assert!(matches!(
        load_config(file.path()),
        Err(TrainError::InvalidConfig(_))
    ));

    let file = write_config(r#"{"epochs": 3, "attention": {"num_heads": 2, "dropout_rate": -0.5}}"#);
    assert!(matches!(
        load_config(file.path()),
        Err(TrainError::InvalidConfig(_))
    ));
}

#[test]
fn test_round_trip_through_json() {
    let file = write_config(r#"{"epochs": 5, "attention": {"num_heads": 1}}"#);
    let config = load_config(file.path()).unwrap();

    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("early_stopping"));
    let reparsed: transcribe_rs::config::TrainingConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, reparsed);
    assert!(validate_config(&reparsed).is_ok());
}
