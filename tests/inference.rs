mod common;

use common::{backbone, loaded_model, solid_image, write_checkpoint};
use onnx_classifier::{
    config::ModelConfig,
    inference::{load_model, predict, predict_image, LabelMap},
    models::Mode,
    utils::error::CheckpointError,
    ClassifierError,
};

#[test]
fn loaded_model_is_in_eval_mode() {
    let dir = tempfile::tempdir().unwrap();
    let model = loaded_model(dir.path());
    assert_eq!(model.mode(), Mode::Eval);
}

#[test]
fn mismatched_head_shape_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let small = ModelConfig {
        hidden_size: 16,
        ..ModelConfig::default()
    };
    let checkpoint = write_checkpoint(dir.path(), &small);

    let result = load_model(&checkpoint, backbone(), &ModelConfig::default());
    assert!(matches!(
        result,
        Err(ClassifierError::Checkpoint(CheckpointError::ShapeMismatch { .. }))
    ));
}

#[test]
fn garbage_checkpoint_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best_model.safetensors");
    std::fs::write(&path, b"not a safetensors file").unwrap();

    let result = load_model(&path, backbone(), &ModelConfig::default());
    assert!(matches!(
        result,
        Err(ClassifierError::Checkpoint(CheckpointError::Format(_)))
    ));
}

#[test]
fn reloading_checkpoint_gives_identical_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig::default();
    let checkpoint = write_checkpoint(dir.path(), &config);
    let labels = LabelMap::default();
    let image = solid_image([120, 60, 220]);

    let first = load_model(&checkpoint, backbone(), &config).unwrap();
    let second = load_model(&checkpoint, backbone(), &config).unwrap();

    assert_eq!(
        predict_image(&image, &first, &labels).unwrap(),
        predict_image(&image, &second, &labels).unwrap()
    );
}

#[test]
fn eval_predictions_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let model = loaded_model(dir.path());
    let labels = LabelMap::default();
    let image = solid_image([10, 200, 30]);

    let a = predict_image(&image, &model, &labels).unwrap();
    let b = predict_image(&image, &model, &labels).unwrap();
    assert_eq!(a, b);
}

#[test]
fn prediction_from_file_uses_configured_labels() {
    let dir = tempfile::tempdir().unwrap();
    let model = loaded_model(dir.path());
    let labels: LabelMap = "cat,dog".parse().unwrap();

    let path = dir.path().join("solid.png");
    solid_image([255, 255, 255]).save(&path).unwrap();

    let prediction = predict(&path, &model, &labels).unwrap();
    assert!(prediction.index <= 1);
    assert_eq!(prediction.label, labels.get(prediction.index).unwrap());
    assert!((0.0..=1.0).contains(&prediction.probability));
    assert_eq!(
        prediction.index == 1,
        prediction.probability > model.threshold()
    );
}

#[test]
fn missing_image_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = loaded_model(dir.path());

    let result = predict(
        &dir.path().join("missing.png"),
        &model,
        &LabelMap::default(),
    );
    assert!(result.is_err());
}
