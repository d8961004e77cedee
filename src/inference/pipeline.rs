use super::{LabelMap, Prediction};
use crate::config::ModelConfig;
use crate::image::{ImageLoader, ImageTransforms};
use crate::metrics::{exceeds_threshold, sigmoid};
use crate::models::{Backbone, BinaryClassifier};
use crate::utils::error::ClassifierError;
use crate::Result;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 构建模型、严格加载检查点并切换到推理模式
///
/// 检查点缺失、无法解析或与结构不符时返回错误，调用方应将其视为启动失败。
pub fn load_model(
    checkpoint_path: &Path,
    backbone: Arc<dyn Backbone>,
    config: &ModelConfig,
) -> Result<BinaryClassifier> {
    let mut model = BinaryClassifier::new(backbone, config)?;
    model.load_checkpoint(checkpoint_path)?;
    model.eval();

    tracing::info!(
        "Model ready: backbone={}, threshold={}, mode={:?}",
        model.backbone().name(),
        model.threshold(),
        model.mode()
    );
    Ok(model)
}

/// 对磁盘上的单张图像做预测，解码失败直接返回错误
pub fn predict(image_path: &Path, model: &BinaryClassifier, labels: &LabelMap) -> Result<Prediction> {
    let image = ImageLoader::from_path(image_path)?;
    predict_image(&image, model, labels)
}

/// 对内存中的图像做预测
pub fn predict_image(
    image: &DynamicImage,
    model: &BinaryClassifier,
    labels: &LabelMap,
) -> Result<Prediction> {
    let start_time = Instant::now();

    let input = ImageTransforms::default().apply(image)?;
    let logits = model.forward(input.view())?;

    let logit = match logits.as_slice() {
        Some([logit]) => *logit,
        _ => {
            return Err(ClassifierError::Inference(format!(
                "expected a single logit, got {}",
                logits.len()
            )))
        }
    };

    let probability = sigmoid(logit);
    let index = u8::from(exceeds_threshold(probability, model.threshold()));
    let label = labels.get(index)?.to_string();

    tracing::debug!(
        "Prediction: label={}, index={}, probability={:.4}, time={:.3}s",
        label,
        index,
        probability,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Prediction {
        label,
        index,
        probability,
    })
}
