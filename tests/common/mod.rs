#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::{Array2, ArrayView4, Axis};
use onnx_classifier::{
    config::ModelConfig,
    inference::load_model,
    models::{Backbone, BinaryClassifier},
    ClassifierError, Result,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 按通道取均值的骨干，不依赖 ONNX 模型文件
pub struct ChannelMeanBackbone;

impl Backbone for ChannelMeanBackbone {
    fn name(&self) -> &str {
        "channel_mean"
    }

    fn feature_dim(&self) -> usize {
        3
    }

    fn extract(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>> {
        let (n, c, h, w) = batch.dim();
        let flat = batch
            .to_owned()
            .into_shape_with_order((n, c, h * w))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        flat.mean_axis(Axis(2))
            .ok_or_else(|| ClassifierError::Inference("empty image".to_string()))
    }
}

pub fn backbone() -> Arc<dyn Backbone> {
    Arc::new(ChannelMeanBackbone)
}

/// 写出一个随机初始化的分类头检查点
pub fn write_checkpoint(dir: &Path, config: &ModelConfig) -> PathBuf {
    let path = dir.join("best_model.safetensors");
    BinaryClassifier::new(backbone(), config)
        .unwrap()
        .save_checkpoint(&path)
        .unwrap();
    path
}

/// 保存检查点后重新加载，得到推理模式下的模型
pub fn loaded_model(dir: &Path) -> BinaryClassifier {
    let config = ModelConfig::default();
    let checkpoint = write_checkpoint(dir, &config);
    load_model(&checkpoint, backbone(), &config).unwrap()
}

pub fn solid_image(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 2, Rgb(color)))
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    solid_image(color)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// PNG 文件头之后全是垃圾数据
pub fn corrupt_png() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"definitely not a png body");
    bytes
}
