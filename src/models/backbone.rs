use super::Device;
use crate::image::ImageTransforms;
use crate::utils::error::ClassifierError;
use crate::{Config, Result};
use ndarray::{Array2, Array4, ArrayView4};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::PathBuf;

/// 冻结的特征提取网络
///
/// 输入 `[N, 3, H, W]` 的归一化图像批次，输出 `[N, feature_dim]` 特征。
pub trait Backbone: Send + Sync {
    fn name(&self) -> &str;

    fn feature_dim(&self) -> usize;

    /// 实际执行推理的设备
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn extract(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>>;
}

/// 由 ONNX 图提供的骨干网络（原始分类层已移除）
pub struct OnnxBackbone {
    session: Mutex<Session>,
    input_name: String,
    output_name: String, // 动态发现的输出名称
    feature_dim: usize,
    model_path: PathBuf,
    device: Device,
}

impl OnnxBackbone {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.model.backbone_path;

        if !model_path.exists() {
            return Err(ClassifierError::ModelLoad(format!(
                "Backbone model not found: {}",
                model_path.display()
            )));
        }

        let device = config.model.device.resolve();
        tracing::info!(
            "Loading backbone from: {} (device: {})",
            model_path.display(),
            device
        );

        let optimization_level = match config.onnx_config.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };

        let session = Session::builder()?
            .with_optimization_level(optimization_level)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .with_execution_providers(device.execution_providers()?)?
            .commit_from_file(model_path)
            .map_err(|e| {
                ClassifierError::ModelLoad(format!(
                    "failed to create ONNX session for {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ClassifierError::ModelLoad(
                    "Backbone model has no inputs".to_string(),
                ))
            }
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ClassifierError::ModelLoad(
                    "Backbone model has no outputs".to_string(),
                ))
            }
        };

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Backbone output[{}]: '{}'", i, output.name);
        }
        tracing::info!(
            "Backbone tensors: input '{}', output '{}'",
            input_name,
            output_name
        );

        let mut backbone = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            feature_dim: 0,
            model_path: model_path.clone(),
            device,
        };

        // 用零输入跑一次前向，确定特征维度并验证计算图可用
        let size = ImageTransforms::default().crop_size() as usize;
        let probe = Array4::<f32>::zeros((1, 3, size, size));
        let features = backbone.run(probe.view())?;
        backbone.feature_dim = features.ncols();
        tracing::info!("Backbone feature dimension: {}", backbone.feature_dim);

        Ok(backbone)
    }

    fn run(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>> {
        let input_tensor = Tensor::from_array(batch.to_owned())?;

        let features = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(self.output_name.as_str()) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ClassifierError::Inference(format!(
                        "Backbone output '{}' not found. Available outputs: {:?}",
                        self.output_name, available
                    )));
                }
            }
        };

        // [N, F] 或 [N, F, 1, 1] 统一展平为 [N, F]
        let batch_size = features.shape().first().copied().unwrap_or(0);
        if batch_size == 0 {
            return Err(ClassifierError::Inference(
                "Backbone returned an empty batch".to_string(),
            ));
        }
        let dim = features.len() / batch_size;

        features
            .into_shape_with_order((batch_size, dim))
            .map_err(|e| ClassifierError::Inference(format!("Unexpected feature shape: {}", e)))
    }
}

impl Backbone for OnnxBackbone {
    fn name(&self) -> &str {
        self.model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx_backbone")
    }

    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn device(&self) -> Device {
        self.device
    }

    fn extract(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>> {
        let features = self.run(batch)?;
        if features.ncols() != self.feature_dim {
            return Err(ClassifierError::Inference(format!(
                "Backbone feature dimension changed: expected {}, got {}",
                self.feature_dim,
                features.ncols()
            )));
        }
        Ok(features)
    }
}
