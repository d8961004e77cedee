use crate::inference::load_model;
use crate::models::{head::Mode, Backbone, BinaryClassifier, OnnxBackbone};
use crate::utils::error::ClassifierError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// 全局模型管理器单例，进程内只加载一次模型
pub struct ModelManager {
    model: Arc<BinaryClassifier>,
    config: Config,
}

static MODEL_MANAGER: OnceCell<Arc<ModelManager>> = OnceCell::new();

impl ModelManager {
    /// 加载 ONNX 骨干和分类头检查点，并初始化全局实例
    ///
    /// 任何加载错误都直接返回，重复初始化同样视为错误。
    pub fn init(config: Config) -> Result<Arc<ModelManager>> {
        if MODEL_MANAGER.get().is_some() {
            return Err(ClassifierError::Internal(
                "Model manager already initialized".to_string(),
            ));
        }

        tracing::info!("Initializing model manager...");

        let backbone: Arc<dyn Backbone> = Arc::new(OnnxBackbone::new(&config)?);
        let model = load_model(&config.model.checkpoint_path, backbone, &config.model)?;

        Self::install(model, config)
    }

    /// 安装一个已经加载好的模型
    pub fn install(model: BinaryClassifier, config: Config) -> Result<Arc<ModelManager>> {
        let manager = Arc::new(ModelManager {
            model: Arc::new(model),
            config,
        });

        MODEL_MANAGER
            .set(Arc::clone(&manager))
            .map_err(|_| ClassifierError::Internal("Model manager already initialized".to_string()))?;

        tracing::info!("Model manager initialized successfully");
        Ok(manager)
    }

    /// 获取模型引用
    pub fn model(&self) -> Arc<BinaryClassifier> {
        Arc::clone(&self.model)
    }

    /// 模型健康检查
    pub fn health_check(&self) -> Result<()> {
        ModelStats::collect(&self.model, &self.config).check()
    }

    pub fn get_stats(&self) -> ModelStats {
        ModelStats::collect(&self.model, &self.config)
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub backbone: String,
    pub device: String,
    pub mode: Mode,
    pub feature_dim: usize,
    pub hidden_size: usize,
    pub trainable_parameters: usize,
    pub freeze_backbone: bool,
    pub threshold: f32,
    pub labels: Vec<String>,
    pub intra_threads: usize,
    pub optimization_level: i32,
}

impl ModelStats {
    pub fn collect(model: &BinaryClassifier, config: &Config) -> Self {
        Self {
            backbone: model.backbone().name().to_string(),
            device: model.backbone().device().to_string(),
            mode: model.mode(),
            feature_dim: model.backbone().feature_dim(),
            hidden_size: model.head().hidden_size(),
            trainable_parameters: model.trainable_parameter_count(),
            freeze_backbone: model.config().freeze_backbone,
            threshold: model.threshold(),
            labels: config.labels.labels().to_vec(),
            intra_threads: config.onnx_config.intra_threads,
            optimization_level: config.onnx_config.optimization_level,
        }
    }

    /// 模型必须处于推理模式且头部与骨干维度一致
    pub fn check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");

        if self.mode != Mode::Eval {
            return Err(ClassifierError::ModelLoad(
                "model is not in evaluation mode".to_string(),
            ));
        }
        if self.feature_dim == 0 {
            return Err(ClassifierError::ModelLoad(
                "backbone reports zero features".to_string(),
            ));
        }

        tracing::debug!("Model health check passed");
        Ok(())
    }
}
