use super::checkpoint::{read_state_dict, write_state_dict};
use super::head::{ClassifierHead, Mode};
use super::Backbone;
use crate::config::ModelConfig;
use crate::metrics::{self, BinaryMetrics};
use crate::utils::error::ClassifierError;
use crate::Result;
use ndarray::{Array1, ArrayView1, ArrayView4};
use std::path::Path;
use std::sync::Arc;

/// 迁移学习二分类模型：冻结骨干 + 可训练分类头
///
/// 输出每张图像一个未归一化的 logit，正类概率为 `sigmoid(logit)`。
pub struct BinaryClassifier {
    backbone: Arc<dyn Backbone>,
    head: ClassifierHead,
    config: ModelConfig,
    mode: Mode,
}

impl BinaryClassifier {
    pub fn new(backbone: Arc<dyn Backbone>, config: &ModelConfig) -> Result<Self> {
        if !config.freeze_backbone {
            return Err(ClassifierError::Config(
                "the ONNX backbone is not trainable, freeze_backbone must stay enabled".to_string(),
            ));
        }

        let head = ClassifierHead::new(backbone.feature_dim(), config.hidden_size, config.dropout);

        tracing::debug!(
            "Constructed classifier: backbone={}, features={}, hidden={}, trainable params={}",
            backbone.name(),
            backbone.feature_dim(),
            config.hidden_size,
            head.parameter_count()
        );

        Ok(Self {
            backbone,
            head,
            config: config.clone(),
            mode: Mode::Train,
        })
    }

    /// 图像批次 `[N, 3, H, W]` → logits `[N]`
    pub fn forward(&self, batch: ArrayView4<f32>) -> Result<Array1<f32>> {
        let features = self.backbone.extract(batch)?;
        self.head.forward(features.view(), self.mode)
    }

    /// 使用模型的 gamma / alpha 计算 focal loss
    pub fn focal_loss(&self, logits: ArrayView1<f32>, targets: ArrayView1<u8>) -> Result<f32> {
        metrics::focal_loss(logits, targets, self.config.gamma, self.config.alpha)
    }

    /// 在决策阈值下计算 accuracy / precision / recall / F1 / AUROC
    pub fn compute_metrics(
        &self,
        logits: ArrayView1<f32>,
        targets: ArrayView1<u8>,
    ) -> Result<BinaryMetrics> {
        BinaryMetrics::from_logits(logits, targets, self.config.threshold)
    }

    /// 严格加载分类头检查点
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        let state = read_state_dict(path)?;
        self.head.load_state_dict(state)?;
        tracing::info!("Loaded head checkpoint from {}", path.display());
        Ok(())
    }

    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        write_state_dict(path, &self.head.state_dict())
    }

    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
    }

    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn backbone(&self) -> &dyn Backbone {
        self.backbone.as_ref()
    }

    pub fn head(&self) -> &ClassifierHead {
        &self.head
    }

    /// 骨干网络冻结，只统计分类头参数
    pub fn trainable_parameter_count(&self) -> usize {
        self.head.parameter_count()
    }
}
