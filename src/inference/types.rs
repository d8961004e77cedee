use serde::Serialize;

/// 单张图像的预测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// 显示名称
    pub label: String,
    /// 类别索引，0 或 1
    pub index: u8,
    /// 正类概率 sigmoid(logit)
    pub probability: f32,
}
