use super::loss::{check_targets, sigmoid};
use crate::Result;
use ndarray::ArrayView1;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 混淆矩阵计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn from_predictions(preds: &[u8], targets: ArrayView1<u8>) -> Self {
        let mut counts = Self::default();
        for (&pred, &target) in preds.iter().zip(targets.iter()) {
            match (pred, target) {
                (1, 1) => counts.tp += 1,
                (1, _) => counts.fp += 1,
                (_, 1) => counts.fn_ += 1,
                _ => counts.tn += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f32 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f32 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f32 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f32 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

/// 分母为 0 时返回 0
fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// 二分类评估指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinaryMetrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub auroc: f32,
}

impl BinaryMetrics {
    /// 由 logits 计算全部指标
    ///
    /// 阈值化后的预测用于 accuracy/precision/recall/F1，AUROC 直接使用概率。
    pub fn from_logits(
        logits: ArrayView1<f32>,
        targets: ArrayView1<u8>,
        threshold: f32,
    ) -> Result<Self> {
        check_targets(logits, targets)?;

        let probs: Vec<f32> = logits.iter().map(|&x| sigmoid(x)).collect();
        let preds: Vec<u8> = probs
            .iter()
            .map(|&p| u8::from(exceeds_threshold(p, threshold)))
            .collect();

        let counts = ConfusionCounts::from_predictions(&preds, targets);

        Ok(Self {
            accuracy: counts.accuracy(),
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            auroc: auroc(&probs, targets),
        })
    }

    pub fn to_map(&self) -> BTreeMap<&'static str, f32> {
        BTreeMap::from([
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
            ("auroc", self.auroc),
        ])
    }
}

/// 严格大于阈值才判为正类
pub fn exceeds_threshold(prob: f32, threshold: f32) -> bool {
    prob > threshold
}

/// ROC 曲线下面积（梯形积分，同分数样本合并为一个阈值点）
///
/// 批次中缺少正样本或负样本时 ROC 无定义，返回 0。
pub fn auroc(probs: &[f32], targets: ArrayView1<u8>) -> f32 {
    let positives = targets.iter().filter(|&&t| t == 1).count();
    let negatives = targets.len() - positives;

    if positives == 0 || negatives == 0 {
        tracing::warn!(
            "AUROC undefined for batch with {} positives and {} negatives, returning 0",
            positives,
            negatives
        );
        return 0.0;
    }

    // NaN 无法排序，结果同样是 NaN
    if probs.iter().any(|p| p.is_nan()) {
        tracing::warn!("AUROC undefined for batch containing NaN probabilities");
        return f32::NAN;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut prev_tpr, mut prev_fpr) = (0.0f64, 0.0f64);
    let mut area = 0.0f64;

    let mut i = 0;
    while i < order.len() {
        let score = probs[order[i]];
        while i < order.len() && probs[order[i]].total_cmp(&score) == Ordering::Equal {
            if targets[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }

        let tpr = tp as f64 / positives as f64;
        let fpr = fp as f64 / negatives as f64;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }

    area as f32
}
