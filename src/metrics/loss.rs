use crate::utils::error::ClassifierError;
use crate::Result;
use ndarray::ArrayView1;

/// 数值稳定的 sigmoid
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// 单个样本的 binary cross entropy with logits
///
/// 使用 `max(x, 0) - x * y + ln(1 + e^{-|x|})`，避免大 logit 溢出。
pub fn bce_with_logits(logit: f32, target: f32) -> f32 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

/// 真实类别对应的概率：正样本取 `p`，负样本取 `1 - p`
pub fn p_t(prob: f32, target: u8) -> f32 {
    if target == 1 {
        prob
    } else {
        1.0 - prob
    }
}

/// Focal loss 的均值
///
/// `loss = mean(alpha * (1 - p_t)^gamma * bce)`，对已经分类正确且置信度高的
/// 样本降低权重。空批次返回 NaN。
pub fn focal_loss(
    logits: ArrayView1<f32>,
    targets: ArrayView1<u8>,
    gamma: f32,
    alpha: f32,
) -> Result<f32> {
    check_targets(logits, targets)?;

    if logits.is_empty() {
        return Ok(f32::NAN);
    }

    let total: f64 = logits
        .iter()
        .zip(targets.iter())
        .map(|(&logit, &target)| {
            let bce = bce_with_logits(logit, target as f32);
            let pt = p_t(sigmoid(logit), target);
            let focal_weight = (1.0 - pt).max(0.0).powf(gamma);
            (alpha * focal_weight * bce) as f64
        })
        .sum();

    Ok((total / logits.len() as f64) as f32)
}

/// 批次长度一致且目标只含 0/1
pub(crate) fn check_targets(logits: ArrayView1<f32>, targets: ArrayView1<u8>) -> Result<()> {
    if logits.len() != targets.len() {
        return Err(ClassifierError::InvalidInput(format!(
            "logits and targets length mismatch: {} vs {}",
            logits.len(),
            targets.len()
        )));
    }
    if let Some(bad) = targets.iter().find(|&&t| t > 1) {
        return Err(ClassifierError::InvalidInput(format!(
            "binary targets must be 0 or 1, found {}",
            bad
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    fn mean_bce(logits: &[f32], targets: &[u8]) -> f32 {
        let sum: f32 = logits
            .iter()
            .zip(targets)
            .map(|(&x, &y)| bce_with_logits(x, y as f32))
            .sum();
        sum / logits.len() as f32
    }

    #[test]
    fn p_t_at_zero_logit_is_half() {
        let prob = sigmoid(0.0);
        assert_eq!(prob, 0.5);
        assert_eq!(p_t(prob, 1), 0.5);
        assert_eq!(p_t(prob, 0), 0.5);
    }

    #[test]
    fn p_t_selects_probability_of_true_class() {
        assert!((p_t(0.8, 1) - 0.8).abs() < 1e-7);
        assert!((p_t(0.8, 0) - 0.2).abs() < 1e-7);
    }

    #[test]
    fn bce_matches_closed_form() {
        // -ln(sigmoid(2))
        let expected = -(1.0f32 / (1.0 + (-2.0f32).exp())).ln();
        assert!((bce_with_logits(2.0, 1.0) - expected).abs() < 1e-6);
        // -ln(1 - sigmoid(2))
        let expected = -(1.0 - 1.0f32 / (1.0 + (-2.0f32).exp())).ln();
        assert!((bce_with_logits(2.0, 0.0) - expected).abs() < 1e-5);
    }

    #[test]
    fn bce_is_finite_for_extreme_logits() {
        assert!(bce_with_logits(100.0, 0.0).is_finite());
        assert!(bce_with_logits(-100.0, 1.0).is_finite());
        assert!((bce_with_logits(100.0, 0.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn focal_loss_reduces_to_bce() {
        let logits = array![-1.5f32, 0.0, 0.3, 2.0];
        let targets = array![0u8, 1, 0, 1];
        let loss = focal_loss(logits.view(), targets.view(), 0.0, 1.0).unwrap();
        let expected = mean_bce(logits.as_slice().unwrap(), targets.as_slice().unwrap());
        assert!((loss - expected).abs() < 1e-6);
    }

    #[test]
    fn focal_loss_downweights_easy_examples() {
        let easy = focal_loss(array![4.0f32].view(), array![1u8].view(), 2.0, 1.0).unwrap();
        let plain = focal_loss(array![4.0f32].view(), array![1u8].view(), 0.0, 1.0).unwrap();
        assert!(easy < plain * 0.01);
    }

    #[test]
    fn focal_loss_known_value() {
        // logit 0: bce = ln 2, p_t = 0.5
        let loss = focal_loss(array![0.0f32].view(), array![1u8].view(), 2.5, 0.75).unwrap();
        let expected = 0.75 * 0.5f32.powf(2.5) * std::f32::consts::LN_2;
        assert!((loss - expected).abs() < 1e-6);
    }

    #[test]
    fn focal_loss_rejects_bad_input() {
        assert!(focal_loss(array![0.0f32, 1.0].view(), array![1u8].view(), 2.0, 0.5).is_err());
        assert!(focal_loss(array![0.0f32].view(), array![2u8].view(), 2.0, 0.5).is_err());
    }

    #[test]
    fn focal_loss_of_empty_batch_is_nan() {
        let logits: [f32; 0] = [];
        let targets: [u8; 0] = [];
        let loss = focal_loss(
            ArrayView1::from(&logits[..]),
            ArrayView1::from(&targets[..]),
            2.0,
            0.5,
        )
        .unwrap();
        assert!(loss.is_nan());
    }

    proptest! {
        #[test]
        fn focal_loss_is_non_negative(
            batch in prop::collection::vec((-30.0f32..30.0, 0u8..=1), 1..32),
            gamma in 0.0f32..5.0,
            alpha in 0.01f32..2.0,
        ) {
            let (logits, targets): (Vec<f32>, Vec<u8>) = batch.into_iter().unzip();
            let loss = focal_loss(
                ArrayView1::from(&logits[..]),
                ArrayView1::from(&targets[..]),
                gamma,
                alpha,
            ).unwrap();
            prop_assert!(loss >= 0.0);
        }

        #[test]
        fn focal_loss_with_unit_alpha_zero_gamma_is_bce(
            batch in prop::collection::vec((-20.0f32..20.0, 0u8..=1), 1..32),
        ) {
            let (logits, targets): (Vec<f32>, Vec<u8>) = batch.into_iter().unzip();
            let loss = focal_loss(
                ArrayView1::from(&logits[..]),
                ArrayView1::from(&targets[..]),
                0.0,
                1.0,
            ).unwrap();
            let expected = mean_bce(&logits, &targets);
            prop_assert!((loss - expected).abs() <= 1e-4 * expected.max(1.0));
        }
    }
}
