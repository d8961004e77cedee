use super::checkpoint::{ensure_consumed, take_tensor, StateDict};
use crate::utils::error::{CheckpointError, ClassifierError};
use crate::Result;
use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1, Ix2};
use rand::Rng;

/// 运行模式，训练模式下启用 dropout
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval,
}

/// 替换后的分类头：Linear → ReLU → Dropout → Linear，输出单个 logit
///
/// 参数名沿用顺序容器的下标，`fc.1` 和 `fc.2` 是无参数的 ReLU 与 Dropout。
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    fc1_weight: Array2<f32>,
    fc1_bias: Array1<f32>,
    fc2_weight: Array2<f32>,
    fc2_bias: Array1<f32>,
    dropout: f32,
}

impl ClassifierHead {
    pub const FC1_WEIGHT: &'static str = "fc.0.weight";
    pub const FC1_BIAS: &'static str = "fc.0.bias";
    pub const FC2_WEIGHT: &'static str = "fc.3.weight";
    pub const FC2_BIAS: &'static str = "fc.3.bias";

    /// 以 `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` 初始化
    pub fn new(in_features: usize, hidden_size: usize, dropout: f32) -> Self {
        let mut rng = rand::thread_rng();

        let bound1 = 1.0 / (in_features as f32).sqrt();
        let bound2 = 1.0 / (hidden_size as f32).sqrt();

        Self {
            fc1_weight: Array2::from_shape_fn((hidden_size, in_features), |_| {
                rng.gen_range(-bound1..=bound1)
            }),
            fc1_bias: Array1::from_shape_fn(hidden_size, |_| rng.gen_range(-bound1..=bound1)),
            fc2_weight: Array2::from_shape_fn((1, hidden_size), |_| {
                rng.gen_range(-bound2..=bound2)
            }),
            fc2_bias: Array1::from_shape_fn(1, |_| rng.gen_range(-bound2..=bound2)),
            dropout,
        }
    }

    pub fn in_features(&self) -> usize {
        self.fc1_weight.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.fc1_weight.nrows()
    }

    pub fn parameter_count(&self) -> usize {
        self.fc1_weight.len() + self.fc1_bias.len() + self.fc2_weight.len() + self.fc2_bias.len()
    }

    /// 各参数名称及期望形状
    pub fn parameter_shapes(&self) -> [(&'static str, Vec<usize>); 4] {
        let (hidden, input) = (self.hidden_size(), self.in_features());
        [
            (Self::FC1_WEIGHT, vec![hidden, input]),
            (Self::FC1_BIAS, vec![hidden]),
            (Self::FC2_WEIGHT, vec![1, hidden]),
            (Self::FC2_BIAS, vec![1]),
        ]
    }

    /// 特征 `[N, in_features]` → logits `[N]`
    pub fn forward(&self, features: ArrayView2<f32>, mode: Mode) -> Result<Array1<f32>> {
        if features.ncols() != self.in_features() {
            return Err(ClassifierError::Inference(format!(
                "head expects {} features, backbone produced {}",
                self.in_features(),
                features.ncols()
            )));
        }

        let mut hidden = features.dot(&self.fc1_weight.t()) + &self.fc1_bias;
        hidden.mapv_inplace(|v| v.max(0.0));

        if mode == Mode::Train && self.dropout > 0.0 {
            let keep = 1.0 - self.dropout;
            let mut rng = rand::thread_rng();
            hidden.mapv_inplace(|v| {
                if rng.gen::<f32>() < self.dropout {
                    0.0
                } else {
                    v / keep
                }
            });
        }

        let logits = hidden.dot(&self.fc2_weight.t()) + &self.fc2_bias;
        Ok(logits.index_axis_move(Axis(1), 0))
    }

    /// 严格加载参数，不做任何补零或截断
    pub fn load_state_dict(
        &mut self,
        mut state: StateDict,
    ) -> std::result::Result<(), CheckpointError> {
        let [fc1_w, fc1_b, fc2_w, fc2_b] = self.parameter_shapes();

        let fc1_weight = take_tensor(&mut state, fc1_w.0, &fc1_w.1)?;
        let fc1_bias = take_tensor(&mut state, fc1_b.0, &fc1_b.1)?;
        let fc2_weight = take_tensor(&mut state, fc2_w.0, &fc2_w.1)?;
        let fc2_bias = take_tensor(&mut state, fc2_b.0, &fc2_b.1)?;
        ensure_consumed(&state)?;

        self.fc1_weight = into_dim::<Ix2>(fc1_w.0, &fc1_w.1, fc1_weight)?;
        self.fc1_bias = into_dim::<Ix1>(fc1_b.0, &fc1_b.1, fc1_bias)?;
        self.fc2_weight = into_dim::<Ix2>(fc2_w.0, &fc2_w.1, fc2_weight)?;
        self.fc2_bias = into_dim::<Ix1>(fc2_b.0, &fc2_b.1, fc2_bias)?;
        Ok(())
    }

    pub fn state_dict(&self) -> StateDict {
        StateDict::from([
            (Self::FC1_WEIGHT.to_string(), self.fc1_weight.clone().into_dyn()),
            (Self::FC1_BIAS.to_string(), self.fc1_bias.clone().into_dyn()),
            (Self::FC2_WEIGHT.to_string(), self.fc2_weight.clone().into_dyn()),
            (Self::FC2_BIAS.to_string(), self.fc2_bias.clone().into_dyn()),
        ])
    }
}

/// 动态维度张量转为固定维度，失败时报告期望形状
fn into_dim<D: ndarray::Dimension>(
    name: &str,
    expected: &[usize],
    array: ndarray::ArrayD<f32>,
) -> std::result::Result<ndarray::Array<f32, D>, CheckpointError> {
    let found = array.shape().to_vec();
    array
        .into_dimensionality::<D>()
        .map_err(|_| CheckpointError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            found,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ArrayD, IxDyn};

    fn fixed_head() -> ClassifierHead {
        let mut head = ClassifierHead::new(2, 3, 0.3);
        let state = StateDict::from([
            (
                ClassifierHead::FC1_WEIGHT.to_string(),
                array![[1.0f32, 0.0], [0.0, 1.0], [-1.0, -1.0]].into_dyn(),
            ),
            (
                ClassifierHead::FC1_BIAS.to_string(),
                array![0.0f32, 0.0, 0.5].into_dyn(),
            ),
            (
                ClassifierHead::FC2_WEIGHT.to_string(),
                array![[1.0f32, 2.0, 3.0]].into_dyn(),
            ),
            (ClassifierHead::FC2_BIAS.to_string(), array![-1.0f32].into_dyn()),
        ]);
        head.load_state_dict(state).unwrap();
        head
    }

    #[test]
    fn forward_applies_linear_relu_linear() {
        let head = fixed_head();
        let features = array![[1.0f32, 2.0], [-1.0, -1.0]];
        let logits = head.forward(features.view(), Mode::Eval).unwrap();
        // 第一行: hidden = [1, 2, relu(-2.5)=0] → 1 + 4 - 1 = 4
        // 第二行: hidden = [0, 0, 2.5] → 7.5 - 1 = 6.5
        assert_eq!(logits, array![4.0f32, 6.5]);
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let head = ClassifierHead::new(8, 16, 0.5);
        let features = Array2::from_shape_fn((4, 8), |(i, j)| (i * 8 + j) as f32 / 10.0);
        let a = head.forward(features.view(), Mode::Eval).unwrap();
        let b = head.forward(features.view(), Mode::Eval).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_wrong_feature_width() {
        let head = ClassifierHead::new(4, 8, 0.0);
        let features = Array2::<f32>::zeros((1, 5));
        assert!(matches!(
            head.forward(features.view(), Mode::Eval),
            Err(ClassifierError::Inference(_))
        ));
    }

    #[test]
    fn load_rejects_mismatched_head_shape() {
        let mut head = ClassifierHead::new(4, 8, 0.3);
        let mut state = head.state_dict();
        state.insert(
            ClassifierHead::FC1_WEIGHT.to_string(),
            ArrayD::zeros(IxDyn(&[16, 4])),
        );
        let err = head.load_state_dict(state).unwrap_err();
        assert!(matches!(err, CheckpointError::ShapeMismatch { ref name, .. } if name == "fc.0.weight"));
    }

    #[test]
    fn load_rejects_missing_and_unexpected_keys() {
        let mut head = ClassifierHead::new(4, 8, 0.3);

        let mut state = head.state_dict();
        state.remove(ClassifierHead::FC2_BIAS);
        assert!(matches!(
            head.load_state_dict(state),
            Err(CheckpointError::MissingKey(_))
        ));

        let mut state = head.state_dict();
        state.insert("fc.9.weight".to_string(), ArrayD::zeros(IxDyn(&[1])));
        assert!(matches!(
            head.load_state_dict(state),
            Err(CheckpointError::UnexpectedKey(_))
        ));
    }

    #[test]
    fn dimensionality_error_reports_expected_shape() {
        let err = into_dim::<Ix2>("fc.0.weight", &[8, 4], ArrayD::zeros(IxDyn(&[32])))
            .unwrap_err();
        match err {
            CheckpointError::ShapeMismatch {
                name,
                expected,
                found,
            } => {
                assert_eq!(name, "fc.0.weight");
                assert_eq!(expected, vec![8, 4]);
                assert_eq!(found, vec![32]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn counts_parameters() {
        let head = ClassifierHead::new(2048, 512, 0.3);
        assert_eq!(head.parameter_count(), 2048 * 512 + 512 + 512 + 1);
    }
}
