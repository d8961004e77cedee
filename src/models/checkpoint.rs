//! safetensors 检查点读写
//!
//! 检查点只保存分类头参数，名称与 `ClassifierHead` 的参数名完全一致。
//! 加载采用严格模式：缺失、多余、形状或类型不符都会返回错误。

use crate::utils::error::{CheckpointError, ClassifierError};
use crate::Result;
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// 以名称为键的 f32 参数表
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// 读取检查点文件中的全部张量
pub fn read_state_dict(path: &Path) -> Result<StateDict> {
    if !path.exists() {
        return Err(CheckpointError::NotFound(path.display().to_string()).into());
    }

    let bytes = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(CheckpointError::from)?;

    let mut state = StateDict::new();
    for name in tensors.names() {
        let view = tensors.tensor(name).map_err(CheckpointError::from)?;
        state.insert(name.clone(), tensor_to_array(name, &view)?);
    }

    tracing::debug!(
        "Read {} tensors from checkpoint {}",
        state.len(),
        path.display()
    );
    Ok(state)
}

fn tensor_to_array(
    name: &str,
    view: &TensorView<'_>,
) -> std::result::Result<ArrayD<f32>, CheckpointError> {
    if view.dtype() != Dtype::F32 {
        return Err(CheckpointError::UnsupportedDtype {
            name: name.to_string(),
            dtype: format!("{:?}", view.dtype()),
        });
    }

    let values: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    ArrayD::from_shape_vec(IxDyn(view.shape()), values).map_err(|_| {
        CheckpointError::ShapeMismatch {
            name: name.to_string(),
            expected: view.shape().to_vec(),
            found: vec![view.data().len() / 4],
        }
    })
}

/// 从参数表中严格取出指定名称和形状的张量
pub fn take_tensor(
    state: &mut StateDict,
    name: &str,
    expected: &[usize],
) -> std::result::Result<ArrayD<f32>, CheckpointError> {
    let tensor = state
        .remove(name)
        .ok_or_else(|| CheckpointError::MissingKey(name.to_string()))?;

    if tensor.shape() != expected {
        return Err(CheckpointError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            found: tensor.shape().to_vec(),
        });
    }

    Ok(tensor)
}

/// 所有期望的参数取出后，剩余的键均视为多余
pub fn ensure_consumed(state: &StateDict) -> std::result::Result<(), CheckpointError> {
    match state.keys().next() {
        Some(extra) => Err(CheckpointError::UnexpectedKey(extra.clone())),
        None => Ok(()),
    }
}

/// 写出检查点
pub fn write_state_dict(path: &Path, state: &StateDict) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = state
        .iter()
        .map(|(name, array)| {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), array.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| ClassifierError::Internal(format!("invalid tensor {}: {}", name, e)))?;
        views.push((name.clone(), view));
    }

    let metadata: Option<HashMap<String, String>> = Some(HashMap::from([(
        "format".to_string(),
        "onnx-classifier-head".to_string(),
    )]));
    safetensors::serialize_to_file(views, &metadata, path).map_err(CheckpointError::from)?;

    tracing::info!("Checkpoint written to {}", path.display());
    Ok(())
}
