use crate::utils::error::ClassifierError;
use crate::Result;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use std::fmt;
use std::str::FromStr;

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// 有 CUDA 时使用 GPU，否则回退到 CPU
    #[default]
    Auto,
    Cpu,
    Cuda(i32),
}

impl Device {
    /// 将 `Auto` 解析为具体设备
    pub fn resolve(self) -> Device {
        match self {
            Device::Auto => {
                if cuda_available() {
                    Device::Cuda(0)
                } else {
                    Device::Cpu
                }
            }
            other => other,
        }
    }

    /// 已解析设备对应的执行提供者
    pub fn execution_providers(self) -> Result<Vec<ExecutionProviderDispatch>> {
        match self.resolve() {
            #[cfg(feature = "cuda")]
            Device::Cuda(device_id) => Ok(vec![
                ort::execution_providers::CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ]),
            #[cfg(not(feature = "cuda"))]
            Device::Cuda(device_id) => Err(ClassifierError::Config(format!(
                "device cuda:{} requested but the binary was built without the `cuda` feature",
                device_id
            ))),
            _ => Ok(vec![CPUExecutionProvider::default().build()]),
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::ExecutionProvider;

    ort::execution_providers::CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

impl FromStr for Device {
    type Err = ClassifierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            _ => {
                let id = value
                    .strip_prefix("cuda:")
                    .and_then(|id| id.parse::<i32>().ok())
                    .filter(|id| *id >= 0)
                    .ok_or_else(|| {
                        ClassifierError::Config(format!(
                            "Unknown device '{}', expected cpu, cuda, cuda:<id> or auto",
                            s
                        ))
                    })?;
                Ok(Device::Cuda(id))
            }
        }
    }
}
