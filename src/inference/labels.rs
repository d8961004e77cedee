use crate::utils::error::ClassifierError;
use crate::Result;
use std::str::FromStr;

/// 二分类索引到显示名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: [String; 2],
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::new("negative", "positive")
    }
}

impl LabelMap {
    pub fn new(negative: impl Into<String>, positive: impl Into<String>) -> Self {
        Self {
            labels: [negative.into(), positive.into()],
        }
    }

    pub fn get(&self, index: u8) -> Result<&str> {
        self.labels
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| ClassifierError::Internal(format!("no label for class index {}", index)))
    }

    pub fn labels(&self) -> &[String; 2] {
        &self.labels
    }
}

/// 解析 "negative,positive" 形式的配置
impl FromStr for LabelMap {
    type Err = ClassifierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [negative, positive] if !negative.is_empty() && !positive.is_empty() => {
                if negative == positive {
                    return Err(ClassifierError::Config(format!(
                        "labels must be distinct, got '{}' twice",
                        negative
                    )));
                }
                Ok(Self::new(*negative, *positive))
            }
            _ => Err(ClassifierError::Config(format!(
                "expected two comma separated labels, got '{}'",
                s
            ))),
        }
    }
}
