use crate::inference::LabelMap;
use crate::models::Device;
use crate::utils::error::ClassifierError;
use crate::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// 模型配置
    pub model: ModelConfig,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 上传文件存储配置
    pub media: MediaConfig,

    /// 类别索引到显示名称的映射
    pub labels: LabelMap,
}

/// 模型结构与超参数
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 骨干网络（ONNX）路径
    pub backbone_path: PathBuf,

    /// 分类头检查点（safetensors）路径
    pub checkpoint_path: PathBuf,

    pub device: Device,

    /// 冻结骨干网络，只有分类头可训练
    pub freeze_backbone: bool,

    pub hidden_size: usize,
    pub dropout: f32,

    /// focal loss 参数
    pub gamma: f32,
    pub alpha: f32,

    /// sigmoid 概率严格大于该值判为正类
    pub threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backbone_path: PathBuf::from("models/backbone.onnx"),
            checkpoint_path: PathBuf::from("models/best_model.safetensors"),
            device: Device::Auto,
            freeze_backbone: true,
            hidden_size: 512,
            dropout: 0.3,
            gamma: 2.5,
            alpha: 0.75,
            threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 单个上传文件大小上限（字节）
    pub max_upload_size: usize,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// 上传文件保存目录
    pub media_dir: PathBuf,

    /// 对外访问前缀，例如 "/media/"
    pub media_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("media"),
            media_url: "/media/".to_string(),
        }
    }
}

impl Config {
    pub fn new(bind_addr: String, workers: Option<usize>, dev_mode: bool) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        if workers == 0 {
            return Err(ClassifierError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let max_upload_size = 10 * 1024 * 1024; // 10MB
        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            // multipart 边界和表单字段需要额外空间
            max_request_size: max_upload_size + 64 * 1024,
            max_upload_size,
        };

        Ok(Self {
            bind_addr,
            workers,
            dev_mode,
            model: ModelConfig::default(),
            onnx_config,
            server_config,
            media: MediaConfig::default(),
            labels: LabelMap::default(),
        })
    }

    /// 启动前检查配置一致性
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;

        if !(model.threshold > 0.0 && model.threshold < 1.0) {
            return Err(ClassifierError::Config(format!(
                "threshold must be in (0, 1), got {}",
                model.threshold
            )));
        }
        if model.gamma < 0.0 || !model.gamma.is_finite() {
            return Err(ClassifierError::Config(format!(
                "focal loss gamma must be >= 0, got {}",
                model.gamma
            )));
        }
        if model.alpha <= 0.0 || !model.alpha.is_finite() {
            return Err(ClassifierError::Config(format!(
                "focal loss alpha must be > 0, got {}",
                model.alpha
            )));
        }
        if !(0.0..1.0).contains(&model.dropout) {
            return Err(ClassifierError::Config(format!(
                "dropout must be in [0, 1), got {}",
                model.dropout
            )));
        }
        if model.hidden_size == 0 {
            return Err(ClassifierError::Config(
                "hidden size must be positive".to_string(),
            ));
        }
        let media_url = &self.media.media_url;
        if media_url.len() < 2 || !media_url.starts_with('/') || !media_url.ends_with('/') {
            return Err(ClassifierError::Config(format!(
                "media url must be a non-root path starting and ending with '/', got {}",
                self.media.media_url
            )));
        }

        Ok(())
    }

    /// 上传文件的访问地址
    pub fn media_url_for(&self, file_name: &str) -> String {
        format!("{}{}", self.media.media_url, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new("127.0.0.1:0".to_string(), Some(2), false).unwrap()
    }

    #[test]
    fn defaults_match_reference_hyperparameters() {
        let config = config();
        assert_eq!(config.model.gamma, 2.5);
        assert_eq!(config.model.alpha, 0.75);
        assert_eq!(config.model.threshold, 0.4);
        assert_eq!(config.model.hidden_size, 512);
        assert!(config.model.freeze_backbone);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(Config::new("127.0.0.1:0".to_string(), Some(0), false).is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = config();
        config.model.threshold = 1.0;
        assert!(matches!(config.validate(), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn media_url_joins_file_name() {
        let mut config = config();
        assert_eq!(config.media_url_for("cat.png"), "/media/cat.png");

        config.media.media_url = "/media".to_string();
        assert!(config.validate().is_err());

        config.media.media_url = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn dev_mode_extends_timeout() {
        let dev = Config::new("127.0.0.1:0".to_string(), None, true).unwrap();
        assert_eq!(dev.server_config.request_timeout, 300);
        assert_eq!(config().server_config.request_timeout, 60);
    }
}
