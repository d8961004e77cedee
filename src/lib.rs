pub mod config;
pub mod image;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use inference::{load_model, predict, Prediction};
pub use models::BinaryClassifier;
pub use utils::error::ClassifierError;

pub type Result<T> = std::result::Result<T, ClassifierError>;
