pub mod labels;
pub mod pipeline;
pub mod types;

pub use labels::LabelMap;
pub use pipeline::{load_model, predict, predict_image};
pub use types::Prediction;
