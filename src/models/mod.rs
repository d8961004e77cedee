pub mod backbone;
pub mod checkpoint;
pub mod classifier;
pub mod device;
pub mod head;
pub mod manager;

pub use backbone::{Backbone, OnnxBackbone};
pub use classifier::BinaryClassifier;
pub use device::Device;
pub use head::{ClassifierHead, Mode};
pub use manager::{ModelManager, ModelStats};
