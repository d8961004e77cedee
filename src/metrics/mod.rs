pub mod classification;
pub mod loss;

pub use classification::{auroc, exceeds_threshold, BinaryMetrics, ConfusionCounts};
pub use loss::{bce_with_logits, focal_loss, p_t, sigmoid};
