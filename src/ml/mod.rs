pub mod ml_model;
pub mod inference;

pub use ml_model::{ModelConfig, PestClassifier};
pub use inference::{load_model, ModelHandle};
