pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::{ModelMetadata, METADATA_FORMAT_VERSION};
pub use model_storage::{save_model_with_metadata, load_metadata, load_model_with_metadata};
pub use config::{AppConfig, AlbumSettings, DeviceType, ModelSettings};
