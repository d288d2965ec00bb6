pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{StoreConfig, UploadConfig};
pub use error::{ConfigError, UploadError};
pub use models::{CoordinatorSnapshot, CoordinatorState, PendingFile, PreviewReference};
pub use services::asset_store::{AssetStore, CloudinaryStore, ProgressReporter};
pub use services::coordinator::{ManualEntryError, UploadCoordinator};
pub use services::upload_service::{AssetUploadService, AttemptHandle, AttemptOutcome};
