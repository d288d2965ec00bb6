use crate::error::ConfigError;
use crate::utils::validation::{DEFAULT_ACCEPTED_MIME_TYPES, DEFAULT_MAX_SIZE_MB, normalize_mime};
use std::env;
use std::time::Duration;
use validator::Validate;

/// Options recognised by the upload coordinator
#[derive(Debug, Clone, Validate)]
pub struct UploadConfig {
    /// Pre-existing remote URL shown as the starting preview
    pub initial_url: Option<String>,

    /// Upper bound on accepted file size in MB (default: 10)
    #[validate(range(exclusive_min = 0.0, message = "max_size_mb must be positive"))]
    pub max_size_mb: f64,

    /// Whitelist of acceptable content types, normalized and de-duplicated
    #[validate(length(min = 1, message = "at least one MIME type must be accepted"))]
    pub accepted_mime_types: Vec<String>,

    /// Upper bound on a single upload attempt (default: 120s)
    pub upload_timeout: Duration,

    /// Abort the transfer of a superseded or removed attempt instead of only
    /// ignoring its result (default: true)
    pub abort_superseded: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            initial_url: None,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            accepted_mime_types: DEFAULT_ACCEPTED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            upload_timeout: Duration::from_secs(120),
            abort_superseded: true,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            initial_url: env::var("UPLOAD_INITIAL_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            max_size_mb: env::var("UPLOAD_MAX_SIZE_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_size_mb),

            accepted_mime_types: env::var("UPLOAD_ACCEPTED_MIME_TYPES")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.accepted_mime_types),

            upload_timeout: env::var("UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.upload_timeout),

            abort_superseded: env::var("UPLOAD_ABORT_SUPERSEDED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.abort_superseded),
        }
    }

    /// Relaxed limits for local testing against a development store
    pub fn development() -> Self {
        Self {
            max_size_mb: 50.0,
            upload_timeout: Duration::from_secs(600),
            ..Self::default()
        }
    }

    /// Normalizes the MIME list and checks every option.
    /// Returns the cleaned-up configuration.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let mut accepted: Vec<String> = Vec::with_capacity(self.accepted_mime_types.len());
        for raw in &self.accepted_mime_types {
            if raw.trim().is_empty() {
                continue;
            }
            let normalized = normalize_mime(raw);
            if !normalized.contains('/') {
                return Err(ConfigError::InvalidMimeType(raw.clone()));
            }
            if !accepted.contains(&normalized) {
                accepted.push(normalized);
            }
        }
        self.accepted_mime_types = accepted;
        self.initial_url = self.initial_url.filter(|u| !u.trim().is_empty());

        self.validate()?;
        Ok(self)
    }
}

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Deployment settings for the remote asset store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Account identifier the upload endpoint is templated on
    pub cloud_name: String,

    /// Unsigned upload preset sent with every request
    pub upload_preset: String,

    /// Optional destination folder on the store
    pub folder: Option<String>,

    /// Store base URL (default: "https://api.cloudinary.com")
    pub api_base: String,
}

impl StoreConfig {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            folder: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let cloud_name = env::var("CLOUDINARY_CLOUD_NAME")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("CLOUDINARY_CLOUD_NAME"))?;
        let upload_preset = env::var("CLOUDINARY_UPLOAD_PRESET")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("CLOUDINARY_UPLOAD_PRESET"))?;

        Ok(Self {
            cloud_name,
            upload_preset,
            folder: env::var("CLOUDINARY_FOLDER").ok().filter(|v| !v.is_empty()),
            api_base: env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }

    pub fn upload_endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.api_base.trim_end_matches('/'),
            self.cloud_name
        )
    }
}
