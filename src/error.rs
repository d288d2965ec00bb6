use crate::utils::validation::ValidationError;
use thiserror::Error;

/// Every way an upload attempt can end without a usable URL.
///
/// The `Display` output of each variant is the message shown next to the
/// upload control, so keep it short and human readable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    /// Bad type or size, rejected locally before any network call.
    #[error("{0}")]
    ValidationRejected(#[from] ValidationError),

    /// Transport-level failure (connection refused, timeout, reset).
    #[error("Network error during upload: {0}")]
    NetworkFailure(String),

    /// Non-2xx response from the asset store.
    #[error("{}", .message.as_deref().unwrap_or("Upload failed"))]
    ServerRejected { status: u16, message: Option<String> },

    /// 2xx response we could not turn into a URL.
    #[error("Upload failed: {0}")]
    MalformedResponse(String),

    /// The local preview could not be decoded for display.
    #[error("Failed to load image preview: {0}")]
    PreviewDecodeFailed(String),

    #[error("Upload was cancelled")]
    Cancelled,
}

impl UploadError {
    /// Stable machine-readable code, mirroring `ValidationError::code`.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::ValidationRejected(e) => e.code,
            UploadError::NetworkFailure(_) => "NETWORK_FAILURE",
            UploadError::ServerRejected { .. } => "SERVER_REJECTED",
            UploadError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            UploadError::PreviewDecodeFailed(_) => "PREVIEW_DECODE_FAILED",
            UploadError::Cancelled => "CANCELLED",
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UploadError::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            UploadError::ServerRejected {
                status: status.as_u16(),
                message: None,
            }
        } else {
            UploadError::NetworkFailure(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration: {0} must be set")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Invalid MIME type in configuration: '{0}'")]
    InvalidMimeType(String),
}
