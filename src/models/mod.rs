use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A locally selected file waiting to be uploaded.
///
/// Cloning is cheap: the content is reference counted.
#[derive(Clone)]
pub struct PendingFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl PendingFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// `data:` URI usable as an optimistic preview before the upload lands.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

impl fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// What the upload control currently displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewReference {
    /// Decoded local file, shown while the upload is in flight
    Local(String),
    /// Confirmed remote URL
    Remote(String),
}

impl PreviewReference {
    pub fn as_str(&self) -> &str {
        match self {
            PreviewReference::Local(uri) | PreviewReference::Remote(uri) => uri,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PreviewReference::Local(_))
    }
}

/// Identity of one select → upload → resolve cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upload percentage that never moves backwards within an attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct UploadProgress(u8);

impl UploadProgress {
    pub fn percent(self) -> u8 {
        self.0
    }

    /// `round(sent / total * 100)`, capped at 100. `None` when the total is unknown.
    pub fn from_bytes(sent: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let pct = (sent as f64 / total as f64 * 100.0).round();
        Some(Self(pct.clamp(0.0, 100.0) as u8))
    }

    /// Keeps the larger of the two values.
    pub fn advance(&mut self, next: UploadProgress) -> bool {
        if next.0 > self.0 {
            self.0 = next.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    PreviewingLocal,
    Uploading,
    Resolved,
    Error,
}

/// Success body returned by the asset store. Only the URL fields matter;
/// the rest is kept for logging. A field of an unexpected shape reads as
/// absent instead of failing the whole body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadedAsset {
    #[serde(default, deserialize_with = "lenient")]
    pub secure_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub public_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl UploadedAsset {
    /// Prefers `secure_url`, falls back to `url`. Empty strings count as absent.
    pub fn canonical_url(&self) -> Option<&str> {
        self.secure_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.trim().is_empty()))
    }
}

/// Failure body returned by the asset store: `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
pub struct StoreErrorBody {
    pub error: StoreErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct StoreErrorDetail {
    pub message: Option<String>,
}

/// Point-in-time view of the coordinator, for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub state: CoordinatorState,
    pub preview: Option<String>,
    pub preview_is_local: bool,
    pub progress: u8,
    pub error: Option<String>,
    pub manual_entry_available: bool,
    pub file_input_key: u64,
}
