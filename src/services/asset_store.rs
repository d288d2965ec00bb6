use crate::config::StoreConfig;
use crate::error::{ConfigError, UploadError};
use crate::models::{PendingFile, StoreErrorBody, UploadedAsset};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::sync::mpsc;

/// Bytes handed to the transport so far, out of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub sent: u64,
    pub total: u64,
}

/// Sending half of an attempt's progress channel. Reports after the
/// receiver is gone are dropped silently.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, sent: u64, total: u64) {
        let _ = self.tx.send(ProgressEvent { sent, total });
    }
}

/// Remote service that stores an uploaded image and returns its URL
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store identifier used in logs
    fn name(&self) -> &'static str;

    /// Uploads the file, emitting progress before the terminal result.
    async fn upload(
        &self,
        file: PendingFile,
        progress: ProgressReporter,
    ) -> Result<UploadedAsset, UploadError>;
}

/// Unsigned multipart upload to a Cloudinary-compatible endpoint
pub struct CloudinaryStore {
    client: Client,
    config: StoreConfig,
    chunk_size: usize,
}

impl CloudinaryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: StoreConfig) -> Self {
        Self {
            client,
            config,
            chunk_size: 64 * 1024,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(StoreConfig::from_env()?))
    }

    /// Granularity of progress events. Smaller chunks mean more events.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn file_part(&self, file: &PendingFile, progress: ProgressReporter) -> Result<Part, UploadError> {
        let total = file.size_bytes();
        let chunks: Vec<Bytes> = (0..file.data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(file.data.len());
                file.data.slice(start..end)
            })
            .collect();

        progress.report(0, total);
        let mut sent = 0u64;
        let body = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            progress.report(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        Ok(part)
    }
}

#[async_trait]
impl AssetStore for CloudinaryStore {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(
        &self,
        file: PendingFile,
        progress: ProgressReporter,
    ) -> Result<UploadedAsset, UploadError> {
        let endpoint = self.config.upload_endpoint();
        tracing::debug!(
            file = %file.file_name,
            size = file.size_bytes(),
            endpoint = %endpoint,
            "Starting upload"
        );

        let mut form = Form::new()
            .part("file", self.file_part(&file, progress)?)
            .text("upload_preset", self.config.upload_preset.clone());
        if let Some(folder) = &self.config.folder {
            form = form.text("folder", folder.clone());
        }

        let response = self.client.post(&endpoint).multipart(form).send().await?;
        let status = response.status();

        if status.is_success() {
            let asset: UploadedAsset = response.json().await?;
            tracing::debug!(
                public_id = ?asset.public_id,
                width = ?asset.width,
                height = ?asset.height,
                format = ?asset.format,
                "Store accepted upload"
            );
            return Ok(asset);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StoreErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .filter(|m| !m.trim().is_empty());
        tracing::error!(status = status.as_u16(), body = %body, "Store rejected upload");

        Err(UploadError::ServerRejected {
            status: status.as_u16(),
            message,
        })
    }
}
