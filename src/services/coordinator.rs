use crate::config::UploadConfig;
use crate::error::{ConfigError, UploadError};
use crate::models::{
    AttemptId, CoordinatorSnapshot, CoordinatorState, PendingFile, PreviewReference,
    UploadProgress, UploadedAsset,
};
use crate::utils::validation::validate_selection;
use thiserror::Error;

/// Receives the canonical URL: the uploaded or typed URL, or `""` on removal.
pub type UrlCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManualEntryError {
    #[error("Remove the current image before entering a URL")]
    Busy,
    #[error("URL must not be empty")]
    Empty,
}

/// Handed out by `select_file`; carries the file to the store for one attempt.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub attempt: AttemptId,
    pub file: PendingFile,
}

/// Owns preview, progress and error for a single upload control and applies
/// every event to them. Events tagged with an attempt other than the current
/// one are dropped, so a superseded or removed upload can never clobber newer
/// state.
pub struct UploadCoordinator {
    config: UploadConfig,
    on_url_resolved: UrlCallback,
    state: CoordinatorState,
    preview: Option<PreviewReference>,
    progress: UploadProgress,
    error: Option<UploadError>,
    current_attempt: Option<AttemptId>,
    next_attempt: u64,
    file_input_key: u64,
    last_url: Option<String>,
}

impl UploadCoordinator {
    pub fn new(config: UploadConfig, on_url_resolved: UrlCallback) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let preview = config.initial_url.clone().map(PreviewReference::Remote);
        let last_url = config.initial_url.clone();

        Ok(Self {
            config,
            on_url_resolved,
            state: CoordinatorState::Idle,
            preview,
            progress: UploadProgress::default(),
            error: None,
            current_attempt: None,
            next_attempt: 1,
            file_input_key: 0,
            last_url,
        })
    }

    /// Replaces the options. A new `initial_url` is only shown when nothing
    /// else is displayed and no upload is running.
    pub fn configure(&mut self, config: UploadConfig) -> Result<(), ConfigError> {
        let config = config.validated()?;
        if self.preview.is_none() && self.current_attempt.is_none() {
            if let Some(url) = &config.initial_url {
                self.preview = Some(PreviewReference::Remote(url.clone()));
                self.last_url = Some(url.clone());
            }
        }
        self.config = config;
        Ok(())
    }

    pub fn set_on_url_resolved(&mut self, on_url_resolved: UrlCallback) {
        self.on_url_resolved = on_url_resolved;
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Validates the file and, when accepted, shows it as a local preview and
    /// opens a new attempt. Any attempt still in flight is superseded.
    ///
    /// A rejected file leaves preview, URL and any running upload untouched.
    pub fn select_file(&mut self, file: PendingFile) -> Result<UploadTicket, UploadError> {
        if let Err(e) = validate_selection(
            &file.mime_type,
            file.size_bytes(),
            self.config.max_size_mb,
            &self.config.accepted_mime_types,
        ) {
            tracing::debug!(file = %file.file_name, code = e.code, "Rejected selected file");
            let err = UploadError::ValidationRejected(e);
            self.error = Some(err.clone());
            return Err(err);
        }

        let attempt = AttemptId(self.next_attempt);
        self.next_attempt += 1;

        if let Some(previous) = self.current_attempt.replace(attempt) {
            tracing::debug!(%previous, %attempt, "Attempt superseded by new selection");
        }

        self.error = None;
        self.progress = UploadProgress::default();
        self.preview = Some(PreviewReference::Local(file.to_data_uri()));
        self.state = CoordinatorState::PreviewingLocal;

        Ok(UploadTicket { attempt, file })
    }

    /// Moves a freshly selected attempt into `Uploading`.
    pub fn begin_upload(&mut self, attempt: AttemptId) -> bool {
        if !self.is_current(attempt) || self.state != CoordinatorState::PreviewingLocal {
            return false;
        }
        self.state = CoordinatorState::Uploading;
        self.progress = UploadProgress::default();
        self.error = None;
        true
    }

    /// Applies a transport progress event. Returns the percentage now shown,
    /// or `None` when the event was ignored.
    pub fn record_progress(&mut self, attempt: AttemptId, sent: u64, total: u64) -> Option<u8> {
        if !self.is_current(attempt) || self.state != CoordinatorState::Uploading {
            tracing::trace!(%attempt, "Ignoring progress for inactive attempt");
            return None;
        }
        if let Some(next) = UploadProgress::from_bytes(sent, total) {
            self.progress.advance(next);
        }
        Some(self.progress.percent())
    }

    /// Terminal success. A body without any URL is turned into a failure.
    pub fn complete_upload(&mut self, attempt: AttemptId, asset: UploadedAsset) -> bool {
        if !self.is_current(attempt) {
            tracing::debug!(%attempt, "Discarding result of abandoned attempt");
            return false;
        }

        let Some(url) = asset.canonical_url().map(str::to_string) else {
            return self.fail_upload(
                attempt,
                UploadError::MalformedResponse(
                    "response contained neither secure_url nor url".to_string(),
                ),
            );
        };

        tracing::info!(%attempt, url = %url, "Upload resolved");
        self.current_attempt = None;
        self.preview = Some(PreviewReference::Remote(url.clone()));
        self.error = None;
        self.state = CoordinatorState::Resolved;
        self.progress = UploadProgress::default();
        self.last_url = Some(url.clone());
        (self.on_url_resolved)(&url);
        true
    }

    /// Terminal failure: shows the error and drops the optimistic preview.
    pub fn fail_upload(&mut self, attempt: AttemptId, error: UploadError) -> bool {
        if !self.is_current(attempt) {
            tracing::debug!(%attempt, error = %error, "Discarding failure of abandoned attempt");
            return false;
        }

        tracing::warn!(%attempt, code = error.code(), "Upload failed: {}", error);
        self.current_attempt = None;
        self.enter_error(error);
        true
    }

    /// The renderer could not display `rendered`. Ignored when the preview has
    /// changed since. Abandons the running attempt, if any.
    pub fn preview_failed(&mut self, rendered: &str, reason: impl Into<String>) -> bool {
        if self.preview.as_ref().map(PreviewReference::as_str) != Some(rendered) {
            return false;
        }
        let error = UploadError::PreviewDecodeFailed(reason.into());
        tracing::warn!(attempt = ?self.current_attempt, "{}", error);
        self.current_attempt = None;
        self.enter_error(error);
        true
    }

    /// Clears preview and error and tells the host form the URL is now empty.
    /// Any attempt in flight is abandoned; its id is returned.
    pub fn remove_current(&mut self) -> Option<AttemptId> {
        let abandoned = self.current_attempt.take();
        if let Some(attempt) = abandoned {
            tracing::debug!(%attempt, "Attempt abandoned by removal");
        }
        self.preview = None;
        self.error = None;
        self.progress = UploadProgress::default();
        self.state = CoordinatorState::Idle;
        self.last_url = None;
        (self.on_url_resolved)("");
        abandoned
    }

    /// Hands a typed URL straight to the host form. Only possible while
    /// nothing is previewed or uploading.
    pub fn set_url_manually(&mut self, url: &str) -> Result<(), ManualEntryError> {
        if !self.manual_entry_available() {
            return Err(ManualEntryError::Busy);
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(ManualEntryError::Empty);
        }
        self.error = None;
        self.state = CoordinatorState::Idle;
        self.last_url = Some(url.to_string());
        (self.on_url_resolved)(url);
        Ok(())
    }

    fn enter_error(&mut self, error: UploadError) {
        self.error = Some(error);
        self.preview = None;
        self.state = CoordinatorState::Error;
        self.progress = UploadProgress::default();
        // remount the file input so the same file can be picked again
        self.file_input_key += 1;
    }

    pub fn is_current(&self, attempt: AttemptId) -> bool {
        self.current_attempt == Some(attempt)
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.current_attempt
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn preview(&self) -> Option<&PreviewReference> {
        self.preview.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    pub fn error(&self) -> Option<&UploadError> {
        self.error.as_ref()
    }

    /// Last URL handed to the host form, used to prefill manual entry after a
    /// failure.
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub fn manual_entry_available(&self) -> bool {
        self.preview.is_none() && self.current_attempt.is_none()
    }

    /// Changes whenever the file input must be reset.
    pub fn file_input_key(&self) -> u64 {
        self.file_input_key
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            state: self.state,
            preview: self.preview.as_ref().map(|p| p.as_str().to_string()),
            preview_is_local: self.preview.as_ref().is_some_and(PreviewReference::is_local),
            progress: self.progress.percent(),
            error: self.error.as_ref().map(ToString::to_string),
            manual_entry_available: self.manual_entry_available(),
            file_input_key: self.file_input_key,
        }
    }
}
