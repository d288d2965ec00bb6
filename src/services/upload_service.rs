use crate::config::UploadConfig;
use crate::error::{ConfigError, UploadError};
use crate::models::{AttemptId, CoordinatorSnapshot, CoordinatorState, PendingFile};
use crate::services::asset_store::{AssetStore, ProgressReporter};
use crate::services::coordinator::{ManualEntryError, UploadCoordinator, UploadTicket, UrlCallback};
use crate::services::preview::{PreviewDecoder, PreviewInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How an attempt ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Resolved { url: String },
    Failed(UploadError),
    /// Superseded or removed before its result arrived; nothing was applied.
    Discarded,
}

/// Returned by `select_file` for each accepted file.
pub struct AttemptHandle {
    pub attempt: AttemptId,
    join: JoinHandle<AttemptOutcome>,
    inner: Arc<Mutex<Inner>>,
}

impl AttemptHandle {
    /// Waits for the attempt to finish. A task that panicked or was aborted
    /// still fails its attempt, so the control does not stay stuck uploading.
    pub async fn outcome(self) -> AttemptOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(attempt = %self.attempt, "Upload task ended abnormally: {}", e);
                let mut inner = self.inner.lock().await;
                let applied = inner.coordinator.fail_upload(self.attempt, UploadError::Cancelled);
                inner.reap();
                if applied {
                    AttemptOutcome::Failed(UploadError::Cancelled)
                } else {
                    AttemptOutcome::Discarded
                }
            }
        }
    }
}

struct InFlight {
    attempt: AttemptId,
    cancel: CancellationToken,
    file: PendingFile,
}

struct Inner {
    coordinator: UploadCoordinator,
    in_flight: Option<InFlight>,
}

impl Inner {
    /// Drops bookkeeping for an attempt the coordinator no longer tracks,
    /// aborting its transfer when configured to.
    fn reap(&mut self) {
        let stale = self
            .in_flight
            .as_ref()
            .is_some_and(|f| !self.coordinator.is_current(f.attempt));
        if !stale {
            return;
        }
        if let Some(flight) = self.in_flight.take() {
            if self.coordinator.config().abort_superseded && !flight.cancel.is_cancelled() {
                tracing::debug!(attempt = %flight.attempt, "Aborting abandoned transfer");
                flight.cancel.cancel();
            }
        }
    }
}

/// Runs upload attempts for one control against an asset store.
///
/// All coordinator state sits behind a single async mutex; the spawned
/// attempt task only ever touches it through attempt-tagged events.
#[derive(Clone)]
pub struct AssetUploadService {
    inner: Arc<Mutex<Inner>>,
    store: Arc<dyn AssetStore>,
}

impl AssetUploadService {
    pub fn new(
        store: Arc<dyn AssetStore>,
        config: UploadConfig,
        on_url_resolved: UrlCallback,
    ) -> Result<Self, ConfigError> {
        let coordinator = UploadCoordinator::new(config, on_url_resolved)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                coordinator,
                in_flight: None,
            })),
            store,
        })
    }

    pub async fn configure(&self, config: UploadConfig) -> Result<(), ConfigError> {
        self.inner.lock().await.coordinator.configure(config)
    }

    /// Validates and previews the file, then starts uploading it in the
    /// background. Rejections are returned without touching the network.
    pub async fn select_file(&self, file: PendingFile) -> Result<AttemptHandle, UploadError> {
        let mut inner = self.inner.lock().await;
        let ticket = inner.coordinator.select_file(file)?;
        inner.reap();

        let cancel = CancellationToken::new();
        inner.coordinator.begin_upload(ticket.attempt);
        inner.in_flight = Some(InFlight {
            attempt: ticket.attempt,
            cancel: cancel.clone(),
            file: ticket.file.clone(),
        });
        let timeout = inner.coordinator.config().upload_timeout;
        drop(inner);

        tracing::info!(
            attempt = %ticket.attempt,
            file = %ticket.file.file_name,
            size = ticket.file.size_bytes(),
            store = self.store.name(),
            "Upload started"
        );

        let attempt = ticket.attempt;
        let join = tokio::spawn(run_attempt(
            self.inner.clone(),
            self.store.clone(),
            ticket,
            cancel,
            timeout,
        ));
        Ok(AttemptHandle {
            attempt,
            join,
            inner: self.inner.clone(),
        })
    }

    pub async fn remove_current(&self) {
        let mut inner = self.inner.lock().await;
        inner.coordinator.remove_current();
        inner.reap();
    }

    pub async fn set_url_manually(&self, url: &str) -> Result<(), ManualEntryError> {
        self.inner.lock().await.coordinator.set_url_manually(url)
    }

    /// Aborts the running transfer. The attempt then fails with
    /// "Upload was cancelled". Returns false when nothing was running.
    pub async fn cancel_current(&self) -> bool {
        let inner = self.inner.lock().await;
        match &inner.in_flight {
            Some(flight) if !flight.cancel.is_cancelled() => {
                flight.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Called by the renderer when it could not display `rendered`.
    pub async fn report_preview_failure(&self, rendered: &str, reason: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let applied = inner.coordinator.preview_failed(rendered, reason);
        inner.reap();
        applied
    }

    /// Decodes the local file behind the current optimistic preview. A file
    /// that cannot be decoded fails the attempt like a renderer error would.
    pub async fn verify_local_preview(&self) -> Result<Option<PreviewInfo>, UploadError> {
        let (file, rendered) = {
            let inner = self.inner.lock().await;
            let Some(flight) = &inner.in_flight else {
                return Ok(None);
            };
            let Some(preview) = inner.coordinator.preview().filter(|p| p.is_local()) else {
                return Ok(None);
            };
            (flight.file.clone(), preview.as_str().to_string())
        };

        let decoded = tokio::task::spawn_blocking(move || PreviewDecoder::inspect(&file.data))
            .await
            .map_err(|e| UploadError::PreviewDecodeFailed(e.to_string()))?;

        match decoded {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                let reason = match &e {
                    UploadError::PreviewDecodeFailed(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.report_preview_failure(&rendered, &reason).await;
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        self.inner.lock().await.coordinator.snapshot()
    }

    pub async fn last_url(&self) -> Option<String> {
        self.inner.lock().await.coordinator.last_url().map(str::to_string)
    }
}

async fn run_attempt(
    inner: Arc<Mutex<Inner>>,
    store: Arc<dyn AssetStore>,
    ticket: UploadTicket,
    cancel: CancellationToken,
    timeout: Duration,
) -> AttemptOutcome {
    let attempt = ticket.attempt;
    let (reporter, mut progress_rx) = ProgressReporter::channel();

    let upload = async {
        tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            res = tokio::time::timeout(timeout, store.upload(ticket.file, reporter)) => match res {
                Ok(result) => result,
                Err(_) => Err(UploadError::NetworkFailure(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            },
        }
    };
    tokio::pin!(upload);

    let result = loop {
        tokio::select! {
            biased;
            Some(event) = progress_rx.recv() => {
                let mut inner = inner.lock().await;
                if let Some(pct) = inner.coordinator.record_progress(attempt, event.sent, event.total) {
                    tracing::trace!(%attempt, progress = pct, "Upload progress");
                }
            }
            result = &mut upload => break result,
        }
    };

    let mut inner = inner.lock().await;
    while let Ok(event) = progress_rx.try_recv() {
        inner.coordinator.record_progress(attempt, event.sent, event.total);
    }

    let outcome = match result {
        Ok(asset) => {
            if !inner.coordinator.complete_upload(attempt, asset) {
                AttemptOutcome::Discarded
            } else if inner.coordinator.state() == CoordinatorState::Resolved {
                AttemptOutcome::Resolved {
                    url: inner.coordinator.last_url().unwrap_or_default().to_string(),
                }
            } else {
                AttemptOutcome::Failed(
                    inner
                        .coordinator
                        .error()
                        .cloned()
                        .unwrap_or(UploadError::MalformedResponse("no URL".to_string())),
                )
            }
        }
        Err(e) => {
            if inner.coordinator.fail_upload(attempt, e.clone()) {
                AttemptOutcome::Failed(e)
            } else {
                AttemptOutcome::Discarded
            }
        }
    };
    inner.reap();
    outcome
}
