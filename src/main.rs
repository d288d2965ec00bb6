use anyhow::{Context, anyhow};
use clap::Parser;
use dotenvy::dotenv;
use fellowship_assets::utils::files::read_pending_file;
use fellowship_assets::{AssetUploadService, AttemptOutcome, CloudinaryStore, UploadConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upload an image to the asset store and print its URL
#[derive(Parser, Debug)]
#[command(name = "asset-upload", version)]
struct Cli {
    /// Image to upload
    file: PathBuf,

    /// Reject files larger than this many MB
    #[arg(long)]
    max_size_mb: Option<f64>,

    /// URL currently stored in the form field
    #[arg(long)]
    initial_url: Option<String>,

    /// Give up on the upload after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Decode the image locally before trusting the upload
    #[arg(long)]
    check_preview: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fellowship_assets=info,asset_upload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = UploadConfig::from_env();
    if let Some(max) = cli.max_size_mb {
        config.max_size_mb = max;
    }
    if cli.initial_url.is_some() {
        config.initial_url = cli.initial_url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.upload_timeout = Duration::from_secs(secs);
    }
    info!(
        "🛡️  Upload Config: Max Size={}MB, Accepted={}, Timeout={}s",
        config.max_size_mb,
        config.accepted_mime_types.join(","),
        config.upload_timeout.as_secs()
    );

    let store = CloudinaryStore::from_env().context("asset store is not configured")?;

    let (url_tx, mut url_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let service = AssetUploadService::new(
        Arc::new(store),
        config,
        Box::new(move |url: &str| {
            let _ = url_tx.send(url.to_string());
        }),
    )?;

    let file = read_pending_file(&cli.file)
        .await
        .with_context(|| format!("cannot read {}", cli.file.display()))?;
    info!(
        "📤 Uploading {} ({} bytes, {})",
        file.file_name,
        file.size_bytes(),
        file.mime_type
    );

    let handle = service.select_file(file).await.map_err(|e| {
        error!("❌ {}", e);
        anyhow!(e)
    })?;

    if cli.check_preview {
        match service.verify_local_preview().await {
            Ok(Some(info)) => info!("🖼️  Preview {}x{} ({})", info.width, info.height, info.format),
            Ok(None) => {}
            Err(e) => {
                error!("❌ {}", e);
                return Err(anyhow!(e));
            }
        }
    }

    let watcher = service.clone();
    let progress_task = tokio::spawn(async move {
        let mut last = 0u8;
        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let snapshot = watcher.snapshot().await;
            if snapshot.progress > last {
                last = snapshot.progress;
                info!("⏳ {}%", last);
            }
        }
    });

    let outcome = tokio::select! {
        outcome = handle.outcome() => outcome,
        _ = signal::ctrl_c() => {
            warn!("⌨️  Ctrl+C received, abandoning upload...");
            service.remove_current().await;
            AttemptOutcome::Discarded
        }
    };
    progress_task.abort();

    while let Ok(url) = url_rx.try_recv() {
        tracing::debug!("Form field set to '{}'", url);
    }

    match outcome {
        AttemptOutcome::Resolved { url } => {
            info!("✅ Upload complete");
            println!("{}", url);
            Ok(())
        }
        AttemptOutcome::Failed(e) => {
            error!("❌ {}", e);
            if let Some(previous) = service.last_url().await {
                info!("Form keeps previous URL: {}", previous);
            }
            Err(anyhow!(e))
        }
        AttemptOutcome::Discarded => {
            info!("🛑 Upload abandoned.");
            Ok(())
        }
    }
}
