use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use fellowship_assets::services::asset_store::ProgressEvent;
use fellowship_assets::{
    AssetStore, AssetUploadService, AttemptOutcome, CloudinaryStore, PendingFile, ProgressReporter,
    StoreConfig, UploadConfig, UploadError,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

const PRESET: &str = "fellowship_unsigned";

/// Minimal stand-in for the asset host's unsigned upload endpoint.
/// The cloud name selects the behaviour.
async fn upload_endpoint(Path(cloud): Path<String>, mut multipart: Multipart) -> Response {
    match cloud.as_str() {
        "broken" => return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response(),
        "garbled" => return (StatusCode::OK, "<html>not json</html>").into_response(),
        "urlless" => return Json(json!({ "public_id": "x", "format": "jpg" })).into_response(),
        "quirky" => {
            return Json(json!({
                "secure_url": "https://res.cloudinary.com/quirky/image/upload/v1/banner.jpg",
                "width": 640.0,
                "height": "480",
                "created_at": "2024-03-01 10:00:00",
                "bytes": null
            }))
            .into_response();
        }
        _ => {}
    }

    let mut preset = None;
    let mut folder = None;
    let mut file_name = None;
    let mut content_type = None;
    let mut size = 0usize;

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                size = field.bytes().await.unwrap().len();
            }
            "upload_preset" => preset = Some(field.text().await.unwrap()),
            "folder" => folder = Some(field.text().await.unwrap()),
            _ => {}
        }
    }

    if preset.as_deref() != Some(PRESET) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Upload preset not found" } })),
        )
            .into_response();
    }

    let path = match folder {
        Some(folder) => format!("{}/{}", folder, file_name.unwrap_or_default()),
        None => file_name.unwrap_or_default(),
    };
    Json(json!({
        "public_id": path,
        "secure_url": format!("https://res.cloudinary.com/{}/image/upload/v1/{}", cloud, path),
        "url": format!("http://res.cloudinary.com/{}/image/upload/v1/{}", cloud, path),
        "bytes": size,
        "format": content_type.unwrap_or_default(),
        "width": 640,
        "height": 480,
        "created_at": "2024-03-01T10:00:00Z"
    }))
    .into_response()
}

async fn spawn_store() -> String {
    let app = Router::new()
        .route("/v1_1/:cloud/image/upload", post(upload_endpoint))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn store_config(base: &str, cloud: &str, preset: &str) -> StoreConfig {
    let mut config = StoreConfig::new(cloud, preset);
    config.api_base = base.to_string();
    config
}

fn jpeg(size: usize) -> PendingFile {
    let mut data = vec![7u8; size];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    PendingFile::new("worship-night.jpg", "image/jpeg", data)
}

/// Every event is sent before the request body finishes, so by the time
/// `upload` returns the channel holds all of them.
fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_upload_reports_progress_and_returns_asset() {
    let base = spawn_store().await;
    let mut config = store_config(&base, "fellowship", PRESET);
    config.folder = Some("events".to_string());
    let store = CloudinaryStore::new(config).with_chunk_size(16 * 1024);

    let (reporter, rx) = ProgressReporter::channel();
    let asset = store.upload(jpeg(300 * 1024), reporter).await.unwrap();

    assert_eq!(
        asset.canonical_url(),
        Some("https://res.cloudinary.com/fellowship/image/upload/v1/events/worship-night.jpg")
    );
    assert_eq!(asset.bytes, Some(300 * 1024));
    assert_eq!(asset.format.as_deref(), Some("image/jpeg"));
    assert!(asset.created_at.is_some());

    let events = drain(rx);
    assert!(events.len() > 2);
    assert_eq!(events.first().unwrap().sent, 0);
    assert_eq!(
        *events.last().unwrap(),
        ProgressEvent { sent: 300 * 1024, total: 300 * 1024 }
    );
    assert!(events.windows(2).all(|w| w[0].sent <= w[1].sent));
}

#[tokio::test]
async fn test_server_message_is_surfaced() {
    let base = spawn_store().await;
    let store = CloudinaryStore::new(store_config(&base, "fellowship", "wrong_preset"));

    let (reporter, _rx) = ProgressReporter::channel();
    let err = store.upload(jpeg(1024), reporter).await.unwrap_err();
    assert_eq!(
        err,
        UploadError::ServerRejected {
            status: 400,
            message: Some("Upload preset not found".to_string())
        }
    );
    assert_eq!(err.to_string(), "Upload preset not found");
}

#[tokio::test]
async fn test_bare_status_is_generic_failure() {
    let base = spawn_store().await;
    let store = CloudinaryStore::new(store_config(&base, "broken", PRESET));

    let (reporter, _rx) = ProgressReporter::channel();
    let err = store.upload(jpeg(1024), reporter).await.unwrap_err();
    assert_eq!(err, UploadError::ServerRejected { status: 502, message: None });
    assert_eq!(err.to_string(), "Upload failed");
}

#[tokio::test]
async fn test_non_json_success_is_malformed() {
    let base = spawn_store().await;
    let store = CloudinaryStore::new(store_config(&base, "garbled", PRESET));

    let (reporter, _rx) = ProgressReporter::channel();
    let err = store.upload(jpeg(1024), reporter).await.unwrap_err();
    assert!(matches!(err, UploadError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_service_end_to_end() {
    let base = spawn_store().await;
    let store = Arc::new(CloudinaryStore::new(store_config(&base, "fellowship", PRESET)));
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = calls.clone();
    let service = AssetUploadService::new(
        store,
        UploadConfig::default(),
        Box::new(move |url: &str| sink.lock().unwrap().push(url.to_string())),
    )
    .unwrap();

    let handle = service.select_file(jpeg(2 * 1024 * 1024)).await.unwrap();
    let outcome = handle.outcome().await;
    assert_eq!(
        outcome,
        AttemptOutcome::Resolved {
            url: "https://res.cloudinary.com/fellowship/image/upload/v1/worship-night.jpg".to_string()
        }
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["https://res.cloudinary.com/fellowship/image/upload/v1/worship-night.jpg"]
    );
    assert_eq!(service.snapshot().await.progress, 0);
}

#[tokio::test]
async fn test_service_urlless_response_fails() {
    let base = spawn_store().await;
    let store = Arc::new(CloudinaryStore::new(store_config(&base, "urlless", PRESET)));
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = calls.clone();
    let service = AssetUploadService::new(
        store,
        UploadConfig::default(),
        Box::new(move |url: &str| sink.lock().unwrap().push(url.to_string())),
    )
    .unwrap();

    let outcome = service.select_file(jpeg(1024)).await.unwrap().outcome().await;
    assert!(matches!(outcome, AttemptOutcome::Failed(UploadError::MalformedResponse(_))));
    let snapshot = service.snapshot().await;
    assert!(snapshot.preview.is_none());
    assert!(snapshot.error.is_some());
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unexpected_metadata_still_resolves() {
    let base = spawn_store().await;
    let store = Arc::new(CloudinaryStore::new(store_config(&base, "quirky", PRESET)));
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = calls.clone();
    let service = AssetUploadService::new(
        store,
        UploadConfig::default(),
        Box::new(move |url: &str| sink.lock().unwrap().push(url.to_string())),
    )
    .unwrap();

    let outcome = service.select_file(jpeg(1024)).await.unwrap().outcome().await;
    assert_eq!(
        outcome,
        AttemptOutcome::Resolved {
            url: "https://res.cloudinary.com/quirky/image/upload/v1/banner.jpg".to_string()
        }
    );
    let snapshot = service.snapshot().await;
    assert!(snapshot.error.is_none());
    assert_eq!(
        snapshot.preview.as_deref(),
        Some("https://res.cloudinary.com/quirky/image/upload/v1/banner.jpg")
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["https://res.cloudinary.com/quirky/image/upload/v1/banner.jpg"]
    );
}
