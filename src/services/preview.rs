use crate::error::UploadError;
use image::io::Reader as ImageReader;
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

pub struct PreviewDecoder;

impl PreviewDecoder {
    /// Decodes the image the way a renderer would before showing it.
    pub fn inspect(bytes: &[u8]) -> Result<PreviewInfo, UploadError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| UploadError::PreviewDecodeFailed(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| UploadError::PreviewDecodeFailed("unrecognized image format".to_string()))?;

        let img = reader
            .decode()
            .map_err(|e| UploadError::PreviewDecodeFailed(e.to_string()))?;

        Ok(PreviewInfo {
            width: img.width(),
            height: img.height(),
            format: format
                .extensions_str()
                .first()
                .map(|ext| ext.to_string())
                .unwrap_or_else(|| format!("{:?}", format).to_lowercase()),
        })
    }
}

/// Best guess at a file's content type: magic bytes first, then the extension.
pub fn sniff_mime(bytes: &[u8], file_name: &str) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}
