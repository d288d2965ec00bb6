use crate::models::PendingFile;
use crate::services::preview::sniff_mime;
use std::path::Path;

/// Reads a file from disk and declares its type from its content.
pub async fn read_pending_file(path: &Path) -> std::io::Result<PendingFile> {
    let data = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime_type = sniff_mime(&data, &file_name);
    Ok(PendingFile::new(file_name, mime_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_pending_file() {
        let mut tmp = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        tmp.write_all(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();

        let file = read_pending_file(tmp.path()).await.unwrap();
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.size_bytes(), 6);
        assert!(file.file_name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(read_pending_file(Path::new("/definitely/not/here.png")).await.is_err());
    }
}
