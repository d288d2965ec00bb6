use mime::Mime;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default maximum upload size in megabytes
pub const DEFAULT_MAX_SIZE_MB: f64 = 10.0;

/// Image types the site accepts unless configured otherwise.
/// `image/jpg` is not a registered type but some pickers still report it.
pub const DEFAULT_ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Converts a limit in megabytes into a byte count.
pub fn max_size_bytes(max_size_mb: f64) -> u64 {
    (max_size_mb * BYTES_PER_MB).floor() as u64
}

/// Lowercases a content type and strips any parameters (`; charset=...`).
pub fn normalize_mime(content_type: &str) -> String {
    match content_type.trim().parse::<Mime>() {
        Ok(mime) => mime.essence_str().to_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    }
}

/// Validates file size against the configured limit (inclusive)
pub fn validate_file_size(size: u64, max_size_mb: f64) -> Result<(), ValidationError> {
    if size > max_size_bytes(max_size_mb) {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!("File size must be less than {}MB", max_size_mb),
        });
    }
    Ok(())
}

/// Validates MIME type against the accepted list
pub fn validate_mime_type(content_type: &str, accepted: &[String]) -> Result<(), ValidationError> {
    let normalized = normalize_mime(content_type);

    if accepted.iter().any(|allowed| *allowed == normalized) {
        return Ok(());
    }

    Err(ValidationError {
        code: "INVALID_MIME_TYPE",
        message: format!(
            "Invalid file type '{}'. Accepted formats: {}",
            content_type,
            accepted.join(", ")
        ),
    })
}

/// Full validation for a selected file. Type is checked before size so a
/// wrong file is reported as such even when it is also too large.
pub fn validate_selection(
    content_type: &str,
    size: u64,
    max_size_mb: f64,
    accepted: &[String],
) -> Result<(), ValidationError> {
    validate_mime_type(content_type, accepted)?;
    validate_file_size(size, max_size_mb)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        DEFAULT_ACCEPTED_MIME_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_validate_file_size() {
        let max = max_size_bytes(DEFAULT_MAX_SIZE_MB);
        assert!(validate_file_size(1024, DEFAULT_MAX_SIZE_MB).is_ok());
        assert!(validate_file_size(max, DEFAULT_MAX_SIZE_MB).is_ok());

        let err = validate_file_size(max + 1, DEFAULT_MAX_SIZE_MB).unwrap_err();
        assert_eq!(err.code, "FILE_TOO_LARGE");
        assert_eq!(err.message, "File size must be less than 10MB");
    }

    #[test]
    fn test_fractional_limit() {
        assert_eq!(max_size_bytes(0.5), 512 * 1024);
        let err = validate_file_size(600 * 1024, 0.5).unwrap_err();
        assert_eq!(err.message, "File size must be less than 0.5MB");
    }

    #[test]
    fn test_validate_mime_type() {
        let accepted = defaults();
        assert!(validate_mime_type("image/jpeg", &accepted).is_ok());
        assert!(validate_mime_type("image/jpg", &accepted).is_ok());
        assert!(validate_mime_type("IMAGE/PNG", &accepted).is_ok());
        assert!(validate_mime_type("image/webp; q=0.9", &accepted).is_ok());

        let err = validate_mime_type("application/pdf", &accepted).unwrap_err();
        assert_eq!(err.code, "INVALID_MIME_TYPE");
        assert!(err.message.contains("image/jpeg, image/jpg, image/png, image/webp, image/gif"));

        assert!(validate_mime_type("image/svg+xml", &accepted).is_err());
        assert!(validate_mime_type("", &accepted).is_err());
    }

    #[test]
    fn test_validate_selection_checks_type_first() {
        let err = validate_selection("application/pdf", u64::MAX, 10.0, &defaults()).unwrap_err();
        assert_eq!(err.code, "INVALID_MIME_TYPE");
    }
}
