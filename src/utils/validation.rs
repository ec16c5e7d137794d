use std::fmt;

/// Maximum accepted file name length in characters
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Slug length bounds for caller-chosen slugs
pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 64;

/// Characters never allowed in file names (beyond path separators)
const RESERVED_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|', ';'];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for crate::api::error::AppError {
    fn from(e: ValidationError) -> Self {
        crate::api::error::AppError::Validation(e.message)
    }
}

/// Validates a file name for use as the second segment of an object key.
///
/// Every uploaded object lives under `"{slug}/{file_name}"`; a name that can
/// escape that prefix (traversal, separators, absolute paths) is rejected
/// outright rather than sanitized, so the key written to the bucket is always
/// exactly what the database records.
pub fn validate_file_name(file_name: &str) -> Result<(), ValidationError> {
    if file_name.is_empty() {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "File name cannot be empty".to_string(),
        });
    }

    if file_name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: format!(
                "File name exceeds maximum length of {} characters",
                MAX_FILE_NAME_LEN
            ),
        });
    }

    if file_name.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", file_name);
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "File name must not contain '..'".to_string(),
        });
    }

    if file_name.contains('/') || file_name.contains('\\') {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "File name must not contain path separators".to_string(),
        });
    }

    if file_name.chars().any(|c| c.is_control()) {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "File name must not contain control characters".to_string(),
        });
    }

    if file_name.chars().any(|c| RESERVED_CHARS.contains(&c)) {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "File name contains reserved characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a caller-chosen slug. Slugs double as the object-store key
/// prefix, so the charset is restricted to URL- and key-safe characters.
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let len = slug.chars().count();
    if len < SLUG_MIN_LEN || len > SLUG_MAX_LEN {
        return Err(ValidationError {
            code: "INVALID_SLUG",
            message: format!(
                "Slug must be between {} and {} characters",
                SLUG_MIN_LEN, SLUG_MAX_LEN
            ),
        });
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError {
            code: "INVALID_SLUG",
            message: "Slug may only contain letters, digits, '-' and '_'".to_string(),
        });
    }

    Ok(())
}

/// Validates the batch size of a presign or finalize request.
pub fn validate_file_count(count: usize, max: usize) -> Result<(), ValidationError> {
    if count > max {
        return Err(ValidationError {
            code: "TOO_MANY_FILES",
            message: format!("A share may contain at most {} files", max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_file_names() {
        assert!(validate_file_name("a.txt").is_ok());
        assert!(validate_file_name("Photo 2025-06-01.jpg").is_ok());
        assert!(validate_file_name("archive.tar.gz").is_ok());
    }

    #[test]
    fn test_rejects_path_traversal() {
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("a/../b.txt").is_err());
    }

    #[test]
    fn test_rejects_separators_and_absolute_paths() {
        assert!(validate_file_name("/etc/passwd").is_err());
        assert!(validate_file_name("dir/file.txt").is_err());
        assert!(validate_file_name("dir\\file.txt").is_err());
    }

    #[test]
    fn test_rejects_empty_and_control_chars() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("file\u{0000}.txt").is_err());
        assert!(validate_file_name("file\n.txt").is_err());
    }

    #[test]
    fn test_rejects_reserved_chars() {
        assert!(validate_file_name("con:aux.txt").is_err());
        assert!(validate_file_name("what?.txt").is_err());
    }

    #[test]
    fn test_slug_charset_and_length() {
        assert!(validate_slug("my-share_01").is_ok());
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug(&"x".repeat(SLUG_MAX_LEN + 1)).is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("dot.dot").is_err());
        assert!(validate_slug("slash/slash").is_err());
    }

    #[test]
    fn test_file_count_limit() {
        assert!(validate_file_count(10, 50).is_ok());
        assert!(validate_file_count(50, 50).is_ok());
        assert!(validate_file_count(51, 50).is_err());
    }
}
