use std::path::Path;

/// Maximum accepted source file size: 10 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// MIME types the catalog accepts for video uploads.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/x-m4v",
    "application/x-mpegURL",
    "video/quicktime",
];

/// File name suffixes accepted regardless of the reported MIME type.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".mp4", ".m3u8", ".m4v"];

/// Reasons a source file is rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file name is empty")]
    EmptyName,

    #[error("unsupported video type {mime_type:?} for {name} (MP4, M3U8, M4V only)")]
    UnsupportedType { name: String, mime_type: String },

    #[error("file is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
}

/// Validates a video file's name, MIME type and size.
///
/// A file passes the type check if its MIME type equals an allowed type or
/// contains an allowed type's subtype (`video/mp4` → `mp4`), or if its name
/// ends with an allowed extension.
pub fn validate_video_file(
    name: &str,
    size: u64,
    mime_type: &str,
    max_size: u64,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let type_ok = !mime_type.is_empty()
        && ALLOWED_MIME_TYPES.iter().any(|allowed| {
            let subtype = allowed.split('/').nth(1).unwrap_or(allowed);
            mime_type == *allowed || mime_type.contains(subtype)
        });
    let ext_ok = ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext));

    if !type_ok && !ext_ok {
        return Err(ValidationError::UnsupportedType {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        });
    }

    if size > max_size {
        return Err(ValidationError::TooLarge {
            size,
            max: max_size,
        });
    }

    Ok(())
}

/// Guesses a MIME type from the file extension.
///
/// Returns an empty string for unknown extensions, matching what a browser
/// reports for files it cannot classify.
pub fn guess_mime_type(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        // `mime_guess` maps .m3u8 to the IANA name; the backend expects this one.
        Some(ext) if ext.eq_ignore_ascii_case("m3u8") => "application/x-mpegURL".to_string(),
        _ => mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default(),
    }
}
