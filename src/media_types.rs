//! Fixed extension <-> MIME type table
//!
//! Used to decide whether a URL suffix is a recognised file extension and to
//! pick an extension for `data:` URIs. The first entry for a MIME type is its
//! preferred extension. Extension lookups are exact-case; callers lowercase
//! explicitly when they want a fallback.

const TYPES: &[(&str, &str)] = &[
    // documents
    (".pdf", "application/pdf"),
    (".txt", "text/plain"),
    (".text", "text/plain"),
    (".bat", "text/plain"),
    (".c", "text/plain"),
    (".h", "text/plain"),
    (".ksh", "text/plain"),
    (".pl", "text/plain"),
    (".html", "text/html"),
    (".htm", "text/html"),
    (".css", "text/css"),
    (".csv", "text/csv"),
    (".md", "text/markdown"),
    (".xml", "text/xml"),
    (".rtf", "application/rtf"),
    (".json", "application/json"),
    (".js", "text/javascript"),
    (".doc", "application/msword"),
    (".dot", "application/msword"),
    (".wiz", "application/msword"),
    (".xls", "application/vnd.ms-excel"),
    (".xlb", "application/vnd.ms-excel"),
    (".ppt", "application/vnd.ms-powerpoint"),
    (".pot", "application/vnd.ms-powerpoint"),
    (".pps", "application/vnd.ms-powerpoint"),
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (".odt", "application/vnd.oasis.opendocument.text"),
    (".epub", "application/epub+zip"),
    (".ps", "application/postscript"),
    (".ai", "application/postscript"),
    (".eps", "application/postscript"),
    // images
    (".jpg", "image/jpeg"),
    (".jpe", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".bmp", "image/bmp"),
    (".ico", "image/vnd.microsoft.icon"),
    (".svg", "image/svg+xml"),
    (".tiff", "image/tiff"),
    (".tif", "image/tiff"),
    (".webp", "image/webp"),
    (".avif", "image/avif"),
    // audio / video
    (".mp3", "audio/mpeg"),
    (".wav", "audio/x-wav"),
    (".ogg", "audio/ogg"),
    (".flac", "audio/flac"),
    (".m4a", "audio/mp4"),
    (".mp4", "video/mp4"),
    (".mpeg", "video/mpeg"),
    (".mpg", "video/mpeg"),
    (".mov", "video/quicktime"),
    (".qt", "video/quicktime"),
    (".webm", "video/webm"),
    (".avi", "video/x-msvideo"),
    // archives / binary
    (".zip", "application/zip"),
    (".gz", "application/gzip"),
    (".tar", "application/x-tar"),
    (".bin", "application/octet-stream"),
    (".exe", "application/octet-stream"),
    (".so", "application/octet-stream"),
    (".o", "application/octet-stream"),
    (".a", "application/octet-stream"),
    (".dll", "application/octet-stream"),
    (".wasm", "application/wasm"),
];

/// MIME type for an extension (with leading dot), exact case
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

/// Whether `ext` (with leading dot) is a recognised extension, exact case
pub fn is_known_extension(ext: &str) -> bool {
    mime_for_extension(ext).is_some()
}

/// Preferred extension (with leading dot) for a MIME type
pub fn preferred_extension(mime: &str) -> Option<&'static str> {
    let mime = mime.trim().to_ascii_lowercase();
    TYPES.iter().find(|(_, m)| *m == mime).map(|(e, _)| *e)
}

/// Declared media type of a `data:` URI, e.g. `image/png` for
/// `data:image/png;base64,...`
pub fn data_uri_media_type(url: &str) -> Option<String> {
    let rest = url
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .map(|_| &url[5..])?;
    let end = rest.find([';', ',']).unwrap_or(rest.len());
    let media_type = rest[..end].trim();
    if media_type.is_empty() {
        // RFC 2397 default
        Some("text/plain".to_string())
    } else {
        Some(media_type.to_ascii_lowercase())
    }
}
