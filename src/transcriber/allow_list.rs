//! Upload allow-list.

/// File suffixes the pipeline accepts (compared lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 10] = [
    "mp4", "mov", "wmv", "avi", "mkv", "mp3", "wav", "aac", "flac", "ogg",
];

/// Lowercased suffix after the last `.`, if the name has one.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

/// Check if the file has an allowed extension.
///
/// Only the text after the last `.` counts, so `clip.mp4.exe` is rejected and
/// `.mp4` (a name that is nothing but an extension) is accepted.
pub fn is_allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
