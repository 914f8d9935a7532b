use crate::config::AppConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// Flash text shown when an upload is refused
pub const INVALID_FILE_MESSAGE: &str =
    "Invalid file type. Please upload a CSV, XLSX, or Parquet file.";

/// Check a client-supplied filename against the extension whitelist
///
/// The name must contain a `.`; whatever follows the last one is compared
/// case-insensitively.
pub fn allowed_file(filename: &str, config: &AppConfig) -> bool {
    match filename.rsplit_once('.') {
        Some((_, extension)) => config.is_allowed_extension(extension),
        None => false,
    }
}

/// Reduce a client-supplied filename to a safe file name
///
/// The name is NFKD-decomposed and any non-ASCII remainder dropped, so accented
/// letters keep their base letter. Path separators become spaces, whitespace runs
/// are joined with `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing `.`/`_` are trimmed. The result may be empty.
///
/// # Examples
/// ```
/// use dataview::upload::secure_filename;
///
/// assert_eq!(secure_filename("My Data.csv"), "My_Data.csv");
/// assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
/// ```
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let stripped = UNSAFE_CHARS.replace_all(&joined, "");
    stripped.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Where an accepted upload ends up, or `None` if the name is refused
///
/// The extension is checked on the raw client name, then the name is sanitized.
pub fn upload_target(filename: &str, config: &AppConfig) -> Option<PathBuf> {
    if !allowed_file(filename, config) {
        return None;
    }
    let safe = secure_filename(filename);
    if safe.is_empty() {
        return None;
    }
    Some(config.upload_dir.join(safe))
}

/// Write an accepted upload to disk, replacing any file with the same name.
#[cfg(feature = "web")]
pub async fn save_upload(target: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, contents).await
}
