//! Key selection and target-key derivation.
//!
//! Everything here is pure: no I/O, no logging.

use crate::config::RunConfig;

/// Extension produced by every conversion.
pub const TARGET_EXTENSION: &str = "webp";

/// Content type stored alongside converted objects.
pub const TARGET_CONTENT_TYPE: &str = "image/webp";

/// Ensure a prefix ends with exactly one `/`, so it only matches whole path
/// segments (`img` must not match `images/a.png`).
pub fn normalize_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

/// Decide whether a listed key should be converted.
///
/// Rejects, in order: keys already in the target format (case-insensitive),
/// keys outside the include prefix, keys under any exclude prefix.
pub fn should_process(key: &str, config: &RunConfig) -> bool {
    if has_target_extension(key) {
        return false;
    }
    if let Some(include) = &config.include_prefix {
        if !key.starts_with(include.as_str()) {
            return false;
        }
    }
    !config
        .exclude_prefixes
        .iter()
        .any(|prefix| key.starts_with(prefix.as_str()))
}

fn has_target_extension(key: &str) -> bool {
    key.to_ascii_lowercase()
        .ends_with(&format!(".{TARGET_EXTENSION}"))
}

/// Derive the converted object's key by replacing the last extension of the
/// final path segment (`a/b.tar.gz` -> `a/b.tar.webp`).
///
/// Keys without an extension get one appended. A leading dot in the file name
/// is not an extension (`a/.hidden` -> `a/.hidden.webp`).
pub fn derive_target_key(key: &str) -> String {
    let segment_start = key.rfind('/').map_or(0, |pos| pos + 1);
    let file_name = &key[segment_start..];
    let stem_len = match file_name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file_name.len() => dot,
        _ => file_name.len(),
    };
    format!(
        "{}.{}",
        &key[..segment_start + stem_len],
        TARGET_EXTENSION
    )
}
