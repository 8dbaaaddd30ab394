//! Filename keys used to match a still image with its motion video.

use std::sync::LazyLock;

use regex::Regex;

/// Trailing `_<digit>` token some devices append to the companion video name.
static LIVE_VIDEO_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d$").expect("valid suffix regex"));

/// Derive the base key shared by a photo and its companion video.
///
/// Strips the final extension, then a single trailing `_<digit>` token:
/// `A.heic` and `A_3.mov` both map to `A`. Names without an extension keep
/// their stem; a leading dot (`.hidden`) is not treated as an extension.
pub fn base_key(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    LIVE_VIDEO_SUFFIX.replace(stem, "").into_owned()
}
