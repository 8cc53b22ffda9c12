//! Group identifier normalization.

use crate::config::TELEGRAM_LINK_PREFIX;

/// Derive the identifier passed to the session provider from user input.
///
/// Accepts `https://t.me/<name>`, `@<name>` or a bare `<name>`. The result is
/// not validated; a bad identifier fails later at entity resolution.
pub fn normalize_group_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix(TELEGRAM_LINK_PREFIX) {
        rest.to_string()
    } else if let Some(rest) = trimmed.strip_prefix('@') {
        rest.to_string()
    } else {
        trimmed.to_string()
    }
}
