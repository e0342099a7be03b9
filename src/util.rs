pub mod hex;

use chrono::{SecondsFormat, Utc};

/// Renders protocol bytes for humans; anything outside printable ASCII becomes `.`.
pub fn sanitize_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            0x20..=0x7e => *b as char,
            _ => '.',
        })
        .collect()
}

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
