//! BLAKE3 content digests
//!
//! Digests are computed over canonical JSON (object keys sorted) so the same
//! logical fields always produce the same hex string.

use serde_json::Value;

/// Length of the abbreviated digest used for mutation references
pub const SHORT_DIGEST_LEN: usize = 16;

/// Digest arbitrary text, returning lowercase hex
pub fn digest_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Digest a JSON record over its canonical form
pub fn digest_value(value: Value) -> String {
    digest_text(&canonicalize(value).to_string())
}

/// Rebuild objects with sorted keys, whatever map backs `serde_json::Map`
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// First [`SHORT_DIGEST_LEN`] hex characters of a text digest
pub fn short_digest(text: &str) -> String {
    let mut full = digest_text(text);
    full.truncate(SHORT_DIGEST_LEN);
    full
}
