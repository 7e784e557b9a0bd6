//! Storage key derivation for free-text location descriptions.

/// Derives the storage key for a raw location string.
///
/// Keeps ASCII and Unicode alphanumerics plus `-` and `_`, drops
/// everything else, then trims trailing whitespace from the result.
/// Distinct inputs that filter to the same string share a key.
#[must_use]
pub fn key_for(location_stretch: &str) -> String {
    let filtered: String = location_stretch
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    filtered.trim_end().to_string()
}
