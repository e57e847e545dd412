//! Credential text normalization.

/// Normalize credential text for comparison.
///
/// Uppercases, drops everything that is not alphanumeric or whitespace and
/// collapses runs of whitespace, so `m.d.` and `MD` compare equal.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_credential(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
