//! Secret detection and redaction.
//!
//! Field names are matched case-insensitively against common secret
//! markers so API keys never reach logs or error output.

use std::fmt;

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

const SECRET_MARKERS: [&str; 6] = ["KEY", "TOKEN", "SECRET", "PASSWORD", "CREDENTIAL", "AUTH"];

/// Checks if a key or field name likely refers to a secret.
///
/// ```
/// use code_index_shared::is_secret_key;
///
/// assert!(is_secret_key("apiKey"));
/// assert!(is_secret_key("CIDX_EMBEDDING_API_KEY"));
/// assert!(!is_secret_key("filePath"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Returns [`REDACTED`] for secret keys, or the original value otherwise.
pub fn redact_if_secret(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        REDACTED.to_owned()
    } else {
        value.to_owned()
    }
}

/// A secret string that redacts itself on `Display` and `Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when the wrapped secret is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(Box::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_provider_credentials() {
        assert!(is_secret_key("OPENAI_API_KEY"));
        assert!(is_secret_key("qdrantApiKey"));
        assert!(is_secret_key("access_token"));
        assert!(is_secret_key("Authorization"));
    }

    #[test]
    fn ignores_ordinary_fields() {
        assert!(!is_secret_key("LOG_LEVEL"));
        assert!(!is_secret_key("filePath"));
        assert!(!is_secret_key("startLine"));
        assert!(!is_secret_key("MAX_RETRIES"));
    }

    #[test]
    fn redacts_only_secret_values() {
        assert_eq!(redact_if_secret("apiKey", "sk-1"), REDACTED);
        assert_eq!(redact_if_secret("model", "text-embedding-3-small"), "text-embedding-3-small");
    }

    #[test]
    fn secret_string_never_prints_its_value() {
        let secret = SecretString::from("sk-live");
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.expose(), "sk-live");
        assert!(SecretString::from("  ").is_blank());
    }
}
