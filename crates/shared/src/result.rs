//! Result alias and error-context helpers.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for attaching context to failed results.
pub trait ResultExt<T> {
    /// Attach a metadata entry to the error, leaving success untouched.
    fn with_metadata(self, key: &'static str, value: impl Into<String>) -> Result<T>;

    /// Attach a metadata entry computed only on failure.
    fn with_metadata_lazy<F, V>(self, key: &'static str, value: F) -> Result<T>
    where
        F: FnOnce() -> V,
        V: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ErrorEnvelope>,
{
    fn with_metadata(self, key: &'static str, value: impl Into<String>) -> Result<T> {
        self.map_err(|error| error.into().with_metadata(key, value))
    }

    fn with_metadata_lazy<F, V>(self, key: &'static str, value: F) -> Result<T>
    where
        F: FnOnce() -> V,
        V: Into<String>,
    {
        self.map_err(|error| error.into().with_metadata(key, value()))
    }
}
