//! Ignore matcher boundary contract.

/// Input to ignore matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreMatchInput<'a> {
    /// Candidate path relative to the workspace root, `/`-separated.
    pub relative_path: &'a str,
    /// Whether the candidate is a directory.
    pub is_dir: bool,
}

/// Boundary contract for ignore matching.
pub trait IgnorePort: Send + Sync {
    /// Returns true when the path should be skipped.
    fn is_ignored(&self, input: IgnoreMatchInput<'_>) -> bool;
}
