//! Syntax structure boundary contract.

use code_index_domain::Language;

/// Request for the structural boundaries of one file.
#[derive(Debug, Clone, Copy)]
pub struct StructureRequest<'a> {
    /// File text.
    pub text: &'a str,
    /// Language of the file.
    pub language: Language,
    /// Nodes longer than this many characters are descended into.
    pub max_node_chars: usize,
}

/// Boundary contract for syntax-aware boundary detection.
pub trait StructureParserPort: Send + Sync {
    /// Returns true when a grammar exists for `language`.
    fn supports(&self, language: Language) -> bool;

    /// Start lines (1-indexed, ascending, deduplicated) of syntax nodes.
    ///
    /// Returns `None` when no grammar exists or the text does not parse;
    /// callers then fall back to line windows.
    fn boundaries(&self, request: StructureRequest<'_>) -> Option<Vec<u32>>;
}
