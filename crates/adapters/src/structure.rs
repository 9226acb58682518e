//! Tree-sitter structure parser adapter.
//!
//! Reports the start lines of top-level syntax nodes. Nodes longer than the
//! requested ceiling are descended into so that their children (statements,
//! methods, fields) become candidate cut lines as well.

use code_index_ports::{Language, StructureParserPort, StructureRequest};
use tree_sitter::{Node, Parser, Tree};

/// Structure parser backed by the bundled tree-sitter grammars.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterStructureParser;

impl TreeSitterStructureParser {
    /// Build a parser.
    pub const fn new() -> Self {
        Self
    }
}

impl StructureParserPort for TreeSitterStructureParser {
    fn supports(&self, language: Language) -> bool {
        tree_sitter_language(language).is_some()
    }

    fn boundaries(&self, request: StructureRequest<'_>) -> Option<Vec<u32>> {
        let tree = parse_tree(request.text, request.language)?;
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!(
                language = request.language.as_str(),
                "syntax tree contains errors"
            );
            return None;
        }
        let mut lines = collect_start_lines(root, request.text, request.max_node_chars);
        lines.sort_unstable();
        lines.dedup();
        Some(lines)
    }
}

fn parse_tree(text: &str, language: Language) -> Option<Tree> {
    let ts_language = tree_sitter_language(language)?;
    let mut parser = Parser::new();
    if parser.set_language(&ts_language).is_err() {
        return None;
    }
    parser.parse(text, None)
}

fn tree_sitter_language(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}

/// Walks named nodes with an explicit stack; only oversized nodes are expanded.
fn collect_start_lines(root: Node<'_>, text: &str, max_node_chars: usize) -> Vec<u32> {
    let mut lines = Vec::new();
    let mut stack: Vec<Node<'_>> = named_children(root);
    stack.reverse();
    while let Some(node) = stack.pop() {
        lines.push(start_line(node));
        if node_chars(node, text) > max_node_chars {
            let mut children = named_children(node);
            children.reverse();
            stack.extend(children);
        }
    }
    lines
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn start_line(node: Node<'_>) -> u32 {
    u32::try_from(node.start_position().row)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

fn node_chars(node: Node<'_>, text: &str) -> usize {
    text.get(node.start_byte()..node.end_byte())
        .map_or(0, |slice| slice.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundaries(text: &str, language: Language, max_node_chars: usize) -> Option<Vec<u32>> {
        TreeSitterStructureParser::new().boundaries(StructureRequest {
            text,
            language,
            max_node_chars,
        })
    }

    const RUST_SOURCE: &str = concat!(
        "use std::fmt;\n",
        "\n",
        "fn first() -> u32 {\n",
        "    let a = 1;\n",
        "    let b = 2;\n",
        "    a + b\n",
        "}\n",
        "\n",
        "struct Point {\n",
        "    x: i32,\n",
        "}\n",
    );

    #[test]
    fn top_level_items_become_boundaries() {
        assert_eq!(
            boundaries(RUST_SOURCE, Language::Rust, 10_000),
            Some(vec![1, 3, 9])
        );
    }

    #[test]
    fn oversized_nodes_expose_their_children() {
        let lines = boundaries(RUST_SOURCE, Language::Rust, 20).unwrap_or_default();
        assert!(lines.contains(&3));
        assert!(lines.contains(&4));
        assert!(lines.contains(&5));
        assert!(lines.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn python_and_tsx_are_parsed() {
        let python = "import os\n\ndef main():\n    return os.getcwd()\n";
        assert_eq!(boundaries(python, Language::Python, 10_000), Some(vec![1, 3]));

        let tsx = "const App = () => <div>hi</div>;\nexport default App;\n";
        assert_eq!(boundaries(tsx, Language::Tsx, 10_000), Some(vec![1, 2]));
    }

    #[test]
    fn languages_without_grammar_are_unsupported() {
        let parser = TreeSitterStructureParser::new();
        assert!(!parser.supports(Language::Markdown));
        assert!(parser.supports(Language::Go));
        assert_eq!(boundaries("# Title\n", Language::Markdown, 100), None);
    }

    #[test]
    fn syntax_errors_fall_back() {
        assert_eq!(boundaries("fn broken( {\n", Language::Rust, 10_000), None);
    }
}
