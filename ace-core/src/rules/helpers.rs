//! Shared tree-sitter plumbing for the built-in Python rules.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use super::RuleError;

/// Parse Python source, surfacing engine failures as detector errors.
pub fn parse_python(source: &str, path: &Path) -> Result<Tree, RuleError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| RuleError(format!("grammar load failed: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| RuleError(format!("no parse tree for {}", path.display())))
}

/// Depth-first visit of every node in the tree.
pub fn visit_nodes<'t>(root: Node<'t>, f: &mut impl FnMut(Node<'t>)) {
    f(root);
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        visit_nodes(child, f);
    }
}

/// Node text, empty on non-UTF-8 spans.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based line of a node's first byte.
pub fn node_line(node: Node<'_>) -> u32 {
    u32::try_from(node.start_position().row).unwrap_or(u32::MAX - 1) + 1
}

/// Full text of a 1-based line, without its newline.
pub fn source_line(source: &str, line: u32) -> Option<&str> {
    source.lines().nth(line as usize - 1)
}
