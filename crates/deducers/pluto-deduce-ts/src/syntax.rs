//! Small helpers over tree-sitter nodes.

use pluto_arch::{Location, Position};
use tree_sitter::Node;

pub(crate) fn text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(crate) fn location(file: &str, node: Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location::new(
        file,
        Position::new(start.row, start.column),
        Position::new(end.row, end.column),
    )
}

pub(crate) fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

pub(crate) fn field<'t>(node: Node<'t>, name: &str) -> Option<Node<'t>> {
    node.child_by_field_name(name)
}

/// The value of a string literal without quotes, if `node` is one.
///
/// Escapes are kept as written.
pub(crate) fn string_value(node: Node, source: &str) -> Option<String> {
    match node.kind() {
        "string" => Some(strip_quotes(text(node, source)).to_string()),
        "template_string" if !has_descendant(node, "template_substitution") => {
            Some(strip_quotes(text(node, source)).to_string())
        }
        _ => None,
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.get(1..raw.len().saturating_sub(1)).unwrap_or("")
}

pub(crate) fn is_function(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Literals that can be copied into another module as they are.
pub(crate) fn is_literal(node: Node) -> bool {
    match node.kind() {
        "string" | "number" | "true" | "false" | "null" | "undefined" | "regex" => true,
        "template_string" => !has_descendant(node, "template_substitution"),
        "unary_expression" => field(node, "argument").is_some_and(is_literal),
        "parenthesized_expression" | "as_expression" | "satisfies_expression" => {
            node.named_child(0).is_some_and(is_literal)
        }
        "array" => named_children(node).into_iter().all(is_literal),
        "object" => named_children(node).into_iter().all(|child| match child.kind() {
            "pair" => field(child, "value").is_some_and(is_literal),
            _ => false,
        }),
        _ => false,
    }
}

pub(crate) fn has_descendant(node: Node, kind: &str) -> bool {
    let mut stack = vec![node];
    while let Some(cur) = stack.pop() {
        if cur.kind() == kind {
            return true;
        }
        let mut cursor = cur.walk();
        stack.extend(cur.named_children(&mut cursor));
    }
    false
}

/// First node of the tree that failed to parse.
pub(crate) fn first_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(cur) = stack.pop() {
        if cur.is_error() || cur.is_missing() {
            return Some(cur);
        }
        if cur.has_error() {
            let mut cursor = cur.walk();
            let children: Vec<_> = cur.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// Skip wrappers that do not change the value of an expression.
pub(crate) fn unwrap_expression(mut node: Node) -> Node {
    while matches!(
        node.kind(),
        "parenthesized_expression" | "as_expression" | "satisfies_expression" | "non_null_expression"
    ) {
        match node.named_child(0) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}
