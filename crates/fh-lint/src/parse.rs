//! Go parsing shared by the formatter and the linter.

use fh_core::analyze::{FormatError, SyntaxIssue};
use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

/// gofmt stops listing after this many errors.
const MAX_SYNTAX_ISSUES: usize = 10;

thread_local! {
    static GO_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failed language load shows up as a `None` tree at parse time.
        let _ = p.set_language(&tree_sitter_go::LANGUAGE.into());
        p
    });
}

/// A parsed Go source file.
pub struct GoSource {
    pub text: String,
    pub tree: Tree,
}

impl GoSource {
    /// Parses `src`. Invalid UTF-8 and grammar errors come back as
    /// [`FormatError::Syntax`].
    pub fn parse(src: &[u8]) -> Result<Self, FormatError> {
        let source = Self::parse_lenient(src)?;
        let issues = source.syntax_issues();
        if issues.is_empty() {
            Ok(source)
        } else {
            Err(FormatError::Syntax(issues))
        }
    }

    /// Parses without rejecting grammar errors.
    pub fn parse_lenient(src: &[u8]) -> Result<Self, FormatError> {
        let text = match std::str::from_utf8(src) {
            Ok(text) => text.to_string(),
            Err(err) => {
                let line = line_of_offset(src, err.valid_up_to());
                return Err(FormatError::Syntax(vec![SyntaxIssue {
                    line,
                    message: "invalid UTF-8 encoding".to_string(),
                }]));
            }
        };
        let tree = GO_PARSER
            .with(|p| p.borrow_mut().parse(&text, None))
            .ok_or_else(|| FormatError::Failed("go parser produced no tree".to_string()))?;
        Ok(Self { text, tree })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        self.text.get(node.start_byte()..node.end_byte()).unwrap_or("")
    }

    /// One issue per outermost ERROR node and per MISSING node.
    pub fn syntax_issues(&self) -> Vec<SyntaxIssue> {
        let root = self.root();
        if !root.has_error() {
            return Vec::new();
        }
        let mut issues = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if issues.len() >= MAX_SYNTAX_ISSUES {
                break;
            }
            if node.is_error() {
                issues.push(SyntaxIssue {
                    line: line_of(node),
                    message: self.unexpected(node),
                });
                continue;
            }
            if node.is_missing() {
                issues.push(SyntaxIssue {
                    line: line_of(node),
                    message: format!("syntax error: missing {}", node.kind()),
                });
                continue;
            }
            if !node.has_error() {
                continue;
            }
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
        issues.sort_by_key(|issue| issue.line);
        issues
    }

    fn unexpected(&self, node: Node<'_>) -> String {
        let snippet: String = self
            .node_text(node)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .chars()
            .take(20)
            .collect();
        if snippet.is_empty() {
            "syntax error: unexpected end of input".to_string()
        } else {
            format!("syntax error: unexpected {snippet}")
        }
    }
}

/// 1-based line of `node`.
pub fn line_of(node: Node<'_>) -> u32 {
    u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX)
}

fn line_of_offset(src: &[u8], offset: usize) -> u32 {
    let newlines = src[..offset.min(src.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

/// Visits `root` and every descendant in document order.
pub fn walk<'a>(root: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}
