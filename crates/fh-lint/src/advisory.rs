use crate::parse::{GoSource, line_of, walk};
use fh_core::analyze::{Advisory, AdvisoryLinter, AnalyzerError, FormatError};
use tree_sitter::Node;

/// Style advisories in the manner of golint, each with the confidence that
/// the advisory is a real problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoLinter;

impl AdvisoryLinter for GoLinter {
    fn lint(&self, path: &str, src: &[u8]) -> Result<Vec<Advisory>, AnalyzerError> {
        let source = GoSource::parse_lenient(src).map_err(|err| match err {
            FormatError::Syntax(issues) => AnalyzerError::Failed(format!(
                "{} syntax error(s) in {path}",
                issues.len()
            )),
            FormatError::Failed(reason) => AnalyzerError::Failed(reason),
        })?;
        let mut lint = Lint {
            source: &source,
            is_test: path.ends_with("_test.go"),
            advisories: Vec::new(),
        };
        lint.run();
        let mut advisories = lint.advisories;
        advisories.sort_by_key(|advisory| advisory.line);
        Ok(advisories)
    }
}

struct Lint<'a> {
    source: &'a GoSource,
    is_test: bool,
    advisories: Vec<Advisory>,
}

impl<'a> Lint<'a> {
    fn run(&mut self) {
        let root = self.source.root();
        self.package_comment(root);
        let mut nodes = Vec::new();
        walk(root, |node| nodes.push(node));
        for node in nodes {
            match node.kind() {
                "function_declaration" => {
                    self.func_doc(node, None);
                    self.func_name(node);
                }
                "method_declaration" => {
                    let receiver = self.receiver_type(node);
                    self.receiver_name(node);
                    if let Some(receiver) = receiver {
                        self.func_doc(node, Some(&receiver));
                    }
                    self.func_name(node);
                }
                "type_spec" | "type_alias" => self.type_doc(node),
                "call_expression" => self.error_string(node),
                "if_statement" => self.if_return_else(node),
                "var_spec" => self.zero_value(node),
                _ => {}
            }
        }
    }

    fn report(&mut self, node: Node<'_>, confidence: f64, message: String) {
        self.advisories.push(Advisory {
            line: line_of(node),
            confidence,
            message,
        });
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        self.source.node_text(node)
    }

    fn package_comment(&mut self, root: Node<'_>) {
        if self.is_test {
            return;
        }
        let mut cursor = root.walk();
        let Some(clause) = root
            .children(&mut cursor)
            .find(|node| node.kind() == "package_clause")
        else {
            return;
        };
        if self.doc_comment(clause).is_none() {
            self.report(
                clause,
                0.2,
                "should have a package comment, unless it's in another file for this package"
                    .to_string(),
            );
        }
    }

    /// Text of the comment block directly above `node`, comment markers
    /// stripped. Only the first comment of the block is returned.
    fn doc_comment(&self, node: Node<'_>) -> Option<String> {
        let mut expected_row = node.start_position().row;
        let mut first = None;
        let mut prev = node.prev_sibling();
        while let Some(comment) = prev {
            if comment.kind() != "comment" || comment.end_position().row + 1 != expected_row {
                break;
            }
            first = Some(comment);
            expected_row = comment.start_position().row;
            prev = comment.prev_sibling();
        }
        first.map(|comment| strip_comment(self.text(comment)))
    }

    fn func_doc(&mut self, node: Node<'_>, receiver: Option<&str>) {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return;
        };
        if !is_exported(name) {
            return;
        }
        if let Some(receiver) = receiver {
            if !is_exported(receiver) {
                return;
            }
        }
        if self.is_test && is_test_entry(name) {
            return;
        }
        let what = match receiver {
            Some(receiver) => format!("method {receiver}.{name}"),
            None => format!("function {name}"),
        };
        match self.doc_comment(node) {
            None => self.report(
                node,
                1.0,
                format!("exported {what} should have comment or be unexported"),
            ),
            Some(doc) if !doc.starts_with(&format!("{name} ")) => self.report(
                node,
                1.0,
                format!("comment on exported {what} should be of the form \"{name} ...\""),
            ),
            Some(_) => {}
        }
    }

    fn type_doc(&mut self, spec: Node<'_>) {
        let Some(name) = spec.child_by_field_name("name").map(|n| self.text(n)) else {
            return;
        };
        if !is_exported(name) {
            return;
        }
        // An ungrouped declaration carries the doc on the `type` keyword line.
        let documented = match spec.parent() {
            Some(decl) if decl.kind() == "type_declaration" && !is_grouped(decl) => decl,
            _ => spec,
        };
        match self.doc_comment(documented) {
            None => self.report(
                documented,
                1.0,
                format!("exported type {name} should have comment or be unexported"),
            ),
            Some(doc) => {
                let body = ["A ", "An ", "The "]
                    .iter()
                    .find_map(|article| doc.strip_prefix(article))
                    .unwrap_or(&doc);
                if !body.starts_with(&format!("{name} ")) {
                    self.report(
                        documented,
                        1.0,
                        format!(
                            "comment on exported type {name} should be of the form \"{name} ...\" (with optional leading article)"
                        ),
                    );
                }
            }
        }
    }

    /// Declared type name of the receiver, without pointer or type params.
    fn receiver_type(&self, method: Node<'_>) -> Option<String> {
        let receiver = method.child_by_field_name("receiver")?;
        let param = receiver.named_child(0)?;
        let mut ty = param.child_by_field_name("type")?;
        loop {
            match ty.kind() {
                "pointer_type" | "parenthesized_type" => ty = ty.named_child(0)?,
                "generic_type" => ty = ty.child_by_field_name("type")?,
                _ => break,
            }
        }
        Some(self.text(ty).to_string())
    }

    fn receiver_name(&mut self, method: Node<'_>) {
        let Some(name) = method
            .child_by_field_name("receiver")
            .and_then(|receiver| receiver.named_child(0))
            .and_then(|param| param.child_by_field_name("name"))
        else {
            return;
        };
        if matches!(self.text(name), "this" | "self") {
            self.report(
                name,
                1.0,
                "receiver name should be a reflection of its identity; don't use generic names such as \"this\" or \"self\"".to_string(),
            );
        }
    }

    fn func_name(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let text = self.text(name);
        if !text.contains('_') || text.chars().all(|c| c == '_') {
            return;
        }
        if self.is_test && is_test_entry(text) {
            return;
        }
        let kind = if node.kind() == "method_declaration" {
            "method"
        } else {
            "func"
        };
        self.report(
            name,
            0.9,
            format!(
                "don't use underscores in Go names; {kind} {text} should be {}",
                camel_case(text)
            ),
        );
    }

    fn error_string(&mut self, call: Node<'_>) {
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        if !matches!(self.text(function), "errors.New" | "fmt.Errorf") {
            return;
        }
        let Some(first) = call
            .child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
        else {
            return;
        };
        if first.kind() != "interpreted_string_literal" {
            return;
        }
        let literal = self.text(first).trim_matches('"');
        if is_bad_error_string(literal) {
            self.report(
                first,
                0.9,
                "error strings should not be capitalized or end with punctuation or a newline"
                    .to_string(),
            );
        }
    }

    fn if_return_else(&mut self, node: Node<'_>) {
        // Only the head of an else-if chain is considered.
        if node
            .parent()
            .is_some_and(|parent| parent.kind() == "if_statement")
        {
            return;
        }
        let Some(alternative) = node.child_by_field_name("alternative") else {
            return;
        };
        if alternative.kind() != "block" {
            return;
        }
        let Some(consequence) = node.child_by_field_name("consequence") else {
            return;
        };
        if last_statement(consequence).is_none_or(|stmt| stmt.kind() != "return_statement") {
            return;
        }
        let declares = node
            .child_by_field_name("initializer")
            .is_some_and(|init| init.kind() == "short_var_declaration");
        let message = if declares {
            "if block ends with a return statement, so drop this else and outdent its block (move short variable declaration to its own line if necessary)"
        } else {
            "if block ends with a return statement, so drop this else and outdent its block"
        };
        self.report(alternative, 1.0, message.to_string());
    }

    fn zero_value(&mut self, spec: Node<'_>) {
        if spec.child_by_field_name("type").is_none() {
            return;
        }
        let Some(values) = spec.child_by_field_name("value") else {
            return;
        };
        if values.named_child_count() != 1 {
            return;
        }
        let Some(value) = values.named_child(0) else {
            return;
        };
        let zero = self.text(value);
        if !matches!(zero, "0" | "0.0" | "\"\"" | "``" | "nil" | "false") {
            return;
        }
        let Some(name) = spec.child_by_field_name("name").map(|n| self.text(n)) else {
            return;
        };
        self.report(
            spec,
            0.9,
            format!("should drop = {zero} from declaration of var {name}; it is the zero value"),
        );
    }
}

fn last_statement(block: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = block.walk();
    let mut last = block
        .named_children(&mut cursor)
        .filter(|node| node.kind() != "comment")
        .last()?;
    if last.kind() == "statement_list" {
        let mut inner = last.walk();
        last = last
            .named_children(&mut inner)
            .filter(|node| node.kind() != "comment")
            .last()?;
    }
    Some(last)
}

fn is_grouped(decl: Node<'_>) -> bool {
    let mut cursor = decl.walk();
    decl.children(&mut cursor).any(|child| child.kind() == "(")
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn is_test_entry(name: &str) -> bool {
    ["Test", "Benchmark", "Example", "Fuzz"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

fn strip_comment(comment: &str) -> String {
    let body = comment
        .strip_prefix("//")
        .or_else(|| {
            comment
                .strip_prefix("/*")
                .map(|rest| rest.strip_suffix("*/").unwrap_or(rest))
        })
        .unwrap_or(comment);
    body.trim().to_string()
}

fn camel_case(name: &str) -> String {
    let leading = name.len() - name.trim_start_matches('_').len();
    let mut out = "_".repeat(leading);
    let mut upper = false;
    for c in name[leading..].chars() {
        if c == '_' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn is_bad_error_string(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.ends_with(['.', ':', '!']) || s.ends_with("\\n") {
        return true;
    }
    let mut chars = s.chars();
    let first = chars.next().is_some_and(char::is_uppercase);
    // Leading acronyms such as "EOF" or "URL" are fine.
    let second_upper = chars.next().is_some_and(char::is_uppercase);
    first && !second_upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(src: &str) -> Vec<Advisory> {
        GoLinter.lint("x.go", src.as_bytes()).unwrap()
    }

    fn messages(src: &str) -> Vec<String> {
        lint(src).into_iter().map(|a| a.message).collect()
    }

    const HEADER: &str = "// Package p does things.\npackage p\n\n";

    #[test]
    fn test_missing_package_comment_has_low_confidence() {
        let advisories = lint("package p\n");
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].line, 1);
        assert!(advisories[0].confidence < 0.8);
    }

    #[test]
    fn test_documented_package_is_quiet() {
        assert!(lint(HEADER).is_empty());
    }

    #[test]
    fn test_exported_function_without_comment() {
        let advisories = lint(&format!("{HEADER}func Run() {{}}\n"));
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].line, 4);
        assert_eq!(advisories[0].confidence, 1.0);
        assert_eq!(
            advisories[0].message,
            "exported function Run should have comment or be unexported"
        );
    }

    #[test]
    fn test_comment_of_wrong_form() {
        let msgs = messages(&format!("{HEADER}// runs things\nfunc Run() {{}}\n"));
        assert_eq!(
            msgs,
            vec!["comment on exported function Run should be of the form \"Run ...\""]
        );
    }

    #[test]
    fn test_well_documented_code_is_quiet() {
        let src = format!(
            "{HEADER}// Run runs.\nfunc Run() {{}}\n\n// A Thing is a thing.\ntype Thing struct{{}}\n\n// Do does.\nfunc (t *Thing) Do() {{}}\n\nfunc helper() {{}}\n"
        );
        assert!(lint(&src).is_empty(), "{:?}", lint(&src));
    }

    #[test]
    fn test_exported_method_and_type() {
        let msgs = messages(&format!(
            "{HEADER}type Thing struct{{}}\n\nfunc (t *Thing) Do() {{}}\n"
        ));
        assert!(msgs.contains(&"exported type Thing should have comment or be unexported".to_string()));
        assert!(msgs.contains(
            &"exported method Thing.Do should have comment or be unexported".to_string()
        ));
    }

    #[test]
    fn test_method_on_unexported_type_needs_no_comment() {
        assert!(lint(&format!("{HEADER}type thing struct{{}}\n\nfunc (t thing) Do() {{}}\n")).is_empty());
    }

    #[test]
    fn test_generic_receiver_names() {
        let msgs = messages(&format!("{HEADER}type t struct{{}}\n\nfunc (self t) do() {{}}\n"));
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("receiver name should be a reflection of its identity"));
    }

    #[test]
    fn test_underscores_in_func_names() {
        let advisories = lint(&format!("{HEADER}func do_the_thing() {{}}\n"));
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].confidence, 0.9);
        assert_eq!(
            advisories[0].message,
            "don't use underscores in Go names; func do_the_thing should be doTheThing"
        );
    }

    #[test]
    fn test_test_functions_may_use_underscores() {
        let advisories = GoLinter
            .lint("x_test.go", b"package p\n\nfunc Test_thing() {}\n")
            .unwrap();
        assert!(advisories.is_empty());
    }

    #[test]
    fn test_error_strings() {
        let src = format!(
            "{HEADER}import \"errors\"\n\nvar a = errors.New(\"Something failed.\")\nvar b = errors.New(\"EOF reached\")\nvar c = errors.New(\"fine\")\n"
        );
        let advisories = lint(&src);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].line, 6);
        assert!(advisories[0].message.starts_with("error strings should not be capitalized"));
    }

    #[test]
    fn test_if_return_else() {
        let src = format!(
            "{HEADER}func f(x int) int {{\n\tif x > 0 {{\n\t\treturn 1\n\t}} else {{\n\t\tx++\n\t}}\n\treturn x\n}}\n"
        );
        let advisories = lint(&src);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].line, 7);
        assert_eq!(
            advisories[0].message,
            "if block ends with a return statement, so drop this else and outdent its block"
        );
    }

    #[test]
    fn test_else_if_chains_are_left_alone() {
        let src = format!(
            "{HEADER}func f(x int) int {{\n\tif x > 0 {{\n\t\treturn 1\n\t}} else if x < 0 {{\n\t\treturn 2\n\t}}\n\treturn x\n}}\n"
        );
        assert!(lint(&src).is_empty());
    }

    #[test]
    fn test_zero_value_initialisation() {
        let msgs = messages(&format!("{HEADER}var n int = 0\nvar m = 0\n"));
        assert_eq!(
            msgs,
            vec!["should drop = 0 from declaration of var n; it is the zero value"]
        );
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("a_b_c"), "aBC");
        assert_eq!(camel_case("_private_name"), "_privateName");
    }
}
