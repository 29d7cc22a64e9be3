use crate::parse::{GoSource, walk};
use fh_core::analyze::{FormatError, SourceFormatter};
use std::ops::Range;

/// Canonical layout for Go sources.
///
/// Only whitespace is normalised: trailing blanks are trimmed, CRLF becomes
/// LF, runs of blank lines collapse to one, leading blank lines go, and the
/// file ends in exactly one newline. Raw string literals are left byte for
/// byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoFormatter;

impl SourceFormatter for GoFormatter {
    fn format(&self, _path: &str, src: &[u8]) -> Result<Vec<u8>, FormatError> {
        let source = GoSource::parse(src)?;
        let mut raw = Vec::new();
        walk(source.root(), |node| {
            if node.kind() == "raw_string_literal" {
                raw.push(node.byte_range());
            }
        });
        Ok(canonical(&source.text, &raw).into_bytes())
    }
}

fn inside(ranges: &[Range<usize>], offset: usize) -> bool {
    ranges
        .iter()
        .any(|range| range.start < offset && offset < range.end)
}

fn canonical(text: &str, raw: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let body = line.strip_suffix('\n').unwrap_or(line);
        let end = start + body.len();

        if inside(raw, end) {
            // The line break belongs to a raw string.
            flush_blank(&mut out, &mut pending_blank);
            out.push_str(body);
            out.push('\n');
            continue;
        }

        let trimmed = if inside(raw, start) {
            // Closing part of a raw string; only what follows it may be trimmed.
            let closing = raw
                .iter()
                .find(|range| range.start < start && start < range.end)
                .map_or(start, |range| range.end);
            let keep = closing - start;
            let (literal, rest) = body.split_at(keep.min(body.len()));
            format!("{literal}{}", rest.trim_end_matches([' ', '\t', '\r']))
        } else {
            body.trim_end_matches([' ', '\t', '\r']).to_string()
        };

        if trimmed.is_empty() && !inside(raw, start) {
            if !out.is_empty() {
                pending_blank = true;
            }
            continue;
        }
        flush_blank(&mut out, &mut pending_blank);
        out.push_str(&trimmed);
        out.push('\n');
    }
    out
}

fn flush_blank(out: &mut String, pending: &mut bool) {
    if *pending {
        out.push('\n');
        *pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(src: &str) -> String {
        String::from_utf8(GoFormatter.format("x.go", src.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_canonical_source_is_unchanged() {
        let src = "package p\n\nimport \"fmt\"\n\nfunc F() {\n\tfmt.Println(1)\n}\n";
        assert_eq!(fmt(src), src);
    }

    #[test]
    fn test_trailing_whitespace_is_trimmed() {
        assert_eq!(fmt("package p   \n\nfunc f() {}\t\n"), "package p\n\nfunc f() {}\n");
    }

    #[test]
    fn test_crlf_is_normalised() {
        assert_eq!(fmt("package p\r\n\r\nvar x = 1\r\n"), "package p\n\nvar x = 1\n");
    }

    #[test]
    fn test_blank_runs_collapse_and_ends_with_one_newline() {
        assert_eq!(
            fmt("\n\npackage p\n\n\n\nvar x = 1\n\n\n"),
            "package p\n\nvar x = 1\n"
        );
        assert_eq!(fmt("package p"), "package p\n");
    }

    #[test]
    fn test_raw_string_interior_is_preserved() {
        let src = "package p\n\nvar s = `a   \n\n\n b\t`   \n";
        assert_eq!(fmt(src), "package p\n\nvar s = `a   \n\n\n b\t`\n");
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        let err = GoFormatter
            .format("x.go", b"package p\n\nfunc {\n")
            .unwrap_err();
        assert!(matches!(err, FormatError::Syntax(_)));
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let once = fmt("package p  \n\n\n\nfunc f() {\r\n\treturn\r\n}\n\n");
        assert_eq!(fmt(&once), once);
    }
}
