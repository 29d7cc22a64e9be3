//! Page rendering. Everything interpolated into markup goes through
//! [`escape`].

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use std::fmt::Write as _;

pub const STYLE: &str = include_str!("../assets/style.css");
pub const SCRIPT: &str = include_str!("../assets/script.js");

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wraps `body` (already markup) in the common page shell.
pub fn page(title: &str, body_class: Option<&str>, body: &str) -> Html<String> {
    let class = body_class
        .map(|class| format!(" class=\"{}\"", escape(class)))
        .unwrap_or_default();
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{}</title>\n\
         <link rel=\"stylesheet\" type=\"text/css\" href=\"/style.css\">\n\
         <script src=\"/script.js\" type=\"text/javascript\"></script>\n\
         </head>\n<body{class}>\n{body}</body>\n</html>\n",
        escape(title)
    ))
}

/// The repository form shown at the top of the landing and results pages.
pub fn header(current: &str) -> String {
    format!(
        "<div id=\"header\">\n<form onsubmit=\"return goproblems();\">\n\
         Find problems in <input id=\"repoText\" placeholder=\"github.com/owner/repo\" value=\"{}\">\n\
         <input type=\"submit\" value=\"Go\">\n</form>\n</div>\n",
        escape(current)
    )
}

pub fn error_page(status: StatusCode, message: &str, committed: &[String]) -> Response {
    let mut body = format!(
        "<h1>fixhub error {}</h1>\n<p>{}</p>\n",
        status.as_u16(),
        escape(message)
    );
    if !committed.is_empty() {
        body.push_str("<p>These fixes were committed before the failure:</p>\n");
        body.push_str(&link_list(committed));
    }
    let title = format!("fixhub error {}", status.as_u16());
    (status, page(&title, Some("info"), &body)).into_response()
}

pub fn link_list(urls: &[String]) -> String {
    let mut out = String::from("<ul>\n");
    for url in urls {
        let url = escape(url);
        let _ = writeln!(out, "<li><a href=\"{url}\">{url}</a></li>");
    }
    out.push_str("</ul>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_page_escapes_title() {
        let Html(text) = page("a<b", None, "<p>hi</p>\n");
        assert!(text.contains("<title>a&lt;b</title>"));
        assert!(text.contains("<p>hi</p>"));
        assert!(text.contains("<body>"));
    }

    #[test]
    fn test_link_list_escapes_urls() {
        let list = link_list(&["https://x/compare/a?expand=1&b=<c>".to_string()]);
        assert!(list.contains("expand=1&amp;b=&lt;c&gt;"));
    }
}
