use crate::AppState;
use crate::html::{self, escape};
use crate::routes::error::{bad_request_page, error_page};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::get;
use fh_core::FixhubError;
use fh_core::scan::ScanReport;
use fh_core::types::{Finding, RepoRef, SessionKey};
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::info;

const SKIP_CONFIRM_COOKIE: &str = "skipconfirm";

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    state: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/style.css", get(style))
        .route("/script.js", get(script))
        .route("/github.com/{owner}/{repo}", get(problems))
        .route("/confirm", get(confirm))
        .with_state(state)
}

pub(crate) async fn landing() -> Response {
    let body = format!(
        "{}<p class=\"summary\">Enter a GitHub repository to list formatting, lint and vet \
         problems in its Go files.</p>\n",
        html::header("")
    );
    html::page("fixhub", None, &body).into_response()
}

pub(crate) async fn style() -> Response {
    static_asset("text/css; charset=utf-8", html::STYLE)
}

pub(crate) async fn script() -> Response {
    static_asset("text/javascript; charset=utf-8", html::SCRIPT)
}

fn static_asset(content_type: &'static str, text: &'static str) -> Response {
    (
        [(CONTENT_TYPE, content_type), (CACHE_CONTROL, "public, max-age=3600")],
        text,
    )
        .into_response()
}

/// `true` when the request carries `skipconfirm=true`.
fn skip_confirm(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == SKIP_CONFIRM_COOKIE && value == "true")
}

/// Splits `name@rev`; an empty or absent rev means the default.
fn split_rev<'a>(segment: &'a str, default_rev: &'a str) -> (&'a str, &'a str) {
    match segment.split_once('@') {
        Some((name, rev)) if !rev.is_empty() => (name, rev),
        Some((name, _)) => (name, default_rev),
        None => (segment, default_rev),
    }
}

pub(crate) async fn problems(
    State(state): State<AppState>,
    Path((owner, segment)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let (name, rev) = split_rev(&segment, &state.config.scan.default_rev);
    let Some(repo) = RepoRef::parse(&format!("{owner}/{name}")) else {
        return bad_request_page(&format!("not a valid github owner/repo: {owner}/{segment}"));
    };
    let report = match state.scanner().check(&repo, rev).await {
        Ok(report) => report,
        Err(err) => return error_page(&FixhubError::from(err)),
    };
    info!(%repo, rev, problems = report.findings.len(), "rendered problem list");
    match render_problems(&state, &report, skip_confirm(&headers)) {
        Ok(body) => html::page("fixhub", None, &body).into_response(),
        Err(err) => error_page(&err),
    }
}

fn render_problems(
    state: &AppState,
    report: &ScanReport,
    skip_confirm: bool,
) -> Result<String, FixhubError> {
    let repo = &report.repo;
    let web = state.config.github.web_url.trim_end_matches('/');
    let mut body = html::header(&format!("github.com/{repo}"));
    let _ = writeln!(
        body,
        "<p class=\"summary\">{} problems in {} files at {} ({} skipped)</p>",
        report.findings.len(),
        report.files_examined,
        escape(&report.revision),
        report.files_skipped
    );
    if report.findings.is_empty() {
        return Ok(body);
    }

    body.push_str("<ul class=\"problems\">\n");
    for finding in report.findings.iter() {
        let mut href = format!("{web}/{repo}/blob/{}/{}", report.revision, finding.file_path);
        let mut label = finding.file_path.clone();
        if finding.line > 0 {
            let _ = write!(href, "#L{}", finding.line);
            let _ = write!(label, ":{}", finding.line);
        }
        let _ = write!(
            body,
            "<li><span class=\"kind\">{}</span><a href=\"{}\">{}</a>: {}",
            finding.kind,
            escape(&href),
            escape(&label),
            escape(&finding.message)
        );
        if let Some(key) = state.open_session(repo, [finding.clone()])? {
            let _ = write!(
                body,
                " <a class=\"fix\" href=\"{}\">Fix</a>",
                escape(&state.fix_link(&key, skip_confirm))
            );
        }
        body.push_str("</li>\n");
    }
    body.push_str("</ul>\n");

    let fixable: Vec<Finding> = report.findings.fixable().cloned().collect();
    if fixable.len() > 1 {
        if let Some(key) = state.open_session(repo, fixable)? {
            let _ = writeln!(
                body,
                "<p><a class=\"fix\" href=\"{}\">Fix all</a></p>",
                escape(&state.fix_link(&key, skip_confirm))
            );
        }
    }
    Ok(body)
}

pub(crate) async fn confirm(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let key = match query.state.as_deref().map(str::parse::<SessionKey>) {
        Some(Ok(key)) => key,
        Some(Err(err)) => return bad_request_page(&format!("state: {err}")),
        None => return bad_request_page("state: missing"),
    };
    let session = match state.sessions.get(&key) {
        Ok(session) => session,
        Err(err) => return error_page(&FixhubError::from(err)),
    };

    let mut body = String::from(
        "<h1>fixhub</h1>\n\
         <p>fixhub will, acting as you, commit the fixes below to a fixhub branch. If you \
         cannot push to the repository it forks it first. From there you can open a pull \
         request.</p>\n\
         <p>To do this fixhub needs write access to your public repositories. It only ever \
         writes to branches named fixbranch-&lt;you&gt;.</p>\n<ul>\n",
    );
    for finding in &session.findings {
        let _ = writeln!(
            body,
            "<li>{} in {}</li>",
            escape(finding.kind.as_str()),
            escape(&finding.file_path)
        );
    }
    let _ = writeln!(
        body,
        "</ul>\n<p><a onclick=\"goconfirm();\" href=\"{}\">Create GitHub commit</a>\n\
         <label><input type=\"checkbox\" id=\"donotshowagain\"> Do not show again</label></p>",
        escape(&state.provider.authorize_url(&key))
    );
    html::page(&format!("fixhub: fix {}", session.repo), Some("info"), &body).into_response()
}
