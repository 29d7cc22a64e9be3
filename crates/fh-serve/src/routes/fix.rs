use crate::AppState;
use crate::html;
use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{bad_request_page, error_page};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Router};
use fh_core::FixhubError;
use fh_core::types::SessionKey;
use fh_core::workflow::FixWorkflow;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/oauthback", get(oauth_callback))
        .with_state(state)
}

/// Completes the authorization round trip: trades the code for the user's
/// credential, then commits the session's fixes as that user.
pub(crate) async fn oauth_callback(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let key = match query.state.as_deref().map(str::parse::<SessionKey>) {
        Some(Ok(key)) => key,
        Some(Err(err)) => return bad_request_page(&format!("state: {err}")),
        None => return bad_request_page("state: missing"),
    };
    if let Some(error) = query.error {
        let reason = query.error_description.unwrap_or(error);
        warn!(%key, correlation_id = %correlation.0, reason = %reason, "authorization declined");
        return html::error_page(
            StatusCode::UNAUTHORIZED,
            &format!("authorization declined: {reason}"),
            &[],
        );
    }
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return bad_request_page("code: missing");
    };

    let host = match state.provider.exchange_code(&code).await {
        Ok(host) => host,
        Err(err) => return error_page(&FixhubError::from(err)),
    };
    let session = match state.sessions.get(&key) {
        Ok(session) => session,
        Err(err) => return error_page(&FixhubError::from(err)),
    };

    let mut workflow = FixWorkflow::new(
        host,
        state.analyzers.formatter.clone(),
        state.config.workflow_options(),
    );
    let report = match workflow.run(&session, &state.sessions).await {
        Ok(report) => report,
        Err(err) => return error_page(&err),
    };
    info!(
        %key,
        correlation_id = %correlation.0,
        target = %report.target.repo,
        commits = report.urls.len(),
        "fixes committed"
    );

    match report.urls.as_slice() {
        [url] => Redirect::to(url).into_response(),
        urls => {
            let body = format!(
                "<h1>fixhub</h1>\n<p>Fixes successfully committed. To view and merge:</p>\n{}",
                html::link_list(urls)
            );
            html::page("fixhub", Some("info"), &body).into_response()
        }
    }
}
