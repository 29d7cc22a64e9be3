use crate::AppState;
use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{invalid_input, map_error};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use fh_core::FixhubError;
use fh_core::types::{Finding, RepoRef, SessionKey};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    rev: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionInput {
    owner: String,
    repo: String,
    findings: Vec<Finding>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    key: SessionKey,
    confirm_url: String,
    authorize_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check/{owner}/{repo}", get(check))
        .route("/sessions", post(create_session))
        .with_state(state)
}

pub(crate) async fn check(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<CheckQuery>,
) -> Response {
    let repo = RepoRef::new(owner, repo);
    let rev = query
        .rev
        .filter(|rev| !rev.trim().is_empty())
        .unwrap_or_else(|| state.config.scan.default_rev.clone());
    match state.scanner().check(&repo, &rev).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => map_error(&FixhubError::from(err), Some(correlation.0)).into_response(),
    }
}

pub(crate) async fn create_session(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<CreateSessionInput>,
) -> Response {
    let repo = RepoRef::new(input.owner, input.repo);
    match state.open_session(&repo, input.findings) {
        Ok(Some(key)) => {
            info!(%key, %repo, "session created");
            Json(SessionCreated {
                confirm_url: state.fix_link(&key, false),
                authorize_url: state.fix_link(&key, true),
                key,
            })
            .into_response()
        }
        Ok(None) => {
            invalid_input("no fixable findings selected", Some(correlation.0)).into_response()
        }
        Err(err) => map_error(&FixhubError::from(err), Some(correlation.0)).into_response(),
    }
}
