use crate::html;
use axum::Json;
use axum::http::StatusCode;
use axum::response::Response;
use fh_core::error::{FixError, FixhubError, HostError, SessionError, WorkflowError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

pub fn map_error(
    err: &FixhubError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code) = classify(err);
    (
        status,
        Json(ErrorEnvelope {
            code,
            message: err.to_string(),
            correlation_id,
        }),
    )
}

/// Request-shape problems that never reach the core.
pub fn invalid_input(
    message: impl Into<String>,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope {
            code: "invalid_input",
            message: message.into(),
            correlation_id,
        }),
    )
}

/// Same mapping as [`map_error`], rendered for a browser.
pub fn error_page(err: &FixhubError) -> Response {
    let (status, _) = classify(err);
    let committed: &[String] = match err {
        FixhubError::Workflow(WorkflowError::CommitAborted { committed, .. }) => committed,
        _ => &[],
    };
    html::error_page(status, &err.to_string(), committed)
}

pub fn bad_request_page(message: &str) -> Response {
    html::error_page(StatusCode::BAD_REQUEST, message, &[])
}

pub fn classify(err: &FixhubError) -> (StatusCode, &'static str) {
    match err {
        FixhubError::Host(host) => map_host_error(host),
        FixhubError::Session(session) => map_session_error(session),
        FixhubError::Fix(fix) => map_fix_error(fix),
        FixhubError::Workflow(workflow) => map_workflow_error(workflow),
        FixhubError::Config(_) | FixhubError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

fn map_host_error(err: &HostError) -> (StatusCode, &'static str) {
    match err {
        HostError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        HostError::Unauthenticated => (StatusCode::UNAUTHORIZED, "auth_required"),
        HostError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, "permission_denied"),
        HostError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        HostError::Incomplete { .. } => (StatusCode::BAD_GATEWAY, "incomplete_listing"),
        HostError::Transport { .. } | HostError::Encoding { .. } => {
            (StatusCode::BAD_GATEWAY, "transport_error")
        }
    }
}

fn map_session_error(err: &SessionError) -> (StatusCode, &'static str) {
    match err {
        SessionError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        SessionError::KeyCollision { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "session_unavailable")
        }
    }
}

fn map_fix_error(err: &FixError) -> (StatusCode, &'static str) {
    match err {
        FixError::NotFixable { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "not_fixable"),
        FixError::UnsupportedKind { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_kind")
        }
        FixError::Unformattable { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "unformattable"),
    }
}

fn map_workflow_error(err: &WorkflowError) -> (StatusCode, &'static str) {
    match err {
        WorkflowError::AuthRequired => (StatusCode::UNAUTHORIZED, "auth_required"),
        WorkflowError::NoWriteAccess { .. } => (StatusCode::FORBIDDEN, "no_write_access"),
        // Status of whatever stopped the run; the code says it was partial.
        WorkflowError::CommitAborted { source, .. } => (classify(source).0, "commit_aborted"),
    }
}
