use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use fh_core::config::{FixhubConfig, OauthConfig, ServerConfig};
use fh_core::error::HostError;
use fh_core::host::{CommitAuthor, FileUpdate, HostProvider, RemoteHost};
use fh_core::types::{ContentId, Credential, RepoRef, SessionKey};
use fh_github::{GithubHost, GithubProvider, OauthApp};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Fake {
    puts: Arc<Mutex<Vec<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer gho_user")
}

async fn commit(Path((_, _, rev)): Path<(String, String, String)>) -> Response {
    if rev == "master" {
        Json(json!({"sha": "c1", "commit": {"tree": {"sha": "t1"}}})).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"message": "No commit found"}))).into_response()
    }
}

async fn tree() -> Json<Value> {
    Json(json!({
        "sha": "t1",
        "tree": [
            {"path": "a.go", "type": "blob", "sha": "b1", "size": 10},
            {"path": "sub", "type": "tree", "sha": "t2"}
        ],
        "truncated": false
    }))
}

async fn blob() -> Json<Value> {
    Json(json!({"sha": "b1", "encoding": "base64", "content": "cGFja2Fn\nZSBh\n"}))
}

async fn user(headers: HeaderMap) -> Response {
    if authorized(&headers) {
        Json(json!({"login": "alice"})).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))).into_response()
    }
}

async fn collaborator(Path((_, _, user)): Path<(String, String, String)>) -> StatusCode {
    if user == "alice" {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn contents(
    State(fake): State<Fake>,
    Path((_, _, path)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if body["sha"] != "b1" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": format!("{path} does not match b1")})),
        )
            .into_response();
    }
    let mut body = body;
    body["path"] = json!(path);
    fake.puts.lock().unwrap().push(body);
    Json(json!({"content": {"path": path}, "commit": {"sha": "c2"}})).into_response()
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    if form.get("code").map(String::as_str) == Some("good") {
        Json(json!({"access_token": "gho_user", "token_type": "bearer"}))
    } else {
        Json(json!({"error": "bad_verification_code"}))
    }
}

async fn start() -> (String, Fake) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/repos/{owner}/{repo}/commits/{rev}", get(commit))
        .route("/repos/{owner}/{repo}/git/trees/{sha}", get(tree))
        .route("/repos/{owner}/{repo}/git/blobs/{sha}", get(blob))
        .route(
            "/repos/{owner}/{repo}/collaborators/{user}",
            get(collaborator),
        )
        .route("/repos/{owner}/{repo}/contents/{*path}", put(contents))
        .route("/user", get(user))
        .route("/login/oauth/access_token", post(token))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), fake)
}

fn repo() -> RepoRef {
    RepoRef::new("faker", "proj")
}

#[tokio::test]
async fn test_reads_revision_tree_and_blob() {
    let (base, _) = start().await;
    let host = GithubHost::new(&base, "fixhub-test", None).unwrap();

    let commit = host.resolve_revision(&repo(), "master").await.unwrap();
    assert_eq!(commit, ContentId::from("c1"));

    let tree = host.recursive_tree(&repo(), &commit).await.unwrap();
    assert_eq!(tree.entries.len(), 2);
    assert_eq!(tree.entries[0].path.as_deref(), Some("a.go"));

    let blob = host.blob(&repo(), &ContentId::from("b1")).await.unwrap();
    assert_eq!(blob.encoding, "base64");
}

#[tokio::test]
async fn test_missing_revision_is_not_found() {
    let (base, _) = start().await;
    let host = GithubHost::new(&base, "fixhub-test", None).unwrap();
    let err = host.resolve_revision(&repo(), "nope").await.unwrap_err();
    assert!(matches!(err, HostError::NotFound { .. }));
}

#[tokio::test]
async fn test_collaborator_lookup() {
    let (base, _) = start().await;
    let host = GithubHost::new(&base, "fixhub-test", None).unwrap();
    assert!(host.is_collaborator(&repo(), "alice").await.unwrap());
    assert!(!host.is_collaborator(&repo(), "mallory").await.unwrap());
}

#[tokio::test]
async fn test_update_file_sends_guard_and_maps_conflict() {
    let (base, fake) = start().await;
    let credential = Credential::new("gho_user");
    let host = GithubHost::new(&base, "fixhub-test", Some(&credential)).unwrap();
    let update = |expected: &str| FileUpdate {
        path: "pkg/a.go".to_string(),
        content: b"package a\n".to_vec(),
        expected_blob: ContentId::from(expected),
        branch: "fixbranch-alice".to_string(),
        message: "fixhub: gofmt".to_string(),
        author: CommitAuthor {
            name: "fixhub".to_string(),
            email: "fixhub@example.com".to_string(),
            date: chrono::Utc::now(),
        },
    };

    let commit = host.update_file(&repo(), update("b1")).await.unwrap();
    assert_eq!(commit, ContentId::from("c2"));
    let puts = fake.puts.lock().unwrap().clone();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0]["path"], "pkg/a.go");
    assert_eq!(puts[0]["branch"], "fixbranch-alice");
    assert_eq!(puts[0]["content"], "cGFja2FnZSBhCg==");

    let err = host.update_file(&repo(), update("stale")).await.unwrap_err();
    assert!(matches!(err, HostError::Conflict { .. }));
}

#[tokio::test]
async fn test_bad_token_is_unauthenticated() {
    let (base, _) = start().await;
    let credential = Credential::new("gho_wrong");
    let host = GithubHost::new(&base, "fixhub-test", Some(&credential)).unwrap();
    let err = host.current_user().await.unwrap_err();
    assert!(matches!(err, HostError::Unauthenticated));
}

#[tokio::test]
async fn test_exchange_code_yields_user_host() {
    let (base, _) = start().await;
    let mut config = FixhubConfig::default();
    config.github.api_url = base.clone();
    config.oauth = OauthConfig {
        client_id: "cid".to_string(),
        client_secret: "secret".to_string(),
        token_url: format!("{base}/login/oauth/access_token"),
        ..OauthConfig::default()
    };
    let provider = GithubProvider::new(&config, None).unwrap();

    let host = provider.exchange_code("good").await.unwrap();
    assert_eq!(host.current_user().await.unwrap(), "alice");

    let err = provider.exchange_code("bad").await.err().unwrap();
    assert!(matches!(err, HostError::Unauthenticated));

    let url = provider.authorize_url(&SessionKey::generate());
    assert!(url.contains("client_id=cid"));
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_unauthenticated() {
    let oauth = OauthConfig {
        token_url: "http://127.0.0.1:1/login/oauth/access_token".to_string(),
        ..OauthConfig::default()
    };
    let app = OauthApp::new(&oauth, &ServerConfig::default(), "fixhub-test").unwrap();
    let err = app.exchange("good").await.unwrap_err();
    assert!(matches!(err, HostError::Unauthenticated));
}
