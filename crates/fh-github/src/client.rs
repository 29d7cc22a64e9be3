use crate::wire;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use fh_core::error::HostError;
use fh_core::host::{FileUpdate, RemoteHost};
use fh_core::types::{ContentId, Credential, RawBlob, RawTree, RepoInfo, RepoRef};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// [`RemoteHost`] backed by the GitHub REST v3 API.
#[derive(Debug, Clone)]
pub struct GithubHost {
    client: reqwest::Client,
    api: Url,
    authenticated: bool,
}

impl GithubHost {
    pub fn new(
        api_url: &str,
        user_agent: &str,
        token: Option<&Credential>,
    ) -> Result<Self, HostError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| HostError::transport("token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| HostError::transport("user agent is not a valid header value"))?,
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(HostError::transport)?;
        let api = Url::parse(api_url)
            .map_err(|err| HostError::transport(format!("api url {api_url:?}: {err}")))?;
        Ok(Self {
            client,
            api,
            authenticated: token.is_some(),
        })
    }

    /// `{api}/repos/{owner}/{name}/{segments..}`, each segment escaped.
    fn repo_url<'a>(
        &self,
        repo: &'a RepoRef,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, HostError> {
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|()| HostError::transport("api url cannot be a base"))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "github request");
        self.client.request(method, url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, HostError> {
        let response = request.send().await.map_err(HostError::transport)?;
        check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T, HostError> {
        let response = self.send(self.request(Method::GET, url), what).await?;
        response.json().await.map_err(HostError::transport)
    }
}

/// Passes successful responses through and turns the rest into the
/// [`HostError`] kind callers branch on.
async fn check_status(response: Response, what: &str) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<wire::ApiError>()
        .await
        .map(|err| err.message)
        .unwrap_or_default();
    Err(status_error(status, what, &message))
}

fn status_error(status: StatusCode, what: &str, message: &str) -> HostError {
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };
    match status {
        StatusCode::NOT_FOUND => HostError::NotFound {
            what: what.to_string(),
        },
        StatusCode::UNAUTHORIZED => HostError::Unauthenticated,
        StatusCode::FORBIDDEN => HostError::PermissionDenied {
            reason: format!("{what}: {detail}"),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => HostError::Conflict {
            path: what.to_string(),
        },
        _ => HostError::Transport {
            reason: format!("{what}: {detail}"),
        },
    }
}

#[async_trait]
impl RemoteHost for GithubHost {
    async fn resolve_revision(&self, repo: &RepoRef, rev: &str) -> Result<ContentId, HostError> {
        let url = self.repo_url(repo, ["commits", rev])?;
        let commit: wire::Commit = self.get_json(url, &format!("commit {rev}")).await?;
        Ok(ContentId::new(commit.sha))
    }

    async fn recursive_tree(
        &self,
        repo: &RepoRef,
        tree: &ContentId,
    ) -> Result<RawTree, HostError> {
        let mut url = self.repo_url(repo, ["git", "trees", tree.as_str()])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: wire::Tree = self.get_json(url, &format!("tree {tree}")).await?;
        Ok(tree.into())
    }

    async fn blob(&self, repo: &RepoRef, blob: &ContentId) -> Result<RawBlob, HostError> {
        let url = self.repo_url(repo, ["git", "blobs", blob.as_str()])?;
        let blob: wire::Blob = self.get_json(url, &format!("blob {blob}")).await?;
        Ok(blob.into())
    }

    async fn current_user(&self) -> Result<String, HostError> {
        if !self.authenticated {
            return Err(HostError::Unauthenticated);
        }
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|()| HostError::transport("api url cannot be a base"))?
            .pop_if_empty()
            .push("user");
        let user: wire::User = self.get_json(url, "current user").await?;
        Ok(user.login)
    }

    async fn is_collaborator(&self, repo: &RepoRef, user: &str) -> Result<bool, HostError> {
        let url = self.repo_url(repo, ["collaborators", user])?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(HostError::transport)?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            // Non-collaborators may not list collaborators at all.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            _ => {
                check_status(response, &format!("collaborator {user} of {repo}")).await?;
                Ok(true)
            }
        }
    }

    async fn create_fork(&self, repo: &RepoRef) -> Result<RepoRef, HostError> {
        let url = self.repo_url(repo, ["forks"])?;
        let response = self
            .send(self.request(Method::POST, url), &format!("fork of {repo}"))
            .await?;
        let fork: wire::Repository = response.json().await.map_err(HostError::transport)?;
        Ok(RepoRef::new(fork.owner.login, fork.name))
    }

    async fn repository(&self, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        let url = self.repo_url(repo, [])?;
        let info: wire::Repository = self.get_json(url, &format!("repository {repo}")).await?;
        Ok(RepoInfo {
            repo: RepoRef::new(info.owner.login, info.name),
            default_branch: info.default_branch,
        })
    }

    async fn branch_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<ContentId>, HostError> {
        let mut segments = vec!["git", "ref", "heads"];
        segments.extend(branch.split('/'));
        let url = self.repo_url(repo, segments)?;
        match self.get_json::<wire::Reference>(url, &format!("branch {branch}")).await {
            Ok(reference) => Ok(Some(ContentId::new(reference.object.sha))),
            Err(HostError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        at: &ContentId,
    ) -> Result<(), HostError> {
        let url = self.repo_url(repo, ["git", "refs"])?;
        let body = wire::CreateReference {
            reference: format!("refs/heads/{branch}"),
            sha: at.as_str(),
        };
        self.send(
            self.request(Method::POST, url).json(&body),
            &format!("branch {branch}"),
        )
        .await?;
        Ok(())
    }

    async fn update_file(
        &self,
        repo: &RepoRef,
        update: FileUpdate,
    ) -> Result<ContentId, HostError> {
        let mut segments = vec!["contents"];
        segments.extend(update.path.split('/'));
        let url = self.repo_url(repo, segments)?;
        let signature = || wire::CommitAuthor {
            name: &update.author.name,
            email: &update.author.email,
            date: update.author.date,
        };
        let body = wire::UpdateContents {
            message: &update.message,
            content: STANDARD.encode(&update.content),
            sha: update.expected_blob.as_str(),
            branch: &update.branch,
            author: signature(),
            committer: signature(),
        };
        let response = self
            .send(self.request(Method::PUT, url).json(&body), &update.path)
            .await?;
        let written: wire::UpdateContentsResponse =
            response.json().await.map_err(HostError::transport)?;
        Ok(ContentId::new(written.commit.sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> GithubHost {
        GithubHost::new("https://api.github.com/", "fixhub-test", None).unwrap()
    }

    #[test]
    fn test_repo_url_escapes_segments() {
        let url = host()
            .repo_url(&RepoRef::new("golang", "lint"), ["contents", "dir", "a b.go"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/golang/lint/contents/dir/a%20b.go"
        );
    }

    #[test]
    fn test_repo_url_keeps_api_prefix() {
        let host = GithubHost::new("https://ghe.example.com/api/v3", "fixhub-test", None).unwrap();
        let url = host.repo_url(&RepoRef::new("a", "b"), ["forks"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/a/b/forks");
    }

    #[test]
    fn test_status_error_kinds() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "commit x", ""),
            HostError::NotFound { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "user", "Bad credentials"),
            HostError::Unauthenticated
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "a.go", "Resource not accessible"),
            HostError::PermissionDenied { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "a.go", "a.go does not match"),
            HostError::Conflict { .. }
        ));
        match status_error(StatusCode::BAD_GATEWAY, "tree t", "upstream") {
            HostError::Transport { reason } => assert!(reason.contains("upstream")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_anonymous_host_has_no_user() {
        let err = host().current_user().await.unwrap_err();
        assert!(matches!(err, HostError::Unauthenticated));
    }
}
