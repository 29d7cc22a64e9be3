use crate::error::HostError;
use crate::types::{ContentId, RawBlob, RawTree, RepoInfo, RepoRef, SessionKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Author recorded on commits made by the fix workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// A single-file commit on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: String,
    pub content: Vec<u8>,
    /// Blob the file must currently have on the branch; the host rejects
    /// the write with [`HostError::Conflict`] otherwise.
    pub expected_blob: ContentId,
    pub branch: String,
    pub message: String,
    pub author: CommitAuthor,
}

/// Operations consumed from the repository host. One instance acts with one
/// credential (or none).
#[async_trait]
pub trait RemoteHost: Send + Sync {
    async fn resolve_revision(&self, repo: &RepoRef, rev: &str) -> Result<ContentId, HostError>;

    /// Recursive listing. Hosts that cap the listing must set `truncated`.
    async fn recursive_tree(&self, repo: &RepoRef, tree: &ContentId)
        -> Result<RawTree, HostError>;

    async fn blob(&self, repo: &RepoRef, blob: &ContentId) -> Result<RawBlob, HostError>;

    /// Login of the credential holder; [`HostError::Unauthenticated`] without one.
    async fn current_user(&self) -> Result<String, HostError>;

    async fn is_collaborator(&self, repo: &RepoRef, user: &str) -> Result<bool, HostError>;

    /// Requests a fork under the credential holder's account. Forks appear
    /// asynchronously; the returned reference may not resolve yet.
    async fn create_fork(&self, repo: &RepoRef) -> Result<RepoRef, HostError>;

    async fn repository(&self, repo: &RepoRef) -> Result<RepoInfo, HostError>;

    /// Head commit of `branch`, or `None` when the branch does not exist.
    async fn branch_head(&self, repo: &RepoRef, branch: &str)
        -> Result<Option<ContentId>, HostError>;

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        at: &ContentId,
    ) -> Result<(), HostError>;

    /// Writes one file as a new commit and returns the commit id.
    async fn update_file(&self, repo: &RepoRef, update: FileUpdate)
        -> Result<ContentId, HostError>;
}

/// Hands out hosts for the two credentials in play: the server's own for
/// scanning, and a user's obtained through the authorization redirect.
#[async_trait]
pub trait HostProvider: Send + Sync {
    fn scanning_host(&self) -> Arc<dyn RemoteHost>;

    /// Where to send the user to authorize; `state` comes back on the
    /// callback unchanged.
    fn authorize_url(&self, state: &SessionKey) -> String;

    /// Trades an authorization code for a host acting as that user.
    async fn exchange_code(&self, code: &str) -> Result<Arc<dyn RemoteHost>, HostError>;
}
