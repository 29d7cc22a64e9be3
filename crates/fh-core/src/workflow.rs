use crate::analyze::SourceFormatter;
use crate::error::{FixhubError, HostError, WorkflowError};
use crate::fetcher::ContentFetcher;
use crate::host::{CommitAuthor, FileUpdate, RemoteHost};
use crate::planner::FixPlanner;
use crate::sessions::SessionStore;
use crate::types::{ContentId, RepoInfo, RepoRef, Session, WorkingTarget};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backoff used while waiting for a requested fork to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkPolling {
    pub initial: Duration,
    /// Polling stops once the next wait would reach this.
    pub cap: Duration,
}

impl Default for ForkPolling {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            cap: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOptions {
    pub web_base: String,
    pub author_name: String,
    pub author_email: String,
    pub fork_polling: ForkPolling,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            web_base: "https://github.com".to_string(),
            author_name: "fixhub".to_string(),
            author_email: "fixhub@users.noreply.github.com".to_string(),
            fork_polling: ForkPolling::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Uninitialized,
    UserResolved,
    TargetResolved,
    BranchEnsured,
    Committing,
    Done,
    Failed { reason: String },
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::UserResolved => f.write_str("user_resolved"),
            Self::TargetResolved => f.write_str("target_resolved"),
            Self::BranchEnsured => f.write_str("branch_ensured"),
            Self::Committing => f.write_str("committing"),
            Self::Done => f.write_str("done"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixReport {
    pub target: WorkingTarget,
    /// One comparison URL per committed fix, in session order.
    pub urls: Vec<String>,
}

/// Resolved working target plus what is needed to branch and compare.
struct Target {
    working: WorkingTarget,
    original: RepoInfo,
    base_branch: String,
}

/// Commits the fixes of one session on behalf of the credential holder of
/// `host`, forking when the user cannot push to the original repository.
pub struct FixWorkflow {
    host: Arc<dyn RemoteHost>,
    formatter: Arc<dyn SourceFormatter>,
    options: WorkflowOptions,
    state: WorkflowState,
}

impl FixWorkflow {
    pub fn new(
        host: Arc<dyn RemoteHost>,
        formatter: Arc<dyn SourceFormatter>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            host,
            formatter,
            options,
            state: WorkflowState::Uninitialized,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Runs every step for `session`. On success the session is removed
    /// from `store`; on failure it stays until it expires.
    pub async fn run(
        &mut self,
        session: &Session,
        store: &SessionStore,
    ) -> Result<FixReport, FixhubError> {
        match self.drive(session).await {
            Ok(report) => {
                store.remove(&session.key);
                self.state = WorkflowState::Done;
                info!(
                    key = %session.key,
                    target = %report.target.repo,
                    commits = report.urls.len(),
                    "fix session done"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(key = %session.key, state = %self.state, error = %err, "fix session failed");
                self.state = WorkflowState::Failed {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    async fn drive(&mut self, session: &Session) -> Result<FixReport, FixhubError> {
        let user = self.resolve_user().await?;
        self.state = WorkflowState::UserResolved;

        let target = self.resolve_target(&session.repo, &user).await?;
        self.state = WorkflowState::TargetResolved;

        self.ensure_branch(&target).await?;
        self.state = WorkflowState::BranchEnsured;

        self.state = WorkflowState::Committing;
        let urls = self.commit_all(session, &target).await?;
        Ok(FixReport {
            target: target.working,
            urls,
        })
    }

    async fn resolve_user(&self) -> Result<String, FixhubError> {
        match self.host.current_user().await {
            Ok(user) => Ok(user),
            Err(HostError::Unauthenticated) => Err(WorkflowError::AuthRequired.into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_target(&self, repo: &RepoRef, user: &str) -> Result<Target, FixhubError> {
        let original = self.host.repository(repo).await?;
        let branch_name = WorkingTarget::branch_for(user);
        let can_push = repo.owner == user || self.host.is_collaborator(repo, user).await?;
        if can_push {
            debug!(%repo, user, "committing to original repository");
            return Ok(Target {
                base_branch: original.default_branch.clone(),
                working: WorkingTarget {
                    repo: repo.clone(),
                    branch_name,
                    is_fork: false,
                },
                original,
            });
        }

        let fork = self
            .host
            .create_fork(repo)
            .await
            .map_err(|err| write_error(repo, err))?;
        info!(%repo, %fork, "requested fork");
        let base_branch = match self.wait_for_fork(&fork).await {
            Some(info) => info.default_branch,
            None => {
                warn!(%fork, "fork still not visible, continuing anyway");
                original.default_branch.clone()
            }
        };
        Ok(Target {
            working: WorkingTarget {
                repo: fork,
                branch_name,
                is_fork: true,
            },
            original,
            base_branch,
        })
    }

    async fn wait_for_fork(&self, fork: &RepoRef) -> Option<RepoInfo> {
        let polling = self.options.fork_polling;
        let mut wait = polling.initial;
        while wait < polling.cap {
            tokio::time::sleep(wait).await;
            match self.host.repository(fork).await {
                Ok(info) => return Some(info),
                Err(err) => debug!(%fork, ?wait, error = %err, "fork not visible yet"),
            }
            wait *= 2;
        }
        None
    }

    async fn ensure_branch(&self, target: &Target) -> Result<(), FixhubError> {
        let repo = &target.working.repo;
        let branch = &target.working.branch_name;
        if self.host.branch_head(repo, branch).await?.is_some() {
            debug!(%repo, branch, "reusing existing branch");
            return Ok(());
        }
        let head: ContentId = self
            .host
            .branch_head(repo, &target.base_branch)
            .await?
            .ok_or_else(|| HostError::NotFound {
                what: format!("branch {} of {repo}", target.base_branch),
            })?;
        self.host
            .create_branch(repo, branch, &head)
            .await
            .map_err(|err| write_error(repo, err))?;
        info!(%repo, branch, from = %target.base_branch, "created branch");
        Ok(())
    }

    async fn commit_all(
        &self,
        session: &Session,
        target: &Target,
    ) -> Result<Vec<String>, FixhubError> {
        let planner = FixPlanner::new(
            ContentFetcher::new(Arc::clone(&self.host), session.repo.clone()),
            Arc::clone(&self.formatter),
        );
        let mut urls = Vec::with_capacity(session.findings.len());
        for finding in &session.findings {
            let result = async {
                let fix = planner.plan(finding).await?;
                let expected_blob = fix.finding.blob_id.clone().ok_or_else(|| {
                    FixhubError::Internal {
                        message: format!("planned fix for {} lost its blob id", finding.file_path),
                    }
                })?;
                let update = FileUpdate {
                    path: finding.file_path.clone(),
                    content: fix.replacement_bytes,
                    expected_blob,
                    branch: target.working.branch_name.clone(),
                    message: format!("fixhub: {}", finding.kind),
                    author: CommitAuthor {
                        name: self.options.author_name.clone(),
                        email: self.options.author_email.clone(),
                        date: Utc::now(),
                    },
                };
                self.host
                    .update_file(&target.working.repo, update)
                    .await
                    .map_err(|err| write_error(&target.working.repo, err))
            }
            .await;

            match result {
                Ok(commit) => {
                    debug!(path = %finding.file_path, %commit, "committed fix");
                    urls.push(self.compare_url(target, &finding.file_path));
                }
                Err(err) => {
                    return Err(WorkflowError::CommitAborted {
                        path: finding.file_path.clone(),
                        committed: urls,
                        source: Box::new(err),
                    }
                    .into());
                }
            }
        }
        Ok(urls)
    }

    /// Comparison page for the working branch, anchored at `path`'s diff.
    fn compare_url(&self, target: &Target, path: &str) -> String {
        let web = self.options.web_base.trim_end_matches('/');
        let working = &target.working;
        let anchor = hex::encode(Sha256::digest(path.as_bytes()));
        if working.is_fork {
            format!(
                "{web}/{}/{}/compare/{}:{}...{}:{}?expand=1#diff-{anchor}",
                working.repo.owner,
                working.repo.name,
                target.original.repo.owner,
                target.original.default_branch,
                working.repo.owner,
                working.branch_name,
            )
        } else {
            format!(
                "{web}/{}/{}/compare/{}?expand=1#diff-{anchor}",
                working.repo.owner, working.repo.name, working.branch_name,
            )
        }
    }
}

fn write_error(repo: &RepoRef, err: HostError) -> FixhubError {
    match err {
        HostError::PermissionDenied { reason } => {
            debug!(%repo, reason, "write refused");
            WorkflowError::NoWriteAccess {
                repo: repo.to_string(),
            }
            .into()
        }
        HostError::Unauthenticated => WorkflowError::AuthRequired.into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MarkerFormatter, MemoryHost};
    use crate::types::{Finding, NewSession};

    const DIRTY: &[(&str, &str)] = &[
        ("a.go", "package a   \n"),
        ("b.go", "package b\t\n"),
        ("clean.go", "package c\n"),
    ];

    fn setup(files: &[(&str, &str)]) -> (MemoryHost, SessionStore, Session) {
        let host = MemoryHost::new();
        host.add_repo("faker", "proj", files);
        let findings = ["a.go", "b.go"]
            .iter()
            .filter_map(|path| {
                host.blob_id("faker", "proj", path)
                    .map(|blob| Finding::format(path, blob))
            })
            .collect();
        let store = SessionStore::new();
        let key = store
            .put(NewSession {
                repo: RepoRef::new("faker", "proj"),
                findings,
            })
            .unwrap();
        let session = store.get(&key).unwrap();
        (host, store, session)
    }

    fn workflow(host: &MemoryHost) -> FixWorkflow {
        FixWorkflow::new(
            Arc::new(host.clone()),
            Arc::new(MarkerFormatter),
            WorkflowOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_commits_to_original_repository() {
        let (host, store, session) = setup(DIRTY);
        let owner = host.acting_as("faker");
        let mut flow = workflow(&owner);
        let report = flow.run(&session, &store).await.unwrap();

        assert_eq!(flow.state(), &WorkflowState::Done);
        assert!(!report.target.is_fork);
        assert_eq!(report.target.repo, RepoRef::new("faker", "proj"));
        assert_eq!(report.target.branch_name, "fixbranch-faker");
        assert_eq!(report.urls.len(), 2);
        assert_ne!(report.urls[0], report.urls[1]);
        for url in &report.urls {
            assert!(url.starts_with(
                "https://github.com/faker/proj/compare/fixbranch-faker?expand=1#diff-"
            ));
        }

        assert_eq!(
            host.file("faker", "proj", "fixbranch-faker", "a.go").unwrap(),
            b"package a\n"
        );
        assert_eq!(
            host.file("faker", "proj", "master", "a.go").unwrap(),
            b"package a   \n"
        );
        let commits = host.commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].path, "a.go");
        assert_eq!(commits[1].path, "b.go");
        assert!(commits.iter().all(|c| c.message == "fixhub: gofmt"));
        assert!(commits.iter().all(|c| c.author == "fixhub"));
        assert!(store.get(&session.key).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collaborator_commits_to_original_repository() {
        let (host, store, session) = setup(DIRTY);
        host.add_collaborator("faker", "proj", "helper");
        let report = workflow(&host.acting_as("helper"))
            .run(&session, &store)
            .await
            .unwrap();
        assert!(!report.target.is_fork);
        assert_eq!(report.target.branch_name, "fixbranch-helper");
        assert!(host.file("faker", "proj", "fixbranch-helper", "b.go").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outsider_commits_to_fork_after_it_appears() {
        let (host, store, session) = setup(DIRTY);
        host.set_fork_delay(2);
        let mut flow = workflow(&host.acting_as("outsider"));
        let report = flow.run(&session, &store).await.unwrap();

        assert!(report.target.is_fork);
        assert_eq!(report.target.repo, RepoRef::new("outsider", "proj"));
        for url in &report.urls {
            assert!(url.starts_with(
                "https://github.com/outsider/proj/compare/faker:master...outsider:fixbranch-outsider?expand=1#diff-"
            ));
        }
        assert!(host.file("outsider", "proj", "fixbranch-outsider", "a.go").is_some());
        assert!(host.file("faker", "proj", "fixbranch-outsider", "a.go").is_none());
        // one lookup of the original plus three polls of the fork
        assert_eq!(host.repository_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fork_polling_gives_up_after_cap_and_continues() {
        let (host, store, session) = setup(DIRTY);
        host.set_fork_delay(100);
        let started = tokio::time::Instant::now();
        let report = workflow(&host.acting_as("outsider"))
            .run(&session, &store)
            .await
            .unwrap();
        // 50ms doubling while below 5s: seven sleeps totalling 6.35s
        assert_eq!(started.elapsed(), Duration::from_millis(6350));
        assert_eq!(host.repository_calls(), 8);
        assert!(report.target.is_fork);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_requires_auth() {
        let (host, store, session) = setup(DIRTY);
        let mut flow = workflow(&host);
        let err = flow.run(&session, &store).await.unwrap_err();
        assert!(matches!(err, FixhubError::Workflow(WorkflowError::AuthRequired)));
        assert!(matches!(flow.state(), WorkflowState::Failed { .. }));
        assert!(store.get(&session.key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_branch_is_reused() {
        let (host, store, session) = setup(DIRTY);
        host.add_branch("faker", "proj", "fixbranch-faker");
        let report = workflow(&host.acting_as("faker"))
            .run(&session, &store)
            .await
            .unwrap();
        assert_eq!(report.urls.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_aborts_remaining_commits() {
        let (host, store, session) = setup(DIRTY);
        host.fail_updates_for_path("b.go");
        let mut flow = workflow(&host.acting_as("faker"));
        let err = flow.run(&session, &store).await.unwrap_err();
        match err {
            FixhubError::Workflow(WorkflowError::CommitAborted {
                path, committed, ..
            }) => {
                assert_eq!(path, "b.go");
                assert_eq!(committed.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(host.commits().len(), 1);
        assert!(store.get(&session.key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_guard_conflict_aborts_batch() {
        let (host, store, session) = setup(DIRTY);
        // someone edits a.go on master after the scan; the new branch is cut
        // from the edited head so the recorded blob no longer matches
        host.push_external("faker", "proj", "a.go", "package a // edited   \n");
        let err = workflow(&host.acting_as("faker"))
            .run(&session, &store)
            .await
            .unwrap_err();
        match err {
            FixhubError::Workflow(WorkflowError::CommitAborted {
                path,
                committed,
                source,
            }) => {
                assert_eq!(path, "a.go");
                assert!(committed.is_empty());
                assert!(matches!(*source, FixhubError::Host(HostError::Conflict { .. })));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(host.commits().is_empty());
    }
}
