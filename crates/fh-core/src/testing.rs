//! In-memory repository host and scripted analyzers for tests.

use crate::analyze::{
    Advisory, AdvisoryLinter, AnalyzerError, Diagnostic, FormatError, SourceFormatter,
    SyntaxIssue, VetChecker,
};
use crate::error::HostError;
use crate::host::{FileUpdate, HostProvider, RemoteHost};
use crate::types::{ContentId, RawBlob, RawTree, RawTreeEntry, RepoInfo, RepoRef, SessionKey};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A commit written through [`RemoteHost::update_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub repo: RepoRef,
    pub branch: String,
    pub path: String,
    pub message: String,
    pub author: String,
    pub commit: ContentId,
}

#[derive(Debug, Clone, Default)]
struct RepoState {
    default_branch: String,
    branches: BTreeMap<String, ContentId>,
    collaborators: BTreeSet<String>,
    /// Remaining `repository` lookups that report the repo as missing.
    hidden_polls: u32,
}

#[derive(Debug, Default)]
struct State {
    repos: BTreeMap<RepoRef, RepoState>,
    commits: HashMap<ContentId, BTreeMap<String, ContentId>>,
    blobs: HashMap<ContentId, Vec<u8>>,
    failing_blobs: HashSet<ContentId>,
    failing_updates: HashSet<String>,
    extra_entries: Vec<RawTreeEntry>,
    truncated: bool,
    fork_delay: u32,
    next_commit: u64,
    log: Vec<CommitRecord>,
    repository_calls: usize,
}

#[derive(Debug, Default)]
struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

struct GaugeGuard<'a>(&'a Gauge);

impl<'a> GaugeGuard<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.max.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Repository host kept entirely in memory. Clones share state; each clone
/// may act as a different user.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<State>>,
    gauge: Arc<Gauge>,
    blob_latency: Option<Duration>,
    user: Option<String>,
}

pub fn content_id(data: &[u8]) -> ContentId {
    ContentId::new(hex::encode(Sha256::digest(data)))
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the same repositories acting as `user`.
    pub fn acting_as(&self, user: &str) -> Self {
        Self {
            user: Some(user.to_string()),
            ..self.clone()
        }
    }

    pub fn with_user(self, user: &str) -> Self {
        self.acting_as(user)
    }

    pub fn with_blob_latency(mut self, latency: Duration) -> Self {
        self.blob_latency = Some(latency);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates `owner/name` with a `master` branch holding `files`.
    pub fn add_repo(&self, owner: &str, name: &str, files: &[(&str, &str)]) -> ContentId {
        self.add_repo_on(owner, name, "master", files)
    }

    pub fn add_repo_on(
        &self,
        owner: &str,
        name: &str,
        default_branch: &str,
        files: &[(&str, &str)],
    ) -> ContentId {
        let mut state = self.lock();
        let mut tree = BTreeMap::new();
        for (path, content) in files {
            let id = content_id(content.as_bytes());
            state.blobs.insert(id.clone(), content.as_bytes().to_vec());
            tree.insert((*path).to_string(), id);
        }
        let head = state.new_commit(tree);
        let repo = RepoState {
            default_branch: default_branch.to_string(),
            branches: BTreeMap::from([(default_branch.to_string(), head.clone())]),
            ..RepoState::default()
        };
        state.repos.insert(RepoRef::new(owner, name), repo);
        head
    }

    pub fn add_collaborator(&self, owner: &str, name: &str, user: &str) {
        if let Some(repo) = self.lock().repos.get_mut(&RepoRef::new(owner, name)) {
            repo.collaborators.insert(user.to_string());
        }
    }

    pub fn add_branch(&self, owner: &str, name: &str, branch: &str) {
        let mut state = self.lock();
        if let Some(repo) = state.repos.get_mut(&RepoRef::new(owner, name)) {
            if let Some(head) = repo.branches.get(&repo.default_branch).cloned() {
                repo.branches.insert(branch.to_string(), head);
            }
        }
    }

    /// Number of `repository` lookups a new fork answers with not-found.
    pub fn set_fork_delay(&self, polls: u32) {
        self.lock().fork_delay = polls;
    }

    pub fn set_truncated(&self, truncated: bool) {
        self.lock().truncated = truncated;
    }

    /// Appends entries to every tree listing as-is.
    pub fn add_raw_entries(&self, entries: Vec<RawTreeEntry>) {
        self.lock().extra_entries.extend(entries);
    }

    /// Makes the blob currently at `path` on the default branch unreadable.
    pub fn fail_blob_for_path(&self, owner: &str, name: &str, path: &str) {
        let mut state = self.lock();
        if let Some(id) = state.file_id(&RepoRef::new(owner, name), None, path) {
            state.failing_blobs.insert(id);
        }
    }

    /// Rejects every write to `path`.
    pub fn fail_updates_for_path(&self, path: &str) {
        self.lock().failing_updates.insert(path.to_string());
    }

    /// Content of `path` on `branch`, if both exist.
    pub fn file(&self, owner: &str, name: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        let id = state.file_id(&RepoRef::new(owner, name), Some(branch), path)?;
        state.blobs.get(&id).cloned()
    }

    /// Blob id of `path` on the default branch.
    pub fn blob_id(&self, owner: &str, name: &str, path: &str) -> Option<ContentId> {
        self.lock().file_id(&RepoRef::new(owner, name), None, path)
    }

    /// Overwrites `path` on the default branch as if someone else pushed.
    pub fn push_external(&self, owner: &str, name: &str, path: &str, content: &str) {
        let mut state = self.lock();
        let repo_ref = RepoRef::new(owner, name);
        let Some(repo) = state.repos.get(&repo_ref) else {
            return;
        };
        let branch = repo.default_branch.clone();
        let Some(head) = repo.branches.get(&branch).cloned() else {
            return;
        };
        let mut tree = state.commits.get(&head).cloned().unwrap_or_default();
        let id = content_id(content.as_bytes());
        state.blobs.insert(id.clone(), content.as_bytes().to_vec());
        tree.insert(path.to_string(), id);
        let commit = state.new_commit(tree);
        if let Some(repo) = state.repos.get_mut(&repo_ref) {
            repo.branches.insert(branch, commit);
        }
    }

    pub fn has_repo(&self, owner: &str, name: &str) -> bool {
        self.lock().repos.contains_key(&RepoRef::new(owner, name))
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.lock().log.clone()
    }

    pub fn repository_calls(&self) -> usize {
        self.lock().repository_calls
    }

    pub fn max_concurrent_blob_reads(&self) -> usize {
        self.gauge.max.load(Ordering::SeqCst)
    }

    fn require_user(&self) -> Result<&str, HostError> {
        self.user.as_deref().ok_or(HostError::Unauthenticated)
    }
}

impl State {
    fn new_commit(&mut self, tree: BTreeMap<String, ContentId>) -> ContentId {
        self.next_commit += 1;
        let id = content_id(format!("commit {}", self.next_commit).as_bytes());
        self.commits.insert(id.clone(), tree);
        id
    }

    fn repo(&self, repo: &RepoRef) -> Result<&RepoState, HostError> {
        self.repos.get(repo).ok_or_else(|| HostError::NotFound {
            what: format!("repository {repo}"),
        })
    }

    fn file_id(&self, repo: &RepoRef, branch: Option<&str>, path: &str) -> Option<ContentId> {
        let state = self.repos.get(repo)?;
        let branch = branch.unwrap_or(&state.default_branch);
        let head = state.branches.get(branch)?;
        self.commits.get(head)?.get(path).cloned()
    }

    fn can_write(&self, repo: &RepoRef, user: &str) -> bool {
        repo.owner == user
            || self
                .repos
                .get(repo)
                .is_some_and(|state| state.collaborators.contains(user))
    }
}

#[async_trait]
impl RemoteHost for MemoryHost {
    async fn resolve_revision(&self, repo: &RepoRef, rev: &str) -> Result<ContentId, HostError> {
        let state = self.lock();
        let repo_state = state.repo(repo)?;
        if let Some(head) = repo_state.branches.get(rev) {
            return Ok(head.clone());
        }
        let id = ContentId::from(rev);
        if state.commits.contains_key(&id) {
            return Ok(id);
        }
        Err(HostError::NotFound {
            what: format!("revision {rev}"),
        })
    }

    async fn recursive_tree(
        &self,
        repo: &RepoRef,
        tree: &ContentId,
    ) -> Result<RawTree, HostError> {
        let state = self.lock();
        state.repo(repo)?;
        let files = state.commits.get(tree).ok_or_else(|| HostError::NotFound {
            what: format!("tree {tree}"),
        })?;
        let mut entries: Vec<RawTreeEntry> = files
            .iter()
            .map(|(path, id)| RawTreeEntry {
                path: Some(path.clone()),
                sha: Some(id.to_string()),
                size: state.blobs.get(id).map(|data| data.len() as u64),
                kind: Some("blob".to_string()),
            })
            .collect();
        entries.extend(state.extra_entries.iter().cloned());
        Ok(RawTree {
            entries,
            truncated: state.truncated,
        })
    }

    async fn blob(&self, repo: &RepoRef, blob: &ContentId) -> Result<RawBlob, HostError> {
        let _guard = GaugeGuard::enter(&self.gauge);
        if let Some(latency) = self.blob_latency {
            tokio::time::sleep(latency).await;
        }
        let state = self.lock();
        state.repo(repo)?;
        if state.failing_blobs.contains(blob) {
            return Err(HostError::Transport {
                reason: format!("connection reset reading {blob}"),
            });
        }
        let data = state.blobs.get(blob).ok_or_else(|| HostError::NotFound {
            what: format!("blob {blob}"),
        })?;
        let encoded = STANDARD.encode(data);
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(RawBlob {
            content: wrapped,
            encoding: "base64".to_string(),
        })
    }

    async fn current_user(&self) -> Result<String, HostError> {
        self.require_user().map(str::to_string)
    }

    async fn is_collaborator(&self, repo: &RepoRef, user: &str) -> Result<bool, HostError> {
        let state = self.lock();
        state.repo(repo)?;
        Ok(state.can_write(repo, user))
    }

    async fn create_fork(&self, repo: &RepoRef) -> Result<RepoRef, HostError> {
        let user = self.require_user()?.to_string();
        let mut state = self.lock();
        let source = state.repo(repo)?.clone();
        let fork = RepoRef::new(&user, &repo.name);
        if !state.repos.contains_key(&fork) {
            let delay = state.fork_delay;
            state.repos.insert(
                fork.clone(),
                RepoState {
                    collaborators: BTreeSet::new(),
                    hidden_polls: delay,
                    ..source
                },
            );
        }
        Ok(fork)
    }

    async fn repository(&self, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        let mut state = self.lock();
        state.repository_calls += 1;
        let repo_state = state.repos.get_mut(repo).ok_or_else(|| HostError::NotFound {
            what: format!("repository {repo}"),
        })?;
        if repo_state.hidden_polls > 0 {
            repo_state.hidden_polls -= 1;
            return Err(HostError::NotFound {
                what: format!("repository {repo}"),
            });
        }
        Ok(RepoInfo {
            repo: repo.clone(),
            default_branch: repo_state.default_branch.clone(),
        })
    }

    async fn branch_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<ContentId>, HostError> {
        let state = self.lock();
        Ok(state.repo(repo)?.branches.get(branch).cloned())
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        at: &ContentId,
    ) -> Result<(), HostError> {
        let user = self.require_user()?.to_string();
        let mut state = self.lock();
        if !state.can_write(repo, &user) {
            return Err(HostError::PermissionDenied {
                reason: format!("{user} cannot push to {repo}"),
            });
        }
        if !state.commits.contains_key(at) {
            return Err(HostError::NotFound {
                what: format!("commit {at}"),
            });
        }
        let repo_state = state.repos.get_mut(repo).ok_or_else(|| HostError::NotFound {
            what: format!("repository {repo}"),
        })?;
        if repo_state.branches.contains_key(branch) {
            return Err(HostError::Conflict {
                path: format!("refs/heads/{branch}"),
            });
        }
        repo_state.branches.insert(branch.to_string(), at.clone());
        Ok(())
    }

    async fn update_file(
        &self,
        repo: &RepoRef,
        update: FileUpdate,
    ) -> Result<ContentId, HostError> {
        let user = self.require_user()?.to_string();
        let mut state = self.lock();
        if !state.can_write(repo, &user) {
            return Err(HostError::PermissionDenied {
                reason: format!("{user} cannot push to {repo}"),
            });
        }
        if state.failing_updates.contains(&update.path) {
            return Err(HostError::Transport {
                reason: format!("write of {} rejected", update.path),
            });
        }
        let head = state
            .repo(repo)?
            .branches
            .get(&update.branch)
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                what: format!("branch {}", update.branch),
            })?;
        let mut tree = state.commits.get(&head).cloned().unwrap_or_default();
        if tree.get(&update.path) != Some(&update.expected_blob) {
            return Err(HostError::Conflict { path: update.path });
        }
        let id = content_id(&update.content);
        state.blobs.insert(id.clone(), update.content);
        tree.insert(update.path.clone(), id);
        let commit = state.new_commit(tree);
        if let Some(repo_state) = state.repos.get_mut(repo) {
            repo_state.branches.insert(update.branch.clone(), commit.clone());
        }
        state.log.push(CommitRecord {
            repo: repo.clone(),
            branch: update.branch,
            path: update.path,
            message: update.message,
            author: update.author.name,
            commit: commit.clone(),
        });
        Ok(commit)
    }
}

/// Provider over a [`MemoryHost`]: scans anonymously and accepts any code
/// registered with [`MemoryProvider::with_code`].
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    host: MemoryHost,
    codes: HashMap<String, String>,
}

impl MemoryProvider {
    pub fn new(host: MemoryHost) -> Self {
        Self {
            host,
            codes: HashMap::new(),
        }
    }

    /// Makes `code` authorize as `user`.
    pub fn with_code(mut self, code: &str, user: &str) -> Self {
        self.codes.insert(code.to_string(), user.to_string());
        self
    }
}

#[async_trait]
impl HostProvider for MemoryProvider {
    fn scanning_host(&self) -> Arc<dyn RemoteHost> {
        Arc::new(self.host.clone())
    }

    fn authorize_url(&self, state: &SessionKey) -> String {
        format!("https://auth.invalid/authorize?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<Arc<dyn RemoteHost>, HostError> {
        let user = self.codes.get(code).ok_or(HostError::Unauthenticated)?;
        Ok(Arc::new(self.host.acting_as(user)))
    }
}

/// Formatter whose canonical form strips trailing spaces. Lines starting
/// with `#syntax:` are syntax errors; a line `#fail` fails outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerFormatter;

impl SourceFormatter for MarkerFormatter {
    fn format(&self, _path: &str, src: &[u8]) -> Result<Vec<u8>, FormatError> {
        let text = String::from_utf8_lossy(src);
        let mut issues = Vec::new();
        let mut out = String::with_capacity(text.len());
        for (idx, line) in text.lines().enumerate() {
            if line.trim() == "#fail" {
                return Err(FormatError::Failed("formatter crashed".to_string()));
            }
            if let Some(message) = line.strip_prefix("#syntax:") {
                issues.push(SyntaxIssue {
                    line: idx as u32 + 1,
                    message: message.trim().to_string(),
                });
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        if !issues.is_empty() {
            return Err(FormatError::Syntax(issues));
        }
        Ok(out.into_bytes())
    }
}

/// Linter reporting `LINT` lines at confidence 1.0 and `MAYBE` lines at 0.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedLinter;

impl AdvisoryLinter for ScriptedLinter {
    fn lint(&self, _path: &str, src: &[u8]) -> Result<Vec<Advisory>, AnalyzerError> {
        let text = String::from_utf8_lossy(src);
        Ok(text
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let line_no = idx as u32 + 1;
                let message = line.trim().to_string();
                if line.starts_with("LINT ") {
                    Some(Advisory {
                        line: line_no,
                        confidence: 1.0,
                        message,
                    })
                } else if line.starts_with("MAYBE ") {
                    Some(Advisory {
                        line: line_no,
                        confidence: 0.5,
                        message,
                    })
                } else {
                    None
                }
            })
            .collect())
    }
}

/// Vet checker reporting each `VET <message>` line.
#[derive(Debug, Default)]
pub struct ScriptedVet {
    available: bool,
    calls: AtomicUsize,
}

impl ScriptedVet {
    pub fn available() -> Self {
        Self {
            available: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VetChecker for ScriptedVet {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn check(&self, _path: &str, src: &[u8]) -> Result<Vec<Diagnostic>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(src);
        Ok(text
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                line.strip_prefix("VET ").map(|message| Diagnostic {
                    line: idx as u32 + 1,
                    message: message.to_string(),
                })
            })
            .collect())
    }
}
