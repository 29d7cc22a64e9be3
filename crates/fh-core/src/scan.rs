use crate::aggregate::Aggregator;
use crate::analyze::{Analyzers, FormatError, VetChecker};
use crate::error::HostError;
use crate::fetcher::ContentFetcher;
use crate::host::RemoteHost;
use crate::types::{ContentId, Finding, FindingKind, FindingSet, RepoRef, TreeEntry};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const DEFAULT_PARALLELISM: usize = 10;
pub const DEFAULT_SIZE_LIMIT: u64 = 1 << 20;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Most files fetched and analyzed at once.
    pub parallelism: usize,
    pub size_limit: u64,
    pub source_suffix: String,
    pub generated_suffix: String,
    pub min_confidence: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            size_limit: DEFAULT_SIZE_LIMIT,
            source_suffix: ".go".to_string(),
            generated_suffix: ".pb.go".to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotSource,
    Generated,
    TooLarge,
}

impl ScanOptions {
    pub fn eligibility(&self, entry: &TreeEntry) -> Eligibility {
        if !entry.path.ends_with(&self.source_suffix) {
            return Eligibility::NotSource;
        }
        if entry.path.ends_with(&self.generated_suffix) {
            return Eligibility::Generated;
        }
        if entry.size_bytes > self.size_limit {
            return Eligibility::TooLarge;
        }
        Eligibility::Eligible
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub repo: RepoRef,
    pub revision: String,
    pub commit: ContentId,
    pub files_examined: usize,
    pub files_skipped: usize,
    pub findings: FindingSet,
}

/// Runs the analyzer chain over every eligible file of a revision.
#[derive(Clone)]
pub struct Scanner {
    host: Arc<dyn RemoteHost>,
    analyzers: Analyzers,
    options: ScanOptions,
}

struct FileContext {
    fetcher: ContentFetcher,
    analyzers: Analyzers,
    vet: Option<Arc<dyn VetChecker>>,
    min_confidence: f64,
}

impl Scanner {
    pub fn new(host: Arc<dyn RemoteHost>, analyzers: Analyzers) -> Self {
        Self {
            host,
            analyzers,
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Scans `rev` of `repo`. Returns once every admitted file task has
    /// finished. Per-file failures are logged and dropped.
    pub async fn check(&self, repo: &RepoRef, rev: &str) -> Result<ScanReport, HostError> {
        let fetcher = ContentFetcher::new(Arc::clone(&self.host), repo.clone());
        let commit = fetcher.resolve(rev).await?;
        info!(%repo, rev, %commit, "resolved revision");
        let entries = fetcher.list_tree(&commit).await?;

        let vet = self
            .analyzers
            .vet
            .as_ref()
            .filter(|vet| vet.is_available())
            .cloned();
        if self.analyzers.vet.is_some() && vet.is_none() {
            info!("vet checker unavailable, skipping vet for this scan");
        }

        let context = Arc::new(FileContext {
            fetcher,
            analyzers: self.analyzers.clone(),
            vet,
            min_confidence: self.options.min_confidence,
        });
        let gate = Arc::new(Semaphore::new(self.options.parallelism.max(1)));
        let aggregator = Arc::new(Aggregator::new());
        let mut tasks = JoinSet::new();
        let mut skipped = 0;

        for entry in entries {
            match self.options.eligibility(&entry) {
                Eligibility::Eligible => {}
                Eligibility::NotSource => continue,
                Eligibility::Generated => {
                    skipped += 1;
                    continue;
                }
                Eligibility::TooLarge => {
                    debug!(
                        path = %entry.path,
                        size = entry.size_bytes,
                        limit = self.options.size_limit,
                        "skipping file, too big"
                    );
                    skipped += 1;
                    continue;
                }
            }
            let context = Arc::clone(&context);
            let gate = Arc::clone(&gate);
            let aggregator = Arc::clone(&aggregator);
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return;
                };
                let findings = analyze_file(&context, &entry).await;
                aggregator.extend(findings);
            });
        }

        let examined = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "scan task did not complete");
            }
        }

        let findings = aggregator.finalize();
        info!(
            %repo,
            rev,
            problems = findings.len(),
            files = examined,
            skipped,
            "scan finished"
        );
        Ok(ScanReport {
            repo: repo.clone(),
            revision: rev.to_string(),
            commit,
            files_examined: examined,
            files_skipped: skipped,
            findings,
        })
    }
}

async fn analyze_file(context: &FileContext, entry: &TreeEntry) -> Vec<Finding> {
    let path = entry.path.as_str();
    let src = match context.fetcher.read_blob(&entry.content_id).await {
        Ok(src) => src,
        Err(err) => {
            debug!(path, error = %err, "dropping file, blob unavailable");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    match context.analyzers.formatter.format(path, &src) {
        Ok(formatted) => {
            if formatted != src {
                findings.push(Finding::format(path, entry.content_id.clone()));
            }
        }
        Err(FormatError::Syntax(issues)) => {
            findings.extend(issues.into_iter().map(|issue| {
                Finding::unfixable(FindingKind::SyntaxError, path, issue.line, issue.message)
            }));
            return findings;
        }
        Err(FormatError::Failed(message)) => {
            findings.push(Finding::unfixable(FindingKind::SyntaxError, path, 0, message));
            return findings;
        }
    }

    match context.analyzers.linter.lint(path, &src) {
        Ok(advisories) => findings.extend(
            advisories
                .into_iter()
                .filter(|advisory| advisory.confidence >= context.min_confidence)
                .map(|advisory| {
                    Finding::unfixable(FindingKind::Advisory, path, advisory.line, advisory.message)
                }),
        ),
        Err(err) => debug!(path, error = %err, "linter failed"),
    }

    if let Some(vet) = &context.vet {
        match vet.check(path, &src).await {
            Ok(diagnostics) => findings.extend(diagnostics.into_iter().map(|diagnostic| {
                Finding::unfixable(
                    FindingKind::VetIssue,
                    path,
                    diagnostic.line,
                    diagnostic.message,
                )
            })),
            Err(err) => debug!(path, error = %err, "vet failed"),
        }
    }

    findings
}
