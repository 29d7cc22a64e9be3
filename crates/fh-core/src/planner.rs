use crate::analyze::{FormatError, SourceFormatter};
use crate::error::{FixError, FixhubError};
use crate::fetcher::ContentFetcher;
use crate::types::{Finding, FindingKind};
use std::sync::Arc;

/// Replacement content for one file, with the bytes it was computed from
/// and the finding it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    pub finding: Finding,
    pub original_bytes: Vec<u8>,
    pub replacement_bytes: Vec<u8>,
}

/// Turns fixable findings into file replacements.
#[derive(Clone)]
pub struct FixPlanner {
    fetcher: ContentFetcher,
    formatter: Arc<dyn SourceFormatter>,
}

impl FixPlanner {
    pub fn new(fetcher: ContentFetcher, formatter: Arc<dyn SourceFormatter>) -> Self {
        Self { fetcher, formatter }
    }

    pub async fn plan(&self, finding: &Finding) -> Result<Fix, FixhubError> {
        if !finding.fixable {
            return Err(not_fixable(finding).into());
        }
        match finding.kind {
            FindingKind::Format => self.plan_format(finding).await,
            FindingKind::Advisory | FindingKind::VetIssue | FindingKind::SyntaxError => {
                Err(FixError::UnsupportedKind { kind: finding.kind }.into())
            }
        }
    }

    async fn plan_format(&self, finding: &Finding) -> Result<Fix, FixhubError> {
        let blob = finding.blob_id.as_ref().ok_or_else(|| not_fixable(finding))?;
        let src = self.fetcher.read_blob(blob).await?;
        let replacement_bytes = self
            .formatter
            .format(&finding.file_path, &src)
            .map_err(|err| FixError::Unformattable {
                path: finding.file_path.clone(),
                reason: match err {
                    FormatError::Syntax(issues) => issues
                        .iter()
                        .map(|issue| format!("line {}: {}", issue.line, issue.message))
                        .collect::<Vec<_>>()
                        .join("; "),
                    FormatError::Failed(reason) => reason,
                },
            })?;
        Ok(Fix {
            finding: finding.clone(),
            original_bytes: src,
            replacement_bytes,
        })
    }
}

fn not_fixable(finding: &Finding) -> FixError {
    FixError::NotFixable {
        path: finding.file_path.clone(),
        message: finding.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::testing::{MarkerFormatter, MemoryHost};
    use crate::types::{ContentId, RepoRef};

    fn planner(host: &MemoryHost) -> FixPlanner {
        let fetcher = ContentFetcher::new(Arc::new(host.clone()), RepoRef::new("faker", "proj"));
        FixPlanner::new(fetcher, Arc::new(MarkerFormatter))
    }

    #[tokio::test]
    async fn test_format_finding_plans_formatted_content() {
        let host = MemoryHost::new();
        host.add_repo("faker", "proj", &[("a.go", "package a   \n")]);
        let blob = host.blob_id("faker", "proj", "a.go").unwrap();
        let fix = planner(&host)
            .plan(&Finding::format("a.go", blob))
            .await
            .unwrap();
        assert_eq!(fix.original_bytes, b"package a   \n");
        assert_eq!(fix.replacement_bytes, b"package a\n");
        assert_eq!(fix.finding.file_path, "a.go");
    }

    #[tokio::test]
    async fn test_unfixable_finding_is_rejected_first() {
        let host = MemoryHost::new();
        let finding = Finding::unfixable(FindingKind::Format, "a.go", 0, "x".to_string());
        let err = planner(&host).plan(&finding).await.unwrap_err();
        assert!(matches!(err, FixhubError::Fix(FixError::NotFixable { .. })));
    }

    #[tokio::test]
    async fn test_fixable_advisory_is_unsupported() {
        let host = MemoryHost::new();
        let mut finding =
            Finding::unfixable(FindingKind::Advisory, "a.go", 3, "rename".to_string());
        finding.fixable = true;
        let err = planner(&host).plan(&finding).await.unwrap_err();
        assert!(matches!(
            err,
            FixhubError::Fix(FixError::UnsupportedKind {
                kind: FindingKind::Advisory
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_blob_surfaces_host_error() {
        let host = MemoryHost::new();
        host.add_repo("faker", "proj", &[("a.go", "package a\n")]);
        let err = planner(&host)
            .plan(&Finding::format("a.go", ContentId::from("gone")))
            .await
            .unwrap_err();
        assert!(matches!(err, FixhubError::Host(HostError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_blob_that_no_longer_parses_is_unformattable() {
        let host = MemoryHost::new();
        host.add_repo("faker", "proj", &[("a.go", "package a\n#syntax: broken\n")]);
        let blob = host.blob_id("faker", "proj", "a.go").unwrap();
        let err = planner(&host)
            .plan(&Finding::format("a.go", blob))
            .await
            .unwrap_err();
        match err {
            FixhubError::Fix(FixError::Unformattable { path, reason }) => {
                assert_eq!(path, "a.go");
                assert!(reason.contains("line 2"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
