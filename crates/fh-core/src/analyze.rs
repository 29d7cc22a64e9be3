use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// One syntax error location reported by a formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: u32,
    pub message: String,
}

/// A formatter failure. Single errors and error lists both arrive as
/// `Syntax` so callers never special-case the shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<SyntaxIssue>),
    #[error("formatter failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub line: u32,
    pub confidence: f64,
    pub message: String,
}

/// A diagnostic from the vet-style checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analyzer failed: {0}")]
    Failed(String),
}

pub trait SourceFormatter: Send + Sync {
    /// Canonical form of `src`.
    fn format(&self, path: &str, src: &[u8]) -> Result<Vec<u8>, FormatError>;
}

pub trait AdvisoryLinter: Send + Sync {
    /// All advisories with their confidence; filtering is the caller's job.
    fn lint(&self, path: &str, src: &[u8]) -> Result<Vec<Advisory>, AnalyzerError>;
}

#[async_trait]
pub trait VetChecker: Send + Sync {
    /// Checked once per scan; an unavailable checker is skipped for the
    /// whole scan.
    fn is_available(&self) -> bool;

    async fn check(&self, path: &str, src: &[u8]) -> Result<Vec<Diagnostic>, AnalyzerError>;
}

/// The analyzer chain applied to every eligible file.
#[derive(Clone)]
pub struct Analyzers {
    pub formatter: Arc<dyn SourceFormatter>,
    pub linter: Arc<dyn AdvisoryLinter>,
    pub vet: Option<Arc<dyn VetChecker>>,
}

impl Analyzers {
    pub fn new(formatter: Arc<dyn SourceFormatter>, linter: Arc<dyn AdvisoryLinter>) -> Self {
        Self {
            formatter,
            linter,
            vet: None,
        }
    }

    pub fn with_vet(mut self, vet: Arc<dyn VetChecker>) -> Self {
        self.vet = Some(vet);
        self
    }
}
