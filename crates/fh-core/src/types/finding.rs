use crate::types::ids::ContentId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FindingKind {
    Format,
    Advisory,
    VetIssue,
    SyntaxError,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "gofmt",
            Self::Advisory => "lint",
            Self::VetIssue => "vet",
            Self::SyntaxError => "syntax",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected problem in one file.
///
/// `line` is 1-based; 0 means the finding applies to the whole file.
/// `blob_id` is set exactly when the finding is fixable, so the original
/// bytes can be fetched again at fix time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub file_path: String,
    pub blob_id: Option<ContentId>,
    pub line: u32,
    pub message: String,
    pub fixable: bool,
}

impl Finding {
    pub fn format(file_path: &str, blob_id: ContentId) -> Self {
        Self {
            kind: FindingKind::Format,
            file_path: file_path.to_string(),
            blob_id: Some(blob_id),
            line: 0,
            message: "This file needs formatting with gofmt.".to_string(),
            fixable: true,
        }
    }

    pub fn unfixable(kind: FindingKind, file_path: &str, line: u32, message: String) -> Self {
        Self {
            kind,
            file_path: file_path.to_string(),
            blob_id: None,
            line,
            message,
            fixable: false,
        }
    }

    /// Total order used for presentation: path, line, message. Kind and
    /// blob id only break ties so the result never depends on arrival order.
    pub fn presentation_cmp(&self, other: &Self) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then(self.line.cmp(&other.line))
            .then_with(|| self.message.cmp(&other.message))
            .then(self.kind.cmp(&other.kind))
            .then_with(|| self.blob_id.cmp(&other.blob_id))
            .then(self.fixable.cmp(&other.fixable))
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file_path, self.line, self.message)
    }
}

/// Findings in presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingSet(Vec<Finding>);

impl FindingSet {
    pub fn from_unsorted(mut findings: Vec<Finding>) -> Self {
        findings.sort_by(Finding::presentation_cmp);
        Self(findings)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Finding] {
        &self.0
    }

    pub fn fixable(&self) -> impl Iterator<Item = &Finding> {
        self.0.iter().filter(|finding| finding.fixable)
    }
}

impl<'a> IntoIterator for &'a FindingSet {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
