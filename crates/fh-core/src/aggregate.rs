use crate::types::{Finding, FindingSet};
use std::sync::{Mutex, PoisonError};

/// Collects findings from concurrent scan tasks.
///
/// The lock is held only for the append itself, never across I/O.
#[derive(Debug, Default)]
pub struct Aggregator {
    findings: Mutex<Vec<Finding>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, finding: Finding) {
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(finding);
    }

    pub fn extend(&self, findings: impl IntoIterator<Item = Finding>) {
        let findings: Vec<Finding> = findings.into_iter().collect();
        if findings.is_empty() {
            return;
        }
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(findings);
    }

    pub fn len(&self) -> usize {
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of everything appended so far. Calling it again
    /// yields the same sequence.
    pub fn finalize(&self) -> FindingSet {
        let snapshot = self
            .findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        FindingSet::from_unsorted(snapshot)
    }
}
