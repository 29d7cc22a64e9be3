use crate::types::finding::Finding;
use crate::types::ids::SessionKey;
use crate::types::repo::RepoRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's selection of fixable findings, parked between presentation and
/// the authorization callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub repo: RepoRef,
    pub findings: Vec<Finding>,
    pub created_at: DateTime<Utc>,
}

/// What a caller hands to the store; the store assigns key and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub repo: RepoRef,
    pub findings: Vec<Finding>,
}
