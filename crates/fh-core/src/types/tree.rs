use crate::types::ids::ContentId;
use serde::{Deserialize, Serialize};

/// One file of a resolved tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub content_id: ContentId,
    pub size_bytes: u64,
}

/// Raw entry as reported by the host; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTreeEntry {
    pub path: Option<String>,
    pub sha: Option<String>,
    pub size: Option<u64>,
    /// `blob`, `tree`, or `commit` (submodule).
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTree {
    pub entries: Vec<RawTreeEntry>,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlob {
    pub content: String,
    pub encoding: String,
}
