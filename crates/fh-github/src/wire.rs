//! JSON shapes of the GitHub REST v3 endpoints used here.

use chrono::{DateTime, Utc};
use fh_core::types::{RawBlob, RawTree, RawTreeEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct TreeEntry {
    pub path: Option<String>,
    pub sha: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

impl From<Tree> for RawTree {
    fn from(tree: Tree) -> Self {
        Self {
            entries: tree
                .tree
                .into_iter()
                .map(|entry| RawTreeEntry {
                    path: entry.path,
                    sha: entry.sha,
                    size: entry.size,
                    kind: entry.kind,
                })
                .collect(),
            truncated: tree.truncated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Blob {
    pub content: String,
    pub encoding: String,
}

impl From<Blob> for RawBlob {
    fn from(blob: Blob) -> Self {
        Self {
            content: blob.content,
            encoding: blob.encoding,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: User,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct Reference {
    pub object: GitObject,
}

#[derive(Debug, Serialize)]
pub struct CreateReference<'a> {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CommitAuthor<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdateContents<'a> {
    pub message: &'a str,
    pub content: String,
    pub sha: &'a str,
    pub branch: &'a str,
    pub author: CommitAuthor<'a>,
    pub committer: CommitAuthor<'a>,
}

#[derive(Debug, Deserialize)]
pub struct ContentsCommit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentsResponse {
    pub commit: ContentsCommit,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
