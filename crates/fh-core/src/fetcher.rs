use crate::error::HostError;
use crate::host::RemoteHost;
use crate::types::{ContentId, RawBlob, RepoRef, TreeEntry};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tracing::debug;

/// Reads revisions, trees and blobs of one repository.
#[derive(Clone)]
pub struct ContentFetcher {
    host: Arc<dyn RemoteHost>,
    repo: RepoRef,
}

impl ContentFetcher {
    pub fn new(host: Arc<dyn RemoteHost>, repo: RepoRef) -> Self {
        Self { host, repo }
    }

    pub async fn resolve(&self, rev: &str) -> Result<ContentId, HostError> {
        self.host
            .resolve_revision(&self.repo, rev)
            .await
            .map_err(|err| err.context(format!("revision {rev:?} of {}", self.repo)))
    }

    /// Full recursive listing of files. Malformed entries and non-blob
    /// entries (directories, submodules) are dropped.
    pub async fn list_tree(&self, tree: &ContentId) -> Result<Vec<TreeEntry>, HostError> {
        let raw = self
            .host
            .recursive_tree(&self.repo, tree)
            .await
            .map_err(|err| err.context(format!("tree {tree} of {}", self.repo)))?;
        if raw.truncated {
            return Err(HostError::Incomplete {
                tree: format!("{tree} of {}", self.repo),
            });
        }

        let total = raw.entries.len();
        let entries: Vec<TreeEntry> = raw
            .entries
            .into_iter()
            .filter(|entry| entry.kind.as_deref().is_none_or(|kind| kind == "blob"))
            .filter_map(|entry| match (entry.path, entry.sha, entry.size) {
                (Some(path), Some(sha), Some(size)) => Some(TreeEntry {
                    path,
                    content_id: ContentId::new(sha),
                    size_bytes: size,
                }),
                _ => None,
            })
            .collect();
        debug!(
            repo = %self.repo,
            %tree,
            total,
            files = entries.len(),
            "listed tree"
        );
        Ok(entries)
    }

    pub async fn read_blob(&self, blob: &ContentId) -> Result<Vec<u8>, HostError> {
        let raw = self
            .host
            .blob(&self.repo, blob)
            .await
            .map_err(|err| err.context(format!("blob {blob} of {}", self.repo)))?;
        decode_blob(raw, blob)
    }
}

fn decode_blob(raw: RawBlob, blob: &ContentId) -> Result<Vec<u8>, HostError> {
    match raw.encoding.as_str() {
        "base64" => {
            // The host wraps base64 payloads at 60 columns.
            let compact: String = raw
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD.decode(compact).map_err(|err| HostError::Transport {
                reason: format!("decoding blob {blob}: {err}"),
            })
        }
        other => Err(HostError::Encoding {
            encoding: other.to_string(),
            what: format!("blob {blob}"),
        }),
    }
}
