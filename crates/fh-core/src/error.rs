use crate::types::FindingKind;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("not found: {what}")]
    NotFound { what: String },
    #[error("transport error: {reason}")]
    Transport { reason: String },
    #[error("unknown content encoding {encoding:?} for {what}")]
    Encoding { encoding: String, what: String },
    #[error("incomplete tree listing for {tree}")]
    Incomplete { tree: String },
    #[error("no credential for the remote host")]
    Unauthenticated,
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("content guard rejected write to {path}")]
    Conflict { path: String },
}

impl HostError {
    /// Prefixes the message with what the caller was doing. The kind is kept.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        match self {
            Self::NotFound { what } => Self::NotFound {
                what: format!("{ctx}: {what}"),
            },
            Self::Transport { reason } => Self::Transport {
                reason: format!("{ctx}: {reason}"),
            },
            Self::PermissionDenied { reason } => Self::PermissionDenied {
                reason: format!("{ctx}: {reason}"),
            },
            other => other,
        }
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no such session: {key:?}")]
    NotFound { key: String },
    #[error("could not draw an unused session key after {attempts} attempts")]
    KeyCollision { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum FixError {
    #[error("problem {message:?} in {path} is not fixable")]
    NotFixable { path: String, message: String },
    #[error("do not know how to fix {kind} problems")]
    UnsupportedKind { kind: FindingKind },
    #[error("cannot reformat {path}: {reason}")]
    Unformattable { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("authorization required")]
    AuthRequired,
    #[error("no write access to {repo}")]
    NoWriteAccess { repo: String },
    #[error("commit of {path} failed after {} successful commits: {source}", .committed.len())]
    CommitAborted {
        path: String,
        committed: Vec<String>,
        #[source]
        source: Box<FixhubError>,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("parsing {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("{path} is too accessible; run `chmod go= {path}` to fix")]
    InsecureTokenFile { path: String },
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FixhubError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fix(#[from] FixError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
