pub mod finding;
pub mod ids;
pub mod repo;
pub mod session;
pub mod tree;

pub use finding::{Finding, FindingKind, FindingSet};
pub use ids::{ContentId, IdError, SessionKey};
pub use repo::{Credential, RepoInfo, RepoRef, WorkingTarget};
pub use session::{NewSession, Session};
pub use tree::{RawBlob, RawTree, RawTreeEntry, TreeEntry};
