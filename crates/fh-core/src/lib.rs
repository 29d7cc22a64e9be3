pub mod aggregate;
pub mod analyze;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod host;
pub mod planner;
pub mod scan;
pub mod sessions;
pub mod workflow;

pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use crate::config::FixhubConfig;
pub use crate::error::FixhubError;
pub use crate::host::{HostProvider, RemoteHost};
pub use crate::scan::{ScanOptions, ScanReport, Scanner};
pub use crate::sessions::SessionStore;
pub use crate::workflow::{FixReport, FixWorkflow, WorkflowOptions};
