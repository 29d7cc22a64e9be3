//! Go analyzers: syntax checking, canonical formatting, style advisories
//! and an external vet runner.

pub mod advisory;
pub mod format;
pub mod parse;
pub mod vet;

pub use crate::advisory::GoLinter;
pub use crate::format::GoFormatter;
pub use crate::vet::GoVet;

use fh_core::analyze::Analyzers;
use fh_core::config::ScanConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The full Go analyzer chain for `config`. A vet command that cannot be
/// parsed leaves vet out rather than failing.
pub fn go_analyzers(config: &ScanConfig) -> Analyzers {
    let analyzers = Analyzers::new(Arc::new(GoFormatter), Arc::new(GoLinter));
    match GoVet::from_command(&config.vet_command) {
        Ok(vet) => analyzers.with_vet(Arc::new(
            vet.with_timeout(Duration::from_secs(config.vet_timeout_secs))
                .with_scratch_root(config.scratch_dir.clone()),
        )),
        Err(err) => {
            warn!(error = %err, "vet disabled");
            analyzers
        }
    }
}
