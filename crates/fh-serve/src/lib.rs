pub mod html;
pub mod middleware;
pub mod routes;

use axum::Router;
use fh_core::analyze::Analyzers;
use fh_core::error::SessionError;
use fh_core::host::HostProvider;
use fh_core::scan::Scanner;
use fh_core::FixhubConfig;
use fh_core::sessions::{SWEEP_INTERVAL, SessionStore};
use fh_core::types::{Finding, NewSession, RepoRef, SessionKey};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FixhubConfig>,
    pub provider: Arc<dyn HostProvider>,
    pub sessions: Arc<SessionStore>,
    pub analyzers: Analyzers,
}

impl AppState {
    pub fn new(
        config: FixhubConfig,
        provider: Arc<dyn HostProvider>,
        analyzers: Analyzers,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            sessions: Arc::new(SessionStore::new()),
            analyzers,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Parks the fixable subset of `findings` for the authorization round
    /// trip. `None` when nothing in the selection is fixable.
    pub fn open_session(
        &self,
        repo: &RepoRef,
        findings: impl IntoIterator<Item = Finding>,
    ) -> Result<Option<SessionKey>, SessionError> {
        let findings: Vec<Finding> = findings.into_iter().filter(|f| f.fixable).collect();
        if findings.is_empty() {
            return Ok(None);
        }
        let count = findings.len();
        let key = self.sessions.put(NewSession {
            repo: repo.clone(),
            findings,
        })?;
        debug!(%key, %repo, count, "session opened");
        Ok(Some(key))
    }

    /// Where a fix link for `key` points: the confirmation page, or the
    /// authorization redirect directly when the user opted out of it.
    pub fn fix_link(&self, key: &SessionKey, skip_confirm: bool) -> String {
        if skip_confirm {
            self.provider.authorize_url(key)
        } else {
            format!("/confirm?state={key}")
        }
    }

    /// A scanner acting with the server's own credential.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.provider.scanning_host(), self.analyzers.clone())
            .with_options(self.config.scan.options())
    }
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

/// Serves until ctrl-c. The session sweep runs for exactly as long as the
/// listener does.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let sweeper = state.sessions.spawn_sweeper(SWEEP_INTERVAL);
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "fixhub listening");
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.stop().await;
    info!("fixhub stopped");
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
