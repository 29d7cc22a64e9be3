use crate::client::GithubHost;
use crate::oauth::OauthApp;
use async_trait::async_trait;
use fh_core::config::FixhubConfig;
use fh_core::error::HostError;
use fh_core::host::{HostProvider, RemoteHost};
use fh_core::types::{Credential, SessionKey};
use std::sync::Arc;
use tracing::info;

/// Scans with the server's own token and commits with the token each user
/// grants through the OAuth redirect.
pub struct GithubProvider {
    scanner: Arc<GithubHost>,
    oauth: OauthApp,
    api_url: String,
    user_agent: String,
}

impl GithubProvider {
    pub fn new(config: &FixhubConfig, token: Option<Credential>) -> Result<Self, HostError> {
        let github = &config.github;
        if token.is_none() {
            info!("no scanning token, using anonymous rate limits");
        }
        let scanner = GithubHost::new(&github.api_url, &github.user_agent, token.as_ref())?;
        Ok(Self {
            scanner: Arc::new(scanner),
            oauth: OauthApp::new(&config.oauth, &config.server, &github.user_agent)?,
            api_url: github.api_url.clone(),
            user_agent: github.user_agent.clone(),
        })
    }
}

#[async_trait]
impl HostProvider for GithubProvider {
    fn scanning_host(&self) -> Arc<dyn RemoteHost> {
        self.scanner.clone()
    }

    fn authorize_url(&self, state: &SessionKey) -> String {
        self.oauth.authorize_url(state)
    }

    async fn exchange_code(&self, code: &str) -> Result<Arc<dyn RemoteHost>, HostError> {
        let credential = self.oauth.exchange(code).await?;
        let host = GithubHost::new(&self.api_url, &self.user_agent, Some(&credential))?;
        Ok(Arc::new(host))
    }
}
