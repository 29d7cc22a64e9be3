use crate::wire::TokenResponse;
use fh_core::config::{OauthConfig, ServerConfig};
use fh_core::error::HostError;
use fh_core::types::{Credential, SessionKey};
use reqwest::Url;
use reqwest::header::ACCEPT;
use tracing::warn;

/// Path the authorization server redirects back to.
pub const CALLBACK_PATH: &str = "/oauthback";

/// Web-flow OAuth application: builds the authorize redirect and trades
/// the returned code for a user token.
#[derive(Debug, Clone)]
pub struct OauthApp {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    redirect_uri: String,
    scope: String,
}

impl OauthApp {
    pub fn new(
        oauth: &OauthConfig,
        server: &ServerConfig,
        user_agent: &str,
    ) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(HostError::transport)?;
        Ok(Self {
            client,
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            authorize_url: oauth.authorize_url.clone(),
            token_url: oauth.token_url.clone(),
            redirect_uri: format!("{}{CALLBACK_PATH}", server.public_url.trim_end_matches('/')),
            scope: oauth.scope.clone(),
        })
    }

    pub fn authorize_url(&self, state: &SessionKey) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope.as_str()),
            ("state", state.as_str()),
        ];
        match Url::parse_with_params(&self.authorize_url, &params) {
            Ok(url) => url.into(),
            Err(err) => {
                warn!(url = %self.authorize_url, error = %err, "bad authorize url");
                self.authorize_url.clone()
            }
        }
    }

    /// Any failure to obtain a token reads as [`HostError::Unauthenticated`];
    /// the reason is only logged.
    pub async fn exchange(&self, code: &str) -> Result<Credential, HostError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "token exchange failed");
                HostError::Unauthenticated
            })?;
        let token: TokenResponse = response.json().await.map_err(|err| {
            warn!(error = %err, "token response unreadable");
            HostError::Unauthenticated
        })?;
        match token.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Credential::new(access_token)),
            _ => {
                warn!(
                    error = token.error.as_deref().unwrap_or("none"),
                    description = token.error_description.as_deref().unwrap_or(""),
                    "token exchange refused"
                );
                Err(HostError::Unauthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_carries_state_and_redirect() {
        let oauth = OauthConfig {
            client_id: "cid".to_string(),
            ..OauthConfig::default()
        };
        let server = ServerConfig {
            port: 6061,
            public_url: "https://fixhub.example/".to_string(),
        };
        let app = OauthApp::new(&oauth, &server, "fixhub-test").unwrap();
        let key = SessionKey::generate();
        let url = Url::parse(&app.authorize_url(&key)).unwrap();
        assert_eq!(url.path(), "/login/oauth/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "cid".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://fixhub.example/oauthback".to_string()
        )));
        assert!(pairs.contains(&("scope".to_string(), "public_repo".to_string())));
        assert!(pairs.contains(&("state".to_string(), key.to_string())));
    }
}
