//! GitHub REST v3 backend for the repository host and the OAuth web flow.

pub mod client;
pub mod oauth;
pub mod provider;
pub mod wire;

pub use client::GithubHost;
pub use oauth::OauthApp;
pub use provider::GithubProvider;
