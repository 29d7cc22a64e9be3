use crate::error::ConfigError;
use crate::scan::ScanOptions;
use crate::types::Credential;
use crate::workflow::{ForkPolling, WorkflowOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "FIXHUB_CONFIG";
const TOKEN_FILE_NAME: &str = ".fixhub-token";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub web_url: String,
    pub user_agent: String,
    /// Personal access token used for scanning. `~` expands to `$HOME`.
    pub token_file: Option<PathBuf>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            web_url: "https://github.com".to_string(),
            user_agent: "fixhub".to_string(),
            token_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub default_rev: String,
    pub parallelism: usize,
    pub size_limit: u64,
    pub source_suffix: String,
    pub generated_suffix: String,
    pub min_confidence: f64,
    pub vet_command: String,
    pub vet_timeout_secs: u64,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            default_rev: "master".to_string(),
            parallelism: options.parallelism,
            size_limit: options.size_limit,
            source_suffix: options.source_suffix,
            generated_suffix: options.generated_suffix,
            min_confidence: options.min_confidence,
            vet_command: "go vet".to_string(),
            vet_timeout_secs: 30,
            scratch_dir: None,
        }
    }
}

impl ScanConfig {
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            parallelism: self.parallelism,
            size_limit: self.size_limit,
            source_suffix: self.source_suffix.clone(),
            generated_suffix: self.generated_suffix.clone(),
            min_confidence: self.min_confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Externally visible base URL, used to build the OAuth redirect.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6061,
            public_url: "http://localhost:6061".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scope: String,
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            scope: "public_repo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub author_name: String,
    pub author_email: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        let options = WorkflowOptions::default();
        Self {
            author_name: options.author_name,
            author_email: options.author_email,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FixhubConfig {
    pub github: GithubConfig,
    pub scan: ScanConfig,
    pub server: ServerConfig,
    pub oauth: OauthConfig,
    pub commit: CommitConfig,
}

impl FixhubConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                });
            }
        };
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `path`, else `$FIXHUB_CONFIG`, else defaults, then applies
    /// the process environment.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("FIXHUB_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "FIXHUB_PORT".to_string(),
                reason: format!("{port:?} is not a port number"),
            })?;
        }
        if let Some(url) = lookup("FIXHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(id) = lookup("FIXHUB_OAUTH_CLIENT_ID") {
            self.oauth.client_id = id;
        }
        if let Some(secret) = lookup("FIXHUB_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = secret;
        }
        if let Some(path) = lookup("FIXHUB_TOKEN_FILE") {
            self.github.token_file = Some(PathBuf::from(path));
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                name: "scan.parallelism".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.scan.min_confidence) {
            return Err(ConfigError::InvalidValue {
                name: "scan.min_confidence".to_string(),
                reason: format!("{} is outside 0..=1", self.scan.min_confidence),
            });
        }
        Ok(())
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            web_base: self.github.web_url.clone(),
            author_name: self.commit.author_name.clone(),
            author_email: self.commit.author_email.clone(),
            fork_polling: ForkPolling::default(),
        }
    }

    /// Token file location with `~` expanded, if one can be determined.
    pub fn token_path(&self) -> Option<PathBuf> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        match &self.github.token_file {
            Some(path) => match path.strip_prefix("~") {
                Ok(rest) => home.map(|home| home.join(rest)),
                Err(_) => Some(path.clone()),
            },
            None => home.map(|home| home.join(TOKEN_FILE_NAME)),
        }
    }
}

/// Reads a personal access token. `Ok(None)` when the file does not exist.
/// Files readable by group or others are refused.
pub fn read_token_file(path: &Path) -> Result<Option<Credential>, ConfigError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o077 != 0 {
            return Err(ConfigError::InsecureTokenFile {
                path: path.display().to_string(),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let token = content.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(Credential::new(token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FixhubConfig::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.server.port, 6061);
        assert_eq!(config.scan.parallelism, 10);
        assert_eq!(config.scan.size_limit, 1 << 20);
        assert_eq!(config.scan.default_rev, "master");
        assert_eq!(config.oauth.scope, "public_repo");
        assert_eq!(config.commit.author_name, "fixhub");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = FixhubConfig::parse(
            "[scan]\nparallelism = 4\n\n[server]\nport = 8080\n",
            Path::new("fixhub.toml"),
        )
        .unwrap();
        assert_eq!(config.scan.parallelism, 4);
        assert_eq!(config.scan.source_suffix, ".go");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.github.user_agent, "fixhub");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = FixhubConfig::parse("[scan\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        let err =
            FixhubConfig::parse("[scan]\nparallelism = 0\n", Path::new("f.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FixhubConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FixhubConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FIXHUB_PORT", "7000"),
            ("FIXHUB_API_URL", "http://127.0.0.1:9"),
            ("FIXHUB_OAUTH_CLIENT_ID", "abc"),
            ("FIXHUB_TOKEN_FILE", "/tmp/token"),
        ]);
        let mut config = FixhubConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.github.api_url, "http://127.0.0.1:9");
        assert_eq!(config.oauth.client_id, "abc");
        assert_eq!(config.token_path(), Some(PathBuf::from("/tmp/token")));
    }

    #[test]
    fn test_bad_port_env_is_rejected() {
        let mut config = FixhubConfig::default();
        let err = config
            .apply_env(|name| (name == "FIXHUB_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_absent_token_file_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_token_file(&dir.path().join("none")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "  secret-token\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = read_token_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InsecureTokenFile { .. }));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let token = read_token_file(&path).unwrap().unwrap();
        assert_eq!(token.expose(), "secret-token");
    }
}
