use clap::{Parser, Subcommand};
use fh_core::config::read_token_file;
use fh_core::scan::ScanReport;
use fh_core::types::{Credential, RepoRef};
use fh_core::{FixhubConfig, FixhubError, HostProvider, Scanner};
use fh_github::GithubProvider;
use owo_colors::OwoColorize;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "fh", version, about = "Find and fix problems in Go repositories on GitHub")]
struct Cli {
    /// Configuration file (default: $FIXHUB_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File holding a GitHub personal access token
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan OWNER/REPO and list its problems
    Check {
        repo: String,
        /// Revision to scan (default from config, normally master)
        #[arg(long)]
        rev: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the web front end
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<(), FixhubError> {
    let mut config = load_config(cli.config.as_deref(), cli.token_file)?;
    let token = load_token(&config)?;

    match cli.command {
        Command::Check { repo, rev, json } => check(&config, token, &repo, rev, json).await,
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, token).await
        }
    }
}

fn load_config(
    path: Option<&Path>,
    token_file: Option<PathBuf>,
) -> Result<FixhubConfig, FixhubError> {
    let mut config = FixhubConfig::from_env(path)?;
    if let Some(token_file) = token_file {
        config.github.token_file = Some(token_file);
    }
    config.validate()?;
    Ok(config)
}

fn load_token(config: &FixhubConfig) -> Result<Option<Credential>, FixhubError> {
    let Some(path) = config.token_path() else {
        warn!("cannot locate a token file, scanning anonymously");
        return Ok(None);
    };
    let token = read_token_file(&path)?;
    if token.is_some() {
        info!(path = %path.display(), "using personal access token");
    }
    Ok(token)
}

async fn check(
    config: &FixhubConfig,
    token: Option<Credential>,
    repo: &str,
    rev: Option<String>,
    json: bool,
) -> Result<(), FixhubError> {
    let repo = RepoRef::parse(repo).ok_or_else(|| FixhubError::Internal {
        message: format!("{repo:?} is not OWNER/REPO"),
    })?;
    let rev = rev.unwrap_or_else(|| config.scan.default_rev.clone());
    let provider = GithubProvider::new(config, token)?;
    let scanner = Scanner::new(provider.scanning_host(), fh_lint::go_analyzers(&config.scan))
        .with_options(config.scan.options());

    let report = scanner.check(&repo, &rev).await?;
    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|err| FixhubError::Internal {
            message: err.to_string(),
        })?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ScanReport) {
    for finding in report.findings.iter() {
        let location = format!("{}:{}:", finding.file_path, finding.line);
        let marker = if finding.fixable {
            format!(" {}", "[fixable]".green())
        } else {
            String::new()
        };
        println!(
            "{} {} {}{marker}",
            location.bold(),
            finding.message,
            format!("({})", finding.kind).dimmed()
        );
    }
    let files: BTreeSet<&str> = report
        .findings
        .iter()
        .map(|finding| finding.file_path.as_str())
        .collect();
    info!(
        repo = %report.repo,
        rev = %report.revision,
        commit = %report.commit,
        skipped = report.files_skipped,
        "{} problems in {} files",
        report.findings.len(),
        files.len()
    );
}

async fn serve(config: FixhubConfig, token: Option<Credential>) -> Result<(), FixhubError> {
    if config.oauth.client_id.is_empty() {
        warn!("no OAuth client id configured; fix links will not authorize");
    }
    let provider = GithubProvider::new(&config, token)?;
    let analyzers = fh_lint::go_analyzers(&config.scan);
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.server.port);
    let state = fh_serve::AppState::new(config, Arc::new(provider), analyzers);
    fh_serve::serve(state, addr)
        .await
        .map_err(|err| FixhubError::Internal {
            message: format!("serve: {err}"),
        })
}
