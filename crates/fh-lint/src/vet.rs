use async_trait::async_trait;
use fh_core::analyze::{AnalyzerError, Diagnostic, VetChecker};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const SCRATCH_FILE: &str = "x.go";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs an external vet command over one file at a time.
///
/// The command cannot read standard input, so each source is written to a
/// private scratch directory as `x.go` and the command is pointed at it.
#[derive(Debug, Clone)]
pub struct GoVet {
    program: Option<PathBuf>,
    args: Vec<String>,
    timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl GoVet {
    /// Splits `command` shell-style and locates the program on `PATH`. A
    /// program that cannot be found makes the checker unavailable.
    pub fn from_command(command: &str) -> Result<Self, AnalyzerError> {
        let argv = shell_words::split(command)
            .map_err(|err| AnalyzerError::Failed(format!("vet command {command:?}: {err}")))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AnalyzerError::Failed("vet command empty".to_string()))?;
        let resolved = find_program(program);
        if resolved.is_none() {
            warn!(program, "vet program not found, vet disabled");
        }
        Ok(Self {
            program: resolved,
            args: args.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            scratch_root: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fixhub-vet");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl VetChecker for GoVet {
    fn is_available(&self) -> bool {
        self.program.is_some()
    }

    async fn check(&self, path: &str, src: &[u8]) -> Result<Vec<Diagnostic>, AnalyzerError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| AnalyzerError::Unavailable("vet program not found".to_string()))?;
        let dir = self
            .scratch_dir()
            .map_err(|err| AnalyzerError::Failed(format!("scratch dir: {err}")))?;
        let file = dir.path().join(SCRATCH_FILE);
        tokio::fs::write(&file, src)
            .await
            .map_err(|err| AnalyzerError::Failed(format!("writing scratch file: {err}")))?;

        let mut command = Command::new(program);
        command
            .args(&self.args)
            .arg(SCRATCH_FILE)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AnalyzerError::Failed(format!("vet timed out on {path}")))?
            .map_err(|err| AnalyzerError::Failed(format!("running vet: {err}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        // The exit status is not a reliable signal; only silence plus
        // failure means vet never ran.
        if combined.trim().is_empty() && !output.status.success() {
            return Err(AnalyzerError::Failed(format!(
                "running vet: {}",
                output.status
            )));
        }
        let diagnostics = parse_output(&combined);
        debug!(path, count = diagnostics.len(), "vet finished");
        Ok(diagnostics)
    }
}

/// Picks `x.go:LINE[:COL]: message` lines out of vet output.
fn parse_output(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let file = parts.next()?.trim();
            let line_no = parts.next()?.trim().parse::<u32>().ok()?;
            let rest = parts.next()?;
            if Path::new(file).file_name()?.to_str()? != SCRATCH_FILE {
                return None;
            }
            let message = match rest.split_once(':') {
                Some((col, message)) if col.trim().parse::<u32>().is_ok() => message,
                _ => rest,
            };
            Some(Diagnostic {
                line: line_no,
                message: message.trim().to_string(),
            })
        })
        .collect()
}

fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_with_and_without_column() {
        let out = "# command-line-arguments\n./x.go:3:2: unreachable code\nx.go:7: possible misuse of unsafe.Pointer\nother.go:1:1: ignored\nnot a diagnostic\n";
        let diagnostics = parse_output(out);
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic {
                    line: 3,
                    message: "unreachable code".to_string()
                },
                Diagnostic {
                    line: 7,
                    message: "possible misuse of unsafe.Pointer".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let vet = GoVet::from_command("definitely-not-a-vet-binary-4711 vet").unwrap();
        assert!(!vet.is_available());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(GoVet::from_command("   ").is_err());
        assert!(GoVet::from_command("go 'vet").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_runs_command_in_scratch_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let vet = GoVet::from_command("sh -c 'echo \"x.go:2: found in $(basename \"$0\")\"' ")
            .unwrap()
            .with_scratch_root(Some(scratch.path().to_path_buf()));
        assert!(vet.is_available());
        let diagnostics = vet.check("pkg/a.go", b"package a\n").await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].message, "found in x.go");
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_failure_is_an_error() {
        let vet = GoVet::from_command("false").unwrap();
        assert!(vet.is_available());
        let err = vet.check("a.go", b"package a\n").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Failed(_)));
    }
}
