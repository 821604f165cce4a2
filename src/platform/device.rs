use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::DeviceOptions;
use crate::error::{FetchError, RemoteCommandError};

/// Suffix used while a transfer is in flight; never matches an accepted extension.
pub const PARTIAL_SUFFIX: &str = "part";

/// File access on the mirrored device.
pub trait RemoteDevice: Send + Sync {
    /// Entry names (not paths) directly inside `dir`.
    fn list_dir(
        &self,
        dir: &str,
    ) -> impl Future<Output = Result<Vec<String>, RemoteCommandError>> + Send;

    /// Copy `remote_path` to `local_path`. A failed transfer must not leave a
    /// file at `local_path`.
    fn fetch(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// `RemoteDevice` backed by the `adb` command line tool.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    program: String,
    prefix: Vec<String>,
    timeout: Duration,
}

#[derive(Debug)]
struct CommandOutput {
    stdout: String,
}

impl AdbDevice {
    pub fn new(options: &DeviceOptions) -> Self {
        let mut prefix = options.extra_args.clone();
        if let Some(serial) = &options.serial {
            prefix.push("-s".to_string());
            prefix.push(serial.clone());
        }
        Self {
            program: options.program.clone(),
            prefix,
            timeout: options.command_timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RemoteCommandError> {
        let rendered = self.render(args);
        debug!(command = %rendered, "running device command");

        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(RemoteCommandError::TimedOut {
                    command: rendered,
                    timeout: self.timeout,
                });
            }
            Ok(Err(source)) => {
                return Err(RemoteCommandError::Spawn {
                    command: rendered,
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(RemoteCommandError::Failed {
                command: rendered,
                status: describe_status(&output.status),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn render(&self, args: &[&str]) -> String {
        let mut parts = Vec::with_capacity(1 + self.prefix.len() + args.len());
        parts.push(self.program.as_str());
        parts.extend(self.prefix.iter().map(String::as_str));
        parts.extend(args.iter().copied());
        parts.join(" ")
    }
}

impl RemoteDevice for AdbDevice {
    async fn list_dir(&self, dir: &str) -> Result<Vec<String>, RemoteCommandError> {
        // `adb shell` hands its arguments to the device shell, so the path is quoted there.
        let quoted = shell_quote(dir);
        let output = self.run(&["shell", "ls", &quoted]).await?;
        Ok(parse_listing(&output.stdout))
    }

    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<(), FetchError> {
        let partial = partial_path(local_path);
        let partial_arg = partial.to_string_lossy().into_owned();

        if let Err(source) = self.run(&["pull", remote_path, &partial_arg]).await {
            discard_partial(&partial);
            return Err(FetchError::Remote {
                remote: remote_path.to_string(),
                source,
            });
        }

        fs::rename(&partial, local_path).map_err(|source| {
            discard_partial(&partial);
            FetchError::Io {
                path: local_path.to_path_buf(),
                source,
            }
        })
    }
}

/// One entry per line; tolerates CRLF output and blank lines.
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Device-side path of `name` inside `dir`.
pub fn remote_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Temporary download target next to `local_path`.
pub fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    local_path.with_file_name(name)
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => debug!(path = %partial.display(), "removed partial download"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %partial.display(),
            error = %err,
            "failed to remove partial download"
        ),
    }
}

fn describe_status(status: &ExitStatus) -> String {
    status
        .code()
        .map(|code| format!("exit code {code}"))
        .unwrap_or_else(|| "signal".to_string())
}

fn shell_quote(arg: &str) -> String {
    fn is_safe(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@' | '%' | '+')
    }
    if !arg.is_empty() && arg.chars().all(is_safe) {
        arg.to_string()
    } else {
        let escaped = arg.replace('\'', "'\\''");
        format!("'{}'", escaped)
    }
}
