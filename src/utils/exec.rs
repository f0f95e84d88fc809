//! External command execution.
//!
//! Builder over `tokio::process` for rebuild commands. Children are killed
//! when the run is cancelled.
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! let output = Cmd::from_slice(&["dotnet", "build"])
//!     .cwd(project_dir)
//!     .run(&cancel)
//!     .await?;
//! ```

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Output, Stdio},
    sync::OnceLock,
};
use tokio_util::sync::CancellationToken;

/// Command builder for external process execution.
#[derive(Debug, Default, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl Cmd {
    /// Create from a command array (e.g., `["dotnet", "fsc"]`). Empty
    /// arguments are dropped.
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter().map(<S as AsRef<OsStr>>::as_ref);
        let program = iter.next().map(OsStr::to_owned).unwrap_or_default();
        let args = iter
            .filter(|arg| !arg.is_empty())
            .map(OsStr::to_owned)
            .collect();
        Self {
            program,
            args,
            cwd: None,
        }
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Command line as a single display string.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, failing on a non-zero exit status.
    pub async fn run(self, cancel: &CancellationToken) -> Result<Output> {
        let name = self.program_name();
        let program = which::which(&self.program)
            .map(PathBuf::into_os_string)
            .unwrap_or_else(|_| self.program.clone());

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{name}`"))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => bail!("`{name}` was cancelled"),
            output = child.wait_with_output() => {
                output.with_context(|| format!("Failed to wait for `{name}`"))?
            }
        };

        if !output.status.success() {
            bail!(format_error(&name, &output));
        }
        Ok(output)
    }
}

/// Strip ANSI escape codes from string.
pub fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    match RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok()) {
        Some(re) => re.replace_all(s, ""),
        None => std::borrow::Cow::Borrowed(s),
    }
}

/// Non-empty output lines, ANSI stripped.
pub fn output_lines(output: &Output) -> Vec<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(|line| strip_ansi(line).trim_end().to_string())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

fn format_error(name: &str, output: &Output) -> String {
    let lines = output_lines(output);
    if lines.is_empty() {
        format!("Command `{name}` failed with {}", output.status)
    } else {
        format!(
            "Command `{name}` failed with {}\n{}",
            output.status,
            lines.join("\n")
        )
    }
}
