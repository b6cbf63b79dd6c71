//! Running the external tools (python, pip) the build delegates to.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

#[allow(missing_docs)]
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("failed to find `{name}`")]
    #[diagnostic(help("make sure `{name}` is installed and on the PATH"))]
    ToolNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", failure_message(.command, .code, .stderr))]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Resolve `program` to an executable, searching the PATH for bare names.
pub fn find_tool(program: &Path) -> Result<PathBuf, ToolError> {
    which::which(program).map_err(|source| ToolError::ToolNotFound {
        name: program.display().to_string(),
        source,
    })
}

/// The command line as it would be typed into a shell, without quoting.
///
/// `program` is shown in place of the resolved executable, so the line reads
/// the way the tool was named by the user.
pub fn command_line(program: &Path, command: &Command) -> String {
    std::iter::once(program.as_os_str())
        .chain(command.get_args())
        .map(OsStr::to_string_lossy)
        .join(" ")
}

/// Run `command` to completion, capturing its output.
///
/// A non-zero exit status is an error carrying the captured stderr. Messages
/// name the command after `program`.
pub fn run(program: &Path, command: &mut Command) -> Result<Output, ToolError> {
    let line = command_line(program, command);
    tracing::debug!("Running `{line}`");

    let output = command.output().map_err(|source| ToolError::Spawn {
        command: line.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        tracing::debug!("{}", stdout.trim_end());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        tracing::debug!("{}", stderr.trim_end());
    }

    if !output.status.success() {
        return Err(ToolError::Failed {
            command: line,
            // killed by a signal
            code: output.status.code().unwrap_or(-1),
            stderr: stderr.into_owned(),
        });
    }

    Ok(output)
}

fn failure_message(command: &str, code: &i32, stderr: &str) -> String {
    let indented = stderr
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("    {line}")
            }
        })
        .join("\n");
    let message = format!("Command '{command}' returned non-zero exit code {code}:\n\n{indented}");
    format!("{}\n", message.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message() {
        let error = ToolError::Failed {
            command: "pip install spam.whl".to_string(),
            code: 1,
            stderr: "ERROR: spam.whl is not a valid wheel filename.\n\nhint: check the name\n"
                .to_string(),
        };
        insta::assert_snapshot!(error.to_string(), @r"
        Command 'pip install spam.whl' returned non-zero exit code 1:

            ERROR: spam.whl is not a valid wheel filename.

            hint: check the name
        ");
        assert!(error.to_string().ends_with("check the name\n"));
    }

    #[test]
    fn test_failure_message_without_stderr() {
        let error = ToolError::Failed {
            command: "pip install spam.whl".to_string(),
            code: 2,
            stderr: String::new(),
        };
        assert_eq!(
            error.to_string(),
            "Command 'pip install spam.whl' returned non-zero exit code 2:\n"
        );
    }

    #[test]
    fn test_command_line() {
        let mut command = Command::new("/usr/bin/pip");
        command.args(["install", "spam.whl", "--no-deps"]);
        assert_eq!(
            command_line(Path::new("pip"), &command),
            "pip install spam.whl --no-deps"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_exit_code() {
        let sh = Path::new("sh");
        let mut command = Command::new(find_tool(sh).unwrap());
        command.args(["-c", "echo broken >&2; exit 3"]);
        let error = run(sh, &mut command).unwrap_err();
        assert!(matches!(error, ToolError::Failed { code: 3, .. }));
        assert!(
            error
                .to_string()
                .starts_with("Command 'sh -c echo broken >&2; exit 3' returned non-zero exit code 3:")
        );
        assert!(error.to_string().contains("    broken"));
    }
}
