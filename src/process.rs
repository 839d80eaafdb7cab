//! External command execution wrapper.
//!
//! Everything this crate observes about WSL happens through external
//! executables (`wsl.exe`, `powershell.exe`, the launcher under test).
//! `Cmd` wraps `std::process::Command` with the two modes we need:
//! checked execution for side effects, and combined-output capture for
//! parsing tool output.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

/// Captured result of a finished external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// stdout followed by stderr, lossily decoded.
    pub text: String,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    pub success: bool,
}

/// Builder for external commands.
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<OsString>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.as_os_str().to_os_string());
        self
    }

    /// Message to use instead of the generic one when the command fails.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for a in &self.args {
            line.push(' ');
            line.push_str(&a.to_string_lossy());
        }
        line
    }

    /// Run with inherited stdio; error if the command cannot be spawned or
    /// exits non-zero.
    pub fn run(self) -> Result<()> {
        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to spawn: {}", self.command_line()))?;

        if !status.success() {
            match &self.error_msg {
                Some(msg) => bail!("{} (exit status {})", msg, status),
                None => bail!("Command failed ({}):\n > {}", status, self.command_line()),
            }
        }
        Ok(())
    }

    /// Capture stdout and stderr without treating a non-zero exit as an
    /// error; callers classify the exit code themselves.
    pub fn combined_output(self) -> Result<CmdOutput> {
        let out = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to spawn: {}", self.command_line()))?;

        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(CmdOutput {
            text,
            code: out.status.code(),
            success: out.status.success(),
        })
    }

    /// Capture like [`combined_output`], but fail on non-zero exit with the
    /// output embedded in the error.
    ///
    /// [`combined_output`]: Cmd::combined_output
    pub fn checked_output(self) -> Result<String> {
        let line = self.command_line();
        let error_msg = self.error_msg.clone();
        let out = self.combined_output()?;
        if !out.success {
            match error_msg {
                Some(msg) => bail!("{}\nOutput: {}", msg, out.text),
                None => bail!("Command failed:\n > {}\nOutput: {}", line, out.text),
            }
        }
        Ok(out.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_captures_stdout_and_exit_code() {
        let out = Cmd::new("sh")
            .args(["-c", "echo hello"])
            .combined_output()
            .unwrap();
        assert!(out.success);
        assert_eq!(out.code, Some(0));
        assert_eq!(out.text.trim(), "hello");
    }

    #[test]
    fn combined_output_preserves_failure_code() {
        let out = Cmd::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .combined_output()
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert!(out.text.contains("oops"));
    }

    #[test]
    fn checked_output_embeds_output_on_failure() {
        let err = Cmd::new("sh")
            .args(["-c", "echo broken >&2; exit 1"])
            .error_msg("listing tool failed")
            .checked_output()
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("listing tool failed"));
        assert!(msg.contains("broken"));
    }

    #[test]
    fn run_fails_for_missing_program() {
        assert!(Cmd::new("definitely_not_a_real_command_12345").run().is_err());
    }
}
