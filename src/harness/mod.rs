//! End-to-end harness helpers: composing launcher and in-instance
//! commands, capturing debug logs on failure, and the per-application
//! acceptance tables.
//!
//! The acceptance tables (which systemd units are allowed to be failed,
//! which upgrade policy an application ships) vary per release and per
//! product decision; they are supplied as configuration, not hard-coded.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::instance::InstanceConfig;
use crate::process::Cmd;

/// Installer log inside the instance, read for completion and debugging.
pub const SERVER_LOG_PATH: &str = "/var/log/installer/systemsetup-server-debug.log";

/// Marker the installer log carries once setup shut down cleanly.
pub const INSTALL_SUCCESS_MARKER: &str = "finish: subiquity/SetupShutdown/shutdown: SUCCESS";

/// Command running inside the instance: `wsl.exe -d <name> -- <cmd>...`.
pub fn wsl_cmd<I, S>(config: &InstanceConfig, linux_cmd: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new("wsl.exe")
        .args(["-d", config.instance_name.as_str(), "--"])
        .args(linux_cmd.into_iter().map(|s| s.as_ref().to_string()))
}

/// Launcher invocation through the shell: `<launcher> <verb> <args>...`.
///
/// The launcher is an installed app-execution alias, so it has to go
/// through the shell rather than being spawned directly.
pub fn launcher_cmd<I, S>(config: &InstanceConfig, verb: &str, args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut command_line = format!("{} {}", config.launcher, verb);
    for arg in args {
        command_line.push(' ');
        command_line.push_str(arg.as_ref());
    }
    Cmd::new("powershell.exe")
        .args(["-noninteractive", "-nologo", "-noprofile", "-command"])
        .arg(command_line)
}

/// Stop the instance so the next command boots it fresh.
pub fn terminate_instance(config: &InstanceConfig) -> Result<()> {
    Cmd::new("wsl.exe")
        .args(["--terminate", config.instance_name.as_str()])
        .error_msg("failed to terminate instance")
        .run()
}

/// Best-effort cleanup at the end of a test: shut WSL down and
/// unregister the instance under test. Failures are reported but not
/// fatal; the testbed check of the next run will catch leftovers.
pub fn cleanup_instance(config: &InstanceConfig) {
    if let Err(e) = Cmd::new("wsl.exe").arg("--shutdown").run() {
        eprintln!("[WARN] failed to shut WSL down after test: {e}");
    }
    if let Err(e) = Cmd::new("wsl.exe")
        .args(["--unregister", config.instance_name.as_str()])
        .run()
    {
        eprintln!("[WARN] failed to unregister instance after test: {e}");
    }
}

/// Dump the installer's server log and the client-side log file, called
/// when a test fails so the failure is diagnosable without re-running.
pub fn capture_debug_logs(config: &InstanceConfig, client_log: &Path) {
    println!("==== Server debug log ====");
    match wsl_cmd(config, ["cat", SERVER_LOG_PATH]).combined_output() {
        Ok(out) if out.success => println!("{}", out.text),
        Ok(out) => eprintln!("[WARN] failed to retrieve server debug log: {}", out.text),
        Err(e) => eprintln!("[WARN] failed to retrieve server debug log: {e}"),
    }

    println!("==== Client debug log ====");
    match fs::read_to_string(client_log) {
        Ok(contents) => println!("{contents}"),
        Err(e) => eprintln!(
            "[WARN] failed to retrieve client debug log '{}': {e}",
            client_log.display()
        ),
    }
}

/// Acceptance expectations for one application.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppExpectations {
    /// systemd units allowed to be in the failed state after boot.
    #[serde(default)]
    pub allowed_failed_units: Vec<String>,
    /// Expected `Prompt` value in the release-upgrades configuration.
    pub upgrade_policy: Option<String>,
}

/// Per-application acceptance tables, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectations {
    /// Application id whose entry applies to unknown (development)
    /// instance names.
    pub fallback: Option<String>,
    pub apps: BTreeMap<String, AppExpectations>,
}

impl Expectations {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading expectations file '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("invalid expectations file '{}'", path.display()))
    }

    /// Expectations for an instance name, falling back to the configured
    /// development entry for names not in the table.
    pub fn for_instance(&self, instance_name: &str) -> Result<&AppExpectations> {
        if let Some(exp) = self.apps.get(instance_name) {
            return Ok(exp);
        }
        if let Some(fallback) = &self.fallback {
            return self.apps.get(fallback).with_context(|| {
                format!("fallback entry {fallback:?} missing from expectations")
            });
        }
        bail!("no expectations configured for instance {instance_name:?}");
    }
}

/// Extract unit names from `systemctl list-units --state=failed --plain
/// --no-legend --no-pager` output.
pub fn parse_failed_units(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Upgrade policy an instance is expected to ship, derived from its name:
/// point-release apps never upgrade, the rolling `Ubuntu` app follows
/// LTSes, everything else (preview, development) upgrades normally.
pub fn upgrade_policy_for(instance_name: &str) -> &'static str {
    if is_lts_release_name(instance_name) {
        return "never";
    }
    if instance_name == "Ubuntu" {
        return "lts";
    }
    "normal"
}

/// Matches `Ubuntu-XX.YY` release instance names.
fn is_lts_release_name(name: &str) -> bool {
    let Some(version) = name.strip_prefix("Ubuntu-") else {
        return false;
    };
    let bytes = version.as_bytes();
    bytes.len() == 5
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'.'
        && bytes[3].is_ascii_digit()
        && bytes[4].is_ascii_digit()
}

/// Extract the `Prompt` value from the DEFAULT section of the
/// release-upgrades configuration file contents.
pub fn prompt_from_release_upgrades(contents: &str) -> Result<String> {
    let mut in_default = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_default = section.eq_ignore_ascii_case("DEFAULT");
            continue;
        }
        if !in_default {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "Prompt" {
                return Ok(value.trim().to_string());
            }
        }
    }
    bail!("no 'Prompt' key in the DEFAULT section of release-upgrades")
}
