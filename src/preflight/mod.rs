//! Preflight checks for the test and build environment.
//!
//! Validates that the host has the external tools the harness drives and
//! that the testbed starts from a clean slate. This prevents cryptic
//! mid-run failures against a half-configured machine.

use anyhow::{bail, Result};

use crate::instance::listing::query_state;
use crate::instance::{InstanceConfig, InstanceState};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// External tools the harness drives.
///
/// Each tuple is (command_name, what it provides).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("wsl.exe", "Windows Subsystem for Linux control tool"),
    ("powershell.exe", "Windows PowerShell"),
];

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, description) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with the list of missing tools
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, provides) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *provides));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} ({})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check that all tools the harness needs are available.
///
/// This checks all tools in [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

/// Check that the instance under test is not registered yet.
///
/// Tests install and unregister the instance; running against a machine
/// where it already exists would destroy real user data.
pub fn check_valid_testbed(config: &InstanceConfig) -> Result<()> {
    let state = query_state(config)?;
    if state != InstanceState::NotFound {
        bail!(
            "instance '{}' is registered (state: {}). Make a backup and unregister it before running the tests.",
            config.instance_name,
            state
        );
    }
    Ok(())
}
