//! Parsing of the `wsl -l -v` instance table.
//!
//! The listing output is a columnar table:
//!
//! ```text
//! * Ubuntu-22.04                      Stopped         2
//! ↑ ↑~~~~~~~~~~~                      ↑~~~~~~
//! | 2: instance name                  3: state
//! 1: default marker [*| ] (ignored)
//! ```
//!
//! Rows that do not match this shape (headers, blank lines, UTF-16
//! artifacts) are skipped. The listing command itself failing with the
//! "no default distro" signature means no instance is registered at all,
//! which is a valid observation, not an error.

use anyhow::{bail, Result};

use crate::instance::{InstanceConfig, InstanceState};
use crate::process::Cmd;

/// Error signature `wsl.exe` prints when no distribution is registered.
pub const NO_DISTRO_SIGNATURE: &str = "WSL_E_DEFAULT_DISTRO_NOT_FOUND";

/// One parsed row of the listing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub is_default: bool,
    pub name: String,
    pub state: String,
}

/// Parse a single listing line into a row, or `None` if it does not match
/// the table shape.
pub fn parse_row(line: &str) -> Option<ListingRow> {
    // Marker column: '*' or ' ', followed by the separator space.
    let mut chars = line.chars();
    let marker = chars.next()?;
    if marker != '*' && marker != ' ' {
        return None;
    }
    if chars.next()? != ' ' {
        return None;
    }

    let rest = &line[2..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let [name, state, version] = fields.as_slice() else {
        return None;
    };

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return None;
    }
    if !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    // Trailing column is the (single-digit) WSL version.
    if version.len() != 1 || !version.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(ListingRow {
        is_default: marker == '*',
        name: name.to_string(),
        state: state.to_string(),
    })
}

/// Extract the state of `instance_name` from a full listing output.
///
/// No matching row means the instance is not registered.
pub fn parse_instance_state(output: &str, instance_name: &str) -> InstanceState {
    for line in output.lines() {
        let Some(row) = parse_row(line) else {
            continue;
        };
        if row.name != instance_name {
            continue;
        }
        return InstanceState::from_listing(&row.state);
    }
    InstanceState::NotFound
}

/// Query the current state of the configured instance.
///
/// Invokes the listing tool once and parses its output. A failing listing
/// command is only acceptable when it carries the no-distro signature;
/// anything else means the environment itself is broken and aborts the
/// caller.
pub fn query_state(config: &InstanceConfig) -> Result<InstanceState> {
    // WSL prints UTF-16 by default; WSL_UTF8=1 forces UTF-8 output.
    let out = Cmd::new("powershell.exe")
        .args([
            "-noninteractive",
            "-nologo",
            "-noprofile",
            "-command",
            "$env:WSL_UTF8=1 ; wsl -l -v",
        ])
        .combined_output()?;

    if !out.success {
        if out.text.contains(NO_DISTRO_SIGNATURE) {
            return Ok(InstanceState::NotFound);
        }
        bail!("Unexpected error calling 'wsl -l -v'. Output: {}", out.text);
    }

    Ok(parse_instance_state(&out.text, &config.instance_name))
}
