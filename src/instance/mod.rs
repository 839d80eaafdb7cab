//! WSL instance model: lifecycle states and instance addressing.
//!
//! An *instance* is a registered WSL distribution environment, addressed
//! by name. Its lifecycle state is only observable by querying the
//! external listing tool; nothing here caches state between observations.

pub mod listing;
pub mod watch;

use std::fmt;

/// Lifecycle state of a named instance as reported by `wsl.exe`.
///
/// `NotFound` is a valid, expected state (the instance is not registered),
/// not an error. Values the listing tool prints that we do not recognize
/// are preserved verbatim in `Other` so new states surface at the parsing
/// boundary instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    NotFound,
    Installing,
    Running,
    Stopped,
    Uninstalling,
    Other(String),
}

impl InstanceState {
    /// Total mapping from a state column value to a state.
    pub fn from_listing(s: &str) -> Self {
        match s {
            "Installing" => Self::Installing,
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            "Uninstalling" => Self::Uninstalling,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::Installing => write!(f, "Installing"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Uninstalling => write!(f, "Uninstalling"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Which instance and launcher a harness run operates on.
///
/// Passed explicitly into every operation; there is no process-wide
/// default instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Registered WSL instance name (e.g. `Ubuntu-22.04`).
    pub instance_name: String,
    /// Launcher executable under test (e.g. `ubuntu2204.exe`).
    pub launcher: String,
}

impl InstanceConfig {
    pub fn new(instance_name: &str, launcher: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            launcher: launcher.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states_map_to_variants() {
        assert_eq!(InstanceState::from_listing("Running"), InstanceState::Running);
        assert_eq!(InstanceState::from_listing("Stopped"), InstanceState::Stopped);
        assert_eq!(
            InstanceState::from_listing("Installing"),
            InstanceState::Installing
        );
        assert_eq!(
            InstanceState::from_listing("Uninstalling"),
            InstanceState::Uninstalling
        );
    }

    #[test]
    fn unknown_state_is_preserved_verbatim() {
        let state = InstanceState::from_listing("Converting");
        assert_eq!(state, InstanceState::Other("Converting".to_string()));
        assert_eq!(state.to_string(), "Converting");
    }
}
