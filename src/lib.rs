//! Test harness and release-build tooling for a WSL distribution launcher.
//!
//! This crate drives the launcher executable and the `wsl.exe` control
//! tool as external black boxes. It provides the two pieces everything
//! else is built from, plus the build-preparation plumbing around them:
//!
//! - **Lifecycle watcher** - polls the instance listing and blocks on
//!   expected state transitions with a hard timeout
//! - **Parallel fetcher** - downloads rootfs archives per architecture,
//!   verified against their checksum manifests
//! - **Release tooling** - release-table derivation, CI build matrix,
//!   build numbers, manifest stamping and meta generation
//! - **Harness helpers** - command composition, debug-log capture and
//!   per-application acceptance tables
//!
//! # Architecture
//!
//! ```text
//! process (command wrapper)
//!     │
//!     ├── instance::listing ── table parser, query_state
//!     │        └── instance::watch ── wait_for_transition, log watcher
//!     ├── preflight ── host tools, testbed validation
//!     └── harness ── launcher/wsl commands, expectations
//!
//! fetch (transfer + checksum, one worker per architecture)
//!     └── assets::prepare_build ── build number, manifests, meta tree
//!              └── release ── CSV table, build matrix
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use wsl_builder::instance::watch::{wait_for_transition, CancelToken, TransitionWait, WslProbe};
//! use wsl_builder::instance::{InstanceConfig, InstanceState};
//!
//! let config = InstanceConfig::new("Ubuntu-22.04", "ubuntu2204.exe");
//! let mut probe = WslProbe::new(&config);
//! let wait = TransitionWait::new(InstanceState::NotFound, InstanceState::Installing);
//! wait_for_transition(&mut probe, &wait, &CancelToken::new())?;
//! ```

pub mod assets;
pub mod fetch;
pub mod harness;
pub mod instance;
pub mod preflight;
pub mod process;
pub mod release;

pub use fetch::{fetch_all, TargetArch};
pub use instance::listing::query_state;
pub use instance::watch::{wait_for_transition, CancelToken, TransitionWait};
pub use instance::{InstanceConfig, InstanceState};
