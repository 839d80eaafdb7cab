//! Polling watcher for asynchronous instance lifecycle transitions.
//!
//! The external tooling exposes no event API: installation, boot and
//! shutdown progress is only observable by re-querying state. The watcher
//! wraps that into a blocking "wait for transition" with a hard wall-clock
//! deadline, checked every poll tick together with a cancellation token so
//! a hung external process cannot wedge a test run past its timeout.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::instance::listing::query_state;
use crate::instance::{InstanceConfig, InstanceState};
use crate::process::Cmd;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period after the installer log reports success, absorbing the
/// server's asynchronous shutdown tail.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Cooperative cancellation flag, checked at every poll boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Source of instance state observations.
///
/// The production implementation shells out to the listing tool; tests
/// script a sequence of observations instead.
pub trait StateProbe {
    fn query(&mut self) -> Result<InstanceState>;
}

/// Probe backed by the real listing command.
pub struct WslProbe<'a> {
    config: &'a InstanceConfig,
}

impl<'a> WslProbe<'a> {
    pub fn new(config: &'a InstanceConfig) -> Self {
        Self { config }
    }
}

impl StateProbe for WslProbe<'_> {
    fn query(&mut self) -> Result<InstanceState> {
        query_state(self.config)
    }
}

/// A single-use description of one expected state transition.
#[derive(Debug, Clone)]
pub struct TransitionWait {
    pub from: InstanceState,
    pub to: InstanceState,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl TransitionWait {
    pub fn new(from: InstanceState, to: InstanceState) -> Self {
        Self {
            from,
            to,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Block until the instance moves from `wait.from` to `wait.to`.
///
/// The instance must currently be in `wait.from`, or already in `wait.to`
/// (a transition that completed before the first observation). Any other
/// state, observed at any point, fails immediately: the monitored process
/// took a path we did not expect. Exceeding `wait.timeout` while still in
/// `wait.from` fails with the last observed state and the elapsed time.
pub fn wait_for_transition(
    probe: &mut dyn StateProbe,
    wait: &TransitionWait,
    cancel: &CancelToken,
) -> Result<InstanceState> {
    println!("Awaiting state transition: {} -> {}", wait.from, wait.to);

    let start = Instant::now();
    let mut state = probe.query()?;
    if state == wait.to {
        return Ok(state);
    }
    if state != wait.from {
        bail!(
            "In transition from '{}' to '{}': unexpected state '{}'",
            wait.from,
            wait.to,
            state
        );
    }

    loop {
        if cancel.is_cancelled() {
            bail!(
                "Wait for '{}' -> '{}' cancelled after {:.1}s (last state: {})",
                wait.from,
                wait.to,
                start.elapsed().as_secs_f64(),
                state
            );
        }
        if start.elapsed() >= wait.timeout {
            bail!(
                "Didn't reach '{}' within {:.0?}. Last state: {}",
                wait.to,
                wait.timeout,
                state
            );
        }

        std::thread::sleep(wait.poll_interval);

        state = probe.query()?;
        if state == wait.from {
            continue;
        }
        if state == wait.to {
            return Ok(state);
        }
        bail!(
            "After transition '{}' -> '{}': unexpected final state '{}'",
            wait.from,
            wait.to,
            state
        );
    }
}

/// One observation of a remote log file.
pub enum LogRead {
    /// The file exists; full contents so far.
    Content(String),
    /// The file has not been created yet; retry on the next tick.
    NotYet,
}

/// Source of remote log observations, same seam pattern as [`StateProbe`].
pub trait LogSource {
    fn read(&mut self) -> Result<LogRead>;
}

/// Reads a log file inside the instance through the command runner.
///
/// `cat` exiting with code 1 means the file does not exist yet, which is
/// expected while the installer is still warming up. Any other failure is
/// an environment problem.
pub struct WslLogSource<'a> {
    config: &'a InstanceConfig,
    log_path: String,
}

impl<'a> WslLogSource<'a> {
    pub fn new(config: &'a InstanceConfig, log_path: &str) -> Self {
        Self {
            config,
            log_path: log_path.to_string(),
        }
    }
}

impl LogSource for WslLogSource<'_> {
    fn read(&mut self) -> Result<LogRead> {
        let out = Cmd::new("wsl.exe")
            .args(["-d", self.config.instance_name.as_str(), "--", "cat"])
            .arg(self.log_path.as_str())
            .combined_output()
            .with_context(|| format!("reading installer log '{}'", self.log_path))?;

        if out.success {
            return Ok(LogRead::Content(out.text));
        }
        if out.code == Some(1) {
            return Ok(LogRead::NotYet);
        }
        bail!(
            "Unexpected error reading installer log '{}': {}",
            self.log_path,
            out.text
        );
    }
}

/// Block until the installer log contains `success_marker`.
///
/// Same polling skeleton as [`wait_for_transition`], with a fixed grace
/// sleep once the marker shows up so the external process can finish its
/// asynchronous shutdown before the caller asserts on final state.
pub fn wait_for_log_completion(
    source: &mut dyn LogSource,
    success_marker: &str,
    poll_interval: Duration,
    timeout: Duration,
    grace: Duration,
    cancel: &CancelToken,
) -> Result<()> {
    println!("Waiting for installer to finish");

    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            bail!(
                "Wait for installer log marker cancelled after {:.1}s",
                start.elapsed().as_secs_f64()
            );
        }
        if start.elapsed() >= timeout {
            bail!("Timed out waiting for installer to finish ({:.0?})", timeout);
        }

        std::thread::sleep(poll_interval);

        match source.read()? {
            LogRead::NotYet => continue,
            LogRead::Content(text) => {
                if text.contains(success_marker) {
                    std::thread::sleep(grace);
                    println!("Installation finished");
                    return Ok(());
                }
            }
        }
    }
}
