//! Value types shared across runbound crates

use std::fmt;
use std::time::Duration;

/// Exit status of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,

    /// Whether the process was signaled
    pub signaled: bool,

    /// Signal number if signaled (Unix)
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signaled: false,
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signaled: true,
            signal: Some(signal),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::with_code(code);
        }

        // Killed by signal
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return Self::signaled(sig);
            }
        }

        Self::with_code(-1)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(sig)) => write!(f, "signal {}", sig),
            (None, None) => write!(f, "unknown"),
        }
    }
}

/// Supervisor lifecycle
///
/// `Running` -> (`ExitedNaturally` | `TimedOut`) -> `ShutdownComplete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    ExitedNaturally,
    TimedOut,
    ShutdownComplete,
}

impl SupervisorState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Running, ExitedNaturally)
                | (Running, TimedOut)
                | (ExitedNaturally, ShutdownComplete)
                | (TimedOut, ShutdownComplete)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Running => "running",
            SupervisorState::ExitedNaturally => "exited_naturally",
            SupervisorState::TimedOut => "timed_out",
            SupervisorState::ShutdownComplete => "shutdown_complete",
        };
        f.write_str(name)
    }
}

/// Which child output pipe a pump forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// How a supervised run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Terminal state reached before shutdown
    pub state: SupervisorState,

    /// Child exit status, if it was reaped
    pub exit_status: Option<ExitStatus>,

    /// Time from launch to the terminal state
    pub elapsed: Duration,
}
