//! Timeout supervision state machine

use runbound_api::{ExitStatus, RunOutcome, StreamKind, SupervisorState};
use runbound_host_api::{ChildControl, ChildStdio, HostResult};
use runbound_util::duration_millis;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{Console, InputRelay, StreamPump};

/// Default time between liveness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default grace for the pumps to flush output written before the child exited
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between liveness checks; also the upper bound on kill latency
    /// after the deadline
    pub poll_interval: Duration,

    /// How long shutdown waits for output pipes to reach EOF, and for a
    /// killed child to be reaped
    pub drain_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Everything bound to the one child of this invocation
pub struct SupervisorRun<C: ChildControl> {
    child: C,
    relay: InputRelay,
    stdout: StreamPump,
    stderr: StreamPump,
    started: Instant,
}

impl<C: ChildControl> SupervisorRun<C> {
    /// Attach the pumps and the relay to a freshly launched child
    pub fn start(child: C, stdio: ChildStdio, console: Console) -> Self {
        let ChildStdio {
            stdin,
            stdout,
            stderr,
        } = stdio;

        let stdout = StreamPump::spawn(StreamKind::Stdout, stdout, console.output);
        let stderr = StreamPump::spawn(StreamKind::Stderr, stderr, console.error);
        let relay = InputRelay::start(console.input, stdin);

        Self {
            child,
            relay,
            stdout,
            stderr,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the child and every task without waiting for any of them
    fn abandon(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(error = %e, "Failed to kill child while abandoning run");
        }
        self.relay.abort();
        self.stdout.abort();
        self.stderr.abort();
    }
}

/// Bounds one child's lifetime.
///
/// `Running` -> (`ExitedNaturally` | `TimedOut`) -> `ShutdownComplete`
#[derive(Debug)]
pub struct TimeoutSupervisor {
    timeout: Duration,
    config: SupervisorConfig,
    state: SupervisorState,
}

impl TimeoutSupervisor {
    pub fn new(timeout: Duration, config: SupervisorConfig) -> Self {
        Self {
            timeout,
            config,
            state: SupervisorState::Running,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, next: SupervisorState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "Supervisor state changed");
        self.state = next;
    }

    /// Supervise `run` to completion: poll until exit or timeout, then shut
    /// down. On a host error the child is killed and every task aborted
    /// before the error is returned.
    pub async fn supervise<C: ChildControl>(
        mut self,
        mut run: SupervisorRun<C>,
    ) -> HostResult<RunOutcome> {
        let exit_status = match self.wait_for_exit(&mut run).await {
            Ok(status) => status,
            Err(e) => {
                run.abandon();
                return Err(e);
            }
        };

        let outcome = RunOutcome {
            state: self.state,
            exit_status,
            elapsed: run.elapsed(),
        };

        self.shutdown(run).await;
        Ok(outcome)
    }

    /// Poll the child every `poll_interval` until it exits or the timeout
    /// elapses. Leaves the supervisor in `ExitedNaturally` or `TimedOut`.
    pub async fn wait_for_exit<C: ChildControl>(
        &mut self,
        run: &mut SupervisorRun<C>,
    ) -> HostResult<Option<ExitStatus>> {
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(status) = run.child.try_wait()? {
                info!(
                    pid = ?run.child.pid(),
                    status = %status,
                    elapsed_ms = duration_millis(run.elapsed()),
                    "Child exited"
                );
                self.transition(SupervisorState::ExitedNaturally);
                return Ok(Some(status));
            }

            if run.elapsed() >= self.timeout {
                warn!(
                    pid = ?run.child.pid(),
                    timeout_ms = duration_millis(self.timeout),
                    "Child exceeded its time-out, killing"
                );
                run.child.kill()?;
                self.transition(SupervisorState::TimedOut);
                return Ok(self.reap(run).await);
            }
        }
    }

    async fn reap<C: ChildControl>(&self, run: &mut SupervisorRun<C>) -> Option<ExitStatus> {
        match tokio::time::timeout(self.config.drain_timeout, run.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = %status, "Killed child reaped");
                Some(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to reap killed child");
                None
            }
            Err(_) => {
                warn!("Killed child not reaped within drain timeout");
                None
            }
        }
    }

    /// Abort the relay, give the pumps a bounded grace to drain, and enter
    /// `ShutdownComplete`.
    pub async fn shutdown<C: ChildControl>(&mut self, run: SupervisorRun<C>) {
        let SupervisorRun {
            child,
            relay,
            stdout,
            stderr,
            ..
        } = run;

        debug!(input_closed = relay.is_finished(), "Stopping input relay");
        relay.abort();

        let deadline = Instant::now() + self.config.drain_timeout;
        let (out_bytes, err_bytes) =
            tokio::join!(stdout.drain_until(deadline), stderr.drain_until(deadline));
        debug!(stdout_bytes = ?out_bytes, stderr_bytes = ?err_bytes, "Output drained");

        drop(child);
        self.transition(SupervisorState::ShutdownComplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbound_api::{CredentialHandle, LaunchSpec};
    use runbound_host_api::{Launched, MockBehavior, MockChild, MockHost, ProcessHost};
    use tokio::io::{AsyncReadExt, BufReader};

    fn quiet_console() -> Console {
        Console::new(
            Box::new(BufReader::new(tokio::io::empty())),
            Box::new(tokio::io::sink()),
            Box::new(tokio::io::sink()),
        )
    }

    async fn start(host: &MockHost, console: Console) -> SupervisorRun<MockChild> {
        let spec = LaunchSpec::new("tester", Duration::from_secs(1), "/bin/mock", None).unwrap();
        let Launched { child, stdio } = host
            .launch(&spec, CredentialHandle::new("tester", String::new()))
            .await
            .unwrap();
        SupervisorRun::start(child, stdio, console)
    }

    #[tokio::test]
    async fn natural_exit_is_not_killed() {
        let host = MockHost::with_behavior(MockBehavior {
            exit_after: Some(Duration::from_millis(20)),
            exit_code: 4,
            ..Default::default()
        });
        let run = start(&host, quiet_console()).await;

        let supervisor =
            TimeoutSupervisor::new(Duration::from_secs(5), SupervisorConfig::default());
        let outcome = supervisor.supervise(run).await.unwrap();

        assert_eq!(outcome.state, SupervisorState::ExitedNaturally);
        assert_eq!(outcome.exit_status, Some(ExitStatus::with_code(4)));
        assert!(outcome.elapsed < Duration::from_secs(5));
        assert_eq!(host.kill_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_child_is_killed_within_one_poll() {
        let host = MockHost::new();
        let run = start(&host, quiet_console()).await;

        let timeout = Duration::from_millis(55);
        let config = SupervisorConfig::default();
        let poll_interval = config.poll_interval;
        let outcome = TimeoutSupervisor::new(timeout, config)
            .supervise(run)
            .await
            .unwrap();

        assert_eq!(outcome.state, SupervisorState::TimedOut);
        assert!(outcome.elapsed >= timeout);
        assert!(
            outcome.elapsed <= timeout + poll_interval,
            "killed after {:?}",
            outcome.elapsed
        );
        assert!(outcome.exit_status.unwrap().signaled);
        assert_eq!(host.kill_count(), 1);
    }

    #[tokio::test]
    async fn state_advances_to_shutdown_complete() {
        let host = MockHost::with_behavior(MockBehavior {
            exit_after: Some(Duration::ZERO),
            ..Default::default()
        });
        let mut run = start(&host, quiet_console()).await;
        let mut supervisor =
            TimeoutSupervisor::new(Duration::from_secs(1), SupervisorConfig::default());
        assert_eq!(supervisor.state(), SupervisorState::Running);

        supervisor.wait_for_exit(&mut run).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::ExitedNaturally);

        supervisor.shutdown(run).await;
        assert_eq!(supervisor.state(), SupervisorState::ShutdownComplete);
    }

    #[tokio::test]
    async fn output_drained_after_exit() {
        let expected: Vec<u8> = (0..200)
            .flat_map(|i| format!("out {}\n", i).into_bytes())
            .collect();
        let host = MockHost::with_behavior(MockBehavior {
            exit_after: Some(Duration::from_millis(5)),
            stdout: expected.clone(),
            stderr: b"warning: something\n".to_vec(),
            ..Default::default()
        });

        let (out_writer, mut out_reader) = tokio::io::duplex(1 << 20);
        let (err_writer, mut err_reader) = tokio::io::duplex(1 << 20);
        let console = Console::new(
            Box::new(BufReader::new(tokio::io::empty())),
            Box::new(out_writer),
            Box::new(err_writer),
        );
        let run = start(&host, console).await;

        TimeoutSupervisor::new(Duration::from_secs(5), SupervisorConfig::default())
            .supervise(run)
            .await
            .unwrap();

        let mut out = Vec::new();
        out_reader.read_to_end(&mut out).await.unwrap();
        let mut err = Vec::new();
        err_reader.read_to_end(&mut err).await.unwrap();

        assert_eq!(out, expected);
        assert_eq!(err, b"warning: something\n");
    }
}
