//! Process management utilities

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use runbound_api::{ExitStatus, LaunchSpec};
use runbound_host_api::{ChildControl, ChildStdio, HostError, HostResult};
use std::io;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::Identity;

/// Variables passed through from the supervisor's environment
const INHERITED_ENV: &[&str] = &["PATH", "LANG", "LC_ALL", "TERM", "TZ"];

/// Managed child process with process group
pub struct ManagedProcess {
    child: Child,
    pub pid: u32,
    pub pgid: u32,
}

impl ManagedProcess {
    /// Spawn the executable in `spec` as `identity`, in its own session and
    /// process group, with all three standard streams piped.
    pub fn spawn(spec: &LaunchSpec, identity: &Identity) -> HostResult<(Self, ChildStdio)> {
        let program = spec.executable();

        let mut cmd = Command::new(program);
        cmd.args(spec.argv());

        // Set environment
        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.env("HOME", &identity.home);
        cmd.env("USER", &identity.name);
        cmd.env("LOGNAME", &identity.name);

        // Set working directory
        if let Some(dir) = spec.working_directory() {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // If anything below fails after the fork, dropping the child kills it
        cmd.kill_on_drop(true);

        let switch = identity.requires_switch();
        let uid = identity.uid;
        let gid = identity.gid;
        let groups = identity.groups.clone();

        // SAFETY: only async-signal-safe syscalls run between fork and exec;
        // the group list is allocated before the fork.
        unsafe {
            cmd.pre_exec(move || {
                // New session, so the child leads its own process group and
                // a group kill reaches everything it starts
                nix::unistd::setsid().map_err(io::Error::from)?;

                if switch {
                    // Order matters: groups and gid must change while we still
                    // hold the privilege to change them
                    nix::unistd::setgroups(&groups).map_err(io::Error::from)?;
                    nix::unistd::setgid(gid).map_err(io::Error::from)?;
                    nix::unistd::setuid(uid).map_err(io::Error::from)?;
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(spec, identity, e))?;

        let pid = child
            .id()
            .ok_or_else(|| HostError::Internal("Child exited before its pid was read".into()))?;
        let pgid = pid; // After setsid, pid == pgid

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Internal("Child stdin was not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Internal("Child stdout was not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HostError::Internal("Child stderr was not piped".into()))?;

        debug!(pid = pid, pgid = pgid, program = %program.display(), "Process spawned");

        let stdio = ChildStdio {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        };

        Ok((Self { child, pid, pgid }, stdio))
    }

    /// Send SIGKILL to the process group
    pub fn kill_group(&self) -> HostResult<()> {
        let pgid = Pid::from_raw(-(self.pgid as i32)); // Negative for process group

        match signal::kill(pgid, Signal::SIGKILL) {
            Ok(()) => {
                debug!(pgid = self.pgid, "Sent SIGKILL to process group");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                // Process already gone
                Ok(())
            }
            Err(e) => Err(HostError::KillFailed(format!(
                "Failed to send SIGKILL: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl ChildControl for ManagedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    /// Check if the process has exited (non-blocking)
    fn try_wait(&mut self) -> HostResult<Option<ExitStatus>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(ExitStatus::from(status))),
            Ok(None) => Ok(None), // Still running
            Err(e) => Err(HostError::Internal(format!("Wait failed: {}", e))),
        }
    }

    fn kill(&mut self) -> HostResult<()> {
        self.kill_group()
    }

    /// Wait for the process to exit
    async fn wait(&mut self) -> HostResult<ExitStatus> {
        match self.child.wait().await {
            Ok(status) => Ok(ExitStatus::from(status)),
            Err(e) => Err(HostError::Internal(format!("Wait failed: {}", e))),
        }
    }
}

fn spawn_error(spec: &LaunchSpec, identity: &Identity, err: io::Error) -> HostError {
    let program = spec.executable().display();
    match err.kind() {
        io::ErrorKind::PermissionDenied => HostError::PermissionDenied(format!(
            "Cannot run {} as {}: {}",
            program, identity.name, err
        )),
        _ => HostError::SpawnFailed(format!("Failed to spawn {}: {}", program, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_username;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn identity() -> Identity {
        Identity::resolve(&current_username().unwrap()).unwrap()
    }

    fn spec(program: &str, args: Option<&str>) -> LaunchSpec {
        LaunchSpec::new(
            "ignored",
            Duration::from_secs(5),
            program,
            args.map(str::to_string),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn spawn_simple_process() {
        let (mut proc, _stdio) =
            ManagedProcess::spawn(&spec("/bin/true", None), &identity()).unwrap();

        let status = proc.wait().await.unwrap();
        assert_eq!(status.code, Some(0));
        assert_eq!(proc.pid, proc.pgid);
    }

    #[tokio::test]
    async fn spawn_with_args_and_capture() {
        let (mut proc, mut stdio) =
            ManagedProcess::spawn(&spec("/bin/echo", Some(r#"hello "big world""#)), &identity())
                .unwrap();

        let mut out = String::new();
        stdio.stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello big world\n");
        assert_eq!(proc.wait().await.unwrap().code, Some(0));
    }

    #[tokio::test]
    async fn working_directory_is_executable_parent() {
        let (mut proc, mut stdio) =
            ManagedProcess::spawn(&spec("/bin/sh", Some("-c pwd")), &identity()).unwrap();

        let mut out = String::new();
        stdio.stdout.read_to_string(&mut out).await.unwrap();
        let reported = std::path::Path::new(out.trim()).canonicalize().unwrap();
        assert_eq!(reported, std::path::Path::new("/bin").canonicalize().unwrap());
        assert_eq!(proc.wait().await.unwrap().code, Some(0));
    }

    #[tokio::test]
    async fn kill_sleeping_process() {
        let (mut proc, _stdio) =
            ManagedProcess::spawn(&spec("/bin/sleep", Some("60")), &identity()).unwrap();

        assert!(proc.try_wait().unwrap().is_none());
        proc.kill().unwrap();

        let status = proc.wait().await.unwrap();
        assert!(status.signaled);
        assert_eq!(status.signal, Some(Signal::SIGKILL as i32));

        // Already gone
        proc.kill().unwrap();
    }

    #[tokio::test]
    async fn missing_executable() {
        let result = ManagedProcess::spawn(&spec("/nonexistent/runbound-test", None), &identity());
        assert!(matches!(result, Err(HostError::SpawnFailed(_))));
    }
}
