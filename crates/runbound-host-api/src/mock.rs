//! Mock host adapter for testing

use async_trait::async_trait;
use runbound_api::{CredentialHandle, ExitStatus, LaunchSpec};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use crate::{ChildControl, ChildStdio, HostError, HostResult, Launched, ProcessHost};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Signal number reported for a killed mock child (SIGKILL)
pub const MOCK_KILL_SIGNAL: i32 = 9;

/// Scripted behavior of the mock children
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Exit on its own after this long; `None` runs until killed
    pub exit_after: Option<Duration>,

    /// Exit code used for a natural exit
    pub exit_code: i32,

    /// Bytes the child writes to stdout before closing it
    pub stdout: Vec<u8>,

    /// Bytes the child writes to stderr before closing it
    pub stderr: Vec<u8>,
}

/// Mock child process
pub struct MockChild {
    started: Instant,
    exit_after: Option<Duration>,
    exit_code: i32,
    killed: Arc<AtomicBool>,
    kill_count: Arc<AtomicUsize>,
}

impl MockChild {
    fn status(&self) -> Option<ExitStatus> {
        if self.killed.load(Ordering::SeqCst) {
            return Some(ExitStatus::signaled(MOCK_KILL_SIGNAL));
        }
        match self.exit_after {
            Some(after) if self.started.elapsed() >= after => {
                Some(ExitStatus::with_code(self.exit_code))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ChildControl for MockChild {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> HostResult<Option<ExitStatus>> {
        Ok(self.status())
    }

    fn kill(&mut self) -> HostResult<()> {
        if self.status().is_none() {
            self.kill_count.fetch_add(1, Ordering::SeqCst);
            self.killed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait(&mut self) -> HostResult<ExitStatus> {
        loop {
            if let Some(status) = self.status() {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Mock host adapter for unit/integration testing
pub struct MockHost {
    behavior: MockBehavior,
    launches: AtomicUsize,
    kill_count: Arc<AtomicUsize>,
    stdin_received: Arc<Mutex<Vec<u8>>>,

    /// Configure launch to fail
    pub fail_launch: Arc<Mutex<bool>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            launches: AtomicUsize::new(0),
            kill_count: Arc::new(AtomicUsize::new(0)),
            stdin_received: Arc::new(Mutex::new(Vec::new())),
            fail_launch: Arc::new(Mutex::new(false)),
        }
    }

    /// Number of children successfully launched
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of forced kills delivered to live children
    pub fn kill_count(&self) -> usize {
        self.kill_count.load(Ordering::SeqCst)
    }

    /// Everything the children have read from their stdin so far
    pub fn stdin_received(&self) -> Vec<u8> {
        self.stdin_received.lock().unwrap().clone()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessHost for MockHost {
    type Child = MockChild;

    async fn launch(
        &self,
        spec: &LaunchSpec,
        _credential: CredentialHandle,
    ) -> HostResult<Launched<MockChild>> {
        if *self.fail_launch.lock().unwrap() {
            return Err(HostError::SpawnFailed(format!(
                "Mock launch failure for {}",
                spec.executable().display()
            )));
        }

        let (stdin_writer, mut stdin_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_reader, mut stdout_writer) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_reader, mut stderr_writer) = tokio::io::duplex(PIPE_CAPACITY);

        let received = self.stdin_received.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok(n) = stdin_reader.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                received.lock().unwrap().extend_from_slice(&buf[..n]);
            }
        });

        let stdout = self.behavior.stdout.clone();
        let stderr = self.behavior.stderr.clone();
        tokio::spawn(async move {
            let _ = stdout_writer.write_all(&stdout).await;
            let _ = stderr_writer.write_all(&stderr).await;
        });

        self.launches.fetch_add(1, Ordering::SeqCst);

        let child = MockChild {
            started: Instant::now(),
            exit_after: self.behavior.exit_after,
            exit_code: self.behavior.exit_code,
            killed: Arc::new(AtomicBool::new(false)),
            kill_count: self.kill_count.clone(),
        };

        Ok(Launched {
            child,
            stdio: ChildStdio {
                stdin: Box::new(stdin_writer),
                stdout: Box::new(stdout_reader),
                stderr: Box::new(stderr_reader),
            },
        })
    }
}
