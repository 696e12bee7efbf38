//! Host adapter traits

use async_trait::async_trait;
use runbound_api::{CredentialHandle, ExitStatus, LaunchSpec};
use runbound_util::RunboundError;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Kill failed: {0}")]
    KillFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

impl From<HostError> for RunboundError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::AccountNotFound(_)
            | HostError::SpawnFailed(_)
            | HostError::PermissionDenied(_) => RunboundError::launch(err.to_string()),
            HostError::Io(e) => RunboundError::Io(e),
            HostError::KillFailed(_) | HostError::Internal(_) => {
                RunboundError::internal(err.to_string())
            }
        }
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The child's three redirected standard streams, from the supervisor's side
pub struct ChildStdio {
    /// Write end of the child's stdin
    pub stdin: BoxedWriter,

    /// Read end of the child's stdout
    pub stdout: BoxedReader,

    /// Read end of the child's stderr
    pub stderr: BoxedReader,
}

/// Liveness and kill control over the one supervised child
#[async_trait]
pub trait ChildControl: Send {
    /// OS process id, if the platform has one
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_wait(&mut self) -> HostResult<Option<ExitStatus>>;

    /// Immediate, non-cooperative termination. Killing an already exited
    /// child is not an error.
    fn kill(&mut self) -> HostResult<()>;

    /// Wait for the child to exit and reap it
    async fn wait(&mut self) -> HostResult<ExitStatus>;
}

/// A freshly launched child: control handle plus its pipes
pub struct Launched<C> {
    pub child: C,
    pub stdio: ChildStdio,
}

/// Host adapter trait - implemented by platform-specific adapters
#[async_trait]
pub trait ProcessHost: Send + Sync {
    type Child: ChildControl + 'static;

    /// Create the child process described by `spec`, running as the identity
    /// in `credential`, with all three standard streams piped.
    ///
    /// Either the child is fully started and returned, or nothing is left
    /// running.
    async fn launch(
        &self,
        spec: &LaunchSpec,
        credential: CredentialHandle,
    ) -> HostResult<Launched<Self::Child>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_errors_map_to_launch_category() {
        let err: RunboundError = HostError::AccountNotFound("nobody2".into()).into();
        assert_eq!(err.category(), "LaunchError");
        assert!(err.to_string().contains("nobody2"));

        let err: RunboundError = HostError::Io(std::io::Error::other("pipe")).into();
        assert_eq!(err.category(), "IoError");

        let err: RunboundError = HostError::KillFailed("EPERM".into()).into();
        assert_eq!(err.category(), "InternalError");
    }
}
