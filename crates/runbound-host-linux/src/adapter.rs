//! Linux host adapter implementation

use async_trait::async_trait;
use runbound_api::{CredentialHandle, LaunchSpec};
use runbound_host_api::{HostError, HostResult, Launched, ProcessHost};
use runbound_util::duration_millis;
use tracing::{debug, info};

use crate::{Identity, ManagedProcess, authorize};

/// Linux host adapter
///
/// Running the child as another account needs two things: the password must
/// pass [`authorize`], and the supervisor must be allowed to change identity
/// (root, or CAP_SETUID/CAP_SETGID), otherwise the spawn fails with a
/// permission error. Launching as the supervisor's own account needs neither.
#[derive(Debug, Default)]
pub struct LinuxHost;

impl LinuxHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessHost for LinuxHost {
    type Child = ManagedProcess;

    async fn launch(
        &self,
        spec: &LaunchSpec,
        credential: CredentialHandle,
    ) -> HostResult<Launched<ManagedProcess>> {
        let identity = Identity::resolve(credential.username())?;
        authorize(&identity, &credential)?;

        if let Some(dir) = spec.working_directory() {
            if !dir.is_dir() {
                return Err(HostError::SpawnFailed(format!(
                    "Working directory {} does not exist",
                    dir.display()
                )));
            }
        }

        debug!(
            user = %identity.name,
            has_secret = credential.has_secret(),
            "Launching as account"
        );

        let (child, stdio) = ManagedProcess::spawn(spec, &identity)?;

        // Consumed exactly once; the secret is wiped on drop
        drop(credential);

        info!(
            pid = child.pid,
            pgid = child.pgid,
            user = %identity.name,
            executable = %spec.executable().display(),
            timeout_ms = duration_millis(spec.timeout()),
            "Spawned process"
        );

        Ok(Launched { child, stdio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_username;
    use runbound_host_api::ChildControl;
    use runbound_util::RunboundError;
    use std::time::Duration;

    fn credential() -> CredentialHandle {
        CredentialHandle::new(current_username().unwrap(), "unused".to_string())
    }

    #[tokio::test]
    async fn test_spawn_and_exit() {
        let host = LinuxHost::new();
        let spec = LaunchSpec::new("me", Duration::from_secs(5), "/bin/true", None).unwrap();

        let Launched { mut child, stdio: _stdio } = host.launch(&spec, credential()).await.unwrap();

        assert!(child.pid().is_some());
        assert_eq!(child.wait().await.unwrap().code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_and_kill() {
        let host = LinuxHost::new();
        let spec =
            LaunchSpec::new("me", Duration::from_secs(5), "/bin/sleep", Some("60".into())).unwrap();

        let Launched { mut child, stdio: _stdio } = host.launch(&spec, credential()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        child.kill().unwrap();

        let status = child.wait().await.unwrap();
        assert!(status.signaled);
    }

    #[tokio::test]
    async fn unknown_account_is_a_launch_error() {
        let host = LinuxHost::new();
        let spec = LaunchSpec::new("x", Duration::from_secs(5), "/bin/true", None).unwrap();
        let credential = CredentialHandle::new("runbound-no-such-user-7f3a", "pw".to_string());

        let result = host.launch(&spec, credential).await;
        assert!(matches!(result, Err(HostError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn wrong_password_for_other_account_starts_nothing() {
        let me = current_username().unwrap();
        let Some(other) = ["nobody", "root", "daemon"]
            .into_iter()
            .find(|name| *name != me && Identity::resolve(name).is_ok())
        else {
            return;
        };
        let host = LinuxHost::new();
        let spec = LaunchSpec::new(other, Duration::from_secs(5), "/bin/true", None).unwrap();
        let credential = CredentialHandle::new(other, "not-the-password".to_string());

        let Err(err) = host.launch(&spec, credential).await else {
            panic!("launch as {} succeeded with a wrong password", other);
        };
        assert!(matches!(err, HostError::PermissionDenied(_)));
        assert!(matches!(RunboundError::from(err), RunboundError::Launch(_)));
    }

    #[tokio::test]
    async fn missing_working_directory() {
        let host = LinuxHost::new();
        let spec =
            LaunchSpec::new("x", Duration::from_secs(5), "/nonexistent/dir/prog", None).unwrap();

        let result = host.launch(&spec, credential()).await;
        assert!(matches!(result, Err(HostError::SpawnFailed(_))));
    }
}
