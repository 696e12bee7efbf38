//! Password check before running as another account

use runbound_api::CredentialHandle;
use runbound_host_api::{HostError, HostResult};

use crate::Identity;

/// PAM service whose auth stack checks the password
#[cfg(feature = "pam")]
pub const PAM_SERVICE: &str = "login";

/// Confirm that `credential` may start processes as `identity`.
///
/// The supervisor's own account needs no check. Any other account must pass
/// PAM authentication with the supplied password; a build without the `pam`
/// feature cannot verify passwords and refuses the switch.
pub fn authorize(identity: &Identity, credential: &CredentialHandle) -> HostResult<()> {
    if !identity.requires_switch() {
        return Ok(());
    }
    verify_password(identity, credential)
}

#[cfg(feature = "pam")]
fn verify_password(identity: &Identity, credential: &CredentialHandle) -> HostResult<()> {
    use secrecy::ExposeSecret;

    let mut client = pam::Client::with_password(PAM_SERVICE)
        .map_err(|e| HostError::Internal(format!("PAM setup failed: {:?}", e)))?;
    client
        .conversation_mut()
        .set_credentials(identity.name.as_str(), credential.secret().expose_secret());

    client.authenticate().map_err(|e| {
        HostError::PermissionDenied(format!(
            "Authentication as {} failed: {:?}",
            identity.name, e
        ))
    })?;

    tracing::debug!(user = %identity.name, service = PAM_SERVICE, "Password accepted");
    Ok(())
}

#[cfg(not(feature = "pam"))]
fn verify_password(identity: &Identity, _credential: &CredentialHandle) -> HostResult<()> {
    Err(HostError::PermissionDenied(format!(
        "Cannot verify the password for {}: built without PAM support",
        identity.name
    )))
}
