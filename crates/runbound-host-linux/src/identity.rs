//! Account resolution for the child's identity

use nix::unistd::{Gid, Uid, User, geteuid};
use runbound_host_api::{HostError, HostResult};
use std::ffi::CString;
use std::path::PathBuf;
use tracing::debug;

/// A resolved local account the child will run as
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,

    /// Supplementary groups, filled only when an identity switch is needed
    pub groups: Vec<Gid>,
}

impl Identity {
    /// Look up `username` in the system account database
    pub fn resolve(username: &str) -> HostResult<Self> {
        let user = User::from_name(username)
            .map_err(|e| HostError::Internal(format!("Account lookup failed: {}", e)))?
            .ok_or_else(|| HostError::AccountNotFound(username.to_string()))?;

        let mut identity = Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
            groups: Vec::new(),
        };

        if identity.requires_switch() {
            let cname = CString::new(identity.name.as_str())
                .map_err(|_| HostError::AccountNotFound(username.to_string()))?;
            identity.groups = nix::unistd::getgrouplist(&cname, identity.gid).map_err(|e| {
                HostError::Internal(format!("Group lookup for {} failed: {}", username, e))
            })?;
        }

        debug!(
            user = %identity.name,
            uid = identity.uid.as_raw(),
            gid = identity.gid.as_raw(),
            switch = identity.requires_switch(),
            "Resolved account"
        );

        Ok(identity)
    }

    /// Whether the child must change uid before exec
    pub fn requires_switch(&self) -> bool {
        self.uid != geteuid()
    }
}

/// Name of the account the supervisor itself runs as
pub fn current_username() -> HostResult<String> {
    let uid = geteuid();
    User::from_uid(uid)
        .map_err(|e| HostError::Internal(format!("Account lookup failed: {}", e)))?
        .map(|user| user.name)
        .ok_or_else(|| HostError::AccountNotFound(format!("uid {}", uid)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_current_user() {
        let name = current_username().unwrap();
        let identity = Identity::resolve(&name).unwrap();

        assert_eq!(identity.uid, geteuid());
        assert!(!identity.requires_switch());
        assert!(identity.groups.is_empty());
    }

    #[test]
    fn unknown_account() {
        let result = Identity::resolve("runbound-no-such-user-7f3a");
        assert!(matches!(result, Err(HostError::AccountNotFound(_))));
    }
}
